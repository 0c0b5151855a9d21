// Domain records shared by the engine, the database and the wire protocol.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::draft::status::DraftStatus;

pub type DraftId = i64;
pub type TeamId = i64;
pub type PlayerId = i64;
pub type PickId = i64;

/// Rounds given to a new draft when the caller does not choose.
pub const DEFAULT_MAX_ROUNDS: i64 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} `{value}`")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

// ---------------------------------------------------------------------------
// League settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoringFormat {
    Standard,
    #[serde(rename = "Half-PPR")]
    HalfPpr,
    #[serde(rename = "PPR")]
    Ppr,
}

impl ScoringFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringFormat::Standard => "Standard",
            ScoringFormat::HalfPpr => "Half-PPR",
            ScoringFormat::Ppr => "PPR",
        }
    }
}

impl FromStr for ScoringFormat {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Standard" => Ok(ScoringFormat::Standard),
            "Half-PPR" => Ok(ScoringFormat::HalfPpr),
            "PPR" => Ok(ScoringFormat::Ppr),
            other => Err(ParseEnumError {
                kind: "scoring format",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DraftType {
    Redraft,
    Dynasty,
}

impl DraftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftType::Redraft => "Redraft",
            DraftType::Dynasty => "Dynasty",
        }
    }
}

impl FromStr for DraftType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Redraft" => Ok(DraftType::Redraft),
            "Dynasty" => Ok(DraftType::Dynasty),
            other => Err(ParseEnumError {
                kind: "draft type",
                value: other.to_string(),
            }),
        }
    }
}

/// Football positions a player can be listed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    QB,
    RB,
    WR,
    TE,
    K,
    #[serde(rename = "D/ST")]
    DST,
    DL,
    LB,
    DB,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::QB => "QB",
            Position::RB => "RB",
            Position::WR => "WR",
            Position::TE => "TE",
            Position::K => "K",
            Position::DST => "D/ST",
            Position::DL => "DL",
            Position::LB => "LB",
            Position::DB => "DB",
        }
    }
}

impl FromStr for Position {
    type Err = ParseEnumError;

    /// Case-sensitive: "qb" is not a position.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QB" => Ok(Position::QB),
            "RB" => Ok(Position::RB),
            "WR" => Ok(Position::WR),
            "TE" => Ok(Position::TE),
            "K" => Ok(Position::K),
            "D/ST" => Ok(Position::DST),
            "DL" => Ok(Position::DL),
            "LB" => Ok(Position::LB),
            "DB" => Ok(Position::DB),
            other => Err(ParseEnumError {
                kind: "position",
                value: other.to_string(),
            }),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

display_as_str!(ScoringFormat, DraftType, Position);

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: DraftId,
    pub name: String,
    pub num_teams: i64,
    pub scoring_format: ScoringFormat,
    pub draft_type: DraftType,
    pub status: DraftStatus,
    /// 0 means no fixed number of rounds.
    pub max_rounds: i64,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    pub fn can_make_picks(&self) -> bool {
        self.status.accepts_picks()
    }
}

/// Settings for a draft that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDraft {
    pub name: String,
    pub num_teams: i64,
    pub scoring_format: ScoringFormat,
    pub draft_type: DraftType,
    pub max_rounds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub draft_id: DraftId,
    pub name: String,
    pub owner_name: Option<String>,
    /// Seat in the snake order, 1..=num_teams. Unrelated to `id`.
    pub draft_position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeam {
    pub name: String,
    pub owner_name: Option<String>,
    pub draft_position: i64,
}

/// Average-draft-position ranks per format. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdpRanks {
    pub dynasty: Option<i64>,
    pub standard: Option<i64>,
    pub half_ppr: Option<i64>,
    pub ppr: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Professional club abbreviation, e.g. "KC".
    pub team: String,
    pub position: Position,
    pub bye_week: Option<i64>,
    pub adp: AdpRanks,
}

impl Player {
    /// ADP rank relevant to a draft's settings. Dynasty drafts ignore the
    /// scoring format.
    pub fn adp_rank(&self, draft_type: DraftType, scoring_format: ScoringFormat) -> Option<i64> {
        if draft_type == DraftType::Dynasty {
            return self.adp.dynasty;
        }
        match scoring_format {
            ScoringFormat::Ppr => self.adp.ppr,
            ScoringFormat::HalfPpr => self.adp.half_ppr,
            ScoringFormat::Standard => self.adp.standard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlayer {
    pub name: String,
    pub team: String,
    pub position: Position,
    pub bye_week: Option<i64>,
    pub adp: AdpRanks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pick {
    pub id: PickId,
    pub draft_id: DraftId,
    pub team_id: TeamId,
    pub player_id: PlayerId,
    /// Derived from `overall_pick`; never chosen independently.
    pub round: i64,
    /// 1-based sequence number across the whole draft.
    pub overall_pick: i64,
    pub is_traded: bool,
    pub adp_rank: Option<i64>,
    pub picked_at: DateTime<Utc>,
}

/// A pick that has passed validation and is ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPick {
    pub draft_id: DraftId,
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub round: i64,
    pub overall_pick: i64,
    pub adp_rank: Option<i64>,
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Start,
    Pause,
    Resume,
    Complete,
    Pick,
    Undo,
    Trade,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Start => "start",
            AuditAction::Pause => "pause",
            AuditAction::Resume => "resume",
            AuditAction::Complete => "complete",
            AuditAction::Pick => "pick",
            AuditAction::Undo => "undo",
            AuditAction::Trade => "trade",
        }
    }
}

impl FromStr for AuditAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(AuditAction::Start),
            "pause" => Ok(AuditAction::Pause),
            "resume" => Ok(AuditAction::Resume),
            "complete" => Ok(AuditAction::Complete),
            "pick" => Ok(AuditAction::Pick),
            "undo" => Ok(AuditAction::Undo),
            "trade" => Ok(AuditAction::Trade),
            other => Err(ParseEnumError {
                kind: "audit action",
                value: other.to_string(),
            }),
        }
    }
}

display_as_str!(AuditAction);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub draft_id: DraftId,
    pub action: AuditAction,
    pub entity_id: Option<i64>,
    pub details: String,
    pub performed_at: DateTime<Utc>,
}
