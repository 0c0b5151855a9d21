// JSON messages exchanged with WebSocket clients.
//
// Every message is an object tagged by `"type"` in SCREAMING_SNAKE_CASE with
// camelCase fields, e.g. `{"type":"MAKE_PICK","draftId":1,"playerId":7}`.

use draftboard_core::board::BoardError;
use draftboard_core::models::{
    AdpRanks, Draft, DraftId, Pick, PickId, Player, PlayerId, Position, Team, TeamId,
};
use draftboard_core::notify::DraftEvent;
use serde::{Deserialize, Serialize};

/// Requests a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Start receiving `EVENT`s for a draft. Replaces any earlier
    /// subscription on the same connection.
    #[serde(rename_all = "camelCase")]
    Subscribe { draft_id: DraftId },

    Unsubscribe,

    #[serde(rename_all = "camelCase")]
    OnTheClock { draft_id: DraftId },

    /// `teamId` and `overallPick` are optional assertions about whose turn
    /// the client thinks it is.
    #[serde(rename_all = "camelCase")]
    MakePick {
        draft_id: DraftId,
        player_id: PlayerId,
        #[serde(default)]
        team_id: Option<TeamId>,
        #[serde(default)]
        overall_pick: Option<i64>,
    },

    #[serde(rename_all = "camelCase")]
    UndoPick { draft_id: DraftId },

    #[serde(rename_all = "camelCase")]
    TradePick {
        pick_id: PickId,
        to_team_id: TeamId,
        #[serde(default)]
        notes: String,
    },

    #[serde(rename_all = "camelCase")]
    StartDraft { draft_id: DraftId },

    #[serde(rename_all = "camelCase")]
    PauseDraft { draft_id: DraftId },

    #[serde(rename_all = "camelCase")]
    ResumeDraft { draft_id: DraftId },

    #[serde(rename_all = "camelCase")]
    CompleteDraft { draft_id: DraftId },

    /// Scoring format and draft type arrive as text and are validated on
    /// receipt.
    #[serde(rename_all = "camelCase")]
    CreateDraft {
        name: String,
        num_teams: i64,
        scoring_format: String,
        draft_type: String,
        #[serde(default)]
        max_rounds: Option<i64>,
    },

    /// Replace a draft's league settings while it is still in setup.
    #[serde(rename_all = "camelCase")]
    UpdateDraft {
        draft_id: DraftId,
        name: String,
        num_teams: i64,
        scoring_format: String,
        draft_type: String,
        #[serde(default)]
        max_rounds: Option<i64>,
    },

    #[serde(rename_all = "camelCase")]
    AddTeam {
        draft_id: DraftId,
        name: String,
        #[serde(default)]
        owner_name: Option<String>,
        draft_position: i64,
    },

    #[serde(rename_all = "camelCase")]
    AddPlayer {
        name: String,
        team: String,
        position: Position,
        #[serde(default)]
        bye_week: Option<i64>,
        #[serde(default)]
        adp: AdpRanks,
    },

    #[serde(rename_all = "camelCase")]
    SearchPlayers {
        draft_id: DraftId,
        #[serde(default)]
        query: String,
        #[serde(default)]
        position: Option<Position>,
        #[serde(default)]
        limit: Option<i64>,
    },
}

/// Replies and pushed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Subscribed { draft_id: DraftId },

    Unsubscribed,

    #[serde(rename_all = "camelCase")]
    OnTheClock {
        draft_id: DraftId,
        overall_pick: i64,
        round: i64,
        team: Team,
    },

    #[serde(rename_all = "camelCase")]
    PickAccepted { pick: Pick, draft_completed: bool },

    /// A command without a richer result succeeded.
    #[serde(rename_all = "camelCase")]
    Ack { draft_id: DraftId },

    DraftCreated { draft: Draft },

    DraftUpdated { draft: Draft },

    TeamAdded { team: Team },

    PlayerAdded { player: Player },

    Players { players: Vec<Player> },

    /// Something happened to the subscribed draft.
    Event { event: DraftEvent },

    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error("bad_request", message)
    }
}

impl From<&BoardError> for ServerMessage {
    fn from(err: &BoardError) -> Self {
        let message = match err {
            // Storage failures stay in the server log.
            BoardError::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        ServerMessage::error(err.code(), message)
    }
}
