// Draft lifecycle: setup -> active <-> paused -> completed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a draft. `Completed` is the only completion signal;
/// there is no separate flag that could disagree with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Setup,
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move draft from {from} to {to}")]
pub struct TransitionError {
    pub from: DraftStatus,
    pub to: DraftStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown draft status `{0}`")]
pub struct ParseStatusError(pub String);

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Setup => "setup",
            DraftStatus::Active => "active",
            DraftStatus::Paused => "paused",
            DraftStatus::Completed => "completed",
        }
    }

    /// Only an active draft accepts picks.
    pub fn accepts_picks(&self) -> bool {
        matches!(self, DraftStatus::Active)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DraftStatus::Completed)
    }

    /// Whether `self -> to` is a legal lifecycle move.
    ///
    /// Completion may be requested from any live state; nothing leaves
    /// `Completed`. The roster-size guard on `Setup -> Active` belongs to the
    /// caller, which is the only place that knows the roster.
    pub fn can_transition_to(&self, to: DraftStatus) -> bool {
        use DraftStatus::*;
        matches!(
            (self, to),
            (Setup, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Setup, Completed)
                | (Active, Completed)
                | (Paused, Completed)
        )
    }

    pub fn transition(self, to: DraftStatus) -> Result<DraftStatus, TransitionError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(TransitionError { from: self, to })
        }
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DraftStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "setup" => Ok(DraftStatus::Setup),
            "active" => Ok(DraftStatus::Active),
            "paused" => Ok(DraftStatus::Paused),
            "completed" => Ok(DraftStatus::Completed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}
