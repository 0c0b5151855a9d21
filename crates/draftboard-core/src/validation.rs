// Draft and team setup rules, checked before anything is written.

use thiserror::Error;

use crate::models::{DraftType, NewDraft, ScoringFormat, TeamId};

pub const MIN_TEAMS: i64 = 2;
pub const MAX_TEAMS: i64 = 14;
pub const MAX_TEAM_NAME_LEN: usize = 50;
pub const MAX_SEARCH_QUERY_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("draft name is required")]
    DraftNameRequired,

    #[error("invalid league size {0}: must be between 2 and 14 teams")]
    InvalidLeagueSize(i64),

    #[error("invalid max rounds {0}: must be 0 (uncapped) or more")]
    InvalidMaxRounds(i64),

    #[error("invalid scoring format `{0}`: must be Standard, Half-PPR, or PPR")]
    InvalidScoringFormat(String),

    #[error("invalid draft type `{0}`: must be Redraft or Dynasty")]
    InvalidDraftType(String),

    #[error("team name is required")]
    TeamNameRequired,

    #[error("team name must be between 1 and 50 characters, got {0}")]
    TeamNameTooLong(usize),

    #[error("team name `{0}` already exists in this draft")]
    DuplicateTeamName(String),

    #[error("draft position {position} out of range: must be between 1 and {num_teams}")]
    InvalidDraftPosition { position: i64, num_teams: i64 },

    #[error("draft position {0} already assigned")]
    DuplicateDraftPosition(i64),

    #[error("must have exactly {expected} teams, found {actual}")]
    IncompleteRoster { expected: i64, actual: i64 },

    #[error("search query too long (max 50 characters)")]
    SearchQueryTooLong,
}

/// The fields of a team that setup rules look at. `id` is `None` for a team
/// that has not been stored yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamCandidate<'a> {
    pub id: Option<TeamId>,
    pub name: &'a str,
    pub draft_position: i64,
}

pub fn validate_new_draft(draft: &NewDraft) -> Result<(), SetupError> {
    if draft.name.trim().is_empty() {
        return Err(SetupError::DraftNameRequired);
    }
    if !(MIN_TEAMS..=MAX_TEAMS).contains(&draft.num_teams) {
        return Err(SetupError::InvalidLeagueSize(draft.num_teams));
    }
    if draft.max_rounds < 0 {
        return Err(SetupError::InvalidMaxRounds(draft.max_rounds));
    }
    Ok(())
}

/// Parse the textual league settings a client submits. Both are
/// case-sensitive.
pub fn parse_league_settings(
    scoring_format: &str,
    draft_type: &str,
) -> Result<(ScoringFormat, DraftType), SetupError> {
    let scoring_format = scoring_format
        .parse()
        .map_err(|_| SetupError::InvalidScoringFormat(scoring_format.to_string()))?;
    let draft_type = draft_type
        .parse()
        .map_err(|_| SetupError::InvalidDraftType(draft_type.to_string()))?;
    Ok((scoring_format, draft_type))
}

/// Check a new or edited team against the rest of the draft's roster.
///
/// Existing teams are scanned in order; for each one a name clash is
/// reported before a seat clash.
pub fn validate_team<'a, I>(
    candidate: TeamCandidate<'_>,
    existing: I,
    num_teams: i64,
) -> Result<(), SetupError>
where
    I: IntoIterator<Item = TeamCandidate<'a>>,
{
    if candidate.name.is_empty() {
        return Err(SetupError::TeamNameRequired);
    }
    let len = candidate.name.chars().count();
    if len > MAX_TEAM_NAME_LEN {
        return Err(SetupError::TeamNameTooLong(len));
    }
    if candidate.draft_position < 1 || candidate.draft_position > num_teams {
        return Err(SetupError::InvalidDraftPosition {
            position: candidate.draft_position,
            num_teams,
        });
    }

    for other in existing {
        if candidate.id.is_some() && other.id == candidate.id {
            continue;
        }
        if other.name == candidate.name {
            return Err(SetupError::DuplicateTeamName(candidate.name.to_string()));
        }
        if other.draft_position == candidate.draft_position {
            return Err(SetupError::DuplicateDraftPosition(candidate.draft_position));
        }
    }
    Ok(())
}

/// A draft can only start with every seat filled.
pub fn validate_roster_count(team_count: i64, num_teams: i64) -> Result<(), SetupError> {
    if team_count != num_teams {
        return Err(SetupError::IncompleteRoster {
            expected: num_teams,
            actual: team_count,
        });
    }
    Ok(())
}

pub fn validate_search_query(query: &str) -> Result<(), SetupError> {
    if query.chars().count() > MAX_SEARCH_QUERY_LEN {
        return Err(SetupError::SearchQueryTooLong);
    }
    Ok(())
}
