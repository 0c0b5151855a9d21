// Snake draft order: which round a pick falls in and whose turn it is.

use thiserror::Error;

use crate::models::{Team, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("invalid pick number {0}: picks are numbered from 1")]
    InvalidPickNumber(i64),

    #[error("invalid number of teams {0}: must be at least 1")]
    InvalidTeamCount(i64),

    #[error("no team found for draft position {0}")]
    NoTeamAtPosition(i64),
}

/// Anything that occupies a draft position and can be put on the clock.
///
/// Draft positions are deliberately separate from team identity: a team's
/// seat can be reassigned or traded without changing its id.
pub trait Seat {
    fn team_id(&self) -> TeamId;
    fn draft_position(&self) -> i64;
}

impl Seat for Team {
    fn team_id(&self) -> TeamId {
        self.id
    }

    fn draft_position(&self) -> i64 {
        self.draft_position
    }
}

impl Seat for (TeamId, i64) {
    fn team_id(&self) -> TeamId {
        self.0
    }

    fn draft_position(&self) -> i64 {
        self.1
    }
}

/// Round number (1-based) for a global pick number: `ceil(pick / num_teams)`.
pub fn round_of(pick_number: i64, num_teams: i64) -> Result<i64, OrderError> {
    check_inputs(pick_number, num_teams)?;
    Ok((pick_number - 1) / num_teams + 1)
}

/// Draft position on the clock for a global pick number.
///
/// Odd rounds run 1..=N, even rounds run N..=1, so the last seat of an odd
/// round also takes the first pick of the next round.
pub fn current_position(pick_number: i64, num_teams: i64) -> Result<i64, OrderError> {
    let round = round_of(pick_number, num_teams)?;
    let position_in_round = ((pick_number - 1) % num_teams) + 1;
    if round % 2 == 1 {
        Ok(position_in_round)
    } else {
        Ok(num_teams - position_in_round + 1)
    }
}

/// Resolve the team on the clock for `pick_number` by scanning `teams` for
/// the computed draft position.
///
/// Rosters hold at most 14 teams, so a linear scan is all this needs. An
/// incomplete roster (e.g. during setup) simply fails to find the seat.
pub fn current_team<T: Seat>(
    pick_number: i64,
    num_teams: i64,
    teams: &[T],
) -> Result<&T, OrderError> {
    let position = current_position(pick_number, num_teams)?;
    teams
        .iter()
        .find(|team| team.draft_position() == position)
        .ok_or(OrderError::NoTeamAtPosition(position))
}

fn check_inputs(pick_number: i64, num_teams: i64) -> Result<(), OrderError> {
    if pick_number < 1 {
        return Err(OrderError::InvalidPickNumber(pick_number));
    }
    if num_teams <= 0 {
        return Err(OrderError::InvalidTeamCount(num_teams));
    }
    Ok(())
}
