// Pick validation against a snapshot of the draft.
//
// Checks run in a fixed order and stop at the first failure:
//   1. sequence  - the pick number must be exactly count + 1
//   2. turn      - the submitting team must be on the clock
//   3. activity  - the draft must be active
// Callers get one error per attempt, never an aggregate.

use thiserror::Error;

use super::order::{self, Seat};
use crate::models::{Draft, DraftStatus, PlayerId, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PickError {
    #[error("pick number must be sequential: expected {expected}, got {proposed}")]
    NonSequential { expected: i64, proposed: i64 },

    #[error("not team {team_id}'s turn to make pick {overall_pick}")]
    WrongTurn { overall_pick: i64, team_id: TeamId },

    #[error("draft is {0}; picks are only accepted while active")]
    DraftNotActive(DraftStatus),

    #[error("player {0} has already been drafted")]
    DuplicatePlayer(PlayerId),
}

/// The part of a pick the sequencer judges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposedPick {
    pub team_id: TeamId,
    pub overall_pick: i64,
}

/// Decide whether `proposed` may be recorded given `current_pick_count`
/// picks already stored for `draft`.
pub fn validate_pick<T: Seat>(
    proposed: ProposedPick,
    draft: &Draft,
    teams: &[T],
    current_pick_count: i64,
) -> Result<(), PickError> {
    let expected = current_pick_count + 1;
    if proposed.overall_pick != expected {
        return Err(PickError::NonSequential {
            expected,
            proposed: proposed.overall_pick,
        });
    }

    // An unresolvable seat counts as the wrong turn: nobody is on the clock.
    let on_clock = order::current_team(proposed.overall_pick, draft.num_teams, teams)
        .map(|team| team.team_id())
        .ok();
    if on_clock != Some(proposed.team_id) {
        return Err(PickError::WrongTurn {
            overall_pick: proposed.overall_pick,
            team_id: proposed.team_id,
        });
    }

    if !draft.status.accepts_picks() {
        return Err(PickError::DraftNotActive(draft.status));
    }

    Ok(())
}

/// A player can only be drafted once per draft, whatever the turn order.
pub fn is_duplicate_player(player_id: PlayerId, drafted: &[PlayerId]) -> bool {
    drafted.contains(&player_id)
}

pub fn ensure_player_available(player_id: PlayerId, drafted: &[PlayerId]) -> Result<(), PickError> {
    if is_duplicate_player(player_id, drafted) {
        return Err(PickError::DuplicatePlayer(player_id));
    }
    Ok(())
}
