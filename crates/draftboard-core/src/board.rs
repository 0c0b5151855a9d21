// Draft board service: ties the turn engine, persistence and notifications
// together behind one API that the server drives.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{is_constraint_violation, Database};
use crate::draft::{
    self, ensure_player_available, is_draft_complete, validate_pick, OrderError, PickError,
    ProposedPick, TransitionError,
};
use crate::models::{
    AuditAction, AuditEntry, Draft, DraftId, DraftStatus, NewDraft, NewPick, NewPlayer, NewTeam,
    Pick, PickId, Player, PlayerId, Position, Team, TeamId,
};
use crate::notify::{DraftEvent, Notifier, Subscription};
use crate::validation::{
    validate_new_draft, validate_roster_count, validate_search_query, validate_team, SetupError,
    TeamCandidate,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BoardError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Pick(#[from] PickError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("draft {0} not found")]
    DraftNotFound(DraftId),

    #[error("team {0} not found")]
    TeamNotFound(TeamId),

    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    #[error("pick {0} not found")]
    PickNotFound(PickId),

    #[error("team {team_id} does not belong to draft {draft_id}")]
    TeamNotInDraft { team_id: TeamId, draft_id: DraftId },

    #[error("teams cannot be changed while the draft is {0}")]
    RosterLocked(DraftStatus),

    #[error("league settings cannot be changed while the draft is {0}")]
    SettingsLocked(DraftStatus),

    #[error("draft {0} has no picks to undo")]
    NoPickToUndo(DraftId),

    #[error("draft {0} is completed")]
    DraftClosed(DraftId),

    #[error("another pick was recorded for this slot or player first")]
    PickConflict,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl BoardError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            BoardError::Order(OrderError::NoTeamAtPosition(_)) => "no_team_at_position",
            BoardError::Order(_) => "invalid_input",
            BoardError::Pick(PickError::NonSequential { .. }) => "non_sequential_pick",
            BoardError::Pick(PickError::WrongTurn { .. }) => "wrong_turn",
            BoardError::Pick(PickError::DraftNotActive(_)) => "draft_not_active",
            BoardError::Pick(PickError::DuplicatePlayer(_)) => "duplicate_player",
            BoardError::Setup(_) => "invalid_setup",
            BoardError::Transition(_) => "invalid_transition",
            BoardError::DraftNotFound(_) => "draft_not_found",
            BoardError::TeamNotFound(_) => "team_not_found",
            BoardError::PlayerNotFound(_) => "player_not_found",
            BoardError::PickNotFound(_) => "pick_not_found",
            BoardError::TeamNotInDraft { .. } => "team_not_in_draft",
            BoardError::RosterLocked(_) => "roster_locked",
            BoardError::SettingsLocked(_) => "settings_locked",
            BoardError::NoPickToUndo(_) => "no_pick_to_undo",
            BoardError::DraftClosed(_) => "draft_completed",
            BoardError::PickConflict => "pick_conflict",
            BoardError::Storage(_) => "internal",
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// A pick submission. `team_id` and `overall_pick` are what the submitter
/// believes is on the clock; left empty they default to the computed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickRequest {
    pub player_id: PlayerId,
    pub team_id: Option<TeamId>,
    pub overall_pick: Option<i64>,
}

impl PickRequest {
    pub fn player(player_id: PlayerId) -> Self {
        Self {
            player_id,
            team_id: None,
            overall_pick: None,
        }
    }
}

/// Replacement values for a team's editable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamUpdate {
    pub name: String,
    pub owner_name: Option<String>,
    pub draft_position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnTheClock {
    pub overall_pick: i64,
    pub round: i64,
    pub team: Team,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickOutcome {
    pub pick: Pick,
    /// The pick filled the last slot and the draft is now completed.
    pub draft_completed: bool,
}

// ---------------------------------------------------------------------------
// DraftBoard
// ---------------------------------------------------------------------------

/// Every mutation of a draft runs under that draft's own lock, so the
/// "count picks, validate, write" sequence never interleaves for one draft
/// while different drafts proceed in parallel. The storage unique
/// constraints catch anything that slips past.
pub struct DraftBoard {
    db: Database,
    notifier: Notifier,
    locks: DashMap<DraftId, Arc<Mutex<()>>>,
}

impl DraftBoard {
    pub fn new(db: Database, notifier: Notifier) -> Self {
        Self {
            db,
            notifier,
            locks: DashMap::new(),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn subscribe(&self, draft_id: DraftId) -> Result<Subscription, BoardError> {
        self.load_draft(draft_id)?;
        Ok(self.notifier.subscribe(draft_id))
    }

    fn with_draft_lock<R>(&self, draft_id: DraftId, f: impl FnOnce() -> R) -> R {
        let lock = Arc::clone(self.locks.entry(draft_id).or_default().value());
        // The guarded value is `()`, so a poisoned lock carries no bad state.
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    fn load_draft(&self, draft_id: DraftId) -> Result<Draft, BoardError> {
        self.db
            .get_draft(draft_id)?
            .ok_or(BoardError::DraftNotFound(draft_id))
    }

    fn load_pick(&self, pick_id: PickId) -> Result<Pick, BoardError> {
        self.db
            .get_pick(pick_id)?
            .ok_or(BoardError::PickNotFound(pick_id))
    }

    fn load_team(&self, team_id: TeamId) -> Result<Team, BoardError> {
        self.db
            .get_team(team_id)?
            .ok_or(BoardError::TeamNotFound(team_id))
    }

    // ------------------------------------------------------------------
    // Drafts
    // ------------------------------------------------------------------

    pub fn create_draft(&self, new: NewDraft) -> Result<Draft, BoardError> {
        validate_new_draft(&new)?;
        let draft = self.db.insert_draft(&new)?;
        info!(
            draft_id = draft.id,
            name = %draft.name,
            num_teams = draft.num_teams,
            max_rounds = draft.max_rounds,
            "draft created"
        );
        Ok(draft)
    }

    pub fn get_draft(&self, draft_id: DraftId) -> Result<Draft, BoardError> {
        self.load_draft(draft_id)
    }

    /// Replace a draft's league settings. Only while in setup; seated teams
    /// must still fit the new team count.
    pub fn update_draft(
        &self,
        draft_id: DraftId,
        settings: NewDraft,
    ) -> Result<Draft, BoardError> {
        validate_new_draft(&settings)?;
        self.with_draft_lock(draft_id, || {
            let draft = self.load_draft(draft_id)?;
            if draft.status != DraftStatus::Setup {
                return Err(BoardError::SettingsLocked(draft.status));
            }
            let teams = self.db.teams_for_draft(draft_id)?;
            if let Some(team) = teams
                .iter()
                .find(|team| team.draft_position > settings.num_teams)
            {
                return Err(SetupError::InvalidDraftPosition {
                    position: team.draft_position,
                    num_teams: settings.num_teams,
                }
                .into());
            }

            let updated = Draft {
                name: settings.name,
                num_teams: settings.num_teams,
                scoring_format: settings.scoring_format,
                draft_type: settings.draft_type,
                max_rounds: settings.max_rounds,
                ..draft
            };
            self.db.update_draft(&updated)?;
            info!(
                draft_id,
                num_teams = updated.num_teams,
                max_rounds = updated.max_rounds,
                "draft settings updated"
            );
            Ok(updated)
        })
    }

    pub fn list_drafts(&self) -> Result<Vec<Draft>, BoardError> {
        Ok(self.db.list_drafts()?)
    }

    /// Delete a draft with its teams, picks and audit history.
    pub fn delete_draft(&self, draft_id: DraftId) -> Result<(), BoardError> {
        self.with_draft_lock(draft_id, || {
            if !self.db.delete_draft(draft_id)? {
                return Err(BoardError::DraftNotFound(draft_id));
            }
            info!(draft_id, "draft deleted");
            Ok(())
        })?;
        self.locks.remove(&draft_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    pub fn teams(&self, draft_id: DraftId) -> Result<Vec<Team>, BoardError> {
        self.load_draft(draft_id)?;
        Ok(self.db.teams_for_draft(draft_id)?)
    }

    pub fn add_team(&self, draft_id: DraftId, team: NewTeam) -> Result<Team, BoardError> {
        self.with_draft_lock(draft_id, || {
            let draft = self.load_draft(draft_id)?;
            if draft.status != DraftStatus::Setup {
                return Err(BoardError::RosterLocked(draft.status));
            }

            let existing = self.db.teams_for_draft(draft_id)?;
            validate_team(
                TeamCandidate {
                    id: None,
                    name: &team.name,
                    draft_position: team.draft_position,
                },
                existing.iter().map(candidate_of),
                draft.num_teams,
            )?;

            let team = self.db.insert_team(draft_id, &team)?;
            info!(draft_id, team_id = team.id, seat = team.draft_position, "team added");
            Ok(team)
        })
    }

    pub fn update_team(&self, team_id: TeamId, update: TeamUpdate) -> Result<Team, BoardError> {
        let team = self.load_team(team_id)?;
        self.with_draft_lock(team.draft_id, || {
            let draft = self.load_draft(team.draft_id)?;
            if draft.is_completed() {
                return Err(BoardError::RosterLocked(draft.status));
            }

            let existing = self.db.teams_for_draft(draft.id)?;
            validate_team(
                TeamCandidate {
                    id: Some(team_id),
                    name: &update.name,
                    draft_position: update.draft_position,
                },
                existing.iter().map(candidate_of),
                draft.num_teams,
            )?;

            let updated = Team {
                id: team_id,
                draft_id: draft.id,
                name: update.name,
                owner_name: update.owner_name,
                draft_position: update.draft_position,
            };
            self.db.update_team(&updated)?;
            info!(draft_id = draft.id, team_id, seat = updated.draft_position, "team updated");
            Ok(updated)
        })
    }

    pub fn remove_team(&self, team_id: TeamId) -> Result<(), BoardError> {
        let team = self.load_team(team_id)?;
        self.with_draft_lock(team.draft_id, || {
            let draft = self.load_draft(team.draft_id)?;
            if draft.status != DraftStatus::Setup {
                return Err(BoardError::RosterLocked(draft.status));
            }
            self.db.delete_team(team_id)?;
            info!(draft_id = draft.id, team_id, "team removed");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    pub fn add_player(&self, player: NewPlayer) -> Result<Player, BoardError> {
        let player = self.db.insert_player(&player)?;
        debug!(player_id = player.id, name = %player.name, "player added");
        Ok(player)
    }

    /// Undrafted players in `draft_id` whose name contains `query`.
    pub fn search_players(
        &self,
        draft_id: DraftId,
        query: &str,
        position: Option<Position>,
        limit: i64,
    ) -> Result<Vec<Player>, BoardError> {
        validate_search_query(query)?;
        self.load_draft(draft_id)?;
        Ok(self
            .db
            .search_available_players(draft_id, query, position, limit)?)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// `setup -> active`, only with every seat filled.
    pub fn start_draft(&self, draft_id: DraftId) -> Result<Draft, BoardError> {
        self.with_draft_lock(draft_id, || {
            let mut draft = self.load_draft(draft_id)?;
            let status = draft.status.transition(DraftStatus::Active)?;
            validate_roster_count(self.db.team_count(draft_id)?, draft.num_teams)?;

            self.db
                .set_draft_status(draft_id, status, AuditAction::Start, "Draft started")?;
            draft.status = status;
            info!(draft_id, "draft started");
            self.notifier
                .notify(draft_id, &DraftEvent::StatusChanged { status });
            Ok(draft)
        })
    }

    pub fn pause_draft(&self, draft_id: DraftId) -> Result<Draft, BoardError> {
        self.change_status(draft_id, DraftStatus::Paused, AuditAction::Pause, "Draft paused")
    }

    pub fn resume_draft(&self, draft_id: DraftId) -> Result<Draft, BoardError> {
        self.change_status(draft_id, DraftStatus::Active, AuditAction::Resume, "Draft resumed")
    }

    /// Mark a draft completed by hand, whatever its pick count.
    pub fn complete_draft(&self, draft_id: DraftId) -> Result<Draft, BoardError> {
        self.change_status(
            draft_id,
            DraftStatus::Completed,
            AuditAction::Complete,
            "Draft marked complete",
        )
    }

    fn change_status(
        &self,
        draft_id: DraftId,
        to: DraftStatus,
        action: AuditAction,
        details: &str,
    ) -> Result<Draft, BoardError> {
        self.with_draft_lock(draft_id, || {
            let mut draft = self.load_draft(draft_id)?;
            let from = draft.status;
            draft.status = from.transition(to)?;

            self.db
                .set_draft_status(draft_id, draft.status, action, details)?;
            info!(draft_id, %from, to = %draft.status, "draft status changed");

            let event = if draft.status.is_completed() {
                DraftEvent::DraftCompleted { draft_id }
            } else {
                DraftEvent::StatusChanged {
                    status: draft.status,
                }
            };
            self.notifier.notify(draft_id, &event);
            Ok(draft)
        })
    }

    // ------------------------------------------------------------------
    // Picks
    // ------------------------------------------------------------------

    pub fn picks(&self, draft_id: DraftId) -> Result<Vec<Pick>, BoardError> {
        self.load_draft(draft_id)?;
        Ok(self.db.picks_for_draft(draft_id)?)
    }

    /// Who picks next and in which round.
    pub fn on_the_clock(&self, draft_id: DraftId) -> Result<OnTheClock, BoardError> {
        let draft = self.load_draft(draft_id)?;
        if draft.is_completed() {
            return Err(BoardError::DraftClosed(draft_id));
        }
        let overall_pick = self.db.pick_count(draft_id)? + 1;
        let teams = self.db.teams_for_draft(draft_id)?;
        let team = draft::current_team(overall_pick, draft.num_teams, &teams)?.clone();
        let round = draft::round_of(overall_pick, draft.num_teams)?;
        Ok(OnTheClock {
            overall_pick,
            round,
            team,
        })
    }

    /// Record the next pick of `draft_id`.
    ///
    /// Sequence, turn and draft activity are checked in that order, then
    /// the player's availability. When the pick fills the last slot of a
    /// capped draft the draft is completed in the same transaction.
    pub fn make_pick(
        &self,
        draft_id: DraftId,
        request: PickRequest,
    ) -> Result<PickOutcome, BoardError> {
        self.with_draft_lock(draft_id, || {
            let draft = self.load_draft(draft_id)?;
            let player = self
                .db
                .get_player(request.player_id)?
                .ok_or(BoardError::PlayerNotFound(request.player_id))?;

            let pick_count = self.db.pick_count(draft_id)?;
            let teams = self.db.teams_for_draft(draft_id)?;
            let team_id = match request.team_id {
                Some(team_id) => team_id,
                None => draft::current_team(pick_count + 1, draft.num_teams, &teams)?.id,
            };
            let proposed = ProposedPick {
                team_id,
                overall_pick: request.overall_pick.unwrap_or(pick_count + 1),
            };

            if let Err(e) = validate_pick(proposed, &draft, &teams, pick_count) {
                debug!(draft_id, error = %e, "pick rejected");
                return Err(e.into());
            }
            ensure_player_available(player.id, &self.db.drafted_player_ids(draft_id)?)?;

            let new_pick = NewPick {
                draft_id,
                team_id,
                player_id: player.id,
                round: draft::round_of(proposed.overall_pick, draft.num_teams)?,
                overall_pick: proposed.overall_pick,
                adp_rank: player.adp_rank(draft.draft_type, draft.scoring_format),
            };
            let team_name = teams
                .iter()
                .find(|team| team.id == team_id)
                .map(|team| team.name.clone())
                .unwrap_or_default();
            let draft_completed = is_draft_complete(&draft, pick_count + 1);
            let details = format!("{} drafted by {}", player.name, team_name);
            let pick = match self.db.record_pick(&new_pick, &details, draft_completed) {
                Ok(pick) => pick,
                Err(e) if is_constraint_violation(&e) => {
                    warn!(draft_id, overall_pick = new_pick.overall_pick, "pick slot already taken");
                    return Err(BoardError::PickConflict);
                }
                Err(e) => return Err(e.into()),
            };

            info!(
                draft_id,
                overall_pick = pick.overall_pick,
                round = pick.round,
                team_id,
                player = %player.name,
                "pick made"
            );
            self.notifier.notify(
                draft_id,
                &DraftEvent::PickMade {
                    pick_id: pick.id,
                    player_id: player.id,
                    player_name: player.name.clone(),
                    team_id,
                    team_name,
                    round: pick.round,
                    overall_pick: pick.overall_pick,
                },
            );
            if draft_completed {
                info!(draft_id, picks = pick_count + 1, "draft completed");
                self.notifier
                    .notify(draft_id, &DraftEvent::DraftCompleted { draft_id });
            }

            Ok(PickOutcome {
                pick,
                draft_completed,
            })
        })
    }

    /// Remove the most recent pick. The pick sequence stays contiguous.
    pub fn undo_last_pick(&self, draft_id: DraftId) -> Result<Pick, BoardError> {
        self.with_draft_lock(draft_id, || {
            let draft = self.load_draft(draft_id)?;
            if draft.is_completed() {
                return Err(BoardError::DraftClosed(draft_id));
            }
            let last = self
                .db
                .last_pick(draft_id)?
                .ok_or(BoardError::NoPickToUndo(draft_id))?;

            let details = format!("Undid pick {}", last.overall_pick);
            if !self.db.delete_pick(&last, &details)? {
                return Err(BoardError::NoPickToUndo(draft_id));
            }
            info!(draft_id, overall_pick = last.overall_pick, "pick undone");
            self.notifier.notify(
                draft_id,
                &DraftEvent::PickUndone {
                    pick_id: last.id,
                    overall_pick: last.overall_pick,
                },
            );
            Ok(last)
        })
    }

    /// Hand an existing pick to another team of the same draft. The pick
    /// keeps its round and overall number.
    pub fn trade_pick(
        &self,
        pick_id: PickId,
        to_team_id: TeamId,
        notes: &str,
    ) -> Result<Pick, BoardError> {
        let draft_id = self.load_pick(pick_id)?.draft_id;

        self.with_draft_lock(draft_id, || {
            // Reload under the lock: an undo or another trade may have
            // changed the pick since.
            let pick = self.load_pick(pick_id)?;
            let to_team = self.load_team(to_team_id)?;
            if to_team.draft_id != pick.draft_id {
                return Err(BoardError::TeamNotInDraft {
                    team_id: to_team_id,
                    draft_id: pick.draft_id,
                });
            }

            let details = if notes.is_empty() {
                format!("Pick {} traded to {}", pick.overall_pick, to_team.name)
            } else {
                notes.to_string()
            };
            if !self.db.reassign_pick(&pick, to_team_id, &details)? {
                return Err(BoardError::PickNotFound(pick_id));
            }
            info!(
                draft_id = pick.draft_id,
                pick_id,
                from_team_id = pick.team_id,
                to_team_id,
                "pick traded"
            );
            self.notifier.notify(
                pick.draft_id,
                &DraftEvent::PickTraded {
                    pick_id,
                    from_team_id: pick.team_id,
                    to_team_id,
                },
            );

            Ok(Pick {
                team_id: to_team_id,
                is_traded: true,
                ..pick
            })
        })
    }

    pub fn audit_log(&self, draft_id: DraftId) -> Result<Vec<AuditEntry>, BoardError> {
        self.load_draft(draft_id)?;
        Ok(self.db.audit_log(draft_id)?)
    }
}

fn candidate_of(team: &Team) -> TeamCandidate<'_> {
    TeamCandidate {
        id: Some(team.id),
        name: &team.name,
        draft_position: team.draft_position,
    }
}
