// Integration tests for the draft board.
//
// These drive whole drafts through the public `DraftBoard` API against an
// in-memory database: snake order over several rounds, automatic
// completion, undo, trades, duplicate players, concurrent submissions and
// the events viewers receive along the way.

use std::sync::Arc;
use std::thread;

use draftboard_core::board::{BoardError, DraftBoard, PickRequest};
use draftboard_core::db::Database;
use draftboard_core::draft::PickError;
use draftboard_core::models::{
    AdpRanks, AuditAction, Draft, DraftStatus, DraftType, NewDraft, NewPlayer, NewTeam, Player,
    Position, ScoringFormat, Team,
};
use draftboard_core::notify::{DraftEvent, Notifier, Subscription};

// ===========================================================================
// Test helpers
// ===========================================================================

fn board() -> DraftBoard {
    DraftBoard::new(
        Database::open(":memory:").expect("in-memory db"),
        Notifier::new(64),
    )
}

/// A draft in setup with `num_teams` teams. Team ids are assigned in
/// reverse seat order so that id and seat never coincide.
fn seeded_draft(board: &DraftBoard, num_teams: i64, max_rounds: i64) -> (Draft, Vec<Team>) {
    let draft = board
        .create_draft(NewDraft {
            name: "Integration League".into(),
            num_teams,
            scoring_format: ScoringFormat::Ppr,
            draft_type: DraftType::Redraft,
            max_rounds,
        })
        .unwrap();

    let mut teams: Vec<Team> = (1..=num_teams)
        .rev()
        .map(|seat| {
            board
                .add_team(
                    draft.id,
                    NewTeam {
                        name: format!("Seat {seat}"),
                        owner_name: Some(format!("Owner {seat}")),
                        draft_position: seat,
                    },
                )
                .unwrap()
        })
        .collect();
    teams.sort_by_key(|team| team.draft_position);
    (draft, teams)
}

fn player_pool(board: &DraftBoard, count: usize) -> Vec<Player> {
    (1..=count)
        .map(|i| {
            board
                .add_player(NewPlayer {
                    name: format!("Player {i:02}"),
                    team: "SF".into(),
                    position: if i % 2 == 0 { Position::WR } else { Position::RB },
                    bye_week: Some(9),
                    adp: AdpRanks {
                        ppr: Some(i as i64),
                        ..AdpRanks::default()
                    },
                })
                .unwrap()
        })
        .collect()
}

fn drain(sub: &mut Subscription) -> Vec<DraftEvent> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

// ===========================================================================
// Test: snake order through a full draft
// ===========================================================================

#[test]
fn four_team_snake_runs_to_completion() {
    let board = board();
    let (draft, teams) = seeded_draft(&board, 4, 2);
    let players = player_pool(&board, 10);
    board.start_draft(draft.id).unwrap();

    let mut seats = Vec::new();
    let mut last_outcome = None;
    for player in players.iter().take(8) {
        let clock = board.on_the_clock(draft.id).unwrap();
        let outcome = board
            .make_pick(draft.id, PickRequest::player(player.id))
            .unwrap();
        assert_eq!(outcome.pick.team_id, clock.team.id);
        assert_eq!(outcome.pick.overall_pick, clock.overall_pick);
        assert_eq!(outcome.pick.round, clock.round);
        seats.push(clock.team.draft_position);
        last_outcome = Some(outcome);
    }

    assert_eq!(seats, vec![1, 2, 3, 4, 4, 3, 2, 1]);
    let last = last_outcome.unwrap();
    assert!(last.draft_completed);
    assert_eq!(last.pick.team_id, teams[0].id);

    let draft = board.get_draft(draft.id).unwrap();
    assert_eq!(draft.status, DraftStatus::Completed);
    assert!(matches!(
        board.on_the_clock(draft.id),
        Err(BoardError::DraftClosed(_))
    ));

    // No ninth pick once completed.
    let err = board
        .make_pick(draft.id, PickRequest::player(players[8].id))
        .unwrap_err();
    assert!(matches!(
        err,
        BoardError::Pick(PickError::DraftNotActive(DraftStatus::Completed))
    ));
}

#[test]
fn picks_stay_contiguous_and_carry_adp() {
    let board = board();
    let (draft, _) = seeded_draft(&board, 3, 3);
    let players = player_pool(&board, 5);
    board.start_draft(draft.id).unwrap();

    for player in &players {
        board
            .make_pick(draft.id, PickRequest::player(player.id))
            .unwrap();
    }

    let picks = board.picks(draft.id).unwrap();
    let numbers: Vec<i64> = picks.iter().map(|p| p.overall_pick).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    let rounds: Vec<i64> = picks.iter().map(|p| p.round).collect();
    assert_eq!(rounds, vec![1, 1, 1, 2, 2]);
    assert_eq!(picks[4].adp_rank, Some(5));
}

#[test]
fn uncapped_draft_never_auto_completes() {
    let board = board();
    let (draft, _) = seeded_draft(&board, 2, 0);
    let players = player_pool(&board, 6);
    board.start_draft(draft.id).unwrap();

    for player in &players {
        let outcome = board
            .make_pick(draft.id, PickRequest::player(player.id))
            .unwrap();
        assert!(!outcome.draft_completed);
    }
    assert_eq!(board.get_draft(draft.id).unwrap().status, DraftStatus::Active);
}

// ===========================================================================
// Test: rejections
// ===========================================================================

#[test]
fn duplicate_player_rejected() {
    let board = board();
    let (draft, _) = seeded_draft(&board, 2, 4);
    let players = player_pool(&board, 2);
    board.start_draft(draft.id).unwrap();

    board
        .make_pick(draft.id, PickRequest::player(players[0].id))
        .unwrap();
    let err = board
        .make_pick(draft.id, PickRequest::player(players[0].id))
        .unwrap_err();
    assert!(matches!(
        err,
        BoardError::Pick(PickError::DuplicatePlayer(id)) if id == players[0].id
    ));
    assert_eq!(err.code(), "duplicate_player");
    assert_eq!(board.picks(draft.id).unwrap().len(), 1);
}

#[test]
fn paused_draft_rejects_then_accepts_after_resume() {
    let board = board();
    let (draft, _) = seeded_draft(&board, 2, 2);
    let players = player_pool(&board, 1);
    board.start_draft(draft.id).unwrap();
    board.pause_draft(draft.id).unwrap();

    let err = board
        .make_pick(draft.id, PickRequest::player(players[0].id))
        .unwrap_err();
    assert!(matches!(
        err,
        BoardError::Pick(PickError::DraftNotActive(DraftStatus::Paused))
    ));

    board.resume_draft(draft.id).unwrap();
    board
        .make_pick(draft.id, PickRequest::player(players[0].id))
        .unwrap();
}

#[test]
fn concurrent_submissions_for_one_slot_commit_once() {
    let board = Arc::new(board());
    let (draft, teams) = seeded_draft(&board, 2, 8);
    let players = player_pool(&board, 8);
    board.start_draft(draft.id).unwrap();

    let handles: Vec<_> = players
        .iter()
        .map(|player| {
            let board = Arc::clone(&board);
            let request = PickRequest {
                player_id: player.id,
                team_id: Some(teams[0].id),
                overall_pick: Some(1),
            };
            thread::spawn(move || board.make_pick(draft.id, request))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(BoardError::Pick(PickError::NonSequential {
                expected: 2,
                proposed: 1
            }))
        ));
    }
    assert_eq!(board.picks(draft.id).unwrap().len(), 1);
}

// ===========================================================================
// Test: undo and trades
// ===========================================================================

#[test]
fn undo_reopens_the_slot() {
    let board = board();
    let (draft, teams) = seeded_draft(&board, 2, 3);
    let players = player_pool(&board, 3);
    board.start_draft(draft.id).unwrap();

    board
        .make_pick(draft.id, PickRequest::player(players[0].id))
        .unwrap();
    board
        .make_pick(draft.id, PickRequest::player(players[1].id))
        .unwrap();

    let undone = board.undo_last_pick(draft.id).unwrap();
    assert_eq!(undone.overall_pick, 2);
    assert_eq!(undone.player_id, players[1].id);

    let clock = board.on_the_clock(draft.id).unwrap();
    assert_eq!(clock.overall_pick, 2);
    assert_eq!(clock.team.id, teams[1].id);

    // The undone player is available again.
    let redo = board
        .make_pick(draft.id, PickRequest::player(players[1].id))
        .unwrap();
    assert_eq!(redo.pick.overall_pick, 2);
}

#[test]
fn trade_keeps_round_and_overall_pick() {
    let board = board();
    let (draft, teams) = seeded_draft(&board, 3, 3);
    let players = player_pool(&board, 4);
    board.start_draft(draft.id).unwrap();

    let mut picks = Vec::new();
    for player in &players {
        picks.push(
            board
                .make_pick(draft.id, PickRequest::player(player.id))
                .unwrap()
                .pick,
        );
    }
    // Pick 4 opens round 2 for seat 3.
    let before = picks[3].clone();
    assert_eq!(before.round, 2);
    assert_eq!(before.team_id, teams[2].id);

    let traded = board
        .trade_pick(before.id, teams[0].id, "Swapped for a future second")
        .unwrap();
    assert_eq!(traded.team_id, teams[0].id);
    assert!(traded.is_traded);

    let stored = board
        .picks(draft.id)
        .unwrap()
        .into_iter()
        .find(|p| p.id == before.id)
        .unwrap();
    assert_eq!(stored.round, before.round);
    assert_eq!(stored.overall_pick, before.overall_pick);
    assert_eq!(stored.team_id, teams[0].id);
    assert!(stored.is_traded);

    let trade_entry = board
        .audit_log(draft.id)
        .unwrap()
        .into_iter()
        .find(|entry| entry.action == AuditAction::Trade)
        .unwrap();
    assert_eq!(trade_entry.details, "Swapped for a future second");
    assert_eq!(trade_entry.entity_id, Some(before.id));
}

// ===========================================================================
// Test: viewers
// ===========================================================================

#[test]
fn viewers_see_picks_undo_trade_and_completion() {
    let board = board();
    let (draft, teams) = seeded_draft(&board, 2, 1);
    let players = player_pool(&board, 3);
    let mut viewer = board.subscribe(draft.id).unwrap();
    board.start_draft(draft.id).unwrap();

    let first = board
        .make_pick(draft.id, PickRequest::player(players[0].id))
        .unwrap()
        .pick;
    board.undo_last_pick(draft.id).unwrap();
    board
        .make_pick(draft.id, PickRequest::player(players[1].id))
        .unwrap();
    board.trade_pick(first.id + 1, teams[1].id, "").unwrap();
    let outcome = board
        .make_pick(draft.id, PickRequest::player(players[2].id))
        .unwrap();
    assert!(outcome.draft_completed);

    let events = drain(&mut viewer);
    assert_eq!(events.len(), 7);
    assert_eq!(
        events[0],
        DraftEvent::StatusChanged {
            status: DraftStatus::Active
        }
    );
    assert_eq!(
        events[1],
        DraftEvent::PickMade {
            pick_id: first.id,
            player_id: players[0].id,
            player_name: "Player 01".into(),
            team_id: teams[0].id,
            team_name: "Seat 1".into(),
            round: 1,
            overall_pick: 1,
        }
    );
    assert_eq!(
        events[2],
        DraftEvent::PickUndone {
            pick_id: first.id,
            overall_pick: 1
        }
    );
    assert!(matches!(events[3], DraftEvent::PickMade { overall_pick: 1, .. }));
    assert!(matches!(
        events[4],
        DraftEvent::PickTraded { to_team_id, .. } if to_team_id == teams[1].id
    ));
    assert!(matches!(events[5], DraftEvent::PickMade { overall_pick: 2, .. }));
    assert_eq!(events[6], DraftEvent::DraftCompleted { draft_id: draft.id });

    drop(viewer);
    assert_eq!(board.notifier().subscriber_count(draft.id), 0);
}

#[test]
fn viewers_of_other_drafts_hear_nothing() {
    let board = board();
    let (busy, _) = seeded_draft(&board, 2, 2);
    let (quiet, _) = seeded_draft(&board, 2, 2);
    let players = player_pool(&board, 1);
    let mut quiet_viewer = board.subscribe(quiet.id).unwrap();

    board.start_draft(busy.id).unwrap();
    board
        .make_pick(busy.id, PickRequest::player(players[0].id))
        .unwrap();

    assert!(drain(&mut quiet_viewer).is_empty());
}
