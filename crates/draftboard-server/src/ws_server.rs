// WebSocket server: commissioners drive drafts and viewers follow them live.

use std::sync::Arc;

use draftboard_core::board::{BoardError, DraftBoard, PickRequest};
use draftboard_core::models::{NewDraft, NewPlayer, NewTeam, DEFAULT_MAX_ROUNDS};
use draftboard_core::notify::{DraftEvent, Subscription};
use draftboard_core::validation::parse_league_settings;
use futures_util::stream::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

use crate::protocol::{ClientMessage, ServerMessage};

/// Player search results returned when the client does not ask for a size.
const DEFAULT_SEARCH_LIMIT: i64 = 50;

/// What a connection should do after handling one client message.
pub enum Dispatch {
    /// Send the reply; the subscription is unchanged.
    Reply(ServerMessage),
    /// Replace the connection's subscription, then send the reply.
    Subscribe(Subscription, ServerMessage),
    /// Drop the connection's subscription, then send the reply.
    Unsubscribe(ServerMessage),
}

impl Dispatch {
    fn reply(result: Result<ServerMessage, BoardError>) -> Self {
        match result {
            Ok(message) => Dispatch::Reply(message),
            Err(e) => {
                match &e {
                    BoardError::Storage(cause) => {
                        error!("storage failure: {cause:#}");
                    }
                    other => debug!(code = other.code(), "request rejected: {other}"),
                }
                Dispatch::Reply(ServerMessage::from(&e))
            }
        }
    }
}

/// Run the server on an already bound listener. Each connection gets its
/// own task; the server runs until the task is cancelled or the process
/// exits.
pub async fn run(listener: TcpListener, board: Arc<DraftBoard>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        let board = Arc::clone(&board);
        tokio::spawn(async move {
            handle_connection(stream, addr.to_string(), board).await;
        });
    }
}

async fn handle_connection(stream: TcpStream, addr: String, board: Arc<DraftBoard>) {
    info!("Accepted TCP connection from {addr}");
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    let (write, read) = ws_stream.split();
    if process_message_stream(read, write, &board, &addr)
        .await
        .is_err()
    {
        warn!("Connection to {addr} dropped while sending");
    }
    info!("Client {addr} disconnected");
}

/// Serve one connection: answer each text frame from `stream` on `sink`
/// and forward events from the connection's subscription, if any.
///
/// Pending events are written before the next request is read. Returns
/// `Err(())` when the sink fails. The subscription is dropped, and so
/// deregistered, when this returns.
///
/// Generic over the stream and sink so it can be tested without sockets.
pub async fn process_message_stream<St, Si>(
    mut stream: St,
    mut sink: Si,
    board: &Arc<DraftBoard>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    Si: Sink<Message> + Unpin,
    Si::Error: std::fmt::Display,
{
    let mut subscription: Option<Subscription> = None;

    loop {
        tokio::select! {
            biased;

            Some(event) = next_event(&mut subscription) => {
                send(&mut sink, &ServerMessage::Event { event }, addr).await?;
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = match dispatch(board, text.as_str().to_owned(), addr).await {
                        Dispatch::Reply(reply) => reply,
                        Dispatch::Subscribe(sub, reply) => {
                            subscription = Some(sub);
                            reply
                        }
                        Dispatch::Unsubscribe(reply) => {
                            subscription = None;
                            reply
                        }
                    };
                    send(&mut sink, &reply, addr).await?;
                }
                Some(Ok(Message::Close(_))) => {
                    info!("Client {addr} sent close frame");
                    break;
                }
                Some(Err(e)) => {
                    warn!("WebSocket error from {addr}: {e}");
                    break;
                }
                None => break,
                Some(Ok(_)) => {
                    // Ignore Binary, Ping, Pong, Frame variants.
                }
            },
        }
    }
    Ok(())
}

/// Board calls wait on a draft's lock and on SQLite, so they run on the
/// blocking pool instead of a runtime worker.
async fn dispatch(board: &Arc<DraftBoard>, text: String, addr: &str) -> Dispatch {
    let board = Arc::clone(board);
    match tokio::task::spawn_blocking(move || handle_text(&board, &text)).await {
        Ok(dispatch) => dispatch,
        Err(e) => {
            error!("request handler for {addr} failed: {e}");
            Dispatch::Reply(ServerMessage::error("internal", "internal error"))
        }
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<DraftEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

async fn send<Si>(sink: &mut Si, message: &ServerMessage, addr: &str) -> Result<(), ()>
where
    Si: Sink<Message> + Unpin,
    Si::Error: std::fmt::Display,
{
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            error!("failed to serialize reply for {addr}: {e}");
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await.map_err(|e| {
        warn!("failed to send to {addr}: {e}");
    })
}

/// Parse one text frame and handle it. Malformed JSON gets a
/// `bad_request` error; the connection stays usable.
pub fn handle_text(board: &DraftBoard, text: &str) -> Dispatch {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => handle_message(board, message),
        Err(e) => {
            debug!("malformed client message: {e}");
            Dispatch::Reply(ServerMessage::bad_request(format!("malformed message: {e}")))
        }
    }
}

/// Apply one client message to the board.
pub fn handle_message(board: &DraftBoard, message: ClientMessage) -> Dispatch {
    match message {
        ClientMessage::Subscribe { draft_id } => match board.subscribe(draft_id) {
            Ok(sub) => Dispatch::Subscribe(sub, ServerMessage::Subscribed { draft_id }),
            Err(e) => Dispatch::reply(Err(e)),
        },
        ClientMessage::Unsubscribe => Dispatch::Unsubscribe(ServerMessage::Unsubscribed),
        ClientMessage::OnTheClock { draft_id } => {
            Dispatch::reply(board.on_the_clock(draft_id).map(|clock| {
                ServerMessage::OnTheClock {
                    draft_id,
                    overall_pick: clock.overall_pick,
                    round: clock.round,
                    team: clock.team,
                }
            }))
        }
        ClientMessage::MakePick {
            draft_id,
            player_id,
            team_id,
            overall_pick,
        } => {
            let request = PickRequest {
                player_id,
                team_id,
                overall_pick,
            };
            Dispatch::reply(board.make_pick(draft_id, request).map(|outcome| {
                ServerMessage::PickAccepted {
                    pick: outcome.pick,
                    draft_completed: outcome.draft_completed,
                }
            }))
        }
        ClientMessage::UndoPick { draft_id } => Dispatch::reply(
            board
                .undo_last_pick(draft_id)
                .map(|_| ServerMessage::Ack { draft_id }),
        ),
        ClientMessage::TradePick {
            pick_id,
            to_team_id,
            notes,
        } => Dispatch::reply(
            board
                .trade_pick(pick_id, to_team_id, &notes)
                .map(|pick| ServerMessage::Ack {
                    draft_id: pick.draft_id,
                }),
        ),
        ClientMessage::StartDraft { draft_id } => {
            Dispatch::reply(board.start_draft(draft_id).map(|_| ServerMessage::Ack { draft_id }))
        }
        ClientMessage::PauseDraft { draft_id } => {
            Dispatch::reply(board.pause_draft(draft_id).map(|_| ServerMessage::Ack { draft_id }))
        }
        ClientMessage::ResumeDraft { draft_id } => {
            Dispatch::reply(board.resume_draft(draft_id).map(|_| ServerMessage::Ack { draft_id }))
        }
        ClientMessage::CompleteDraft { draft_id } => Dispatch::reply(
            board
                .complete_draft(draft_id)
                .map(|_| ServerMessage::Ack { draft_id }),
        ),
        ClientMessage::CreateDraft {
            name,
            num_teams,
            scoring_format,
            draft_type,
            max_rounds,
        } => {
            let result = parse_league_settings(&scoring_format, &draft_type)
                .map_err(BoardError::from)
                .and_then(|(scoring_format, draft_type)| {
                    board.create_draft(NewDraft {
                        name,
                        num_teams,
                        scoring_format,
                        draft_type,
                        max_rounds: max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS),
                    })
                });
            Dispatch::reply(result.map(|draft| ServerMessage::DraftCreated { draft }))
        }
        ClientMessage::UpdateDraft {
            draft_id,
            name,
            num_teams,
            scoring_format,
            draft_type,
            max_rounds,
        } => {
            let result = parse_league_settings(&scoring_format, &draft_type)
                .map_err(BoardError::from)
                .and_then(|(scoring_format, draft_type)| {
                    board.update_draft(
                        draft_id,
                        NewDraft {
                            name,
                            num_teams,
                            scoring_format,
                            draft_type,
                            max_rounds: max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS),
                        },
                    )
                });
            Dispatch::reply(result.map(|draft| ServerMessage::DraftUpdated { draft }))
        }
        ClientMessage::AddTeam {
            draft_id,
            name,
            owner_name,
            draft_position,
        } => Dispatch::reply(
            board
                .add_team(
                    draft_id,
                    NewTeam {
                        name,
                        owner_name,
                        draft_position,
                    },
                )
                .map(|team| ServerMessage::TeamAdded { team }),
        ),
        ClientMessage::AddPlayer {
            name,
            team,
            position,
            bye_week,
            adp,
        } => Dispatch::reply(
            board
                .add_player(NewPlayer {
                    name,
                    team,
                    position,
                    bye_week,
                    adp,
                })
                .map(|player| ServerMessage::PlayerAdded { player }),
        ),
        ClientMessage::SearchPlayers {
            draft_id,
            query,
            position,
            limit,
        } => Dispatch::reply(
            board
                .search_players(
                    draft_id,
                    &query,
                    position,
                    limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
                )
                .map(|players| ServerMessage::Players { players }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftboard_core::db::Database;
    use draftboard_core::models::{DraftStatus, Position};
    use draftboard_core::notify::Notifier;
    use futures_util::stream;

    fn board() -> Arc<DraftBoard> {
        Arc::new(DraftBoard::new(
            Database::open(":memory:").unwrap(),
            Notifier::new(16),
        ))
    }

    /// Helper: create a stream of Message results from a vec.
    fn mock_stream(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    fn text(json: serde_json::Value) -> Result<Message, WsError> {
        Ok(Message::Text(json.to_string().into()))
    }

    fn replies(sent: &[Message]) -> Vec<ServerMessage> {
        sent.iter()
            .map(|m| match m {
                Message::Text(t) => serde_json::from_str(t.as_str()).unwrap(),
                other => panic!("unexpected frame {other:?}"),
            })
            .collect()
    }

    fn reply_of(dispatch: Dispatch) -> ServerMessage {
        match dispatch {
            Dispatch::Reply(m) | Dispatch::Subscribe(_, m) | Dispatch::Unsubscribe(m) => m,
        }
    }

    fn error_code(message: &ServerMessage) -> &str {
        match message {
            ServerMessage::Error { code, .. } => code,
            other => panic!("expected Error, got {other:?}"),
        }
    }

    /// A two-team, one-round draft that is already active, plus one player.
    fn active_draft(board: &DraftBoard) -> (i64, i64) {
        let draft = match reply_of(handle_message(
            board,
            ClientMessage::CreateDraft {
                name: "Wire".into(),
                num_teams: 2,
                scoring_format: "PPR".into(),
                draft_type: "Redraft".into(),
                max_rounds: Some(1),
            },
        )) {
            ServerMessage::DraftCreated { draft } => draft,
            other => panic!("expected DraftCreated, got {other:?}"),
        };
        for seat in 1..=2 {
            reply_of(handle_message(
                board,
                ClientMessage::AddTeam {
                    draft_id: draft.id,
                    name: format!("Team {seat}"),
                    owner_name: None,
                    draft_position: seat,
                },
            ));
        }
        let player = match reply_of(handle_message(
            board,
            ClientMessage::AddPlayer {
                name: "Runner".into(),
                team: "DET".into(),
                position: Position::RB,
                bye_week: Some(8),
                adp: Default::default(),
            },
        )) {
            ServerMessage::PlayerAdded { player } => player,
            other => panic!("expected PlayerAdded, got {other:?}"),
        };
        assert_eq!(
            reply_of(handle_message(board, ClientMessage::StartDraft { draft_id: draft.id })),
            ServerMessage::Ack { draft_id: draft.id }
        );
        (draft.id, player.id)
    }

    #[test]
    fn malformed_json_is_bad_request() {
        let board = board();
        let reply = reply_of(handle_text(&board, "{not json"));
        assert_eq!(error_code(&reply), "bad_request");
    }

    #[test]
    fn invalid_league_settings_rejected() {
        let board = board();
        let reply = reply_of(handle_message(
            &board,
            ClientMessage::CreateDraft {
                name: "Bad".into(),
                num_teams: 10,
                scoring_format: "ppr".into(),
                draft_type: "Redraft".into(),
                max_rounds: None,
            },
        ));
        assert_eq!(error_code(&reply), "invalid_setup");
    }

    #[test]
    fn on_the_clock_then_pick() {
        let board = board();
        let (draft_id, player_id) = active_draft(&board);

        match reply_of(handle_message(&board, ClientMessage::OnTheClock { draft_id })) {
            ServerMessage::OnTheClock {
                overall_pick,
                round,
                team,
                ..
            } => {
                assert_eq!(overall_pick, 1);
                assert_eq!(round, 1);
                assert_eq!(team.draft_position, 1);
            }
            other => panic!("expected OnTheClock, got {other:?}"),
        }

        let reply = reply_of(handle_message(
            &board,
            ClientMessage::MakePick {
                draft_id,
                player_id,
                team_id: None,
                overall_pick: None,
            },
        ));
        assert!(matches!(
            reply,
            ServerMessage::PickAccepted {
                draft_completed: false,
                ..
            }
        ));

        let reply = reply_of(handle_message(
            &board,
            ClientMessage::MakePick {
                draft_id,
                player_id,
                team_id: None,
                overall_pick: None,
            },
        ));
        assert_eq!(error_code(&reply), "duplicate_player");
    }

    #[test]
    fn update_draft_before_and_after_start() {
        let board = board();
        let (draft_id, _) = active_draft(&board);
        let update = |num_teams| ClientMessage::UpdateDraft {
            draft_id,
            name: "Renamed".into(),
            num_teams,
            scoring_format: "Standard".into(),
            draft_type: "Redraft".into(),
            max_rounds: Some(2),
        };

        let reply = reply_of(handle_message(&board, update(2)));
        assert_eq!(error_code(&reply), "settings_locked");

        let draft = match reply_of(handle_message(
            &board,
            ClientMessage::CreateDraft {
                name: "Fresh".into(),
                num_teams: 4,
                scoring_format: "PPR".into(),
                draft_type: "Redraft".into(),
                max_rounds: None,
            },
        )) {
            ServerMessage::DraftCreated { draft } => draft,
            other => panic!("expected DraftCreated, got {other:?}"),
        };
        match reply_of(handle_message(
            &board,
            ClientMessage::UpdateDraft {
                draft_id: draft.id,
                name: "Fresh".into(),
                num_teams: 6,
                scoring_format: "Half-PPR".into(),
                draft_type: "Dynasty".into(),
                max_rounds: None,
            },
        )) {
            ServerMessage::DraftUpdated { draft: updated } => {
                assert_eq!(updated.num_teams, 6);
                assert_eq!(updated.max_rounds, DEFAULT_MAX_ROUNDS);
                assert_eq!(updated.status, DraftStatus::Setup);
            }
            other => panic!("expected DraftUpdated, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_unknown_draft_is_error() {
        let board = board();
        let dispatch = handle_message(&board, ClientMessage::Subscribe { draft_id: 404 });
        assert!(matches!(dispatch, Dispatch::Reply(_)));
        assert_eq!(error_code(&reply_of(dispatch)), "draft_not_found");
    }

    #[tokio::test]
    async fn replies_then_forwards_own_events() {
        let board = board();
        let (draft_id, _) = active_draft(&board);
        let messages = vec![
            text(serde_json::json!({"type": "SUBSCRIBE", "draftId": draft_id})),
            text(serde_json::json!({"type": "PAUSE_DRAFT", "draftId": draft_id})),
        ];

        let mut sent: Vec<Message> = Vec::new();
        process_message_stream(mock_stream(messages), &mut sent, &board, "test")
            .await
            .unwrap();

        assert_eq!(
            replies(&sent),
            vec![
                ServerMessage::Subscribed { draft_id },
                ServerMessage::Ack { draft_id },
                ServerMessage::Event {
                    event: DraftEvent::StatusChanged {
                        status: DraftStatus::Paused
                    }
                },
            ]
        );
        // The stream ended, so the connection's subscription is gone.
        assert_eq!(board.notifier().subscriber_count(draft_id), 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_events() {
        let board = board();
        let (draft_id, _) = active_draft(&board);
        let messages = vec![
            text(serde_json::json!({"type": "SUBSCRIBE", "draftId": draft_id})),
            text(serde_json::json!({"type": "UNSUBSCRIBE"})),
            text(serde_json::json!({"type": "PAUSE_DRAFT", "draftId": draft_id})),
        ];

        let mut sent: Vec<Message> = Vec::new();
        process_message_stream(mock_stream(messages), &mut sent, &board, "test")
            .await
            .unwrap();

        assert_eq!(
            replies(&sent),
            vec![
                ServerMessage::Subscribed { draft_id },
                ServerMessage::Unsubscribed,
                ServerMessage::Ack { draft_id },
            ]
        );
    }

    #[tokio::test]
    async fn close_frame_stops_processing() {
        let board = board();
        let messages = vec![
            text(serde_json::json!({"type": "UNSUBSCRIBE"})),
            Ok(Message::Close(None)),
            text(serde_json::json!({"type": "UNSUBSCRIBE"})),
        ];

        let mut sent: Vec<Message> = Vec::new();
        process_message_stream(mock_stream(messages), &mut sent, &board, "test")
            .await
            .unwrap();
        assert_eq!(replies(&sent), vec![ServerMessage::Unsubscribed]);
    }

    #[tokio::test]
    async fn error_stops_processing() {
        let board = board();
        let messages = vec![
            Err(WsError::ConnectionClosed),
            text(serde_json::json!({"type": "UNSUBSCRIBE"})),
        ];

        let mut sent: Vec<Message> = Vec::new();
        process_message_stream(mock_stream(messages), &mut sent, &board, "test")
            .await
            .unwrap();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn binary_and_ping_messages_are_ignored() {
        let board = board();
        let messages = vec![
            Ok(Message::Binary(vec![1, 2, 3].into())),
            Ok(Message::Ping(vec![].into())),
            Ok(Message::Pong(vec![].into())),
            Ok(Message::Text("garbage".into())),
        ];

        let mut sent: Vec<Message> = Vec::new();
        process_message_stream(mock_stream(messages), &mut sent, &board, "test")
            .await
            .unwrap();

        let replies = replies(&sent);
        assert_eq!(replies.len(), 1);
        assert_eq!(error_code(&replies[0]), "bad_request");
    }

    #[tokio::test]
    async fn slow_request_does_not_stall_other_connections() {
        let path = std::env::temp_dir().join(format!(
            "draftboard_ws_blocking_{}.db",
            std::process::id()
        ));
        let remove_files = || {
            for suffix in ["", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
            }
        };
        remove_files();

        let board = Arc::new(DraftBoard::new(
            Database::open(path.to_str().unwrap()).unwrap(),
            Notifier::new(16),
        ));
        let draft_id = match reply_of(handle_message(
            &board,
            ClientMessage::CreateDraft {
                name: "Busy".into(),
                num_teams: 2,
                scoring_format: "PPR".into(),
                draft_type: "Redraft".into(),
                max_rounds: Some(1),
            },
        )) {
            ServerMessage::DraftCreated { draft } => draft.id,
            other => panic!("expected DraftCreated, got {other:?}"),
        };

        // Another writer holds the database, so the next status change
        // waits out SQLite's busy timeout.
        let side = rusqlite::Connection::open(&path).unwrap();
        side.execute_batch("BEGIN EXCLUSIVE;").unwrap();

        let started = std::time::Instant::now();
        let slow_board = Arc::clone(&board);
        let slow = tokio::spawn(async move {
            let messages = vec![text(
                serde_json::json!({"type": "COMPLETE_DRAFT", "draftId": draft_id}),
            )];
            let mut sent: Vec<Message> = Vec::new();
            process_message_stream(mock_stream(messages), &mut sent, &slow_board, "slow")
                .await
                .unwrap();
            sent
        });
        let quick_board = Arc::clone(&board);
        let quick = tokio::spawn(async move {
            let messages = vec![Ok(Message::Text("not json".into()))];
            let mut sent: Vec<Message> = Vec::new();
            process_message_stream(mock_stream(messages), &mut sent, &quick_board, "quick")
                .await
                .unwrap();
            sent
        });

        let quick_sent = quick.await.unwrap();
        let quick_elapsed = started.elapsed();
        side.execute_batch("COMMIT;").unwrap();
        let slow_sent = slow.await.unwrap();

        assert_eq!(error_code(&replies(&quick_sent)[0]), "bad_request");
        assert!(
            quick_elapsed < std::time::Duration::from_secs(2),
            "quick connection waited {quick_elapsed:?}"
        );
        assert_eq!(replies(&slow_sent), vec![ServerMessage::Ack { draft_id }]);

        drop(side);
        drop(board);
        remove_files();
    }
}
