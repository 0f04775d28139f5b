use super::*;
use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::json;
use shared::protocol::ResetDecision;
use tokio::sync::oneshot;

use crate::{
    error::DispatchError,
    fixtures::{
        estimation_outcome, estimation_round, event, market_outcome, market_state, snapshot,
        snapshot_with_events, trivia_outcome, trivia_question,
    },
    hints::salary_hint,
    minigame::RoundPhase,
};

/// Replays canned replies in order and records every action it was asked
/// to send.
#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<ActionResponse, DispatchError>>>,
    states: Mutex<VecDeque<GameSnapshot>>,
    sent: Mutex<Vec<ClientAction>>,
    state_fetches: Mutex<u32>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ScriptedTransport {
    async fn reply(&self, reply: Result<ActionResponse, DispatchError>) {
        self.replies.lock().await.push_back(reply);
    }

    async fn serve_state(&self, snapshot: GameSnapshot) {
        self.states.lock().await.push_back(snapshot);
    }

    async fn sent(&self) -> Vec<ClientAction> {
        self.sent.lock().await.clone()
    }

    /// Holds the next `send` until the returned sender fires.
    async fn hold_next_send(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.gate.lock().await = Some(gate);
        release
    }
}

#[async_trait]
impl ActionTransport for ScriptedTransport {
    async fn send(&self, action: &ClientAction) -> Result<ActionResponse, DispatchError> {
        self.sent.lock().await.push(action.clone());
        let reply = self.replies.lock().await.pop_front();
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        reply.unwrap_or_else(|| {
            Err(DispatchError::Unavailable(format!(
                "no scripted reply for {}",
                action.name()
            )))
        })
    }

    async fn fetch_state(&self) -> Result<GameSnapshot, DispatchError> {
        *self.state_fetches.lock().await += 1;
        self.states
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| DispatchError::Unavailable("no scripted state".to_string()))
    }
}

async fn loaded_session(initial: GameSnapshot) -> (Arc<GameSession>, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    transport.serve_state(initial).await;
    let session = GameSession::new(transport.clone());
    session.load_state().await.expect("initial load");
    (session, transport)
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn notices(events: &[SessionEvent]) -> Vec<(NoticeLevel, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Notice(notice) => Some((notice.level, notice.message.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn initial_load_populates_store_and_shows_head_event() {
    let transport = Arc::new(ScriptedTransport::default());
    transport
        .serve_state(snapshot_with_events(vec![
            event("Market News", json!([])),
            event("Research Complete", json!([])),
        ]))
        .await;
    let session = GameSession::new(transport.clone());
    let mut events = session.subscribe_events();
    assert!(session.snapshot().await.is_none());

    let snapshot = session.load_state().await.expect("load");
    assert_eq!(snapshot.week, 1);
    assert_eq!(session.snapshot_version().await, 1);
    assert_eq!(session.modal_phase().await, ModalPhase::Shown);
    assert_eq!(
        session.current_event().await.expect("event").title,
        "Market News"
    );

    let published = drain(&mut events);
    assert!(matches!(
        published[0],
        SessionEvent::SnapshotReplaced { version: 1, week: 1, .. }
    ));
    assert!(matches!(&published[1], SessionEvent::EventShown(event) if event.title == "Market News"));
    assert!(transport.sent().await.is_empty());
}

#[tokio::test]
async fn next_turn_replaces_snapshot_and_surfaces_message() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    let mut events = session.subscribe_events();
    transport
        .reply(Ok(ActionResponse::ok()
            .with_state(snapshot(2))
            .with_message("Week advanced")))
        .await;

    let receipt = session.next_turn().await.expect("next turn");
    assert_eq!(receipt.message.as_deref(), Some("Week advanced"));
    assert_eq!(receipt.snapshot.expect("snapshot").week, 2);
    assert_eq!(session.snapshot().await.expect("snapshot").week, 2);
    assert_eq!(transport.sent().await, vec![ClientAction::NextTurn]);
    assert_eq!(
        notices(&drain(&mut events)),
        vec![(NoticeLevel::Info, "Week advanced".to_string())]
    );
}

#[tokio::test]
async fn desk_actions_send_their_intents_in_order() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    for week in 2..=5 {
        transport
            .reply(Ok(ActionResponse::ok().with_state(snapshot(week))))
            .await;
    }

    session
        .start_research(" Momentum ", 4)
        .await
        .expect("research");
    session.hire_infra("Linus", 40).await.expect("hire infra");
    session
        .upgrade_infra("compute_level")
        .await
        .expect("upgrade");
    let receipt = session.restart_game().await.expect("restart");

    assert_eq!(receipt.snapshot.expect("snapshot").week, 5);
    assert_eq!(session.snapshot_version().await, 5);
    assert_eq!(
        transport.sent().await,
        vec![
            ClientAction::StartResearch {
                style: "Momentum".to_string(),
                duration: 4
            },
            ClientAction::HireInfra {
                name: StaffName::from("Linus"),
                skill: 40
            },
            ClientAction::UpgradeInfra {
                infra_type: "compute_level".to_string()
            },
            ClientAction::RestartGame,
        ]
    );
}

#[tokio::test]
async fn underpaid_hire_is_rejected_and_roster_unchanged() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    let mut events = session.subscribe_events();
    assert!(salary_hint(50, 10_000).below_minimum);

    let mut server_state = snapshot(1);
    server_state.team.clear();
    transport
        .reply(Ok(ActionResponse::error(
            "Salary too low for skill 50. Offer at least $100,000.",
        )
        .with_state(server_state)))
        .await;

    let err = session
        .hire_quant("Edsger", 50, 10_000)
        .await
        .expect_err("below minimum");
    assert!(matches!(err, SessionError::Rejected(_)));
    assert!(!err.is_local());

    let current = session.snapshot().await.expect("snapshot");
    assert_eq!(current.team.len(), 2);
    assert_eq!(session.snapshot_version().await, 1);
    let published = notices(&drain(&mut events));
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, NoticeLevel::Warning);
    assert!(published[0].1.contains("Salary too low"));
}

#[tokio::test]
async fn local_validation_sends_nothing() {
    let (session, transport) = loaded_session(snapshot(1)).await;

    assert!(matches!(
        session.hire_quant("   ", 50, 200_000).await,
        Err(SessionError::Validation(ValidationError::Missing { field: "name" }))
    ));
    assert!(matches!(
        session.start_research("Momentum", 0).await,
        Err(SessionError::Validation(ValidationError::OutOfRange { field: "duration", .. }))
    ));
    assert!(matches!(
        session.submit_spread("abc").await,
        Err(SessionError::Validation(ValidationError::NotNumeric { .. }))
    ));
    assert!(transport.sent().await.is_empty());
}

#[tokio::test]
async fn portfolio_update_drops_zero_weights_and_checks_ids() {
    let transport = Arc::new(ScriptedTransport::default());
    let session = GameSession::new(transport.clone());
    assert!(matches!(
        session
            .update_portfolio(vec![(AlphaId::from("alpha_1"), 1.0)])
            .await,
        Err(SessionError::Uninitialized)
    ));

    transport.serve_state(snapshot(1)).await;
    session.load_state().await.expect("load");

    let err = session
        .update_portfolio(vec![(AlphaId::from("alpha_4"), 0.2)])
        .await
        .expect_err("still in research");
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::UnknownAlpha(ref id)) if id == "alpha_4"
    ));
    assert!(transport.sent().await.is_empty());

    transport
        .reply(Ok(ActionResponse::ok().with_state(snapshot(1))))
        .await;
    session
        .update_portfolio(vec![
            (AlphaId::from("alpha_1"), 0.5),
            (AlphaId::from("alpha_2"), 0.0),
            (AlphaId::from("alpha_3"), 0.3),
        ])
        .await
        .expect("allocate");
    assert_eq!(
        transport.sent().await,
        vec![ClientAction::UpdatePortfolio {
            positions: vec![
                Position {
                    alpha_id: AlphaId::from("alpha_1"),
                    weight: 0.5
                },
                Position {
                    alpha_id: AlphaId::from("alpha_3"),
                    weight: 0.3
                },
            ]
        }]
    );
}

#[tokio::test]
async fn trivia_run_finishes_and_forces_reconciliation() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    let mut events = session.subscribe_events();

    transport
        .reply(Ok(ActionResponse::ok().with_game_data(trivia_question(1, 3, 0))))
        .await;
    session.start_trivia().await.expect("start");

    for index in 1..=3u32 {
        transport
            .reply(Ok(ActionResponse::ok().with_result(trivia_outcome(
                index,
                3,
                true,
                i64::from(index),
            ))))
            .await;
    }
    transport.serve_state(snapshot(2)).await;

    for _ in 0..2 {
        let transition = session.answer_trivia(1).await.expect("answer");
        assert!(matches!(transition, RoundTransition::Advanced { .. }));
    }
    let transition = session.answer_trivia(1).await.expect("answer");
    let RoundTransition::Finished { reward, .. } = transition else {
        panic!("expected finish, got {transition:?}");
    };
    assert!(reward.is_some());

    let (score, terminal) = session
        .with_mini_game(|open| {
            let open = open.expect("open session");
            (open.score(), open.is_terminal())
        })
        .await;
    assert_eq!(score, 3.0);
    assert!(terminal);

    // Result carried no state, so the post-reward snapshot was pulled.
    assert_eq!(*transport.state_fetches.lock().await, 2);
    assert_eq!(session.snapshot().await.expect("snapshot").week, 2);

    assert!(matches!(
        session.answer_trivia(0).await,
        Err(SessionError::SessionFinished(MiniGameKind::Trivia))
    ));

    let published = drain(&mut events);
    assert!(published.iter().any(|event| matches!(
        event,
        SessionEvent::MiniGameFinished { kind: MiniGameKind::Trivia, reward: Some(_), .. }
    )));
    assert_eq!(
        published
            .iter()
            .filter(|event| matches!(event, SessionEvent::RoundResolved { .. }))
            .count(),
        2
    );
}

#[tokio::test]
async fn second_start_while_active_is_a_local_no_op() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    transport
        .reply(Ok(ActionResponse::ok().with_game_data(trivia_question(1, 3, 0))))
        .await;
    session.start_trivia().await.expect("start");

    assert!(matches!(
        session.start_estimation().await,
        Err(SessionError::SessionActive(MiniGameKind::Trivia))
    ));
    assert!(matches!(
        session.start_trivia().await,
        Err(SessionError::SessionActive(MiniGameKind::Trivia))
    ));
    assert_eq!(transport.sent().await, vec![ClientAction::StartTriviaGame]);
}

#[tokio::test]
async fn market_making_quote_and_replacement_after_finish() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    transport
        .reply(Ok(
            ActionResponse::ok().with_game_data(market_state(1, 1, 100.0, 0, 0.0))
        ))
        .await;
    session.start_market_making().await.expect("start");

    transport
        .reply(Ok(ActionResponse::ok()
            .with_result(market_outcome(1, 1, 100.0, 0.5, 0.1))
            .with_state(snapshot(3))))
        .await;
    let transition = session.submit_spread("0.5").await.expect("quote");
    assert!(matches!(transition, RoundTransition::Finished { .. }));

    let quote = session
        .with_mini_game(|open| match open {
            Some(MiniGameSession::MarketMaking(mm)) => mm.extras().quotes.last().copied(),
            _ => None,
        })
        .await
        .expect("quote outcome");
    assert!(quote.bid < quote.quoted_mid() && quote.quoted_mid() < quote.ask);
    // State came with the result, no extra load.
    assert_eq!(*transport.state_fetches.lock().await, 1);
    assert_eq!(session.snapshot().await.expect("snapshot").week, 3);

    transport
        .reply(Ok(ActionResponse::ok().with_game_data(trivia_question(1, 3, 0))))
        .await;
    session.start_trivia().await.expect("finished session is replaced");
    let kind = session
        .with_mini_game(|open| open.map(MiniGameSession::kind))
        .await;
    assert_eq!(kind, Some(MiniGameKind::Trivia));
}

#[tokio::test]
async fn round_state_is_reconciled_even_when_the_result_is_refused() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    transport
        .reply(Ok(ActionResponse::ok().with_game_data(trivia_question(1, 3, 0))))
        .await;
    session.start_trivia().await.expect("start");
    let mut events = session.subscribe_events();

    // Garbage result: the round stays open, the state still lands.
    transport
        .reply(Ok(ActionResponse::ok()
            .with_result(json!({"surprise": true}))
            .with_state(snapshot(5))))
        .await;
    assert!(matches!(
        session.answer_trivia(0).await,
        Err(SessionError::Protocol(_))
    ));
    assert_eq!(session.snapshot().await.expect("snapshot").week, 5);

    // No result at all.
    transport
        .reply(Ok(ActionResponse::ok().with_state(snapshot(6))))
        .await;
    assert!(matches!(
        session.answer_trivia(0).await,
        Err(SessionError::UnexpectedPayload { field: "result", .. })
    ));
    assert_eq!(session.snapshot().await.expect("snapshot").week, 6);
    let phase = session
        .with_mini_game(|open| open.map(MiniGameSession::phase))
        .await;
    assert_eq!(phase, Some(RoundPhase::Active(1)));

    // The server lost the game.
    transport
        .reply(Ok(ActionResponse::ok()
            .with_result(json!({"error": "No active game"}))
            .with_state(snapshot(7))))
        .await;
    let err = session.answer_trivia(0).await.expect_err("lost game");
    assert!(matches!(err, SessionError::Rejected(_)));
    assert_eq!(session.snapshot().await.expect("snapshot").week, 7);
    assert_eq!(session.snapshot_version().await, 4);
    let terminal = session
        .with_mini_game(|open| open.is_some_and(MiniGameSession::is_terminal))
        .await;
    assert!(terminal);

    let published = drain(&mut events);
    assert_eq!(
        published
            .iter()
            .filter(|event| matches!(event, SessionEvent::SnapshotReplaced { .. }))
            .count(),
        3
    );
    assert_eq!(
        notices(&published),
        vec![(NoticeLevel::Warning, "No active game".to_string())]
    );
}

#[tokio::test]
async fn estimation_run_replaces_leaderboard_and_reconciles_each_round() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    let mut start = estimation_round(1, 2, 0);
    start["leaderboard"] = json!([{"score": 5, "avg_error": 0.8, "week": 1, "year": 1}]);
    transport
        .reply(Ok(ActionResponse::ok().with_game_data(start)))
        .await;
    session.start_estimation().await.expect("start");

    assert!(matches!(
        session.submit_estimation_guess("abc").await,
        Err(SessionError::Validation(ValidationError::NotNumeric { field: "guess", .. }))
    ));
    assert_eq!(transport.sent().await, vec![ClientAction::StartMiniGame]);

    transport
        .reply(Ok(ActionResponse::ok()
            .with_result(estimation_outcome(1, 2, 0.9, 1.2, 8))
            .with_state(snapshot(2))))
        .await;
    assert_eq!(
        session.submit_estimation_guess(" 0.9 ").await.expect("round 1"),
        RoundTransition::Advanced { resolved: 1, next: 2 }
    );
    assert_eq!(session.snapshot().await.expect("snapshot").week, 2);

    transport
        .reply(Ok(ActionResponse::ok()
            .with_result(estimation_outcome(2, 2, 1.0, 1.1, 18))
            .with_state(snapshot(3))))
        .await;
    let transition = session
        .submit_estimation_guess("1.0")
        .await
        .expect("round 2");
    assert!(matches!(
        transition,
        RoundTransition::Finished { resolved: 2, reward: Some(_) }
    ));

    let (score, board) = session
        .with_mini_game(|open| match open {
            Some(MiniGameSession::Estimation(game)) => {
                (game.score(), game.extras().leaderboard.clone())
            }
            _ => panic!("estimation session expected"),
        })
        .await;
    assert_eq!(score, 18.0);
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].score, 18);

    assert_eq!(session.snapshot().await.expect("snapshot").week, 3);
    // Every reply carried state; only the initial load hit the state endpoint.
    assert_eq!(*transport.state_fetches.lock().await, 1);
    assert_eq!(
        transport.sent().await,
        vec![
            ClientAction::StartMiniGame,
            ClientAction::SubmitMiniGame { guess: 0.9 },
            ClientAction::SubmitMiniGame { guess: 1.0 },
        ]
    );
}

#[tokio::test]
async fn transport_failure_leaves_state_and_releases_surface() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    transport
        .reply(Ok(ActionResponse::ok().with_game_data(trivia_question(1, 3, 0))))
        .await;
    session.start_trivia().await.expect("start");
    let mut events = session.subscribe_events();

    transport
        .reply(Err(DispatchError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        }))
        .await;
    let err = session.answer_trivia(0).await.expect_err("transport");
    assert!(matches!(err, SessionError::Dispatch(_)));

    assert!(!session.is_busy(Surface::MiniGameRound));
    let phase = session
        .with_mini_game(|open| open.map(MiniGameSession::phase))
        .await;
    assert_eq!(phase, Some(RoundPhase::Active(1)));
    assert_eq!(session.snapshot_version().await, 1);
    let published = notices(&drain(&mut events));
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, NoticeLevel::Error);

    // The same round can be retried.
    transport
        .reply(Ok(ActionResponse::ok().with_result(trivia_outcome(1, 3, true, 1))))
        .await;
    session.answer_trivia(1).await.expect("retry");
}

#[tokio::test]
async fn surfaces_are_single_flight_but_independent() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    transport
        .reply(Ok(ActionResponse::ok().with_game_data(trivia_question(1, 3, 0))))
        .await;
    session.start_trivia().await.expect("start");

    transport
        .reply(Ok(ActionResponse::ok().with_result(trivia_outcome(1, 3, true, 1))))
        .await;
    let release = transport.hold_next_send().await;
    let pending = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.answer_trivia(1).await })
    };
    while !session.is_busy(Surface::MiniGameRound) {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        session.answer_trivia(2).await,
        Err(SessionError::Busy(Surface::MiniGameRound))
    ));
    assert!(matches!(
        session.close_mini_game().await,
        Err(SessionError::Busy(Surface::MiniGameRound))
    ));

    transport
        .reply(Ok(ActionResponse::ok().with_state(snapshot(2))))
        .await;
    session.next_turn().await.expect("desk is not blocked");

    release.send(()).expect("release");
    let transition = pending.await.expect("join").expect("answer");
    assert_eq!(
        transition,
        RoundTransition::Advanced {
            resolved: 1,
            next: 2
        }
    );
    assert!(!session.is_busy(Surface::MiniGameRound));
    assert_eq!(session.close_mini_game().await.expect("close"), Some(MiniGameKind::Trivia));
    assert_eq!(session.close_mini_game().await.expect("close"), None);
}

#[tokio::test]
async fn continue_is_local_and_does_not_reappear() {
    let win = event("YOU WIN!", json!([{"text": "Keep trading", "effect": "continue"}]));
    let (session, transport) = loaded_session(snapshot_with_events(vec![win.clone()])).await;
    let mut events = session.subscribe_events();

    assert!(matches!(
        session.next_turn().await,
        Err(SessionError::EventPending(title)) if title == "YOU WIN!"
    ));

    assert!(session.choose_event(0).await.expect("continue").is_none());
    assert!(transport.sent().await.is_empty());
    assert_eq!(session.modal_phase().await, ModalPhase::Hidden);
    assert!(drain(&mut events).iter().any(|event| matches!(
        event,
        SessionEvent::EventResolved { dispatched: false, .. }
    )));

    // The server still queues it; it stays dismissed.
    transport
        .reply(Ok(
            ActionResponse::ok().with_state(snapshot_with_events(vec![win.clone()]))
        ))
        .await;
    session.next_turn().await.expect("next turn");
    assert_eq!(session.modal_phase().await, ModalPhase::Hidden);

    transport
        .reply(Ok(ActionResponse::ok().with_state(snapshot_with_events(vec![
            event("Market News", json!([])),
        ]))))
        .await;
    session.next_turn().await.expect("next turn");
    assert_eq!(
        session.current_event().await.expect("event").title,
        "Market News"
    );
}

#[tokio::test]
async fn reset_offer_round_trips_and_next_event_is_shown() {
    let offer = event(
        "Competing Hedge Fund Call",
        json!([
            {"text": "Take it", "effect": {"type": "reset_offer", "decision": "accept"}},
            {"text": "Stay put", "effect": {"type": "reset_offer", "decision": "decline"}}
        ]),
    );
    let news = event("Market News", json!([]));
    let (session, transport) =
        loaded_session(snapshot_with_events(vec![offer, news.clone()])).await;

    transport
        .reply(Ok(
            ActionResponse::ok().with_state(snapshot_with_events(vec![news]))
        ))
        .await;
    let snapshot = session
        .choose_event(1)
        .await
        .expect("choice")
        .expect("reconciled");
    assert_eq!(snapshot.events_queue.len(), 1);
    assert_eq!(
        transport.sent().await,
        vec![ClientAction::HandleResetOffer {
            decision: ResetDecision::Decline
        }]
    );
    assert_eq!(
        session.current_event().await.expect("next event").title,
        "Market News"
    );

    transport
        .reply(Ok(ActionResponse::ok().with_state(snapshot_with_events(vec![]))))
        .await;
    session.acknowledge_event().await.expect("ack");
    assert_eq!(transport.sent().await.last(), Some(&ClientAction::ClearEvent));
    assert_eq!(session.modal_phase().await, ModalPhase::Hidden);
}

#[tokio::test]
async fn game_over_restart_round_trips_and_closes_the_modal() {
    let game_over = event(
        "GAME OVER",
        json!([{"text": "Start over", "effect": "restart"}]),
    );
    let (session, transport) = loaded_session(snapshot_with_events(vec![game_over])).await;
    assert_eq!(session.modal_phase().await, ModalPhase::Shown);
    assert!(matches!(
        session.next_turn().await,
        Err(SessionError::EventPending(title)) if title == "GAME OVER"
    ));

    transport
        .reply(Ok(ActionResponse::ok().with_state(snapshot(1))))
        .await;
    let fresh = session
        .choose_event(0)
        .await
        .expect("restart")
        .expect("reconciled");

    assert_eq!(transport.sent().await, vec![ClientAction::RestartGame]);
    assert!(fresh.head_event().is_none());
    assert_eq!(session.snapshot_version().await, 2);
    assert_eq!(session.modal_phase().await, ModalPhase::Hidden);
    assert!(session.current_event().await.is_none());
}

#[tokio::test]
async fn infra_request_payload_is_echoed_verbatim() {
    let request = event(
        "Infra Team Request",
        json!([
            {"text": "Approve", "effect": {"type": "approve_infra", "infra": "compute_level", "cost": 50000}},
            {"text": "Reject", "effect": {"type": "reject_infra", "infra": "compute_level"}}
        ]),
    );
    let (session, transport) = loaded_session(snapshot_with_events(vec![request])).await;
    transport
        .reply(Ok(ActionResponse::ok().with_state(snapshot_with_events(vec![]))))
        .await;

    session.choose_event(0).await.expect("approve");
    let sent = transport.sent().await;
    assert_eq!(
        serde_json::to_value(&sent[0]).expect("encode"),
        json!({
            "type": "handle_infra_request",
            "effect": {"type": "approve_infra", "infra": "compute_level", "cost": 50000}
        })
    );
}

#[tokio::test]
async fn rejected_event_choice_keeps_the_event_up() {
    let over = event("GAME OVER", json!([{"text": "Restart", "effect": "restart"}]));
    let (session, transport) = loaded_session(snapshot_with_events(vec![over])).await;
    transport
        .reply(Ok(ActionResponse::error("restart unavailable")))
        .await;

    assert!(matches!(
        session.choose_event(0).await,
        Err(SessionError::Rejected(_))
    ));
    assert_eq!(session.modal_phase().await, ModalPhase::Shown);
    assert!(!session.is_busy(Surface::EventModal));
    assert!(matches!(
        session.choose_event(5).await,
        Err(SessionError::NoSuchChoice { index: 5, available: 1 })
    ));
}

#[tokio::test]
async fn saves_use_default_name_and_list() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    let mut events = session.subscribe_events();
    transport
        .reply(Ok(ActionResponse::ok().with_message("Game saved as savegame")))
        .await;
    transport
        .reply(Ok(ActionResponse::ok().with_saves(vec![
            "savegame".to_string(),
            "late-game".to_string(),
        ])))
        .await;
    transport
        .reply(Ok(ActionResponse::ok()
            .with_message("Loaded late-game")
            .with_state(snapshot(30))))
        .await;

    let receipt = session.save_game("  ").await.expect("save");
    assert!(receipt.snapshot.is_none());
    let saves = session.list_saves().await.expect("list");
    assert_eq!(saves, vec!["savegame".to_string(), "late-game".to_string()]);
    session.load_game("late-game").await.expect("load");

    assert_eq!(
        transport.sent().await,
        vec![
            ClientAction::SaveGame {
                name: DEFAULT_SAVE_NAME.to_string()
            },
            ClientAction::ListSaves,
            ClientAction::LoadGame {
                name: "late-game".to_string()
            },
        ]
    );
    assert_eq!(session.snapshot().await.expect("snapshot").week, 30);
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, SessionEvent::SavesListed(saves) if saves.len() == 2)));
}

#[tokio::test]
async fn fire_staff_uses_the_staff_kind() {
    let (session, transport) = loaded_session(snapshot(1)).await;
    transport
        .reply(Ok(ActionResponse::ok().with_state(snapshot(1))))
        .await;
    session
        .fire_staff(StaffKind::Infra, "Linus")
        .await
        .expect("fire");
    assert_eq!(
        serde_json::to_value(&transport.sent().await[0]).expect("encode"),
        json!({"type": "fire_staff", "staff_type": "infra", "name": "Linus"})
    );
}

#[tokio::test]
async fn unconfigured_session_reports_unavailable() {
    let session = GameSession::unconfigured();
    let mut events = session.subscribe_events();
    let err = session.load_state().await.expect_err("no server");
    assert!(matches!(
        err,
        SessionError::Dispatch(DispatchError::Unavailable(_))
    ));
    assert_eq!(notices(&drain(&mut events))[0].0, NoticeLevel::Error);
}
