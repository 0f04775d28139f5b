use super::*;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::protocol::ResponseStatus;
use tokio::{net::TcpListener, sync::Mutex};

use crate::fixtures::snapshot_json;

#[derive(Debug, Clone, PartialEq)]
struct Recorded {
    path: &'static str,
    body: String,
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

async fn handle_next_turn(State(state): State<MockState>, body: Bytes) -> Json<Value> {
    state.requests.lock().await.push(Recorded {
        path: "/api/next_turn",
        body: String::from_utf8_lossy(&body).into_owned(),
    });
    Json(json!({"status": "ok", "state": snapshot_json(2)}))
}

async fn handle_action(State(state): State<MockState>, Json(action): Json<Value>) -> Json<Value> {
    state.requests.lock().await.push(Recorded {
        path: "/api/action",
        body: action.to_string(),
    });
    match action["type"].as_str() {
        Some("list_saves") => Json(json!({"status": "ok", "saves": ["savegame", "run-2"]})),
        Some("hire_quant") => Json(json!({
            "status": "error",
            "message": "Salary too low for skill 50. Offer at least $100,000.",
            "state": snapshot_json(1),
        })),
        Some("start_trivia_game") => Json(json!({
            "status": "ok",
            "game_data": {"index": 1, "total": 3, "prompt": "?", "options": ["a", "b"], "score": 0},
        })),
        _ => Json(json!({"status": "ok", "message": "done", "state": snapshot_json(1)})),
    }
}

async fn handle_state() -> Json<Value> {
    Json(snapshot_json(7))
}

async fn spawn_game_server() -> (String, MockState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = MockState::default();
    let app = Router::new()
        .route("/api/next_turn", post(handle_next_turn))
        .route("/api/action", post(handle_action))
        .route("/api/state", get(handle_state))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

async fn spawn_broken_server() -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route(
            "/api/action",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "engine exploded") }),
        )
        .route("/api/state", get(|| async { "not json" }));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn next_turn_posts_without_a_body() {
    let (server_url, state) = spawn_game_server().await;
    let transport = HttpTransport::new(&server_url, DEFAULT_REQUEST_TIMEOUT).expect("transport");

    let response = transport.send(&ClientAction::NextTurn).await.expect("send");
    assert!(response.is_ok());
    assert_eq!(response.state.expect("state").week, 2);

    let requests = state.requests.lock().await;
    assert_eq!(
        *requests,
        vec![Recorded {
            path: "/api/next_turn",
            body: String::new(),
        }]
    );
}

#[tokio::test]
async fn actions_post_flat_tagged_json() {
    let (server_url, state) = spawn_game_server().await;
    let transport = HttpTransport::new(&server_url, DEFAULT_REQUEST_TIMEOUT).expect("transport");

    transport
        .send(&ClientAction::UpgradeInfra {
            infra_type: "compute_level".to_string(),
        })
        .await
        .expect("send");

    let requests = state.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/api/action");
    let body: Value = serde_json::from_str(&requests[0].body).expect("json body");
    assert_eq!(body, json!({"type": "upgrade_infra", "infra_type": "compute_level"}));
}

#[tokio::test]
async fn business_errors_come_back_as_responses_not_dispatch_errors() {
    let (server_url, _state) = spawn_game_server().await;
    let transport = HttpTransport::new(&server_url, DEFAULT_REQUEST_TIMEOUT).expect("transport");

    let response = transport
        .send(&ClientAction::HireQuant {
            name: "Ada".into(),
            skill: 50,
            salary: 10_000,
        })
        .await
        .expect("send");
    assert_eq!(response.status, ResponseStatus::Error);
    let rejection = response.rejection().expect("rejection");
    assert!(rejection.message.contains("Salary too low"));
}

#[tokio::test]
async fn decodes_optional_envelope_fields() {
    let (server_url, _state) = spawn_game_server().await;
    let transport = HttpTransport::new(&server_url, DEFAULT_REQUEST_TIMEOUT).expect("transport");

    let saves = transport.send(&ClientAction::ListSaves).await.expect("send");
    assert_eq!(
        saves.saves,
        Some(vec!["savegame".to_string(), "run-2".to_string()])
    );
    assert!(saves.state.is_none());

    let started = transport
        .send(&ClientAction::StartTriviaGame)
        .await
        .expect("send");
    assert!(started.state.is_none());
    assert_eq!(started.game_data.expect("game data")["total"], 3);
}

#[tokio::test]
async fn fetch_state_reads_the_state_dump() {
    let (server_url, _state) = spawn_game_server().await;
    let transport = HttpTransport::new(&server_url, DEFAULT_REQUEST_TIMEOUT).expect("transport");

    let snapshot = transport.fetch_state().await.expect("state");
    assert_eq!(snapshot.week, 7);
    assert_eq!(snapshot.team.len(), 2);
}

#[tokio::test]
async fn non_success_status_and_bad_bodies_are_dispatch_errors() {
    let server_url = spawn_broken_server().await;
    let transport = HttpTransport::new(&server_url, DEFAULT_REQUEST_TIMEOUT).expect("transport");

    let err = transport
        .send(&ClientAction::ClearEvent)
        .await
        .expect_err("500 must fail");
    match err {
        DispatchError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "engine exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = transport.fetch_state().await.expect_err("bad json");
    assert!(matches!(err, DispatchError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let transport =
        HttpTransport::new(&format!("http://{addr}"), DEFAULT_REQUEST_TIMEOUT).expect("transport");
    let err = transport
        .send(&ClientAction::NextTurn)
        .await
        .expect_err("nothing listening");
    assert!(matches!(err, DispatchError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn unavailable_transport_never_reaches_a_server() {
    let err = UnavailableTransport
        .send(&ClientAction::ListSaves)
        .await
        .expect_err("unavailable");
    assert!(err.to_string().contains("list_saves"));
}

#[test]
fn base_url_keeps_path_prefixes() {
    let url = normalize_base_url(" http://localhost:5000/sim ").expect("url");
    assert_eq!(url.as_str(), "http://localhost:5000/sim/");
    assert_eq!(
        url.join("api/action").expect("join").as_str(),
        "http://localhost:5000/sim/api/action"
    );

    let url = normalize_base_url("http://127.0.0.1:5000/").expect("url");
    assert_eq!(url.as_str(), "http://127.0.0.1:5000/");
}

#[test]
fn base_url_requires_http() {
    assert!(matches!(
        normalize_base_url("ftp://example.com"),
        Err(DispatchError::InvalidUrl { .. })
    ));
    assert!(matches!(
        normalize_base_url("not a url"),
        Err(DispatchError::InvalidUrl { .. })
    ));
}
