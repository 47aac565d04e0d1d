use super::*;
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

#[derive(Clone)]
struct CaptureState {
    tx: Arc<Mutex<Option<oneshot::Sender<serde_json::Value>>>>,
    response: serde_json::Value,
}

async fn capture_and_respond(
    State(state): State<CaptureState>,
    Json(payload): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send(payload);
    }
    Json(state.response.clone())
}

async fn spawn_capture_server(
    path: &'static str,
    response: serde_json::Value,
) -> Result<(String, oneshot::Receiver<serde_json::Value>)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel();
    let state = CaptureState {
        tx: Arc::new(Mutex::new(Some(tx))),
        response,
    };
    let app = Router::new()
        .route(path, post(capture_and_respond))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), rx))
}

#[tokio::test]
async fn new_problem_posts_difficulty_and_decodes_response() {
    let (server_url, payload_rx) = spawn_capture_server(
        "/new-problem",
        serde_json::json!({ "problem_id": "p-7", "prompt": "2+2=?" }),
    )
    .await
    .expect("spawn server");

    let api = BackendApi::new(server_url);
    let problem = api.new_problem(Difficulty::Medium).await.expect("problem");

    assert_eq!(problem.problem_id, ProblemId::from("p-7"));
    assert_eq!(problem.prompt, "2+2=?");

    let payload = payload_rx.await.expect("payload");
    assert_eq!(payload, serde_json::json!({ "difficulty": "medium" }));
}

#[tokio::test]
async fn numeric_problem_id_is_normalized_to_text() {
    let (server_url, _payload_rx) = spawn_capture_server(
        "/new-problem",
        serde_json::json!({ "problem_id": 42, "prompt": "3+3=?" }),
    )
    .await
    .expect("spawn server");

    let api = BackendApi::new(server_url);
    let problem = api.new_problem(Difficulty::Easy).await.expect("problem");

    assert_eq!(problem.problem_id, ProblemId::from("42"));
}

#[tokio::test]
async fn submit_answer_echoes_id_as_string() {
    let (server_url, payload_rx) = spawn_capture_server(
        "/answer",
        serde_json::json!({ "ok": false, "feedback": "Problem expired. Start a new one." }),
    )
    .await
    .expect("spawn server");

    let api = BackendApi::new(server_url);
    let outcome = api
        .submit_answer(&ProblemId::from("7"), "14")
        .await
        .expect("outcome");

    assert!(!outcome.ok);
    assert_eq!(
        outcome.feedback.as_deref(),
        Some("Problem expired. Start a new one.")
    );

    let payload = payload_rx.await.expect("payload");
    assert_eq!(
        payload,
        serde_json::json!({ "problem_id": "7", "answer": "14" })
    );
}

#[tokio::test]
async fn non_success_status_carries_code_text_and_body() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route(
        "/new-problem",
        post(|| async { (StatusCode::NOT_FOUND, "problem store offline") }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let api = BackendApi::new(format!("http://{addr}"));
    let err = api
        .new_problem(Difficulty::Easy)
        .await
        .expect_err("must fail");

    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    let rendered = err.to_string();
    assert!(rendered.contains("404 Not Found"), "got: {rendered}");
    assert!(rendered.contains("problem store offline"), "got: {rendered}");
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route("/new-problem", post(|| async { "not json" }));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let api = BackendApi::new(format!("http://{addr}"));
    let err = api
        .new_problem(Difficulty::Easy)
        .await
        .expect_err("must fail");

    assert!(matches!(err, ApiClientError::Decode { .. }));
}

#[tokio::test]
async fn health_probe_reads_ok_flag_and_trims_trailing_slash() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route(
        "/healthz",
        get(|| async { Json(serde_json::json!({ "ok": true })) }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let api = BackendApi::new(format!("http://{addr}/"));
    assert_eq!(api.base_url(), format!("http://{addr}"));
    assert!(api.health().await.expect("health"));
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    // Bind then drop so the port is very likely unused.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let api = BackendApi::new(format!("http://{addr}"));
    let err = api
        .new_problem(Difficulty::Easy)
        .await
        .expect_err("must fail");

    assert!(matches!(err, ApiClientError::Transport { .. }));
    assert_eq!(err.status(), None);
}
