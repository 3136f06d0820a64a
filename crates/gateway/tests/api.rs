use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use cg_conversations::{hash_token, mint_user_token};
use cg_domain::config::Config;
use cg_domain::{IdentityKind, Message, Result, SubjectKey};
use cg_gateway::api;
use cg_gateway::bootstrap::assemble_state;
use cg_gateway::state::AppState;
use cg_providers::CompletionGateway;
use cg_storage::Stores;

struct EchoGateway {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl CompletionGateway for EchoGateway {
    async fn complete(&self, messages: &[Message], _max_tokens: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(format!("echo: {last}"))
    }

    fn model(&self) -> &str {
        "echo"
    }
}

struct Harness {
    app: Router,
    state: AppState,
    gateway: Arc<EchoGateway>,
}

fn harness_with(config: Config) -> Harness {
    let gateway = Arc::new(EchoGateway {
        calls: AtomicUsize::new(0),
    });
    let state = assemble_state(Arc::new(config), Stores::memory(), Some(gateway.clone())).unwrap();
    Harness {
        app: api::router().with_state(state.clone()),
        state,
        gateway,
    }
}

fn harness() -> Harness {
    harness_with(Config::default())
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, headers: &[(&str, &str)], body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

const ABC: &[(&str, &str)] = &[("x-visitor-id", "abc")];

/// Collects formatted log lines for the current test thread.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn capture(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let (status, body) = send(&h.app, get("/health", &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["completion_gateway"], "echo");
}

#[tokio::test]
async fn missing_credentials_is_401() {
    let h = harness();
    let (status, body) = send(&h.app, get("/v1/conversations", &[])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Unauthorized");
}

#[tokio::test]
async fn invalid_bearer_does_not_fall_back_to_guest() {
    let h = harness();
    let (status, _) = send(
        &h.app,
        get(
            "/v1/conversations",
            &[("authorization", "Bearer nope"), ("x-visitor-id", "abc")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_or_malformed_input_is_422() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        post("/v1/conversations", ABC, json!({ "input_text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["data"]["kind"], "validation_error");

    let req = Request::builder()
        .method("POST")
        .uri("/v1/conversations")
        .header("content-type", "application/json")
        .header("x-visitor-id", "abc")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.gateway.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn first_turn_names_conversation_and_round_trips() {
    let h = harness();
    let input = "abcdefghijklmnopqrstuvwxy";
    let (status, body) = send(
        &h.app,
        post("/v1/conversations", ABC, json!({ "input_text": input })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Conversation created successfully");
    assert_eq!(body["data"]["conversation_name"], "abcdefghijklmnopqrst...");
    assert_eq!(body["data"]["output_text"], format!("echo: {input}"));
    assert!(body["data"]["user_id"].is_null());
    let id = body["data"]["conversation_id"].as_i64().unwrap();

    let (status, body) = send(
        &h.app,
        post(
            "/v1/conversations",
            ABC,
            json!({ "input_text": "second", "conversation_id": id.to_string() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Conversation updated successfully");
    assert_eq!(body["data"]["conversation_id"], id);

    let (status, body) = send(&h.app, get(&format!("/v1/conversations/{id}"), ABC)).await;
    assert_eq!(status, StatusCode::OK);
    let turns = body["data"]["conversation_data"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["input_text"], input);
    assert_eq!(turns[1]["input_text"], "second");
    assert_eq!(turns[1]["output_text"], "echo: second");

    let (status, body) = send(&h.app, get("/v1/conversations", ABC)).await;
    assert_eq!(status, StatusCode::OK);
    let list = body["data"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["conversation_id"], id);
}

#[tokio::test]
async fn foreign_conversation_is_404_and_creates_nothing() {
    let h = harness();
    let (_, body) = send(
        &h.app,
        post("/v1/conversations", ABC, json!({ "input_text": "mine" })),
    )
    .await;
    let id = body["data"]["conversation_id"].as_i64().unwrap();

    let intruder: &[(&str, &str)] = &[("x-visitor-id", "intruder")];
    let (status, body) = send(
        &h.app,
        post(
            "/v1/conversations",
            intruder,
            json!({ "input_text": "let me in", "conversation_id": id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Not Found");

    let (status, _) = send(&h.app, get(&format!("/v1/conversations/{id}"), intruder)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&h.app, get("/v1/conversations", intruder)).await;
    assert!(body["data"].as_array().unwrap().is_empty());
    assert_eq!(h.gateway.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bad_conversation_id_path_is_422() {
    let h = harness();
    for raw in ["abc", "0", "-4"] {
        let (status, _) = send(&h.app, get(&format!("/v1/conversations/{raw}"), ABC)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "path {raw}");
    }
}

#[tokio::test]
async fn exhausted_quota_is_429_with_minutes() {
    let mut config = Config::default();
    config.entitlements.guest_daily_minutes = 0;
    let h = harness_with(config);

    let (status, body) = send(
        &h.app,
        post("/v1/conversations", ABC, json!({ "input_text": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Usage Limit Exceeded");
    assert_eq!(body["data"]["limit_minutes"], 0);
    assert_eq!(body["data"]["used_minutes"], 0);
    assert_eq!(h.gateway.calls.load(Ordering::SeqCst), 0);

    let (_, body) = send(&h.app, get("/v1/conversations", ABC)).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn subscribed_user_is_unlimited_and_unmetered() {
    let h = harness();
    let token = mint_user_token();
    let user = h
        .state
        .stores
        .users
        .create_user("ada", &hash_token(&token), Utc::now())
        .await
        .unwrap();
    h.state.stores.users.set_subscription(user.id, true).await.unwrap();
    let bearer = format!("Bearer {token}");
    let auth: &[(&str, &str)] = &[("authorization", bearer.as_str())];

    for i in 0..3 {
        let (status, body) = send(
            &h.app,
            post("/v1/conversations", auth, json!({ "input_text": format!("q{i}") })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user_id"], user.id);
    }

    let (status, body) = send(&h.app, get("/v1/usage", auth)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unlimited"], true);
    assert!(body["data"]["limit_minutes"].is_null());

    let subject = cg_domain::SubjectKey::new(cg_domain::IdentityKind::User, &user.id.to_string());
    let period = h.state.ledger.period_date(Utc::now());
    assert!(h
        .state
        .stores
        .usage
        .get_usage(&subject, period)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn guest_usage_reports_limit() {
    let h = harness();
    send(
        &h.app,
        post("/v1/conversations", ABC, json!({ "input_text": "hi" })),
    )
    .await;
    let (status, body) = send(&h.app, get("/v1/usage", ABC)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["limit_minutes"], 10);
    assert_eq!(body["data"]["allowed"], true);
    assert_eq!(body["data"]["subject_key"], "device:abc");
}

#[tokio::test]
async fn missing_completion_credential_is_500() {
    let state = assemble_state(Arc::new(Config::default()), Stores::memory(), None).unwrap();
    let app = api::router().with_state(state);
    let (status, body) = send(
        &app,
        post("/v1/conversations", ABC, json!({ "input_text": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "API Key Missing");
    assert!(!body.to_string().contains("OPENAI_API_KEY"));
}

#[tokio::test]
async fn missing_completion_credential_is_reported_before_body_errors() {
    let state = assemble_state(Arc::new(Config::default()), Stores::memory(), None).unwrap();
    let app = api::router().with_state(state);

    let (status, body) = send(
        &app,
        post(
            "/v1/conversations",
            ABC,
            json!({ "input_text": "hi", "conversation_id": "abc" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "API Key Missing");

    let req = Request::builder()
        .method("POST")
        .uri("/v1/conversations")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "API Key Missing");
}

struct SlowGateway {
    finished: AtomicUsize,
}

#[async_trait::async_trait]
impl CompletionGateway for SlowGateway {
    async fn complete(&self, _messages: &[Message], _max_tokens: u32) -> Result<String> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok("late reply".into())
    }

    fn model(&self) -> &str {
        "slow"
    }
}

#[tokio::test]
async fn dropped_request_still_stores_turn_and_releases_quota_lock() {
    let gateway = Arc::new(SlowGateway {
        finished: AtomicUsize::new(0),
    });
    let state = assemble_state(
        Arc::new(Config::default()),
        Stores::memory(),
        Some(gateway.clone()),
    )
    .unwrap();
    let app = api::router().with_state(state.clone());

    let req = post("/v1/conversations", ABC, json!({ "input_text": "hello" }));
    let abandoned = tokio::time::timeout(Duration::from_millis(50), app.clone().oneshot(req)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(gateway.finished.load(Ordering::SeqCst), 1);

    let subject = SubjectKey::new(IdentityKind::Device, "abc");
    let conversations = state
        .stores
        .conversations
        .list_conversations(&subject)
        .await
        .unwrap();
    assert_eq!(conversations.len(), 1);
    let turns = state
        .stores
        .conversations
        .turns(conversations[0].id)
        .await
        .unwrap();
    assert_eq!(turns[0].output_text.as_deref(), Some("late reply"));
    assert!(state
        .stores
        .usage
        .get_usage(&subject, state.ledger.period_date(Utc::now()))
        .await
        .unwrap()
        .is_some());

    // The subject lock was released by the commit, so the next turn runs.
    let (status, _) = send(
        &app,
        post("/v1/conversations", ABC, json!({ "input_text": "again" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(gateway.finished.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn read_failures_are_logged_with_subject_and_conversation() {
    let h = harness();
    let (_, body) = send(
        &h.app,
        post("/v1/conversations", ABC, json!({ "input_text": "mine" })),
    )
    .await;
    let id = body["data"]["conversation_id"].as_i64().unwrap();

    let logs = LogBuffer::default();
    let _guard = logs.capture();
    let intruder: &[(&str, &str)] = &[("x-visitor-id", "intruder")];
    let (status, _) = send(&h.app, get(&format!("/v1/conversations/{id}"), intruder)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&h.app, get("/v1/usage", &[])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let out = logs.contents();
    let not_found = out
        .lines()
        .find(|l| l.contains("not_found"))
        .expect("404 was logged");
    assert!(not_found.contains("request rejected"));
    assert!(not_found.contains("device:intruder"));
    assert!(not_found.contains(&format!("conversation_id={id}")));
    assert!(out.lines().any(|l| l.contains("unauthenticated")));
}

#[tokio::test]
async fn visitor_ids_are_minted_or_echoed() {
    let h = harness();
    let (status, body) = send(&h.app, post("/v1/visitor", &[], json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let minted = body["data"]["visitor_id"].as_str().unwrap();
    assert_eq!(minted.len(), 32);
    assert_eq!(body["data"]["created"], true);

    let headers: &[(&str, &str)] = &[("x-visitor-id", "device-9")];
    let (_, first) = send(&h.app, post("/v1/visitor", headers, json!({}))).await;
    let (_, second) = send(&h.app, post("/v1/visitor", headers, json!({}))).await;
    assert_eq!(first["data"]["visitor_id"], "device-9");
    assert_eq!(first["data"]["created"], true);
    assert_eq!(second["data"]["created"], false);

    let bad: &[(&str, &str)] = &[("x-visitor-id", "has spaces")];
    let (status, _) = send(&h.app, post("/v1/visitor", bad, json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
