//! Integration tests for the Kaï API.
//!
//! Each test builds its own router over an in-memory store and a scripted
//! generation gateway.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use kai_api::create_router;
use kai_api::state::AppState;
use kai_chat::{ChatError, GenerationGateway, StreamDispatcher};
use kai_core::config::ChatConfig;
use kai_core::types::IpLogEntry;
use kai_storage::{KvStore, SqliteKvStore};

// =============================================================================
// Helpers
// =============================================================================

/// Gateway returning a fixed reply, or failing, and counting calls.
struct ScriptedGateway {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    async fn generate(&self, _prompt: &str) -> Result<String, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| ChatError::Gateway("provider unavailable".to_string()))
    }
}

fn make_state(gateway: Arc<ScriptedGateway>) -> AppState {
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKvStore::in_memory().unwrap());
    let config = ChatConfig {
        chunk_interval_ms: 0,
        ..ChatConfig::default()
    };
    AppState::new(StreamDispatcher::new(kv, gateway, &config), 50)
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

/// Decode every `data:` payload of an SSE body as JSON.
async fn sse_payloads(resp: axum::response::Response) -> Vec<Value> {
    let body = String::from_utf8(body_bytes(resp).await).unwrap();
    body.split("\n\n")
        .flat_map(|frame| frame.lines())
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect()
}

fn reply_text(payloads: &[Value]) -> String {
    payloads
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect()
}

// =============================================================================
// GET /
// =============================================================================

#[tokio::test]
async fn test_root_banner() {
    let app = create_router(make_state(ScriptedGateway::replying("x")));
    let resp = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, "Kaï Backend Running".as_bytes());
}

// =============================================================================
// POST /chat/stream
// =============================================================================

#[tokio::test]
async fn test_chat_stream_missing_message_is_400() {
    for body in [r#"{}"#, r#"{"message":""}"#, r#"{"sessionId":"s"}"#] {
        let app = create_router(make_state(ScriptedGateway::replying("x")));
        let resp = app.oneshot(post_json("/chat/stream", body)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {}", body);
        let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json, serde_json::json!({"error": "Message required"}));
    }
}

#[tokio::test]
async fn test_chat_stream_rejects_non_json_body() {
    let app = create_router(make_state(ScriptedGateway::replying("x")));
    let resp = app
        .oneshot(post_json("/chat/stream", "message=hi"))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_chat_stream_happy_path() {
    let gateway = ScriptedGateway::replying("Hello! I am Kaï, how can I help you today?");
    let app = create_router(make_state(gateway.clone()));

    let resp = app
        .oneshot(post_json("/chat/stream", r#"{"message":"hi"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(resp.headers()[header::CONNECTION], "keep-alive");

    let payloads = sse_payloads(resp).await;
    let init = &payloads[0];
    assert_eq!(init["init"], true);
    assert_eq!(init["ip"], "unknown");
    let sid = init["sessionId"].as_str().unwrap();
    assert!(!sid.is_empty());

    assert_eq!(payloads.last().unwrap(), &serde_json::json!({"done": true}));
    assert_eq!(reply_text(&payloads), "Hello! I am Kaï, how can I help you today?");
    for text in &payloads[1..payloads.len() - 1] {
        assert_eq!(text["sessionId"], sid);
        assert!(text["text"].as_str().unwrap().chars().count() <= 30);
    }
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn test_chat_stream_second_turn_served_from_cache() {
    let gateway = ScriptedGateway::replying("Cached answer");
    let app = create_router(make_state(gateway.clone()));

    let first = app
        .clone()
        .oneshot(post_json("/chat/stream", r#"{"message":"hi"}"#))
        .await
        .unwrap();
    let first = sse_payloads(first).await;
    let sid = first[0]["sessionId"].as_str().unwrap().to_string();

    let body = serde_json::json!({"message": "  HI ", "sessionId": sid}).to_string();
    let second = app
        .oneshot(post_json("/chat/stream", &body))
        .await
        .unwrap();
    let second = sse_payloads(second).await;

    assert_eq!(second[0]["sessionId"], sid.as_str());
    assert_eq!(reply_text(&second), "Cached answer");
    assert_eq!(second.last().unwrap()["done"], true);
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn test_chat_stream_gateway_failure_reports_in_stream() {
    let app = create_router(make_state(ScriptedGateway::failing()));
    let resp = app
        .oneshot(post_json("/chat/stream", r#"{"message":"hi","sessionId":"s1"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let payloads = sse_payloads(resp).await;
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0]["sessionId"], "s1");
    assert_eq!(payloads[1], serde_json::json!({"error": "Streaming failed"}));
}

#[tokio::test]
async fn test_chat_stream_uses_forwarded_address() {
    let state = make_state(ScriptedGateway::replying("ok"));
    let app = create_router(state.clone());

    let req = Request::post("/chat/stream")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .body(Body::from(r#"{"message":"hi","sessionId":"s1"}"#))
        .unwrap();
    let payloads = sse_payloads(app.oneshot(req).await.unwrap()).await;

    assert_eq!(payloads[0]["ip"], "203.0.113.9");
    assert_eq!(
        state.ip_log.session_ip("s1").unwrap().as_deref(),
        Some("203.0.113.9")
    );
}

// =============================================================================
// GET /admin/recent-ips
// =============================================================================

#[tokio::test]
async fn test_recent_ips_empty() {
    let app = create_router(make_state(ScriptedGateway::replying("x")));
    let resp = app
        .oneshot(Request::get("/admin/recent-ips").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let entries: Vec<IpLogEntry> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_recent_ips_returns_last_fifty_oldest_first() {
    let state = make_state(ScriptedGateway::replying("x"));
    for i in 0..55 {
        state.ip_log.record(&format!("10.0.0.{}", i), "s").unwrap();
    }
    let app = create_router(state);

    let resp = app
        .oneshot(Request::get("/admin/recent-ips").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let entries = json.as_array().unwrap();

    assert_eq!(entries.len(), 50);
    assert_eq!(entries[0]["ip"], "10.0.0.5");
    assert_eq!(entries[49]["ip"], "10.0.0.54");
    assert_eq!(entries[0]["sessionId"], "s");
    assert!(entries[0]["ts"].is_string());
}
