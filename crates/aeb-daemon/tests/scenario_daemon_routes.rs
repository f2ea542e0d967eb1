//! In-process scenario tests for aeb-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP
//! socket. Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt; // oneshot

use aeb_daemon::{routes, state};
use aeb_protocol::{Action, Command, CommandMeta};

const TOKEN: &str = "test-token";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_state() -> Arc<state::AppState> {
    Arc::new(state::AppState::new(TOKEN))
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str, bearer: Option<&str>) -> Request<axum::body::Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(axum::body::Body::empty()).unwrap()
}

fn post_json(uri: &str, bearer: Option<&str>, body: &serde_json::Value) -> Request<axum::body::Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder
        .body(axum::body::Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_without_token_is_401() {
    let st = make_state();
    let (status, body) = call(routes::build_router(st), get("/status", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(parse_json(body)["ok"], false);
}

#[tokio::test]
async fn status_with_wrong_token_is_401() {
    let st = make_state();
    let (status, _) = call(routes::build_router(st), get("/status", Some("nope"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_accepts_bearer_header() {
    let st = make_state();
    let (status, body) = call(routes::build_router(st), get("/status", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "aeb-daemon");
    assert_eq!(json["peer_connected"], false);
    assert!(json["peer_meta"].is_null());
    assert_eq!(json["pending_commands"], 0);
}

#[tokio::test]
async fn status_accepts_query_token() {
    let st = make_state();
    let uri = format!("/status?token={TOKEN}");
    let (status, _) = call(routes::build_router(st), get(&uri, None)).await;
    assert_eq!(status, StatusCode::OK);
}

// ---------------------------------------------------------------------------
// POST /command
// ---------------------------------------------------------------------------

#[tokio::test]
async fn command_without_peer_is_503() {
    let st = make_state();
    let cmd = Command::new(Action::ReadSchema, serde_json::json!({}), CommandMeta::default());
    let body = serde_json::to_value(&cmd).unwrap();

    let (status, resp) = call(
        routes::build_router(st),
        post_json("/command", Some(TOKEN), &body),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(parse_json(resp)["ok"], false);
}

#[tokio::test]
async fn command_with_invalid_envelope_is_400() {
    let st = make_state();

    // Attach a fake peer so the envelope check is actually reached.
    let _attachment = st.bridge().attach_peer().await;

    let (status, resp) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/command", Some(TOKEN), &serde_json::json!({"not": "a command"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json = parse_json(resp);
    assert_eq!(json["ok"], false);
    assert!(json["error"].as_str().unwrap().contains("invalid command envelope"));
}

#[tokio::test]
async fn command_with_unknown_action_is_400_with_allowed_list() {
    let st = make_state();
    let _attachment = st.bridge().attach_peer().await;

    let cmd = Command::new(Action::ReadSchema, serde_json::json!({}), CommandMeta::default());
    let mut body = serde_json::to_value(&cmd).unwrap();
    body["action"] = serde_json::json!("delete_everything");

    let (status, resp) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/command", Some(TOKEN), &body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json = parse_json(resp);
    assert_eq!(json["ok"], false);
    let msg = json["error"].as_str().unwrap();
    assert!(msg.contains("unsupported action 'delete_everything'"));
    assert!(msg.contains("update_schema"));
}

// ---------------------------------------------------------------------------
// POST /shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_triggers_gateway_signal() {
    let st = make_state();
    let mut rx = st.gateway.shutdown_signal();

    let (status, body) = call(
        routes::build_router(Arc::clone(&st)),
        post_json("/shutdown", Some(TOKEN), &serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["ok"], true);

    rx.changed().await.unwrap();
    assert!(*rx.borrow());
}

// ---------------------------------------------------------------------------
// Unknown routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let st = make_state();
    let (status, _) = call(routes::build_router(st), get("/does_not_exist", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
