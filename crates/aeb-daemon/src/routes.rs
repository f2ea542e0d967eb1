//! Axum router and all HTTP/WebSocket handlers for aeb-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and
//! attaches middleware layers (CORS, tracing) afterwards so the
//! scenario tests in `tests/` can compose the bare router directly.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, RawQuery, Request, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

use aeb_protocol::{Action, Command, CommandOutcome};

use crate::{
    api_types::{ErrorResponse, ShutdownResponse, StatusResponse},
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// `/ws` performs its own token/loopback check inside the handler; every
/// other route sits behind the bearer-token middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/command", post(command))
        .route("/status", get(status_handler))
        .route("/shutdown", post(shutdown))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_token,
        ));

    Router::new()
        .route("/ws", get(ws_handler))
        .merge(protected)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

fn token_matches(state: &AppState, headers: &HeaderMap, query: Option<&str>) -> bool {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(bearer) = auth.strip_prefix("Bearer ") {
            if bearer == state.token {
                return true;
            }
        }
    }
    query_token(query).is_some_and(|t| t == state.token)
}

fn query_token(query: Option<&str>) -> Option<&str> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

pub(crate) async fn require_token(
    State(st): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let query = req.uri().query().map(str::to_string);
    if !token_matches(&st, req.headers(), query.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("unauthorized")),
        )
            .into_response();
    }
    next.run(req).await
}

// ---------------------------------------------------------------------------
// POST /command
// ---------------------------------------------------------------------------

/// Forward a full command envelope to the plugin and await the
/// correlated result.
pub(crate) async fn command(State(st): State<Arc<AppState>>, body: Json<Value>) -> Response {
    if !st.gateway.status().await.peer_connected {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("plugin not connected")),
        )
            .into_response();
    }

    // Check the action against the registry first, so a caller outside
    // it gets the allowed-action list instead of a serde variant error.
    if let Some(name) = body.0.get("action").and_then(Value::as_str) {
        if let Err(e) = Action::parse(name) {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response();
        }
    }

    let cmd: Command = match serde_json::from_value(body.0) {
        Ok(cmd) => cmd,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(format!("invalid command envelope: {e}"))),
            )
                .into_response()
        }
    };

    let outcome = st.gateway.dispatch(cmd).await;
    outcome_response(outcome)
}

/// Transport failures map onto distinct status codes so callers can
/// tell a dead peer from a slow one; a plugin-level `ok:false` reply is
/// still a successful HTTP exchange.
fn outcome_response(outcome: CommandOutcome) -> Response {
    let status = if outcome.ok {
        StatusCode::OK
    } else {
        match outcome
            .error
            .as_ref()
            .and_then(|e| e.get("kind"))
            .and_then(Value::as_str)
        {
            Some("no_peer_attached") => StatusCode::SERVICE_UNAVAILABLE,
            Some("timeout") => StatusCode::GATEWAY_TIMEOUT,
            Some("transport_failure") | Some("peer_disconnected") => StatusCode::BAD_GATEWAY,
            Some("duplicate_command_id") => StatusCode::BAD_REQUEST,
            _ => StatusCode::OK,
        }
    };
    (status, Json(outcome)).into_response()
}

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let s = st.gateway.status().await;
    Json(StatusResponse {
        ok: true,
        service: st.build.service,
        version: st.build.version,
        peer_connected: s.peer_connected,
        peer_meta: s.peer_meta,
        pending_commands: s.pending_commands,
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    })
}

// ---------------------------------------------------------------------------
// POST /shutdown
// ---------------------------------------------------------------------------

pub(crate) async fn shutdown(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    info!("shutdown requested");
    st.gateway.request_shutdown();
    Json(ShutdownResponse {
        ok: true,
        message: "shutting down",
    })
}

// ---------------------------------------------------------------------------
// GET /ws  (plugin side)
// ---------------------------------------------------------------------------

/// Plugin WebSocket endpoint.
///
/// The plugin authenticates via `?token=`; token-less connections are
/// accepted only from loopback, because the in-editor plugin cannot
/// read the token file from disk.
pub(crate) async fn ws_handler(
    State(st): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> Response {
    if !token_matches(&st, &headers, query.as_deref()) {
        if !addr.ip().is_loopback() {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized")),
            )
                .into_response();
        }
        info!(%addr, "loopback plugin connection accepted without token");
    }

    ws.on_upgrade(move |socket| handle_peer_socket(st, socket))
}

/// Attach the socket to the bridge and pump frames both ways until the
/// connection ends or the bridge replaces it.
async fn handle_peer_socket(st: Arc<AppState>, socket: WebSocket) {
    let attachment = st.bridge().attach_peer().await;
    let epoch = attachment.epoch;
    let mut outbound = attachment.outbound;
    let (mut sink, mut stream) = socket.split();

    info!(epoch, "plugin websocket connected");

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // Sender dropped: the bridge replaced this connection.
                None => break,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => st.bridge().on_peer_message(&text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(epoch, error = %e, "plugin websocket error");
                    break;
                }
            },
        }
    }

    st.bridge().detach_peer(epoch).await;
    let _ = sink.close().await;
    info!(epoch, "plugin websocket disconnected");
}
