//! aeb-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, resolves the
//! auth token, builds the shared state, wires middleware, and starts
//! the HTTP server. All route handlers live in `routes.rs`; all shared
//! state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use aeb_bridge::{spawn_heartbeat, HEARTBEAT_INTERVAL};
use aeb_daemon::{routes, state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let token = match std::env::var("AEB_TOKEN") {
        Ok(t) if !t.is_empty() => t,
        _ => state::generate_token(),
    };
    let token_path = state::token_file_path();
    state::persist_token(&token_path, &token)?;
    info!("auth token written to {:?}", token_path);

    let shared = Arc::new(state::AppState::new(token));

    spawn_heartbeat(Arc::clone(shared.bridge()), HEARTBEAT_INTERVAL);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787)));
    info!("aeb-daemon listening on http://{}", addr);

    let mut shutdown_rx = shared.gateway.shutdown_signal();
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupt received"),
            _ = shutdown_rx.changed() => info!("shutdown route triggered"),
        }
    })
    .await
    .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("AEB_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins (the editor runs locally).
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "https://pro.easyeda.com",
        "http://localhost:8787",
        "http://127.0.0.1:8787",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
