//! Shared runtime state for aeb-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself beyond the bridge/gateway pair it wraps.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use aeb_bridge::{Bridge, Gateway};

/// Static build metadata included in status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    /// Caller-facing front over the correlation bridge.
    pub gateway: Arc<Gateway>,
    /// Bearer token every HTTP caller must present.
    pub token: String,
    /// Static build metadata.
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(token: impl Into<String>) -> Self {
        let bridge = Arc::new(Bridge::new());
        Self {
            gateway: Arc::new(Gateway::new(bridge)),
            token: token.into(),
            build: BuildInfo {
                service: "aeb-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        self.gateway.bridge()
    }
}

// ---------------------------------------------------------------------------
// Token helpers
// ---------------------------------------------------------------------------

/// Fresh random token (two uuid v4 hex blocks, 64 chars).
pub fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Where the token is persisted for the CLI to pick up.
pub fn token_file_path() -> PathBuf {
    std::env::var("AEB_TOKEN_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".aeb-token"))
}

/// Persist the token so a CLI on the same machine can authenticate.
pub fn persist_token(path: &PathBuf, token: &str) -> Result<()> {
    std::fs::write(path, token).with_context(|| format!("write token file {:?}", path))
}
