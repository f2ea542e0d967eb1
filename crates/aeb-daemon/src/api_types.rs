//! Response shapes for the daemon's HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GET /status response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub peer_connected: bool,
    /// Metadata the plugin announced in its `bridge_connected` event;
    /// `null` while no peer is attached.
    pub peer_meta: Option<Value>,
    pub pending_commands: usize,
    pub timestamp_ms: i64,
}

/// Uniform error body for refused or failed requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

/// POST /shutdown response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub ok: bool,
    pub message: &'static str,
}
