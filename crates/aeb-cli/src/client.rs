//! HTTP client for the bridge daemon.
//!
//! Implements [`CommandPort`] over `POST /command`, so the requirement
//! compiler's resolver and the apply flow run unchanged against a live
//! daemon.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use aeb_protocol::{Action, Command, CommandMeta, CommandOutcome, CommandPort};

/// Per-request HTTP timeout. Longer than the daemon's own command
/// timeout so a 504 from the daemon wins over a client-side abort.
const HTTP_TIMEOUT: Duration = Duration::from_secs(35);

pub struct HttpBridgeClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpBridgeClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{host}:{port}"),
            token: load_token(),
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub async fn get_status(&self) -> Value {
        self.request(reqwest::Method::GET, "/status", None).await
    }

    pub async fn shutdown(&self) -> Value {
        self.request(reqwest::Method::POST, "/shutdown", Some(Value::Object(Default::default())))
            .await
    }

    /// Forward a full command envelope and return the daemon's JSON body
    /// verbatim; transport failures become `{ok:false, error}` objects.
    pub async fn send_command(&self, cmd: &Command) -> Value {
        let body = match serde_json::to_value(cmd) {
            Ok(v) => v,
            Err(e) => {
                return serde_json::json!({
                    "ok": false,
                    "error": format!("command serialization failed: {e}"),
                })
            }
        };
        self.request(reqwest::Method::POST, "/command", Some(body))
            .await
    }

    async fn request(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Value {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        // Error bodies carry the useful detail, so the HTTP status code
        // itself is not treated as a failure here.
        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                return serde_json::json!({
                    "ok": false,
                    "error": format!("connection failed: {e}"),
                })
            }
        };
        match resp.json::<Value>().await {
            Ok(v) => v,
            Err(e) => serde_json::json!({
                "ok": false,
                "error": format!("invalid JSON response: {e}"),
            }),
        }
    }
}

#[async_trait::async_trait]
impl CommandPort for HttpBridgeClient {
    async fn issue(&self, action: Action, payload: Value, meta: CommandMeta) -> CommandOutcome {
        let cmd = Command::new(action, payload, meta);
        let body = self.send_command(&cmd).await;
        match serde_json::from_value::<CommandOutcome>(body.clone()) {
            Ok(outcome) => outcome,
            Err(_) => CommandOutcome::failure(format!("unrecognized daemon response: {body}")),
        }
    }
}

/// Token resolution mirrors the daemon: `AEB_TOKEN` wins, then the
/// token file the daemon persisted at startup.
fn load_token() -> Option<String> {
    if let Ok(token) = std::env::var("AEB_TOKEN") {
        if !token.is_empty() {
            return Some(token);
        }
    }
    let path = std::env::var("AEB_TOKEN_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".aeb-token"));
    std::fs::read_to_string(path)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
