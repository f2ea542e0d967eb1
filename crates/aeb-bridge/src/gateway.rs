//! Gateway front: the synchronous request/result contract callers see.
//!
//! `issue` suspends until the correlation bridge resolves the matching
//! pending request or the deadline elapses, and always returns the
//! uniform [`CommandOutcome`] shape — no failure mode escapes as a panic
//! or bare error.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;

use aeb_protocol::{Action, Command, CommandMeta, CommandOutcome, CommandPort};

use crate::bridge::{Bridge, BridgeError, DEFAULT_COMMAND_TIMEOUT};

/// Status payload for the daemon's `/status` route.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayStatus {
    pub peer_connected: bool,
    pub peer_meta: Option<Value>,
    pub pending_commands: usize,
}

/// Caller-facing front over the correlation bridge.
pub struct Gateway {
    bridge: Arc<Bridge>,
    command_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl Gateway {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self::with_timeout(bridge, DEFAULT_COMMAND_TIMEOUT)
    }

    pub fn with_timeout(bridge: Arc<Bridge>, command_timeout: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            bridge,
            command_timeout,
            shutdown_tx,
        }
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Forward a pre-built command envelope and await its outcome.
    ///
    /// No-peer-attached is reported immediately; nothing is registered.
    pub async fn dispatch(&self, cmd: Command) -> CommandOutcome {
        let pending = match self.bridge.send(&cmd).await {
            Ok(p) => p,
            Err(e) => return outcome_from_error(&e),
        };
        match self.bridge.await_reply(pending, self.command_timeout).await {
            Ok(reply) => CommandOutcome {
                ok: reply.ok,
                result: reply.result,
                error: reply.error,
            },
            Err(e) => outcome_from_error(&e),
        }
    }

    pub async fn status(&self) -> GatewayStatus {
        let s = self.bridge.status().await;
        GatewayStatus {
            peer_connected: s.peer_connected,
            peer_meta: s.peer_meta,
            pending_commands: s.pending_commands,
        }
    }

    /// Observer side of the shutdown signal (used for graceful serve).
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[async_trait::async_trait]
impl CommandPort for Gateway {
    async fn issue(&self, action: Action, payload: Value, meta: CommandMeta) -> CommandOutcome {
        self.dispatch(Command::new(action, payload, meta)).await
    }
}

/// Map a bridge error into the uniform outcome shape, keeping the kind
/// machine-readable so timeout and disconnect stay distinguishable.
fn outcome_from_error(err: &BridgeError) -> CommandOutcome {
    CommandOutcome::failure_value(json!({
        "kind": err.kind(),
        "message": err.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issue_without_peer_reports_immediately() {
        let gateway = Gateway::new(Arc::new(Bridge::new()));
        let outcome = gateway
            .issue(Action::ReadSchema, json!({}), CommandMeta::default())
            .await;
        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_ref().unwrap()["kind"], "no_peer_attached");
        // Nothing may be registered against an absent peer slot.
        assert_eq!(gateway.status().await.pending_commands, 0);
    }

    #[tokio::test]
    async fn shutdown_signal_observes_request() {
        let gateway = Gateway::new(Arc::new(Bridge::new()));
        let mut rx = gateway.shutdown_signal();
        assert!(!*rx.borrow());
        gateway.request_shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
