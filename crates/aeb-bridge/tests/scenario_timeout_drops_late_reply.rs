//! A command with no reply inside the deadline fails with a timeout,
//! and a reply arriving after the deadline has no observable effect.
//!
//! Uses the paused tokio clock, so the 30-unit deadline elapses without
//! real waiting.

use std::sync::Arc;
use std::time::Duration;

use aeb_bridge::{Bridge, Gateway};
use aeb_protocol::{Action, Command, CommandMeta, CommandPort};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn timeout_removes_pending_and_late_reply_is_ignored() {
    let bridge = Arc::new(Bridge::new());
    let _attachment = bridge.attach_peer().await;

    let cmd = Command::new(Action::ReadSchema, json!({}), CommandMeta::default());
    let pending = bridge.send(&cmd).await.unwrap();

    let err = bridge
        .await_reply(pending, Duration::from_secs(30))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "timeout");
    assert_eq!(bridge.status().await.pending_commands, 0);

    // The late reply must be dropped, not delivered to a stale caller.
    bridge
        .on_peer_message(&format!(
            r#"{{"type":"result","id":"{}","ok":true,"result":{{"late":true}}}}"#,
            cmd.id
        ))
        .await;
    assert_eq!(bridge.status().await.pending_commands, 0);
}

#[tokio::test(start_paused = true)]
async fn gateway_outcome_distinguishes_timeout_from_disconnect() {
    let bridge = Arc::new(Bridge::new());
    let gateway = Gateway::with_timeout(Arc::clone(&bridge), Duration::from_secs(30));
    let _attachment = bridge.attach_peer().await;

    let outcome = gateway
        .issue(Action::CheckAuth, json!({}), CommandMeta::default())
        .await;
    assert!(!outcome.ok);
    assert_eq!(outcome.error.as_ref().unwrap()["kind"], "timeout");
}
