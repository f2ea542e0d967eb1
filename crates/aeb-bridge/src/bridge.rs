//! The correlation bridge: single peer slot + pending-request map.
//!
//! # Invariants
//!
//! - At most one attached peer at any instant; replacement fails every
//!   outstanding pending request with [`BridgeError::PeerDisconnected`].
//! - At most one pending request per command id.
//! - Every pending request resolves exactly once: correlated reply,
//!   disconnect, or timeout — whichever happens first. The resolving
//!   path always removes the entry from the map before resolving it.
//!
//! All connection-state mutation (attach/detach, pending-map edits) is
//! serialized through the single `tokio::sync::Mutex<BridgeInner>`; a
//! `send` can never register against a peer slot that is being torn down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, trace, warn};

use aeb_protocol::{ping_frame, Command, PeerMessage, EVENT_BRIDGE_CONNECTED};

/// Per-command reply deadline.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between liveness pings while a peer is attached.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// BridgeError
// ---------------------------------------------------------------------------

/// Failure modes surfaced to the gateway caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeError {
    /// No plugin peer is attached; reported before anything is registered.
    NoPeerAttached,
    /// Writing the frame to the peer connection failed.
    TransportFailure { detail: String },
    /// No correlated reply arrived within the deadline.
    Timeout { waited_ms: u128 },
    /// The pending request was invalidated by a peer disconnect or
    /// connection replacement.
    PeerDisconnected,
    /// A command with this id is already in flight.
    DuplicateCommandId { id: String },
}

impl BridgeError {
    /// Stable machine-readable kind, carried in outcome error objects.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::NoPeerAttached => "no_peer_attached",
            BridgeError::TransportFailure { .. } => "transport_failure",
            BridgeError::Timeout { .. } => "timeout",
            BridgeError::PeerDisconnected => "peer_disconnected",
            BridgeError::DuplicateCommandId { .. } => "duplicate_command_id",
        }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::NoPeerAttached => write!(f, "plugin not connected"),
            BridgeError::TransportFailure { detail } => {
                write!(f, "failed to send to plugin: {detail}")
            }
            BridgeError::Timeout { waited_ms } => {
                write!(f, "command timed out after {waited_ms}ms waiting for plugin reply")
            }
            BridgeError::PeerDisconnected => write!(f, "plugin disconnected"),
            BridgeError::DuplicateCommandId { id } => {
                write!(f, "command id '{id}' is already in flight")
            }
        }
    }
}

impl std::error::Error for BridgeError {}

// ---------------------------------------------------------------------------
// Reply plumbing
// ---------------------------------------------------------------------------

/// Application-level reply extracted from a correlated `result` message.
#[derive(Clone, Debug)]
pub struct PeerReply {
    pub ok: bool,
    pub result: Option<Value>,
    pub error: Option<Value>,
}

type Resolution = Result<PeerReply, BridgeError>;

/// Handle for one in-flight command, resolved exactly once.
#[derive(Debug)]
pub struct PendingReply {
    id: String,
    rx: oneshot::Receiver<Resolution>,
}

impl PendingReply {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// What the transport task receives from [`Bridge::attach_peer`]: the
/// connection epoch (for a race-free detach) and the outbound frame
/// stream to pump into the socket. Dropping the receiver (or the bridge
/// dropping its sender on replacement) ends the connection.
pub struct PeerAttachment {
    pub epoch: u64,
    pub outbound: mpsc::UnboundedReceiver<String>,
}

/// Point-in-time connection state, surfaced by the daemon status route.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub peer_connected: bool,
    pub peer_meta: Option<Value>,
    pub pending_commands: usize,
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

struct PeerSlot {
    epoch: u64,
    outbound: mpsc::UnboundedSender<String>,
}

struct BridgeInner {
    peer: Option<PeerSlot>,
    peer_meta: Option<Value>,
    pending: HashMap<String, oneshot::Sender<Resolution>>,
    next_epoch: u64,
}

impl BridgeInner {
    /// Resolve every pending request with `err` and clear the map.
    fn fail_all_pending(&mut self, err: BridgeError) {
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(err.clone()));
        }
    }
}

/// Owns the single peer connection slot and all in-flight bookkeeping.
pub struct Bridge {
    inner: Mutex<BridgeInner>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BridgeInner {
                peer: None,
                peer_meta: None,
                pending: HashMap::new(),
                next_epoch: 0,
            }),
        }
    }

    /// Attach a new peer connection, replacing any existing one.
    ///
    /// Replacement closes the old outbound channel (which ends the old
    /// socket task), fails every outstanding pending request with
    /// [`BridgeError::PeerDisconnected`], and clears peer metadata —
    /// atomically with respect to concurrent `send` calls.
    pub async fn attach_peer(&self) -> PeerAttachment {
        let mut inner = self.inner.lock().await;

        if inner.peer.is_some() {
            warn!("a plugin is already connected — replacing old connection");
        }
        inner.peer = None;
        inner.peer_meta = None;
        inner.fail_all_pending(BridgeError::PeerDisconnected);

        let (tx, rx) = mpsc::unbounded_channel();
        inner.next_epoch += 1;
        let epoch = inner.next_epoch;
        inner.peer = Some(PeerSlot {
            epoch,
            outbound: tx,
        });
        info!(epoch, "plugin connected");

        PeerAttachment {
            epoch,
            outbound: rx,
        }
    }

    /// Detach the peer attached at `epoch`.
    ///
    /// A stale socket task finishing after its connection was replaced
    /// carries an old epoch and must not tear down the new peer.
    pub async fn detach_peer(&self, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if inner.peer.as_ref().map(|p| p.epoch) != Some(epoch) {
            return;
        }
        inner.peer = None;
        inner.peer_meta = None;
        inner.fail_all_pending(BridgeError::PeerDisconnected);
        info!(epoch, "plugin disconnected");
    }

    /// Register a pending request and transmit the command frame.
    ///
    /// The pending entry is registered *before* transmission; if the
    /// write fails the entry is removed and the error surfaces as a
    /// transport failure, never as a timeout.
    pub async fn send(&self, cmd: &Command) -> Result<PendingReply, BridgeError> {
        let frame = serde_json::to_string(cmd).map_err(|e| BridgeError::TransportFailure {
            detail: format!("serialize command: {e}"),
        })?;

        let mut inner = self.inner.lock().await;
        let Some(peer) = inner.peer.as_ref() else {
            return Err(BridgeError::NoPeerAttached);
        };
        if inner.pending.contains_key(&cmd.id) {
            return Err(BridgeError::DuplicateCommandId {
                id: cmd.id.clone(),
            });
        }

        let outbound = peer.outbound.clone();
        let (tx, rx) = oneshot::channel();
        inner.pending.insert(cmd.id.clone(), tx);

        if outbound.send(frame).is_err() {
            inner.pending.remove(&cmd.id);
            return Err(BridgeError::TransportFailure {
                detail: "peer connection closed".to_string(),
            });
        }

        trace!(id = %cmd.id, action = %cmd.action, "command forwarded to plugin");
        Ok(PendingReply {
            id: cmd.id.clone(),
            rx,
        })
    }

    /// Race the pending slot against the deadline.
    ///
    /// On timeout the pending entry is removed, so a late reply is
    /// silently dropped rather than delivered to a stale caller.
    pub async fn await_reply(
        &self,
        pending: PendingReply,
        timeout: Duration,
    ) -> Result<PeerReply, BridgeError> {
        match tokio::time::timeout(timeout, pending.rx).await {
            Ok(Ok(resolution)) => resolution,
            // Sender dropped without resolving: the bridge only drops
            // senders when tearing down a peer slot.
            Ok(Err(_)) => Err(BridgeError::PeerDisconnected),
            Err(_) => {
                let mut inner = self.inner.lock().await;
                inner.pending.remove(&pending.id);
                Err(BridgeError::Timeout {
                    waited_ms: timeout.as_millis(),
                })
            }
        }
    }

    /// Dispatch one raw frame received from the peer.
    ///
    /// Unmatched or duplicate result ids and non-JSON frames are logged
    /// and dropped; they are never treated as errors.
    pub async fn on_peer_message(&self, raw: &str) {
        let msg: PeerMessage = match serde_json::from_str(raw) {
            Ok(m) => m,
            Err(_) => {
                let preview: String = raw.chars().take(200).collect();
                warn!("unparseable message from plugin: {preview}");
                return;
            }
        };

        match msg {
            PeerMessage::Pong { .. } => {
                trace!("pong from plugin");
            }
            PeerMessage::Ping { id, .. } => {
                // Answer peer-initiated pings best-effort.
                let pong = PeerMessage::Pong {
                    id: Some(id),
                    timestamp: Some(chrono::Utc::now().timestamp_millis() as f64 / 1000.0),
                };
                if let Ok(frame) = serde_json::to_string(&pong) {
                    let inner = self.inner.lock().await;
                    if let Some(peer) = inner.peer.as_ref() {
                        let _ = peer.outbound.send(frame);
                    }
                }
            }
            PeerMessage::Event { event, payload } => {
                if event == EVENT_BRIDGE_CONNECTED {
                    info!(meta = %payload, "plugin identified");
                    let mut inner = self.inner.lock().await;
                    inner.peer_meta = Some(payload);
                } else {
                    debug!(event, "unhandled plugin event");
                }
            }
            PeerMessage::Result {
                id,
                ok,
                result,
                error,
            } => {
                let mut inner = self.inner.lock().await;
                match inner.pending.remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(Ok(PeerReply { ok, result, error }));
                    }
                    None => {
                        debug!(id, "unmatched or late result from plugin — dropped");
                    }
                }
            }
        }
    }

    /// Best-effort raw frame to the attached peer (heartbeat path).
    /// Returns false when no peer is attached or the channel is closed.
    pub async fn send_raw(&self, frame: String) -> bool {
        let inner = self.inner.lock().await;
        match inner.peer.as_ref() {
            Some(peer) => peer.outbound.send(frame).is_ok(),
            None => false,
        }
    }

    pub async fn status(&self) -> BridgeStatus {
        let inner = self.inner.lock().await;
        BridgeStatus {
            peer_connected: inner.peer.is_some(),
            peer_meta: inner.peer_meta.clone(),
            pending_commands: inner.pending.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

/// Spawn the liveness task: a ping every `interval` while a peer is
/// attached. Never blocks on a reply; send failures are ignored — the
/// next command attempt surfaces any real connectivity loss.
pub fn spawn_heartbeat(bridge: Arc<Bridge>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // the first tick fires immediately
        loop {
            ticker.tick().await;
            if !bridge.send_raw(ping_frame()).await {
                trace!("heartbeat skipped: no plugin attached");
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
