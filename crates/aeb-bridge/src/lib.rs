//! Correlation bridge and gateway front.
//!
//! One physical peer connection carries many concurrently in-flight
//! commands; this crate owns the single peer slot, the pending-request
//! map, reply correlation by id, the heartbeat loop, and the synchronous
//! `issue → outcome` contract callers see.

pub mod bridge;
pub mod gateway;

pub use bridge::{
    spawn_heartbeat, Bridge, BridgeError, BridgeStatus, PeerAttachment, PeerReply, PendingReply,
    DEFAULT_COMMAND_TIMEOUT, HEARTBEAT_INTERVAL,
};
pub use gateway::{Gateway, GatewayStatus};
