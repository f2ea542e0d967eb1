//! Reconciliation verifier: did the peer actually realize the edits it
//! accepted?
//!
//! Builds expected entity sets from the applied operations, actual sets
//! from a fresh peer-reported snapshot, and checks asymmetric
//! containment: every expected entity must be present; unrelated extras
//! in the snapshot are never failures.

pub mod engine;
pub mod key;
pub mod types;

pub use engine::verify;
pub use key::{canon_num, canonical_wire_key, ComponentKey, WireKey};
pub use types::{VerificationReport, VerifySets};
