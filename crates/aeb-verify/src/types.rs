use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::key::{ComponentKey, WireKey};

/// One side of the comparison (expected intent or actual snapshot),
/// rendered with stable ordering for deterministic reports.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifySets {
    pub components: BTreeSet<ComponentKey>,
    pub wires: BTreeSet<WireKey>,
    pub nets: BTreeSet<String>,
}

/// Outcome of one verification pass. Derived, never stored: recomputed
/// from a fresh snapshot on every call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub ok: bool,
    pub expected: VerifySets,
    pub actual: VerifySets,
    pub missing_components: Vec<ComponentKey>,
    pub missing_wires: Vec<WireKey>,
    pub missing_nets: Vec<String>,
    /// Set when the snapshot carried no usable schema object. A failure
    /// kind of its own, distinct from a containment mismatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malformed_snapshot: Option<String>,
}

impl VerificationReport {
    pub fn malformed(expected: VerifySets, reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            expected,
            actual: VerifySets::default(),
            missing_components: Vec::new(),
            missing_wires: Vec::new(),
            missing_nets: Vec::new(),
            malformed_snapshot: Some(reason.into()),
        }
    }

    /// True only when the failure is a containment mismatch (not a
    /// malformed snapshot).
    pub fn is_mismatch(&self) -> bool {
        !self.ok && self.malformed_snapshot.is_none()
    }
}
