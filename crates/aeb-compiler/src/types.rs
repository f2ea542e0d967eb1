//! Requirement spec input and compiler output/error types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use aeb_protocol::ops::Operation;

// ---------------------------------------------------------------------------
// Requirement spec (read-only input)
// ---------------------------------------------------------------------------

/// Declarative description of desired components, nets, and wires.
/// Never mutated by the compiler.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementSpec {
    #[serde(default)]
    pub components: Vec<ComponentReq>,
    #[serde(default)]
    pub nets: Vec<NetReq>,
    #[serde(default)]
    pub wires: Vec<WireReq>,
}

/// One component entry: symbolic keyword and/or concrete library
/// identity, placement, and optional pin stubs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentReq {
    pub designator: String,
    /// Symbolic search keyword, resolved against the peer's component
    /// library when a resolver is supplied.
    #[serde(default)]
    pub keyword: Option<String>,
    /// Concrete library identity; required when no resolver is supplied.
    #[serde(default)]
    pub library_id: Option<String>,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub mirror: bool,
    #[serde(default)]
    pub pins: Vec<PinStub>,
}

/// Stub line drawn from a component pin: offset from the component
/// position, a direction, and an optional length override.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinStub {
    pub net: String,
    #[serde(default)]
    pub dx: f64,
    #[serde(default)]
    pub dy: f64,
    pub direction: StubDirection,
    #[serde(default)]
    pub length: Option<f64>,
}

/// Canvas coordinates grow rightward and downward, so `Up` is -y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StubDirection {
    Up,
    Down,
    Left,
    Right,
}

impl StubDirection {
    pub fn unit(&self) -> (f64, f64) {
        match self {
            StubDirection::Up => (0.0, -1.0),
            StubDirection::Down => (0.0, 1.0),
            StubDirection::Left => (-1.0, 0.0),
            StubDirection::Right => (1.0, 0.0),
        }
    }
}

/// Named net connecting stub descriptors on placed components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetReq {
    pub name: String,
    #[serde(default)]
    pub connections: Vec<StubConn>,
}

/// One directional stub of a net, anchored on a component designator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StubConn {
    /// Designator of a component declared in the same spec.
    pub component: String,
    #[serde(default)]
    pub dx: f64,
    #[serde(default)]
    pub dy: f64,
    pub direction: StubDirection,
    #[serde(default)]
    pub length: Option<f64>,
}

/// Explicit wire with literal coordinates; passes through unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireReq {
    pub net: String,
    pub points: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Compiler output
// ---------------------------------------------------------------------------

/// Entity counts for observability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileSummary {
    pub components: usize,
    pub nets: usize,
    pub wires: usize,
}

/// Result of a successful compilation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompileOutput {
    pub operations: Vec<Operation>,
    pub summary: CompileSummary,
    /// keyword → concrete library identity actually chosen, recorded for
    /// the audit trail.
    pub resolved_components: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// CompileError
// ---------------------------------------------------------------------------

/// Compilation fails atomically: the first unresolvable or malformed
/// entry aborts the whole call and no partial operation list escapes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileError {
    /// Entry carries neither a concrete library identity nor a keyword a
    /// resolver could look up.
    UnresolvedComponent {
        designator: String,
        keyword: Option<String>,
    },
    /// The resolver call itself failed for this keyword.
    ResolveFailed { keyword: String, detail: String },
    /// The resolver returned no candidate at the requested rank.
    NoCandidate {
        keyword: String,
        index: usize,
        available: usize,
    },
    /// A net connection references a designator not declared in the
    /// requirement spec.
    UnknownComponentRef { net: String, component: String },
    /// Structurally invalid entry (e.g. wire with an odd or too-short
    /// point sequence).
    MalformedEntry { context: String, detail: String },
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::UnresolvedComponent {
                designator,
                keyword,
            } => match keyword {
                Some(k) => write!(
                    f,
                    "component '{designator}' (keyword '{k}') has no concrete library_id and no resolver was supplied"
                ),
                None => write!(
                    f,
                    "component '{designator}' has neither a library_id nor a keyword to resolve"
                ),
            },
            CompileError::ResolveFailed { keyword, detail } => {
                write!(f, "resolving keyword '{keyword}' failed: {detail}")
            }
            CompileError::NoCandidate {
                keyword,
                index,
                available,
            } => write!(
                f,
                "keyword '{keyword}': candidate index {index} out of range ({available} available)"
            ),
            CompileError::UnknownComponentRef { net, component } => write!(
                f,
                "net '{net}' references component '{component}' which is not declared in the requirement spec"
            ),
            CompileError::MalformedEntry { context, detail } => {
                write!(f, "malformed entry ({context}): {detail}")
            }
        }
    }
}

impl std::error::Error for CompileError {}
