//! Primitive edit operations carried inside an `update_schema` payload.
//!
//! The requirement compiler produces these; the apply flow submits them
//! as `payload.operations` and the verifier diffs them against the
//! peer-reported schema snapshot.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One primitive edit instruction, serialized as `{kind, input}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "input", rename_all = "snake_case")]
pub enum Operation {
    CreateComponent(CreateComponent),
    CreateWire(CreateWire),
}

impl Operation {
    /// Wire-level kind name, matched against peer capabilities.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateComponent(_) => "create_component",
            Operation::CreateWire(_) => "create_wire",
        }
    }
}

/// Place one component at an absolute schematic position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateComponent {
    /// Symbolic identity on the sheet (e.g. `U1`, `R3`).
    pub designator: String,
    /// Concrete library identity resolved before compilation completes.
    pub library_id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub mirror: bool,
}

/// Draw one wire as a flat point sequence `[x0, y0, x1, y1, …]` labeled
/// with a net name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateWire {
    pub points: Vec<f64>,
    pub net: String,
}

/// Build the `update_schema` payload for an operation list.
pub fn operations_payload(operations: &[Operation]) -> Value {
    json!({ "operations": operations })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_serializes_as_kind_plus_input() {
        let op = Operation::CreateComponent(CreateComponent {
            designator: "U1".to_string(),
            library_id: "LIB1".to_string(),
            x: 10.0,
            y: 20.0,
            rotation: 90.0,
            mirror: false,
        });
        let v = serde_json::to_value(&op).unwrap();
        assert_eq!(v["kind"], "create_component");
        assert_eq!(v["input"]["designator"], "U1");
        assert_eq!(v["input"]["x"], 10.0);
    }

    #[test]
    fn payload_wraps_operations_list() {
        let ops = vec![Operation::CreateWire(CreateWire {
            points: vec![0.0, 0.0, 10.0, 0.0],
            net: "GND".to_string(),
        })];
        let payload = operations_payload(&ops);
        assert_eq!(payload["operations"][0]["kind"], "create_wire");
        assert_eq!(payload["operations"][0]["input"]["net"], "GND");
    }
}
