//! Containment verification engine.

use serde_json::Value;

use aeb_protocol::ops::Operation;

use crate::key::{canonical_wire_key, ComponentKey, WireKey};
use crate::types::{VerificationReport, VerifySets};

/// Diff the intent expressed by `operations` against the peer-reported
/// `snapshot` (the `result` of a `read_schema` command).
///
/// `ok` requires every expected component tuple, every expected wire
/// key, and every net referenced by an expected wire to be present in
/// the actual sets. Extra snapshot entries are deliberately ignored:
/// this is a containment check of intent, not whole-schema equality, so
/// re-applying over an already-populated sheet stays idempotent.
pub fn verify(operations: &[Operation], snapshot: &Value) -> VerificationReport {
    let expected = expected_sets(operations);

    let Some(schema) = snapshot.get("schema").filter(|s| s.is_object()) else {
        return VerificationReport::malformed(
            expected,
            "snapshot has no schema object".to_string(),
        );
    };
    let actual = actual_sets(schema);

    let missing_components: Vec<ComponentKey> = expected
        .components
        .iter()
        .filter(|c| !actual.components.contains(*c))
        .cloned()
        .collect();
    let missing_wires: Vec<WireKey> = expected
        .wires
        .iter()
        .filter(|w| !actual.wires.contains(*w))
        .cloned()
        .collect();
    let missing_nets: Vec<String> = expected
        .nets
        .iter()
        .filter(|n| !actual.nets.contains(*n))
        .cloned()
        .collect();

    let ok = missing_components.is_empty() && missing_wires.is_empty() && missing_nets.is_empty();

    VerificationReport {
        ok,
        expected,
        actual,
        missing_components,
        missing_wires,
        missing_nets,
        malformed_snapshot: None,
    }
}

fn expected_sets(operations: &[Operation]) -> VerifySets {
    let mut sets = VerifySets::default();
    for op in operations {
        match op {
            Operation::CreateComponent(c) => {
                sets.components
                    .insert(ComponentKey::new(&c.designator, &c.library_id, c.x, c.y));
            }
            Operation::CreateWire(w) => {
                sets.wires.insert(canonical_wire_key(&w.points, &w.net));
                sets.nets.insert(w.net.clone());
            }
        }
    }
    sets
}

fn actual_sets(schema: &Value) -> VerifySets {
    let mut sets = VerifySets::default();

    if let Some(components) = schema.get("components").and_then(Value::as_array) {
        for c in components {
            let (Some(designator), Some(library_id)) = (
                c.get("designator").and_then(Value::as_str),
                c.get("library_id").and_then(Value::as_str),
            ) else {
                continue; // unusable entry can never satisfy an expectation
            };
            let x = c.get("x").and_then(Value::as_f64).unwrap_or(0.0);
            let y = c.get("y").and_then(Value::as_f64).unwrap_or(0.0);
            sets.components
                .insert(ComponentKey::new(designator, library_id, x, y));
        }
    }

    if let Some(wires) = schema.get("wires").and_then(Value::as_array) {
        for w in wires {
            let Some(net) = w.get("net").and_then(Value::as_str) else {
                continue;
            };
            let points: Vec<f64> = w
                .get("points")
                .and_then(Value::as_array)
                .map(|pts| pts.iter().filter_map(Value::as_f64).collect())
                .unwrap_or_default();
            sets.wires.insert(canonical_wire_key(&points, net));
            sets.nets.insert(net.to_string());
        }
    }

    sets
}
