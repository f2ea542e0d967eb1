//! Canonical comparison keys.
//!
//! Coordinates arriving from the peer and from compiled operations may
//! differ in representation (`5` vs `5.0`) and wires may be reported in
//! either direction. Keys normalize both so semantically equal entities
//! compare equal.

use serde::{Deserialize, Serialize};

/// Normalize one numeric value: integral floats collapse to integers,
/// non-integral values keep their shortest float form.
pub fn canon_num(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 {
        // -0.0 normalizes to 0 here as well.
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Identity key for a placed component.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey {
    pub designator: String,
    pub library_id: String,
    pub x: String,
    pub y: String,
}

impl ComponentKey {
    pub fn new(designator: &str, library_id: &str, x: f64, y: f64) -> Self {
        Self {
            designator: designator.to_string(),
            library_id: library_id.to_string(),
            x: canon_num(x),
            y: canon_num(y),
        }
    }
}

/// Direction- and representation-independent key for a wire.
///
/// The point sequence is reduced to the lexicographically smaller of its
/// forward and reverse orderings, paired with the net label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WireKey {
    pub points: Vec<(String, String)>,
    pub net: String,
}

/// Build the canonical key for a flat `[x0, y0, x1, y1, …]` sequence.
/// A trailing unpaired value is dropped.
pub fn canonical_wire_key(points: &[f64], net: &str) -> WireKey {
    let forward: Vec<(String, String)> = points
        .chunks_exact(2)
        .map(|p| (canon_num(p[0]), canon_num(p[1])))
        .collect();
    let mut reverse = forward.clone();
    reverse.reverse();

    WireKey {
        points: forward.min(reverse),
        net: net.to_string(),
    }
}
