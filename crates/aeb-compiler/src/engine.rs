//! Compilation engine: spec → ordered operation list.

use std::collections::BTreeMap;

use tracing::debug;

use aeb_protocol::ops::{CreateComponent, CreateWire, Operation};

use crate::resolver::ComponentResolver;
use crate::types::{
    CompileError, CompileOutput, CompileSummary, RequirementSpec, StubDirection,
};

/// Knobs for one compile call.
#[derive(Clone, Copy, Debug)]
pub struct CompileOptions {
    /// Rank of the search candidate to pick (0 = best match).
    pub candidate_index: usize,
    /// Stub line length when a pin stub or net connection does not
    /// override it.
    pub default_stub_length: f64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            candidate_index: 0,
            default_stub_length: 10.0,
        }
    }
}

/// Compile a requirement spec into primitive edit operations.
///
/// All `create_component` operations precede all `create_wire`
/// operations, so components referenced by a wire's net are always
/// placed earlier in the same batch.
///
/// Fails atomically: the first unresolvable or malformed entry aborts
/// the call and no partial operation list is ever returned.
pub async fn compile(
    spec: &RequirementSpec,
    resolver: Option<&dyn ComponentResolver>,
    options: &CompileOptions,
) -> Result<CompileOutput, CompileError> {
    let mut component_ops: Vec<Operation> = Vec::new();
    let mut wire_ops: Vec<Operation> = Vec::new();
    let mut resolved_components: BTreeMap<String, String> = BTreeMap::new();
    // designator → placement, for anchoring net connections
    let mut positions: BTreeMap<String, (f64, f64)> = BTreeMap::new();

    for comp in &spec.components {
        let library_id = match (&comp.library_id, &comp.keyword) {
            (Some(lib), _) => lib.clone(),
            (None, Some(keyword)) => {
                let Some(resolver) = resolver else {
                    return Err(CompileError::UnresolvedComponent {
                        designator: comp.designator.clone(),
                        keyword: Some(keyword.clone()),
                    });
                };
                let candidates =
                    resolver
                        .resolve(keyword)
                        .await
                        .map_err(|e| CompileError::ResolveFailed {
                            keyword: keyword.clone(),
                            detail: e.detail,
                        })?;
                let chosen = candidates.get(options.candidate_index).ok_or_else(|| {
                    CompileError::NoCandidate {
                        keyword: keyword.clone(),
                        index: options.candidate_index,
                        available: candidates.len(),
                    }
                })?;
                resolved_components.insert(keyword.clone(), chosen.library_id.clone());
                chosen.library_id.clone()
            }
            (None, None) => {
                return Err(CompileError::UnresolvedComponent {
                    designator: comp.designator.clone(),
                    keyword: None,
                })
            }
        };

        positions.insert(comp.designator.clone(), (comp.x, comp.y));
        component_ops.push(Operation::CreateComponent(CreateComponent {
            designator: comp.designator.clone(),
            library_id,
            x: comp.x,
            y: comp.y,
            rotation: comp.rotation,
            mirror: comp.mirror,
        }));

        for stub in &comp.pins {
            wire_ops.push(stub_wire(
                (comp.x, comp.y),
                stub.dx,
                stub.dy,
                stub.direction,
                stub.length.unwrap_or(options.default_stub_length),
                &stub.net,
            ));
        }
    }

    for net in &spec.nets {
        for conn in &net.connections {
            let &(cx, cy) = positions.get(&conn.component).ok_or_else(|| {
                CompileError::UnknownComponentRef {
                    net: net.name.clone(),
                    component: conn.component.clone(),
                }
            })?;
            wire_ops.push(stub_wire(
                (cx, cy),
                conn.dx,
                conn.dy,
                conn.direction,
                conn.length.unwrap_or(options.default_stub_length),
                &net.name,
            ));
        }
    }

    for (i, wire) in spec.wires.iter().enumerate() {
        if wire.points.len() < 4 || wire.points.len() % 2 != 0 {
            return Err(CompileError::MalformedEntry {
                context: format!("wires[{i}] net '{}'", wire.net),
                detail: format!(
                    "point sequence needs an even count of at least 4 values, got {}",
                    wire.points.len()
                ),
            });
        }
        // Literal coordinates pass through unchanged.
        wire_ops.push(Operation::CreateWire(CreateWire {
            points: wire.points.clone(),
            net: wire.net.clone(),
        }));
    }

    let summary = CompileSummary {
        components: component_ops.len(),
        nets: spec.nets.len(),
        wires: wire_ops.len(),
    };
    debug!(
        components = summary.components,
        nets = summary.nets,
        wires = summary.wires,
        "requirement spec compiled"
    );

    let mut operations = component_ops;
    operations.extend(wire_ops);

    Ok(CompileOutput {
        operations,
        summary,
        resolved_components,
    })
}

/// Synthesize the two-point stub line: anchored at the component
/// position plus the stub offset, extended `length` in `direction`.
fn stub_wire(
    origin: (f64, f64),
    dx: f64,
    dy: f64,
    direction: StubDirection,
    length: f64,
    net: &str,
) -> Operation {
    let ax = origin.0 + dx;
    let ay = origin.1 + dy;
    let (ux, uy) = direction.unit();
    Operation::CreateWire(CreateWire {
        points: vec![ax, ay, ax + ux * length, ay + uy * length],
        net: net.to_string(),
    })
}
