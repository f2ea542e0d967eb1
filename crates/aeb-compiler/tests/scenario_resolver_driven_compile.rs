//! Resolver-driven compilation: symbolic keywords resolve to concrete
//! library identities, pin stubs and net connections synthesize wire
//! operations anchored at the component position.

use aeb_compiler::{
    compile, CompileOptions, ComponentReq, ComponentResolver, NetReq, RequirementSpec,
    ResolveError, ResolvedCandidate, StubConn, StubDirection,
};
use aeb_protocol::ops::Operation;

struct StubResolver(Vec<ResolvedCandidate>);

#[async_trait::async_trait]
impl ComponentResolver for StubResolver {
    async fn resolve(&self, _keyword: &str) -> Result<Vec<ResolvedCandidate>, ResolveError> {
        Ok(self.0.clone())
    }
}

fn candidate(library_id: &str) -> ResolvedCandidate {
    ResolvedCandidate {
        library_id: library_id.to_string(),
        description: None,
    }
}

fn spec_one_component_one_net() -> RequirementSpec {
    RequirementSpec {
        components: vec![ComponentReq {
            designator: "U1".to_string(),
            keyword: Some("opamp".to_string()),
            library_id: None,
            x: 100.0,
            y: 200.0,
            rotation: 0.0,
            mirror: false,
            pins: vec![],
        }],
        nets: vec![NetReq {
            name: "VCC".to_string(),
            connections: vec![StubConn {
                component: "U1".to_string(),
                dx: 5.0,
                dy: 0.0,
                direction: StubDirection::Right,
                length: None,
            }],
        }],
        wires: vec![],
    }
}

#[tokio::test]
async fn one_component_one_net_yields_one_place_and_one_wire() {
    let resolver = StubResolver(vec![candidate("LIB-I")]);
    let out = compile(
        &spec_one_component_one_net(),
        Some(&resolver),
        &CompileOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(out.operations.len(), 2);
    assert_eq!(out.summary.components, 1);
    assert_eq!(out.summary.nets, 1);
    assert_eq!(out.summary.wires, 1);

    let Operation::CreateComponent(c) = &out.operations[0] else {
        panic!("first operation must place the component");
    };
    assert_eq!(c.designator, "U1");
    assert_eq!(c.library_id, "LIB-I");
    assert_eq!((c.x, c.y), (100.0, 200.0));

    // Stub: anchor = position + offset, extended default length (10)
    // rightward.
    let Operation::CreateWire(w) = &out.operations[1] else {
        panic!("second operation must draw the stub wire");
    };
    assert_eq!(w.net, "VCC");
    assert_eq!(w.points, vec![105.0, 200.0, 115.0, 200.0]);

    assert_eq!(out.resolved_components["opamp"], "LIB-I");
}

#[tokio::test]
async fn candidate_index_selects_lower_ranked_hit() {
    let resolver = StubResolver(vec![candidate("LIB-0"), candidate("LIB-1")]);
    let out = compile(
        &spec_one_component_one_net(),
        Some(&resolver),
        &CompileOptions {
            candidate_index: 1,
            ..CompileOptions::default()
        },
    )
    .await
    .unwrap();

    let Operation::CreateComponent(c) = &out.operations[0] else {
        panic!("expected component operation");
    };
    assert_eq!(c.library_id, "LIB-1");
}

#[tokio::test]
async fn candidate_index_out_of_range_fails() {
    let resolver = StubResolver(vec![candidate("LIB-0")]);
    let err = compile(
        &spec_one_component_one_net(),
        Some(&resolver),
        &CompileOptions {
            candidate_index: 3,
            ..CompileOptions::default()
        },
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("candidate index 3 out of range"));
}

#[tokio::test]
async fn concrete_library_id_skips_the_resolver() {
    let mut spec = spec_one_component_one_net();
    spec.components[0].keyword = None;
    spec.components[0].library_id = Some("LIB-FIXED".to_string());

    let out = compile(&spec, None, &CompileOptions::default()).await.unwrap();
    let Operation::CreateComponent(c) = &out.operations[0] else {
        panic!("expected component operation");
    };
    assert_eq!(c.library_id, "LIB-FIXED");
    assert!(out.resolved_components.is_empty());
}

#[tokio::test]
async fn components_always_precede_wires() {
    let mut spec = spec_one_component_one_net();
    spec.components.push(ComponentReq {
        designator: "U2".to_string(),
        keyword: Some("resistor".to_string()),
        library_id: None,
        x: 0.0,
        y: 0.0,
        rotation: 0.0,
        mirror: false,
        pins: vec![],
    });

    let resolver = StubResolver(vec![candidate("LIB-X")]);
    let out = compile(&spec, Some(&resolver), &CompileOptions::default())
        .await
        .unwrap();

    let first_wire = out
        .operations
        .iter()
        .position(|op| matches!(op, Operation::CreateWire(_)))
        .unwrap();
    assert!(out.operations[..first_wire]
        .iter()
        .all(|op| matches!(op, Operation::CreateComponent(_))));
}
