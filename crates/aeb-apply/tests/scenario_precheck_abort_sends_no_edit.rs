//! Precheck gate: a plan needing unsupported operation kinds aborts
//! before any edit command leaves the flow, and the attempt still gets
//! an audit record naming the abort point.

use std::sync::Mutex;

use serde_json::{json, Value};

use aeb_apply::{run_apply, ApplyError, ApplyOptions, ApplyState};
use aeb_audit::{verify_record_file, AuditStore, RecordCheck};
use aeb_protocol::ops::{CreateComponent, CreateWire, Operation};
use aeb_protocol::{Action, CommandMeta, CommandOutcome, CommandPort};

/// Scripted peer: answers `get_runtime_status` with a fixed capability
/// list, records every action it sees.
struct ScriptedPort {
    capabilities: Vec<&'static str>,
    seen: Mutex<Vec<Action>>,
}

impl ScriptedPort {
    fn new(capabilities: Vec<&'static str>) -> Self {
        Self {
            capabilities,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn actions(&self) -> Vec<Action> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CommandPort for ScriptedPort {
    async fn issue(&self, action: Action, _payload: Value, _meta: CommandMeta) -> CommandOutcome {
        self.seen.lock().unwrap().push(action);
        match action {
            Action::GetRuntimeStatus => {
                CommandOutcome::success(Some(json!({ "capabilities": self.capabilities })))
            }
            _ => CommandOutcome::success(Some(json!({}))),
        }
    }
}

fn plan() -> Vec<Operation> {
    vec![
        Operation::CreateComponent(CreateComponent {
            designator: "U1".to_string(),
            library_id: "LIB-A".to_string(),
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            mirror: false,
        }),
        Operation::CreateWire(CreateWire {
            points: vec![0.0, 0.0, 10.0, 0.0],
            net: "VCC".to_string(),
        }),
    ]
}

#[tokio::test]
async fn missing_capability_aborts_without_submitting() {
    let port = ScriptedPort::new(vec!["create_component"]);
    let options = ApplyOptions {
        confirm: true,
        ..ApplyOptions::default()
    };

    let report = run_apply(&port, &plan(), &options, None).await.unwrap();

    assert_eq!(report.state, ApplyState::Aborted);
    assert_eq!(report.mode, "precheck");
    assert_eq!(
        report.error,
        Some(ApplyError::CapabilityMissing {
            missing: vec!["create_wire".to_string()],
        })
    );

    // Only the status query ever reached the peer.
    assert_eq!(port.actions(), vec![Action::GetRuntimeStatus]);
}

#[tokio::test]
async fn aborted_attempt_writes_audit_record_with_abort_mode() {
    let dir = tempfile::tempdir().unwrap();
    let store = AuditStore::new(dir.path()).unwrap();

    let port = ScriptedPort::new(vec![]);
    let report = run_apply(&port, &plan(), &ApplyOptions::default(), Some(&store))
        .await
        .unwrap();

    let path = report.audit_path.expect("audit record path");
    let RecordCheck::Valid { record } = verify_record_file(&path).unwrap() else {
        panic!("audit record failed self-hash check");
    };
    assert_eq!(record.mode, "precheck");
    assert!(!record.ok);
    assert_eq!(record.stages.len(), 1);
    assert_eq!(record.stages[0].stage, "precheck");
}

#[tokio::test]
async fn real_apply_without_confirm_aborts_before_submission() {
    let port = ScriptedPort::new(vec!["create_component", "create_wire"]);

    let report = run_apply(&port, &plan(), &ApplyOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(report.error, Some(ApplyError::ConfirmationRequired));
    assert_eq!(report.mode, "apply");
    assert_eq!(port.actions(), vec![Action::GetRuntimeStatus]);
}
