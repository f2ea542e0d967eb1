//! Apply flow state machine.
//!
//! PRECHECKING → (DRY_RUNNING) → APPLYING → (VERIFYING) → DONE, with
//! ABORTED reachable from every stage. Nothing is ever submitted as an
//! edit before the precheck passes, and a real apply additionally
//! requires explicit confirmation.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use serde_json::{json, Value};
use tracing::{info, warn};

use aeb_audit::{AuditRecord, AuditStore, StageRecord};
use aeb_protocol::ops::{operations_payload, Operation};
use aeb_protocol::{Action, CommandMeta, CommandPort};
use aeb_verify::{verify, VerificationReport};

// ---------------------------------------------------------------------------
// Options / report types
// ---------------------------------------------------------------------------

/// Caller-side knobs for one apply attempt.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApplyOptions {
    /// Required for a real apply; without it the flow aborts before any
    /// submission.
    pub confirm: bool,
    /// End-to-end rehearsal: the plan is submitted with `meta.dry_run`
    /// and the flow stops there. Confirmation is not required and the
    /// schema is left untouched, so verification is skipped.
    pub dry_run: bool,
    /// Run a dry-run submission first and only proceed to the real
    /// apply if the peer accepts it.
    pub preflight: bool,
    /// Forwarded to the peer on submission.
    pub continue_on_error: bool,
    /// Re-read the schema after a real apply and check containment.
    pub verify: bool,
}

/// Terminal state of the flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyState {
    Done,
    Aborted,
}

impl ApplyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyState::Done => "done",
            ApplyState::Aborted => "aborted",
        }
    }
}

/// What one attempt did and how it ended.
#[derive(Debug)]
pub struct ApplyReport {
    pub state: ApplyState,
    pub ok: bool,
    /// Stage the flow reached: `done`, or the stage it aborted in.
    pub mode: String,
    pub stages: Vec<StageRecord>,
    pub error: Option<ApplyError>,
    pub verification: Option<VerificationReport>,
    /// Where the audit record landed, when one was written.
    pub audit_path: Option<PathBuf>,
}

impl ApplyReport {
    /// JSON rendering for CLI output.
    pub fn to_json(&self) -> Value {
        json!({
            "state": self.state.as_str(),
            "ok": self.ok,
            "mode": self.mode,
            "stages": self.stages,
            "error": self.error.as_ref().map(|e| json!({
                "kind": e.kind(),
                "message": e.to_string(),
            })),
            "verification": self.verification,
            "audit_path": self.audit_path.as_ref().map(|p| p.display().to_string()),
        })
    }
}

/// Why an attempt ended short of a clean `done`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyError {
    /// The runtime status query itself failed.
    PrecheckFailed { detail: String },
    /// The plan needs operation kinds the peer does not advertise.
    CapabilityMissing { missing: Vec<String> },
    /// Real apply attempted without explicit confirmation.
    ConfirmationRequired,
    /// The peer rejected the dry-run submission.
    DryRunRejected { detail: String },
    /// The peer rejected the real submission.
    ApplyRejected { detail: String },
    /// Post-apply schema re-read failed.
    SnapshotFailed { detail: String },
    /// The re-read succeeded but carried no usable schema object, so
    /// containment could not be checked at all.
    MalformedSnapshot { report: VerificationReport },
    /// Apply reported success but the schema does not contain the plan.
    VerificationMismatch { report: VerificationReport },
}

impl ApplyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApplyError::PrecheckFailed { .. } => "precheck_failed",
            ApplyError::CapabilityMissing { .. } => "capability_missing",
            ApplyError::ConfirmationRequired => "confirmation_required",
            ApplyError::DryRunRejected { .. } => "dry_run_rejected",
            ApplyError::ApplyRejected { .. } => "apply_rejected",
            ApplyError::SnapshotFailed { .. } => "snapshot_failed",
            ApplyError::MalformedSnapshot { .. } => "malformed_snapshot",
            ApplyError::VerificationMismatch { .. } => "verification_mismatch",
        }
    }
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyError::PrecheckFailed { detail } => {
                write!(f, "runtime status precheck failed: {detail}")
            }
            ApplyError::CapabilityMissing { missing } => write!(
                f,
                "peer does not support required operation kinds: {}",
                missing.join(", ")
            ),
            ApplyError::ConfirmationRequired => {
                write!(f, "real apply requires explicit confirmation")
            }
            ApplyError::DryRunRejected { detail } => {
                write!(f, "dry-run submission rejected: {detail}")
            }
            ApplyError::ApplyRejected { detail } => write!(f, "apply rejected: {detail}"),
            ApplyError::SnapshotFailed { detail } => {
                write!(f, "post-apply schema read failed: {detail}")
            }
            ApplyError::MalformedSnapshot { report } => write!(
                f,
                "post-apply snapshot unusable: {}",
                report
                    .malformed_snapshot
                    .as_deref()
                    .unwrap_or("no schema object")
            ),
            ApplyError::VerificationMismatch { report } => write!(
                f,
                "applied schema is missing {} component(s), {} wire(s), {} net(s)",
                report.missing_components.len(),
                report.missing_wires.len(),
                report.missing_nets.len()
            ),
        }
    }
}

impl std::error::Error for ApplyError {}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// Runs one apply attempt over `port`.
///
/// Returns `Err` only when the audit record itself cannot be written;
/// every flow-level failure is reported inside [`ApplyReport`].
pub async fn run_apply(
    port: &dyn CommandPort,
    plan: &[Operation],
    options: &ApplyOptions,
    audit: Option<&AuditStore>,
) -> anyhow::Result<ApplyReport> {
    let mut stages: Vec<StageRecord> = Vec::new();

    let outcome = drive(port, plan, options, &mut stages).await;

    let (state, mode, error, verification) = match outcome {
        FlowOutcome::Done { verification } => {
            (ApplyState::Done, "done".to_string(), None, verification)
        }
        FlowOutcome::Aborted { stage, error } => {
            warn!(stage, error = %error, "apply attempt aborted");
            let verification = match &error {
                ApplyError::VerificationMismatch { report }
                | ApplyError::MalformedSnapshot { report } => Some(report.clone()),
                _ => None,
            };
            (ApplyState::Aborted, stage.to_string(), Some(error), verification)
        }
    };

    let ok = matches!(state, ApplyState::Done);
    let audit_path = match audit {
        Some(store) => {
            let mut record = AuditRecord::new(mode.clone(), ok, stages.clone());
            let path = store
                .write(&mut record)
                .context("write apply audit record")?;
            Some(path)
        }
        None => None,
    };

    info!(
        state = state.as_str(),
        mode = %mode,
        operations = plan.len(),
        "apply attempt finished"
    );

    Ok(ApplyReport {
        state,
        ok,
        mode,
        stages,
        error,
        verification,
        audit_path,
    })
}

enum FlowOutcome {
    Done {
        verification: Option<VerificationReport>,
    },
    Aborted {
        stage: &'static str,
        error: ApplyError,
    },
}

async fn drive(
    port: &dyn CommandPort,
    plan: &[Operation],
    options: &ApplyOptions,
    stages: &mut Vec<StageRecord>,
) -> FlowOutcome {
    // ---- PRECHECKING ----
    let required: BTreeSet<&'static str> = plan.iter().map(Operation::kind).collect();
    let status = port
        .issue(Action::GetRuntimeStatus, json!({}), CommandMeta::default())
        .await;
    if !status.ok {
        let detail = status.error_text();
        stages.push(StageRecord::new(
            "precheck",
            false,
            json!({"error": detail.clone()}),
        ));
        return FlowOutcome::Aborted {
            stage: "precheck",
            error: ApplyError::PrecheckFailed { detail },
        };
    }
    let capabilities: BTreeSet<String> = status
        .result
        .as_ref()
        .and_then(|r| r.get("capabilities"))
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let missing: Vec<String> = required
        .iter()
        .filter(|k| !capabilities.contains(**k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        stages.push(StageRecord::new(
            "precheck",
            false,
            json!({"capabilities": capabilities, "missing": missing.clone()}),
        ));
        return FlowOutcome::Aborted {
            stage: "precheck",
            error: ApplyError::CapabilityMissing { missing },
        };
    }
    stages.push(StageRecord::new(
        "precheck",
        true,
        json!({"capabilities": capabilities, "required": required}),
    ));

    // ---- DRY_RUNNING ----
    if options.dry_run || options.preflight {
        let meta = CommandMeta {
            confirm: false,
            dry_run: true,
            continue_on_error: options.continue_on_error,
        };
        let outcome = port
            .issue(Action::UpdateSchema, operations_payload(plan), meta)
            .await;
        if !outcome.ok {
            // The real apply is never attempted after a rejected rehearsal.
            let detail = outcome.error_text();
            stages.push(StageRecord::new(
                "dry_run",
                false,
                json!({"error": detail.clone()}),
            ));
            return FlowOutcome::Aborted {
                stage: "dry_run",
                error: ApplyError::DryRunRejected { detail },
            };
        }
        stages.push(StageRecord::new(
            "dry_run",
            true,
            json!({"operations": plan.len()}),
        ));
        // End-to-end rehearsal stops here; the schema is untouched.
        if options.dry_run {
            return FlowOutcome::Done { verification: None };
        }
    }

    // ---- APPLYING ----
    if !options.confirm {
        stages.push(StageRecord::new(
            "apply",
            false,
            json!({"error": "confirmation required"}),
        ));
        return FlowOutcome::Aborted {
            stage: "apply",
            error: ApplyError::ConfirmationRequired,
        };
    }
    let meta = CommandMeta {
        confirm: true,
        dry_run: false,
        continue_on_error: options.continue_on_error,
    };
    let outcome = port
        .issue(Action::UpdateSchema, operations_payload(plan), meta)
        .await;
    if !outcome.ok {
        let detail = outcome.error_text();
        stages.push(StageRecord::new(
            "apply",
            false,
            json!({"error": detail.clone()}),
        ));
        return FlowOutcome::Aborted {
            stage: "apply",
            error: ApplyError::ApplyRejected { detail },
        };
    }
    stages.push(StageRecord::new(
        "apply",
        true,
        json!({"operations": plan.len()}),
    ));

    // ---- VERIFYING ----
    if !options.verify {
        return FlowOutcome::Done { verification: None };
    }
    let snapshot = port
        .issue(Action::ReadSchema, json!({}), CommandMeta::default())
        .await;
    if !snapshot.ok {
        let detail = snapshot.error_text();
        stages.push(StageRecord::new(
            "verify",
            false,
            json!({"error": detail.clone()}),
        ));
        return FlowOutcome::Aborted {
            stage: "verify",
            error: ApplyError::SnapshotFailed { detail },
        };
    }
    let report = verify(plan, &snapshot.result.unwrap_or(Value::Null));
    let report_value = serde_json::to_value(&report).unwrap_or(Value::Null);
    if report.malformed_snapshot.is_some() {
        stages.push(StageRecord::new("verify", false, report_value));
        return FlowOutcome::Aborted {
            stage: "verify",
            error: ApplyError::MalformedSnapshot { report },
        };
    }
    if !report.ok {
        stages.push(StageRecord::new("verify", false, report_value));
        return FlowOutcome::Aborted {
            stage: "verify",
            error: ApplyError::VerificationMismatch { report },
        };
    }
    stages.push(StageRecord::new("verify", true, report_value));
    FlowOutcome::Done {
        verification: Some(report),
    }
}
