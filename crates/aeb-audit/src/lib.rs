//! Apply-attempt audit trail.
//!
//! One canonical JSON document per attempt, written once and never
//! rewritten. `record_hash` is the sha256 of the record serialized with
//! recursively sorted keys and the hash field cleared, so any later
//! edit of the file is detectable.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Outcome of one flow stage (`precheck`, `dry_run`, `apply`, `verify`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub ok: bool,
    /// Stage-specific payload: capability lists, submitted operation
    /// counts, verification diffs, error objects.
    pub detail: Value,
}

impl StageRecord {
    pub fn new(stage: impl Into<String>, ok: bool, detail: Value) -> Self {
        Self {
            stage: stage.into(),
            ok,
            detail,
        }
    }
}

/// One apply attempt, end to end.
///
/// `mode` names the stage the flow reached: `done` for a completed run,
/// otherwise the stage at which it aborted (`precheck`, `dry_run`,
/// `apply`, `verify`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub attempt_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub mode: String,
    pub ok: bool,
    pub stages: Vec<StageRecord>,
    pub record_hash: Option<String>,
}

impl AuditRecord {
    pub fn new(mode: impl Into<String>, ok: bool, stages: Vec<StageRecord>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            ts_utc: Utc::now(),
            mode: mode.into(),
            ok,
            stages,
            record_hash: None,
        }
    }
}

/// Writes sealed records into an audit directory, one file per attempt.
pub struct AuditStore {
    dir: PathBuf,
}

impl AuditStore {
    /// Opens the store and ensures the directory exists.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("create_dir_all {:?}", dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Seals the record (fills `record_hash`) and writes it as
    /// `apply-<UTC compact timestamp>-<millis>-<attempt id prefix>.json`.
    /// The attempt-id fragment keeps names unique even when two attempts
    /// land in the same millisecond. Fails if the target file already
    /// exists; records are immutable once written.
    pub fn write(&self, record: &mut AuditRecord) -> Result<PathBuf> {
        record.record_hash = Some(compute_record_hash(record)?);

        let attempt = record.attempt_id.simple().to_string();
        let path = self.dir.join(format!(
            "apply-{}-{:03}-{}.json",
            record.ts_utc.format("%Y%m%dT%H%M%S"),
            record.ts_utc.timestamp_subsec_millis(),
            &attempt[..8]
        ));
        let body = canonical_json(record)?;

        let mut f = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("create audit record {:?}", path))?;
        f.write_all(body.as_bytes())
            .context("write audit record failed")?;
        f.write_all(b"\n").context("write newline failed")?;
        Ok(path)
    }
}

/// Canonical form: recursively sorted keys, compact JSON.
fn canonical_json<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit record failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash is computed over the canonical record WITHOUT `record_hash` (to
/// avoid self-reference).
pub fn compute_record_hash(record: &AuditRecord) -> Result<String> {
    let mut clone = record.clone();
    clone.record_hash = None;

    let canonical = canonical_json(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Re-reads one record file and checks its self-hash.
pub fn verify_record_file(path: impl AsRef<Path>) -> Result<RecordCheck> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit record {:?}", path.as_ref()))?;
    let record: AuditRecord =
        serde_json::from_str(content.trim()).context("parse audit record failed")?;

    let Some(claimed) = record.record_hash.clone() else {
        return Ok(RecordCheck::Unsealed);
    };
    let recomputed = compute_record_hash(&record)?;
    if claimed == recomputed {
        Ok(RecordCheck::Valid { record })
    } else {
        Ok(RecordCheck::Tampered { claimed, recomputed })
    }
}

/// Result of a record self-hash check.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordCheck {
    Valid { record: AuditRecord },
    /// Record was written without a hash; nothing to verify.
    Unsealed,
    Tampered { claimed: String, recomputed: String },
}
