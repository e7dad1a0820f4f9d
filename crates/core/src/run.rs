// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run records: the per-invocation audit trail.
//!
//! A [`RunRecord`] is created with `status=running` the moment a pipeline
//! starts and is re-persisted after every step, so a crash mid-run leaves
//! a partial-but-useful trail. `meta` is a structured record (one entry
//! per executed step plus typed fields for the pieces the pipelines need
//! to report, such as rollback outcome and bundle checksum) and is
//! only serialized into a tree at the persistence boundary.

use crate::id::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::FailureKind;

/// Which pipeline produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Backup,
    Restore,
    ForgetSnapshot,
    ExportSnapshot,
    ExportFull,
    ExportDelta,
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunType::Backup => "backup",
            RunType::Restore => "restore",
            RunType::ForgetSnapshot => "forget_snapshot",
            RunType::ExportSnapshot => "export_snapshot",
            RunType::ExportFull => "export_full",
            RunType::ExportDelta => "export_delta",
        })
    }
}

/// Lifecycle status of a run. Terminal status is set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Skipped => "skipped",
        })
    }
}

/// Closed set of pipeline step names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Preflight,
    Dump,
    Snapshot,
    Retention,
    Forget,
    StagedRestore,
    SafetyBackup,
    MaintenanceDown,
    FilesCutover,
    DbCutover,
    PostCutover,
    MaintenanceUp,
    Rollback,
    Diff,
    Restore,
    Package,
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StepName::Preflight => "preflight",
            StepName::Dump => "dump",
            StepName::Snapshot => "snapshot",
            StepName::Retention => "retention",
            StepName::Forget => "forget",
            StepName::StagedRestore => "staged_restore",
            StepName::SafetyBackup => "safety_backup",
            StepName::MaintenanceDown => "maintenance_down",
            StepName::FilesCutover => "files_cutover",
            StepName::DbCutover => "db_cutover",
            StepName::PostCutover => "post_cutover",
            StepName::MaintenanceUp => "maintenance_up",
            StepName::Rollback => "rollback",
            StepName::Diff => "diff",
            StepName::Restore => "restore",
            StepName::Package => "package",
        })
    }
}

/// Outcome tag of a single recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StepStatus::Ok => "ok",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        })
    }
}

/// Captured detail of one step: exit code, duration, truncated and
/// redacted stdout/stderr, shell-escaped command echo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One executed step in a run's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEntry {
    pub step: StepName,
    pub status: StepStatus,
    #[serde(flatten)]
    pub meta: StepMeta,
}

/// The failure that terminated a run, if any. The message is redacted
/// before it ever reaches this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub step: StepName,
    pub kind: FailureKind,
    pub message: String,
}

/// Per-facet rollback outcome, recorded even when rollback itself
/// partially fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackMeta {
    pub attempted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_restored: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_restored: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Produced export bundle: where it landed, how big, and its checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMeta {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Lock-contention backoff note for pipelines that self-requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequeueMeta {
    pub attempt: u32,
    pub delay_secs: u64,
}

/// Structured run metadata, serialized as a JSON tree at the persistence
/// boundary only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_snapshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_snapshot_id: Option<String>,
    /// Maintenance bypass secret, deliberately recorded so an operator
    /// can inspect the site mid-restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypass_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requeue: Option<RequeueMeta>,
}

/// Audit record for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub run_type: RunType,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: RunMeta,
}

impl RunRecord {
    /// Start a new running record.
    pub fn begin(run_type: RunType, started_at: DateTime<Utc>) -> Self {
        Self {
            id: RunId::new(),
            run_type,
            status: RunStatus::Running,
            started_at,
            finished_at: None,
            meta: RunMeta::default(),
        }
    }

    /// Append a step entry to the trail.
    pub fn push_step(&mut self, step: StepName, status: StepStatus, meta: StepMeta) {
        self.meta.steps.push(StepEntry { step, status, meta });
    }

    /// Record a non-fatal warning.
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.meta.warnings.push(warning.into());
    }

    /// Set a terminal status. The first terminal transition wins; later
    /// calls are ignored so a rollback path can't overwrite the original
    /// failure.
    pub fn finish(&mut self, status: RunStatus, finished_at: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.status = status;
        self.finished_at = Some(finished_at);
    }

    /// Mark the run skipped with a reason (e.g. `lock_unavailable`).
    pub fn skip(&mut self, reason: impl Into<String>, finished_at: DateTime<Utc>) {
        self.meta.skip_reason = Some(reason.into());
        self.finish(RunStatus::Skipped, finished_at);
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, RunStatus::Running)
    }

    /// Step entry by name, if the step ran.
    pub fn step(&self, name: StepName) -> Option<&StepEntry> {
        self.meta.steps.iter().find(|e| e.step == name)
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
