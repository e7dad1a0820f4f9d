// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run context: record lifecycle, step persistence, heartbeats.
//!
//! Every step is persisted into the run record *before* the pipeline
//! advances, and every string that lands in the record passes through the
//! redactor first.

use std::sync::Arc;

use bh_core::{
    FailureKind, Redactor, RunFailure, RunRecord, RunStatus, RunType, StepMeta, StepName,
    StepStatus,
};
use bh_db::DbError;
use bh_lock::LockHandle;
use bh_proc::{Heartbeat, ProcessResult};
use bh_snapshot::SnapError;
use bh_storage::RunStore;
use chrono::Utc;
use tracing::{info, warn};

use crate::error::{classify_db, classify_snap, EngineError};

pub(crate) struct RunCtx {
    pub record: RunRecord,
    runs: RunStore,
    redactor: Redactor,
    handle: Arc<LockHandle>,
}

impl RunCtx {
    /// Create the running record, associate it with the lock, persist it.
    pub fn begin(
        run_type: RunType,
        runs: RunStore,
        redactor: Redactor,
        handle: Arc<LockHandle>,
    ) -> Result<Self, EngineError> {
        let record = RunRecord::begin(run_type, Utc::now());
        handle.set_run_id(&record.id)?;
        runs.save(&record)?;
        info!(run = %record.id, kind = %run_type, "run started");
        Ok(Self {
            record,
            runs,
            redactor,
            handle,
        })
    }

    /// Refresh the lock with the current step name. Heartbeat failures are
    /// logged, never fatal; losing a heartbeat must not kill a cutover.
    pub fn heartbeat(&self, step: StepName) {
        if let Err(e) = self
            .handle
            .heartbeat(&[("step".to_string(), step.to_string())])
        {
            warn!(step = %step, "lock heartbeat failed: {e}");
        }
    }

    /// A heartbeat callback for long subprocess calls.
    pub fn heartbeat_fn(&self, step: StepName) -> Heartbeat {
        let handle = Arc::clone(&self.handle);
        Heartbeat::new(Arc::new(move || {
            let _ = handle.heartbeat(&[("step".to_string(), step.to_string())]);
        }))
    }

    pub fn save(&self) -> Result<(), EngineError> {
        self.runs.save(&self.record)?;
        Ok(())
    }

    fn step_meta(&self, result: &ProcessResult) -> StepMeta {
        StepMeta {
            exit_code: Some(result.exit_code),
            duration_ms: result.duration.as_millis() as u64,
            stdout: some_nonempty(self.redactor.scrub(result.stdout.trim_end())),
            stderr: some_nonempty(self.redactor.scrub(result.stderr.trim_end())),
            command: Some(self.redactor.scrub(&result.display_command())),
            note: None,
        }
    }

    /// Record a completed subprocess step and persist before advancing.
    pub fn step_process(
        &mut self,
        step: StepName,
        result: &ProcessResult,
    ) -> Result<(), EngineError> {
        let meta = self.step_meta(result);
        self.record.push_step(step, StepStatus::Ok, meta);
        self.save()
    }

    /// Like [`Self::step_process`] with an extra note.
    pub fn step_process_with_note(
        &mut self,
        step: StepName,
        result: &ProcessResult,
        note: impl Into<String>,
    ) -> Result<(), EngineError> {
        let mut meta = self.step_meta(result);
        meta.note = Some(self.redactor.scrub(&note.into()));
        self.record.push_step(step, StepStatus::Ok, meta);
        self.save()
    }

    /// Record a completed non-subprocess step with a note.
    pub fn step_note(&mut self, step: StepName, note: impl Into<String>) -> Result<(), EngineError> {
        let meta = StepMeta {
            note: Some(self.redactor.scrub(&note.into())),
            ..StepMeta::default()
        };
        self.record.push_step(step, StepStatus::Ok, meta);
        self.save()
    }

    /// Record a detailed step entry as-is (caller-built meta).
    pub fn step_entry(
        &mut self,
        step: StepName,
        status: StepStatus,
        mut meta: StepMeta,
    ) -> Result<(), EngineError> {
        meta.stdout = meta.stdout.map(|s| self.redactor.scrub(&s));
        meta.stderr = meta.stderr.map(|s| self.redactor.scrub(&s));
        meta.command = meta.command.map(|s| self.redactor.scrub(&s));
        meta.note = meta.note.map(|s| self.redactor.scrub(&s));
        self.record.push_step(step, status, meta);
        self.save()
    }

    /// Record a skipped step with its reason.
    pub fn step_skipped(
        &mut self,
        step: StepName,
        reason: impl Into<String>,
    ) -> Result<(), EngineError> {
        let meta = StepMeta {
            note: Some(reason.into()),
            ..StepMeta::default()
        };
        self.record.push_step(step, StepStatus::Skipped, meta);
        self.save()
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let scrubbed = self.redactor.scrub(&warning.into());
        warn!(run = %self.record.id, "{scrubbed}");
        self.record.push_warning(scrubbed);
    }

    /// Mark the run failed at `step` and return the boundary error. The
    /// message is scrubbed before persistence.
    pub fn fail(&mut self, step: StepName, kind: FailureKind, message: impl Into<String>) -> EngineError {
        let message = self.redactor.scrub(&message.into());
        if self.record.step(step).is_none() {
            self.record
                .push_step(step, StepStatus::Failed, StepMeta::default());
        }
        self.record.meta.error = Some(RunFailure {
            step,
            kind,
            message: message.clone(),
        });
        self.record.finish(RunStatus::Failed, Utc::now());
        if let Err(e) = self.save() {
            warn!("failed persisting failure record: {e}");
        }
        EngineError::Step {
            step,
            kind,
            message,
        }
    }

    /// Fail on a snapshot-tool error, recording the failing subprocess
    /// output when there is any.
    pub fn fail_snap(&mut self, step: StepName, err: &SnapError) -> EngineError {
        if let SnapError::Process { result, .. } = err {
            let mut meta = self.step_meta(result);
            if let SnapError::Process { hint: Some(hint), .. } = err {
                meta.note = Some(format!("hint: {hint}"));
            }
            self.record.push_step(step, StepStatus::Failed, meta);
        }
        let (kind, message) = classify_snap(err);
        self.fail(step, kind, message)
    }

    pub fn fail_db(&mut self, step: StepName, err: &DbError) -> EngineError {
        let (kind, message) = classify_db(err);
        self.fail(step, kind, message)
    }

    /// Terminal success.
    pub fn succeed(mut self) -> Result<RunRecord, EngineError> {
        self.record.finish(RunStatus::Success, Utc::now());
        self.runs.save(&self.record)?;
        info!(run = %self.record.id, "run succeeded");
        Ok(self.record)
    }
}

fn some_nonempty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
#[path = "run_ctx_tests.rs"]
mod tests;
