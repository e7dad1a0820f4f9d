// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The restore pipeline.
//!
//! `preflight → staged_restore → maintenance_down → files_cutover →
//! db_cutover → post_cutover → maintenance_up → done`, with a rollback
//! branch reachable from any cutover state. Nothing irreversible happens
//! before the maintenance window; everything after it is guarded by the
//! rollback tracker.

mod cutover;
mod preflight;
mod rollback;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bh_core::{RunRecord, RunType, StepName};
use chrono::Utc;
use tracing::warn;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::fsutil;
use crate::maintenance::{Maintenance, MaintenanceChange};
use crate::outcome::Disposition;
use crate::run_ctx::RunCtx;

const LOCK_BLOCK: Duration = Duration::from_secs(5);

/// What a restore touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreScope {
    Files,
    Database,
    Full,
}

impl RestoreScope {
    pub fn includes_files(self) -> bool {
        matches!(self, RestoreScope::Files | RestoreScope::Full)
    }

    pub fn includes_db(self) -> bool {
        matches!(self, RestoreScope::Database | RestoreScope::Full)
    }
}

/// How the live file tree is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoverMode {
    /// In-place sync with delete-extraneous. Works across filesystems,
    /// not atomic.
    Rsync,
    /// Two renames on one filesystem. Atomic per rename, with a short
    /// window of total unavailability between them.
    Atomic,
}

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Snapshot id, short id, or unique prefix.
    pub snapshot: String,
    pub scope: RestoreScope,
    pub mode: CutoverMode,
    /// Override the configured safety-backup default.
    pub safety_backup: Option<bool>,
}

/// Paths the staged phase hands to cutover and rollback.
pub(crate) struct RestorePlan {
    pub scratch: PathBuf,
    pub staging: PathBuf,
    /// Staged compressed dump inside `staging` (db in scope only).
    pub staged_dump: Option<PathBuf>,
    /// Safety dump inside the live tree, written before cutover.
    pub safety_dump: Option<PathBuf>,
}

/// What has irreversibly happened so far.
#[derive(Default)]
pub(crate) struct CutoverTracker {
    pub files_swapped: bool,
    pub db_wiped: bool,
    pub rollback_dir: Option<PathBuf>,
    pub maintenance_down: bool,
}

impl Engine {
    pub async fn run_restore(&self, opts: RestoreOptions) -> Result<Disposition, EngineError> {
        // Concurrency guard: if the mutex is held elsewhere the run is
        // skipped entirely: recorded for audit, never queued, no
        // filesystem mutation.
        if self.lock.read_info()?.is_some() {
            return Ok(Disposition::Skipped(self.record_skipped_restore()?));
        }
        let ttl = self.settings.restore.max_duration_secs;
        let context = [("scope".to_string(), format!("{:?}", opts.scope).to_lowercase())];
        let Some(handle) = self
            .lock
            .acquire(RunType::Restore, ttl, LOCK_BLOCK, &context)
            .await?
        else {
            return Ok(Disposition::Skipped(self.record_skipped_restore()?));
        };

        let handle = Arc::new(handle);
        let mut ctx = RunCtx::begin(
            RunType::Restore,
            self.runs.clone(),
            self.redactor.clone(),
            Arc::clone(&handle),
        )?;

        let outcome = self.drive_restore(&mut ctx, &opts).await;
        if let Err(e) = handle.release() {
            warn!("lock release failed: {e}");
        }
        match outcome {
            Ok(()) => Ok(Disposition::Completed(ctx.succeed()?)),
            Err(e) => Err(e),
        }
    }

    fn record_skipped_restore(&self) -> Result<RunRecord, EngineError> {
        let mut record = RunRecord::begin(RunType::Restore, Utc::now());
        record.skip("lock_unavailable", Utc::now());
        self.runs.save(&record)?;
        Ok(record)
    }

    async fn drive_restore(
        &self,
        ctx: &mut RunCtx,
        opts: &RestoreOptions,
    ) -> Result<(), EngineError> {
        let pre = self.restore_preflight(ctx, opts).await?;

        // Scratch lives next to the project root: the staging tree must
        // share the root's filesystem for the atomic rename.
        let root = self.settings.app.project_root.clone();
        let parent = root
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));
        let scratch = parent.join(format!(".bh-restore-{}", ctx.record.id.short(8)));

        let result = self
            .restore_with_scratch(ctx, opts, &pre, &scratch)
            .await;
        if let Err(e) = fsutil::remove_tree(&scratch) {
            ctx.warn(format!("scratch cleanup failed: {e}"));
            let _ = ctx.save();
        }
        result
    }

    async fn restore_with_scratch(
        &self,
        ctx: &mut RunCtx,
        opts: &RestoreOptions,
        pre: &preflight::PreflightReport,
        scratch: &std::path::Path,
    ) -> Result<(), EngineError> {
        let mut plan = self.staged_restore(ctx, opts, pre, scratch).await?;

        // Optional safety backup: a failure here aborts before anything
        // irreversible has happened.
        let safety = opts
            .safety_backup
            .unwrap_or(self.settings.restore.safety_backup);
        if safety {
            plan.safety_dump = Some(self.safety_backup(ctx).await?);
        } else {
            ctx.step_skipped(StepName::SafetyBackup, "safety backup disabled")?;
        }

        // Maintenance window, with a per-run bypass secret in the meta.
        let maintenance = Maintenance::new(&self.settings.app.project_root);
        let secret = Maintenance::generate_secret();
        ctx.record.meta.bypass_secret = Some(secret.clone());
        ctx.heartbeat(StepName::MaintenanceDown);
        match maintenance.down(&secret) {
            Ok(MaintenanceChange::Changed) => {
                ctx.step_note(StepName::MaintenanceDown, "maintenance mode enabled")?;
            }
            Ok(MaintenanceChange::Already) => {
                ctx.step_note(StepName::MaintenanceDown, "already in maintenance mode")?;
            }
            Err(e) => {
                return Err(ctx.fail(
                    StepName::MaintenanceDown,
                    bh_core::FailureKind::Runtime,
                    format!("enabling maintenance mode failed: {e}"),
                ));
            }
        }

        let mut tracker = CutoverTracker {
            maintenance_down: true,
            ..CutoverTracker::default()
        };

        let cut = self
            .cutover(ctx, opts, &plan, &mut tracker, &maintenance, &secret)
            .await;

        let result = match cut {
            Ok(()) => {
                ctx.heartbeat(StepName::MaintenanceUp);
                match maintenance.up() {
                    Ok(MaintenanceChange::Changed) => {
                        ctx.step_note(StepName::MaintenanceUp, "maintenance mode disabled")?;
                    }
                    Ok(MaintenanceChange::Already) => {
                        ctx.step_note(StepName::MaintenanceUp, "maintenance mode already up")?;
                    }
                    Err(e) => {
                        ctx.warn(format!("disabling maintenance mode failed: {e}"));
                    }
                }
                Ok(())
            }
            Err(e) => {
                let rollback = self.rollback_restore(ctx, &plan, &tracker).await;
                ctx.record.meta.rollback = Some(rollback);
                let _ = ctx.save();
                Err(e)
            }
        };

        // Final safety net: never leave the site down, regardless of
        // success, failure, or rollback outcome.
        if tracker.maintenance_down && maintenance.is_down() {
            match maintenance.up() {
                Ok(_) => {
                    ctx.warn("maintenance mode cleared in final cleanup".to_string());
                    let _ = ctx.save();
                }
                Err(e) => {
                    ctx.warn(format!("final maintenance cleanup failed: {e}"));
                    let _ = ctx.save();
                }
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
