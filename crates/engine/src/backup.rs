// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The backup pipeline: dump → snapshot → retention.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bh_core::{DbDriver, RunType, StepMeta, StepName, StepStatus};
use bh_db::DbConnection;
use bh_snapshot::BackupOpts;
use chrono::Utc;
use tracing::warn;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::outcome::{backoff_delay, Disposition};
use crate::run_ctx::RunCtx;

const LOCK_BLOCK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Extra snapshot tags.
    pub tags: Vec<String>,
    /// Trigger label (console, scheduler, ui).
    pub trigger: String,
    /// Requeue attempt counter, for backoff.
    pub attempt: u32,
}

impl Engine {
    pub async fn run_backup(&self, opts: BackupOptions) -> Result<Disposition, EngineError> {
        let ttl = self.settings.backup.max_duration_secs;
        let context = [("trigger".to_string(), opts.trigger.clone())];
        let Some(handle) = self
            .lock
            .acquire(RunType::Backup, ttl, LOCK_BLOCK, &context)
            .await?
        else {
            // Lock contention is not a failure; the caller re-enqueues.
            return Ok(Disposition::Requeue {
                attempt: opts.attempt + 1,
                delay: backoff_delay(opts.attempt),
            });
        };
        let handle = Arc::new(handle);
        let mut ctx = RunCtx::begin(
            RunType::Backup,
            self.runs.clone(),
            self.redactor.clone(),
            Arc::clone(&handle),
        )?;

        let outcome = self.drive_backup(&mut ctx, &opts).await;
        if let Err(e) = handle.release() {
            warn!("lock release failed: {e}");
        }
        match outcome {
            Ok(()) => Ok(Disposition::Completed(ctx.succeed()?)),
            Err(e) => Err(e),
        }
    }

    async fn drive_backup(
        &self,
        ctx: &mut RunCtx,
        opts: &BackupOptions,
    ) -> Result<(), EngineError> {
        // Step 1: database dump, streamed compressed into the project so
        // the snapshot captures it.
        ctx.heartbeat(StepName::Dump);
        let conn = DbConnection::from_settings(&self.settings);
        let dump_path = self.new_dump_path("db");
        let dump = match bh_db::dump(&conn, &dump_path).await {
            Ok(dump) => dump,
            Err(e) => return Err(ctx.fail_db(StepName::Dump, &e)),
        };
        for warning in &dump.warnings {
            ctx.warn(warning.clone());
        }
        ctx.step_entry(
            StepName::Dump,
            StepStatus::Ok,
            StepMeta {
                exit_code: Some(dump.exit_code),
                duration_ms: dump.duration.as_millis() as u64,
                command: Some(dump.command.clone()),
                note: Some(format!(
                    "{} compressed bytes at {}",
                    dump.bytes_written,
                    dump.path.display()
                )),
                ..StepMeta::default()
            },
        )?;

        // Step 2: snapshot creation over the resolved paths.
        ctx.heartbeat(StepName::Snapshot);
        let result = match self
            .snap
            .backup(
                &self.settings.backup_paths(),
                &self.snapshot_tags(&opts.trigger, &opts.tags),
                BackupOpts {
                    excludes: self.snapshot_excludes(),
                    heartbeat: Some(ctx.heartbeat_fn(StepName::Snapshot)),
                },
            )
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(ctx.fail_snap(StepName::Snapshot, &e)),
        };
        ctx.step_process(StepName::Snapshot, &result)?;

        // Step 3: retention, skipped with reason when unconfigured.
        ctx.heartbeat(StepName::Retention);
        if self.settings.retention.is_empty() {
            ctx.step_skipped(StepName::Retention, "retention policy not configured")?;
        } else {
            let result = match self.snap.forget(&self.settings.retention, true).await {
                Ok(result) => result,
                Err(e) => return Err(ctx.fail_snap(StepName::Retention, &e)),
            };
            ctx.step_process(StepName::Retention, &result)?;
        }
        Ok(())
    }

    /// Timestamped dump path inside the project's dump directory.
    pub(crate) fn new_dump_path(&self, prefix: &str) -> PathBuf {
        let ext = match self.settings.database.driver {
            DbDriver::Sqlite => "sqlite.zst",
            DbDriver::Mysql | DbDriver::Postgres => "sql.zst",
        };
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        self.settings.dump_dir().join(format!("{prefix}-{stamp}.{ext}"))
    }
}

#[cfg(test)]
#[path = "backup_tests.rs"]
mod tests;
