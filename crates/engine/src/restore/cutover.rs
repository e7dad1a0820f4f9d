// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The irreversible part: files cutover, database cutover, post-cutover.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bh_core::{FailureKind, StepMeta, StepName, StepStatus};
use bh_db::DbConnection;
use bh_proc::{CommandRunner, CommandSpec};
use chrono::Utc;
use tracing::info;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::fsutil;
use crate::maintenance::Maintenance;
use crate::run_ctx::RunCtx;

use super::{CutoverMode, CutoverTracker, RestoreOptions, RestorePlan};

impl Engine {
    pub(crate) async fn cutover(
        &self,
        ctx: &mut RunCtx,
        opts: &RestoreOptions,
        plan: &RestorePlan,
        tracker: &mut CutoverTracker,
        maintenance: &Maintenance,
        secret: &str,
    ) -> Result<(), EngineError> {
        if opts.scope.includes_files() {
            ctx.heartbeat(StepName::FilesCutover);
            match opts.mode {
                CutoverMode::Rsync => self.files_cutover_rsync(ctx, plan).await?,
                CutoverMode::Atomic => {
                    self.files_cutover_atomic(ctx, plan, tracker, maintenance, secret)?
                }
            }
        }
        if opts.scope.includes_db() {
            ctx.heartbeat(StepName::DbCutover);
            self.db_cutover(ctx, opts, plan, tracker).await?;
        }
        self.post_cutover(ctx).await?;
        Ok(())
    }

    /// In-place sync of staged content onto the live root. Not atomic,
    /// but works across filesystems. The environment file and the
    /// maintenance flag are excluded; safety dumps are spared from
    /// delete-extraneous so a rollback can still find them.
    async fn files_cutover_rsync(
        &self,
        ctx: &mut RunCtx,
        plan: &RestorePlan,
    ) -> Result<(), EngineError> {
        let root = &self.settings.app.project_root;
        let spec = CommandSpec::new("rsync")
            .arg("-a")
            .arg("--delete")
            .arg(format!("--exclude=/{}", self.settings.restore.env_file))
            .arg(format!("--exclude=/{}", Maintenance::flag_rel()))
            .arg("--exclude=safety-*")
            .arg(format!("{}/", plan.staging.display()))
            .arg(format!("{}/", root.display()))
            .timeout(Duration::from_secs(self.settings.restore.max_duration_secs))
            .heartbeat(ctx.heartbeat_fn(StepName::FilesCutover));
        let result = match CommandRunner::run(spec).await {
            Ok(result) => result,
            Err(e) => {
                return Err(ctx.fail(
                    StepName::FilesCutover,
                    FailureKind::Process,
                    format!("rsync cutover failed: {e}"),
                ));
            }
        };
        if !result.ok() {
            let meta = StepMeta {
                exit_code: Some(result.exit_code),
                duration_ms: result.duration.as_millis() as u64,
                stderr: Some(result.stderr_tail(400).to_string()),
                command: Some(result.display_command()),
                ..StepMeta::default()
            };
            ctx.step_entry(StepName::FilesCutover, StepStatus::Failed, meta)?;
            return Err(ctx.fail(
                StepName::FilesCutover,
                FailureKind::Process,
                format!("rsync exited {}", result.exit_code),
            ));
        }
        ctx.step_process(StepName::FilesCutover, &result)?;
        Ok(())
    }

    /// Two renames: live → rollback dir, staging → live. Both paths share
    /// a filesystem (checked in preflight). Between the renames there is a
    /// short window where the live path does not exist, an inherent
    /// limitation of the swap, documented rather than papered over.
    fn files_cutover_atomic(
        &self,
        ctx: &mut RunCtx,
        plan: &RestorePlan,
        tracker: &mut CutoverTracker,
        maintenance: &Maintenance,
        secret: &str,
    ) -> Result<(), EngineError> {
        let root = self.settings.app.project_root.clone();
        let parent = root.parent().unwrap_or(Path::new("/"));
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let rollback_dir = parent.join(format!("{root_name}.rollback-{stamp}"));

        if let Err(e) = std::fs::rename(&root, &rollback_dir) {
            return Err(ctx.fail(
                StepName::FilesCutover,
                FailureKind::Runtime,
                format!("cannot move live tree aside: {e}"),
            ));
        }
        tracker.files_swapped = true;
        tracker.rollback_dir = Some(rollback_dir.clone());
        ctx.record.meta.rollback_dir = Some(rollback_dir.clone());

        if let Err(e) = std::fs::rename(&plan.staging, &root) {
            return Err(ctx.fail(
                StepName::FilesCutover,
                FailureKind::Runtime,
                format!("cannot move staging into place: {e}"),
            ));
        }

        // The environment file is deliberately excluded from snapshots;
        // carry the live one across the swap.
        let env_file = &self.settings.restore.env_file;
        let env_src = rollback_dir.join(env_file);
        if env_src.is_file() {
            if let Err(e) = std::fs::copy(&env_src, root.join(env_file)) {
                ctx.warn(format!("could not carry {env_file} into the new tree: {e}"));
            }
        }

        // The first rename moved the maintenance flag away with the old
        // tree; re-assert it on the new one.
        if let Err(e) = maintenance.down(secret) {
            ctx.warn(format!("could not re-assert maintenance mode: {e}"));
        }

        info!(rollback = %rollback_dir.display(), "atomic files cutover complete");
        ctx.step_note(
            StepName::FilesCutover,
            format!(
                "atomic swap complete; previous tree retained at {}",
                rollback_dir.display()
            ),
        )?;
        Ok(())
    }

    /// Wipe all application tables/views except the preserve-list, then
    /// stream-import the staged dump.
    async fn db_cutover(
        &self,
        ctx: &mut RunCtx,
        opts: &RestoreOptions,
        plan: &RestorePlan,
        tracker: &mut CutoverTracker,
    ) -> Result<(), EngineError> {
        let conn = DbConnection::from_settings(&self.settings);
        let preserve = self.settings.database.preserve_tables.clone();

        let wiped = match bh_db::wipe(&conn, &preserve).await {
            Ok(wiped) => wiped,
            Err(e) => return Err(ctx.fail_db(StepName::DbCutover, &e)),
        };
        tracker.db_wiped = true;

        let dump_path = match self.staged_dump_location(opts, plan) {
            Some(path) => path,
            None => {
                return Err(ctx.fail(
                    StepName::DbCutover,
                    FailureKind::Runtime,
                    "no staged dump recorded for database cutover",
                ));
            }
        };
        let imported = match bh_db::import(&conn, &dump_path).await {
            Ok(imported) => imported,
            Err(e) => return Err(ctx.fail_db(StepName::DbCutover, &e)),
        };

        ctx.step_entry(
            StepName::DbCutover,
            StepStatus::Ok,
            StepMeta {
                exit_code: Some(imported.exit_code),
                duration_ms: imported.duration.as_millis() as u64,
                command: Some(imported.command.clone()),
                note: Some(format!(
                    "dropped {} tables, {} views; preserved {}; imported {}",
                    wiped.dropped_tables.len(),
                    wiped.dropped_views.len(),
                    wiped.preserved.len(),
                    dump_path.display()
                )),
                ..StepMeta::default()
            },
        )?;
        Ok(())
    }

    /// Where the staged dump lives at db-cutover time: inside the live
    /// tree once a files cutover moved/synced it there, else still in
    /// staging.
    fn staged_dump_location(&self, opts: &RestoreOptions, plan: &RestorePlan) -> Option<PathBuf> {
        let staged = plan.staged_dump.as_ref()?;
        if !opts.scope.includes_files() {
            return Some(staged.clone());
        }
        let rel = staged.strip_prefix(&plan.staging).ok()?;
        Some(self.settings.app.project_root.join(rel))
    }

    /// Clear generated caches, re-link public storage, restart workers.
    /// Individual failures are warnings, not fatal.
    async fn post_cutover(&self, ctx: &mut RunCtx) -> Result<(), EngineError> {
        ctx.heartbeat(StepName::PostCutover);
        let root = self.settings.app.project_root.clone();
        let mut notes = Vec::new();

        for rel in [
            "bootstrap/cache",
            "storage/framework/cache/data",
            "storage/framework/views",
        ] {
            let dir = root.join(rel);
            if !dir.is_dir() {
                continue;
            }
            match clear_dir_contents(&dir) {
                Ok(count) if count > 0 => notes.push(format!("cleared {count} entries in {rel}")),
                Ok(_) => {}
                Err(e) => ctx.warn(format!("cache clear of {rel} failed: {e}")),
            }
        }

        match relink_public_storage(&root) {
            Ok(true) => notes.push("re-linked public/storage".to_string()),
            Ok(false) => {}
            Err(e) => ctx.warn(format!("public storage relink failed: {e}")),
        }

        match &self.settings.restore.restart_workers_cmd {
            Some(cmd) if !cmd.is_empty() => {
                let spec = CommandSpec::new(&cmd[0])
                    .args(cmd[1..].iter().cloned())
                    .timeout(Duration::from_secs(120));
                match CommandRunner::run(spec).await {
                    Ok(result) if result.ok() => notes.push("worker restart ok".to_string()),
                    Ok(result) => ctx.warn(format!(
                        "worker restart exited {}: {}",
                        result.exit_code,
                        result.stderr_tail(200)
                    )),
                    Err(e) => ctx.warn(format!("worker restart failed: {e}")),
                }
            }
            _ => notes.push("no worker restart command configured".to_string()),
        }

        ctx.step_note(
            StepName::PostCutover,
            if notes.is_empty() {
                "nothing to do".to_string()
            } else {
                notes.join("; ")
            },
        )?;
        Ok(())
    }
}

/// Delete everything inside `dir`, keeping the directory itself.
fn clear_dir_contents(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        fsutil::remove_tree(&entry.path())?;
        count += 1;
    }
    Ok(count)
}

/// Ensure `public/storage` points at `../storage/app/public`. Returns
/// whether a link was (re)created.
fn relink_public_storage(root: &Path) -> std::io::Result<bool> {
    let public = root.join("public");
    if !public.is_dir() {
        return Ok(false);
    }
    let link = public.join("storage");
    match std::fs::symlink_metadata(&link) {
        Ok(_) => std::fs::remove_file(&link)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::os::unix::fs::symlink("../storage/app/public", &link)?;
    Ok(true)
}
