// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Full disaster-recovery export.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bh_core::{FailureKind, RunType, StepName};
use bh_snapshot::{resolve_snapshot, RestoreOpts, Snapshot, SnapshotFilter};
use bh_storage::{ExportBaseline, ExportEntry};
use chrono::{Duration as ChronoDuration, Utc};
use tracing::warn;

use crate::engine::Engine;
use crate::error::{classify_snap, EngineError};
use crate::export::ExportDocs;
use crate::fsutil;
use crate::outcome::{backoff_delay, Disposition};
use crate::run_ctx::RunCtx;

#[derive(Debug, Clone, Default)]
pub struct FullExportOptions {
    /// Export this snapshot instead of the latest one.
    pub snapshot: Option<String>,
    /// Keep the environment file in the bundle. Off by default; the env
    /// file carries live credentials.
    pub include_env: bool,
    pub attempt: u32,
}

impl Engine {
    pub async fn run_export_full(
        &self,
        opts: FullExportOptions,
    ) -> Result<Disposition, EngineError> {
        let run_type = if opts.snapshot.is_some() {
            RunType::ExportSnapshot
        } else {
            RunType::ExportFull
        };
        let ttl = self.settings.export.max_duration_secs;
        let Some(handle) = self
            .lock
            .acquire(run_type, ttl, Duration::from_secs(5), &[])
            .await?
        else {
            return Ok(Disposition::Requeue {
                attempt: opts.attempt + 1,
                delay: backoff_delay(opts.attempt),
            });
        };
        let handle = Arc::new(handle);
        let mut ctx = RunCtx::begin(
            run_type,
            self.runs.clone(),
            self.redactor.clone(),
            Arc::clone(&handle),
        )?;

        let outcome = self.drive_export_full(&mut ctx, &opts).await;
        if let Err(e) = handle.release() {
            warn!("lock release failed: {e}");
        }
        match outcome {
            Ok(()) => Ok(Disposition::Completed(ctx.succeed()?)),
            Err(e) => Err(e),
        }
    }

    async fn drive_export_full(
        &self,
        ctx: &mut RunCtx,
        opts: &FullExportOptions,
    ) -> Result<(), EngineError> {
        ctx.heartbeat(StepName::Preflight);
        let (snapshots, _) = match self.snap.snapshots(&SnapshotFilter::default()).await {
            Ok(out) => out,
            Err(e) => return Err(ctx.fail_snap(StepName::Preflight, &e)),
        };
        let snapshot = match &opts.snapshot {
            Some(query) => match resolve_snapshot(&snapshots, query) {
                Ok(snapshot) => snapshot.clone(),
                Err(e) => {
                    let (kind, message) = classify_snap(&e);
                    return Err(ctx.fail(StepName::Preflight, kind, message));
                }
            },
            None => match snapshots.iter().max_by_key(|s| s.time) {
                Some(snapshot) => snapshot.clone(),
                None => {
                    return Err(ctx.fail(
                        StepName::Preflight,
                        FailureKind::Runtime,
                        "repository has no snapshots to export",
                    ));
                }
            },
        };
        ctx.record.meta.snapshot_id = Some(snapshot.id.clone());
        ctx.step_note(
            StepName::Preflight,
            format!("exporting snapshot {}", snapshot.short()),
        )?;

        let scratch = self
            .settings
            .app
            .state_dir
            .join(format!(".bh-export-{}", ctx.record.id.short(8)));
        let result = self
            .export_full_with_scratch(ctx, opts, &snapshot, &scratch)
            .await;
        if let Err(e) = fsutil::remove_tree(&scratch) {
            ctx.warn(format!("scratch cleanup failed: {e}"));
            let _ = ctx.save();
        }
        result
    }

    async fn export_full_with_scratch(
        &self,
        ctx: &mut RunCtx,
        opts: &FullExportOptions,
        snapshot: &Snapshot,
        scratch: &Path,
    ) -> Result<(), EngineError> {
        ctx.heartbeat(StepName::Restore);
        let restore_target = scratch.join("restore");
        if let Err(e) = std::fs::create_dir_all(&restore_target) {
            return Err(ctx.fail(
                StepName::Restore,
                FailureKind::Runtime,
                format!("cannot create scratch dir: {e}"),
            ));
        }
        let result = match self
            .snap
            .restore(
                &snapshot.id,
                &restore_target,
                RestoreOpts {
                    heartbeat: Some(ctx.heartbeat_fn(StepName::Restore)),
                    ..RestoreOpts::default()
                },
            )
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(ctx.fail_snap(StepName::Restore, &e)),
        };
        ctx.step_process(StepName::Restore, &result)?;

        // Rename the restored project subtree into the bundle folder.
        let root = &self.settings.app.project_root;
        let rel = root.strip_prefix("/").unwrap_or(root.as_path());
        let restored_root = restore_target.join(rel);
        if !restored_root.is_dir() {
            return Err(ctx.fail(
                StepName::Restore,
                FailureKind::Runtime,
                format!(
                    "snapshot {} does not contain the project root {}",
                    snapshot.short(),
                    root.display()
                ),
            ));
        }
        let kind = if opts.snapshot.is_some() { "snapshot" } else { "full" };
        let bundle_name = self.bundle_name(kind, snapshot.short());
        let bundle_dir = scratch.join(&bundle_name);
        if let Err(e) = std::fs::rename(&restored_root, &bundle_dir) {
            return Err(ctx.fail(
                StepName::Restore,
                FailureKind::Runtime,
                format!("cannot shape bundle folder: {e}"),
            ));
        }

        // Strip the environment file unless explicitly requested, and the
        // configured excluded subpaths.
        if !opts.include_env {
            let _ = std::fs::remove_file(bundle_dir.join(&self.settings.restore.env_file));
        }
        for rel in &self.settings.export.exclude {
            if let Err(e) = fsutil::remove_tree(&bundle_dir.join(rel)) {
                ctx.warn(format!("could not strip excluded path {rel}: {e}"));
            }
        }

        let docs = ExportDocs {
            readme: full_readme(&self.settings.app.name, snapshot, opts.include_env),
            manifest: serde_json::json!({
                "kind": kind,
                "app": self.settings.app.name,
                "environment": self.settings.app.environment,
                "snapshot_id": snapshot.id,
                "snapshot_short_id": snapshot.short(),
                "generated_at": Utc::now(),
            }),
            deleted: None,
        };
        if let Err(e) = self.write_bundle_docs(&bundle_dir, &docs) {
            return Err(ctx.fail(
                StepName::Package,
                FailureKind::Runtime,
                format!("cannot write bundle docs: {e}"),
            ));
        }

        let bundle = self.package_bundle(ctx, &bundle_dir, &bundle_name)?;
        ctx.record.meta.bundle = Some(bundle.clone());

        self.exports.add(ExportEntry {
            bundle: bundle.path.clone(),
            run_id: ctx.record.id.clone(),
            kind: ctx.record.run_type,
            created_at: Utc::now(),
            delete_after: Utc::now()
                + ChronoDuration::days(i64::from(self.settings.export.retention_days)),
            size_bytes: bundle.size_bytes,
            sha256: bundle.sha256.clone(),
        })?;

        // This snapshot becomes the baseline for future delta exports.
        self.baseline.write(&ExportBaseline {
            snapshot_id: snapshot.id.clone(),
            short_id: snapshot.short().to_string(),
            recorded_at: Utc::now(),
        })?;
        ctx.save()?;
        Ok(())
    }
}

fn full_readme(app: &str, snapshot: &Snapshot, include_env: bool) -> String {
    format!(
        "Disaster-recovery bundle for {app}\n\
         ==================================\n\n\
         Snapshot: {} ({})\n\
         Taken at: {}\n\n\
         This folder contains the full project tree restored from the\n\
         snapshot above. Database dumps (zstd-compressed) are under the\n\
         configured dump directory inside the tree.\n\n\
         {}\n\
         To apply a later delta bundle on top of this one, unpack both\n\
         and run the delta bundle's TOOLS/restore.sh (or restore.ps1)\n\
         pointing at this bundle's root.\n",
        snapshot.short(),
        snapshot.id,
        snapshot.time,
        if include_env {
            "The environment file IS included. Handle with care."
        } else {
            "The environment file is NOT included; provision one by hand."
        }
    )
}
