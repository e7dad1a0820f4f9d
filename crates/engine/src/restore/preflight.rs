// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restore preflight and the staged (throwaway) restore.

use std::path::Path;

use bh_core::{FailureKind, StepName};
use bh_db::DbConnection;
use bh_snapshot::{resolve_snapshot, RestoreOpts, SnapshotFilter};
use tracing::info;

use crate::engine::Engine;
use crate::error::{classify_snap, EngineError};
use crate::fsutil;
use crate::run_ctx::RunCtx;

use super::{RestoreOptions, RestorePlan};

/// Staging must look like a web project before cutover may proceed:
/// entrypoint, dependency manifest, vendored runtime.
const STAGING_MARKERS: [&str; 2] = ["index.php", "composer.json"];
const STAGING_MARKER_DIRS: [&str; 1] = ["vendor"];

pub(crate) struct PreflightReport {
    pub snapshot_id: String,
    pub snapshot_short: String,
}

impl Engine {
    pub(crate) async fn restore_preflight(
        &self,
        ctx: &mut RunCtx,
        opts: &RestoreOptions,
    ) -> Result<PreflightReport, EngineError> {
        ctx.heartbeat(StepName::Preflight);
        let root = self.settings.app.project_root.clone();

        // Snapshot tool connectivity.
        if let Err(e) = self.snap.version().await {
            return Err(ctx.fail_snap(StepName::Preflight, &e));
        }

        // Resolve the requested snapshot by id, short id, or prefix.
        let (snapshots, _) = match self.snap.snapshots(&SnapshotFilter::default()).await {
            Ok(out) => out,
            Err(e) => return Err(ctx.fail_snap(StepName::Preflight, &e)),
        };
        let snapshot = match resolve_snapshot(&snapshots, &opts.snapshot) {
            Ok(snapshot) => snapshot.clone(),
            Err(e) => {
                let (kind, message) = classify_snap(&e);
                return Err(ctx.fail(StepName::Preflight, kind, message));
            }
        };
        ctx.record.meta.snapshot_id = Some(snapshot.id.clone());

        // Target directory must exist and be writable.
        if !fsutil::dir_writable(&root) {
            return Err(ctx.fail(
                StepName::Preflight,
                FailureKind::Runtime,
                format!("project root {} is missing or not writable", root.display()),
            ));
        }

        // Database connectivity, when the database is in scope.
        if opts.scope.includes_db() {
            let conn = DbConnection::from_settings(&self.settings);
            if let Err(e) = conn.ping().await {
                return Err(ctx.fail_db(StepName::Preflight, &e));
            }
        }

        let parent = root.parent().unwrap_or(Path::new("/"));

        // Atomic mode swaps via rename; root and parent must share a
        // filesystem or the pipeline aborts before any mutation.
        if opts.scope.includes_files() && opts.mode == super::CutoverMode::Atomic {
            match self.fs_probe.same_filesystem(&root, parent) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(ctx.fail(
                        StepName::Preflight,
                        FailureKind::Runtime,
                        format!(
                            "{} and {} are on different filesystems; atomic swap \
                             requires a single filesystem (use rsync mode)",
                            root.display(),
                            parent.display()
                        ),
                    ));
                }
                Err(e) => {
                    return Err(ctx.fail(
                        StepName::Preflight,
                        FailureKind::Runtime,
                        format!("filesystem check failed: {e}"),
                    ));
                }
            }
        }

        // Space estimate from the store's own accounting, falling back to
        // a local directory-size probe.
        let expected = match self.snap.stats_restore_size(&snapshot.id).await {
            Ok((size, _)) => size,
            Err(e) => {
                ctx.warn(format!(
                    "restore-size accounting unavailable ({e}); falling back to a local probe"
                ));
                fsutil::dir_size(&root).unwrap_or(0)
            }
        };
        let required = fsutil::required_space(expected, opts.scope.includes_files());
        let free = match self.fs_probe.free_space(parent) {
            Ok(free) => free,
            Err(e) => {
                return Err(ctx.fail(
                    StepName::Preflight,
                    FailureKind::Runtime,
                    format!("free-space probe failed: {e}"),
                ));
            }
        };
        if free < required {
            return Err(ctx.fail(
                StepName::Preflight,
                FailureKind::Runtime,
                format!(
                    "insufficient free space: required {required} bytes, available {free} bytes"
                ),
            ));
        }

        info!(snapshot = %snapshot.short(), expected, free, "restore preflight passed");
        ctx.step_note(
            StepName::Preflight,
            format!(
                "snapshot {} resolved; expected {expected} bytes, free {free} bytes, \
                 required {required} bytes",
                snapshot.short()
            ),
        )?;

        Ok(PreflightReport {
            snapshot_id: snapshot.id.clone(),
            snapshot_short: snapshot.short().to_string(),
        })
    }

    /// Restore into a throwaway sibling tree, then stage and validate.
    pub(crate) async fn staged_restore(
        &self,
        ctx: &mut RunCtx,
        opts: &RestoreOptions,
        pre: &PreflightReport,
        scratch: &Path,
    ) -> Result<RestorePlan, EngineError> {
        ctx.heartbeat(StepName::StagedRestore);
        let root = self.settings.app.project_root.clone();
        let restore_target = scratch.join("restore");
        if let Err(e) = std::fs::create_dir_all(&restore_target) {
            return Err(ctx.fail(
                StepName::StagedRestore,
                FailureKind::Runtime,
                format!("cannot create scratch dir: {e}"),
            ));
        }

        let result = match self
            .snap
            .restore(
                &pre.snapshot_id,
                &restore_target,
                RestoreOpts {
                    heartbeat: Some(ctx.heartbeat_fn(StepName::StagedRestore)),
                    ..RestoreOpts::default()
                },
            )
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(ctx.fail_snap(StepName::StagedRestore, &e)),
        };

        // The tool restores absolute paths under the target; locate the
        // project subtree and move it into a swap-ready staging dir.
        let rel = root
            .strip_prefix("/")
            .unwrap_or(root.as_path())
            .to_path_buf();
        let restored_root = restore_target.join(&rel);
        if !restored_root.is_dir() {
            return Err(ctx.fail(
                StepName::StagedRestore,
                FailureKind::Runtime,
                format!(
                    "snapshot {} does not contain the project root {}",
                    pre.snapshot_short,
                    root.display()
                ),
            ));
        }
        let staging = scratch.join("staging");
        if let Err(e) = std::fs::rename(&restored_root, &staging) {
            return Err(ctx.fail(
                StepName::StagedRestore,
                FailureKind::Runtime,
                format!("cannot move restored tree into staging: {e}"),
            ));
        }

        // Minimum expected markers.
        for marker in STAGING_MARKERS {
            if !staging.join(marker).is_file() {
                return Err(ctx.fail(
                    StepName::StagedRestore,
                    FailureKind::Runtime,
                    format!("staging validation failed: missing {marker}"),
                ));
            }
        }
        for marker in STAGING_MARKER_DIRS {
            if !staging.join(marker).is_dir() {
                return Err(ctx.fail(
                    StepName::StagedRestore,
                    FailureKind::Runtime,
                    format!("staging validation failed: missing {marker}/ directory"),
                ));
            }
        }

        // A database-in-scope restore needs the staged compressed dump.
        let mut staged_dump = None;
        if opts.scope.includes_db() {
            let dump_dir = staging.join(&self.settings.backup.dump_dir);
            staged_dump = match fsutil::newest_file(&dump_dir) {
                Ok(Some(path)) => Some(path),
                Ok(None) => {
                    return Err(ctx.fail(
                        StepName::StagedRestore,
                        FailureKind::Runtime,
                        format!(
                            "staging validation failed: no staged database dump under {}",
                            dump_dir.display()
                        ),
                    ));
                }
                Err(e) => {
                    return Err(ctx.fail(
                        StepName::StagedRestore,
                        FailureKind::Runtime,
                        format!("staging validation failed: {e}"),
                    ));
                }
            };
        }

        ctx.step_process_with_note(
            StepName::StagedRestore,
            &result,
            format!("staged at {}; validation passed", staging.display()),
        )?;

        Ok(RestorePlan {
            scratch: scratch.to_path_buf(),
            staging,
            staged_dump,
            safety_dump: None,
        })
    }

    /// Fresh dump + snapshot tagged `safety-before-restore`. Returns the
    /// dump path inside the live tree.
    pub(crate) async fn safety_backup(
        &self,
        ctx: &mut RunCtx,
    ) -> Result<std::path::PathBuf, EngineError> {
        ctx.heartbeat(StepName::SafetyBackup);
        let conn = DbConnection::from_settings(&self.settings);
        let dump_path = self.new_dump_path("safety");
        let dump = match bh_db::dump(&conn, &dump_path).await {
            Ok(dump) => dump,
            Err(e) => return Err(ctx.fail_db(StepName::SafetyBackup, &e)),
        };
        for warning in &dump.warnings {
            ctx.warn(warning.clone());
        }

        let result = match self
            .snap
            .backup(
                &self.settings.backup_paths(),
                &self.snapshot_tags("restore", &["safety-before-restore".to_string()]),
                bh_snapshot::BackupOpts {
                    excludes: self.snapshot_excludes(),
                    heartbeat: Some(ctx.heartbeat_fn(StepName::SafetyBackup)),
                },
            )
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(ctx.fail_snap(StepName::SafetyBackup, &e)),
        };
        ctx.step_process_with_note(
            StepName::SafetyBackup,
            &result,
            format!("safety dump at {}", dump_path.display()),
        )?;
        Ok(dump_path)
    }
}
