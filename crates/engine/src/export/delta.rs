// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delta disaster-recovery export: a minimal changed-file bundle built
//! from the diff between the recorded baseline and the latest snapshot.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bh_core::{FailureKind, RunType, StepName};
use bh_snapshot::{resolve_snapshot, RestoreOpts, SnapshotFilter};
use bh_storage::ExportEntry;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::warn;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::export::ExportDocs;
use crate::fsutil;
use crate::outcome::{backoff_delay, Disposition};
use crate::run_ctx::RunCtx;

/// Changed-path restores are chunked to bound per-call argument size.
const INCLUDE_BATCH: usize = 100;

impl Engine {
    pub async fn run_export_delta(&self, attempt: u32) -> Result<Disposition, EngineError> {
        let ttl = self.settings.export.max_duration_secs;
        let Some(handle) = self
            .lock
            .acquire(RunType::ExportDelta, ttl, Duration::from_secs(5), &[])
            .await?
        else {
            return Ok(Disposition::Requeue {
                attempt: attempt + 1,
                delay: backoff_delay(attempt),
            });
        };
        let handle = Arc::new(handle);
        let mut ctx = RunCtx::begin(
            RunType::ExportDelta,
            self.runs.clone(),
            self.redactor.clone(),
            Arc::clone(&handle),
        )?;

        let outcome = self.drive_export_delta(&mut ctx).await;
        if let Err(e) = handle.release() {
            warn!("lock release failed: {e}");
        }
        match outcome {
            Ok(()) => Ok(Disposition::Completed(ctx.succeed()?)),
            Err(e) => Err(e),
        }
    }

    async fn drive_export_delta(&self, ctx: &mut RunCtx) -> Result<(), EngineError> {
        ctx.heartbeat(StepName::Preflight);

        // A delta needs a previously recorded baseline.
        let Some(baseline) = self.baseline.read()? else {
            return Err(ctx.fail(
                StepName::Preflight,
                FailureKind::Runtime,
                "no baseline snapshot recorded; run a full export first",
            ));
        };

        let (snapshots, _) = match self.snap.snapshots(&SnapshotFilter::default()).await {
            Ok(out) => out,
            Err(e) => return Err(ctx.fail_snap(StepName::Preflight, &e)),
        };
        let base = match resolve_snapshot(&snapshots, &baseline.snapshot_id) {
            Ok(base) => base.clone(),
            Err(_) => {
                return Err(ctx.fail(
                    StepName::Preflight,
                    FailureKind::Runtime,
                    format!(
                        "baseline snapshot {} is no longer in the repository",
                        baseline.short_id
                    ),
                ));
            }
        };
        let Some(latest) = snapshots.iter().max_by_key(|s| s.time).cloned() else {
            return Err(ctx.fail(
                StepName::Preflight,
                FailureKind::Runtime,
                "repository has no snapshots",
            ));
        };
        ctx.record.meta.baseline_snapshot_id = Some(base.id.clone());
        ctx.record.meta.to_snapshot_id = Some(latest.id.clone());
        ctx.step_note(
            StepName::Preflight,
            format!("delta {} -> {}", base.short(), latest.short()),
        )?;

        // Path-level diff between the two snapshots.
        ctx.heartbeat(StepName::Diff);
        let diff = if base.id == latest.id {
            ctx.step_note(StepName::Diff, "baseline is the latest snapshot; empty delta")?;
            bh_snapshot::SnapshotDiff::default()
        } else {
            let (diff, result) = match self
                .snap
                .diff(&base.id, &latest.id, Some(ctx.heartbeat_fn(StepName::Diff)))
                .await
            {
                Ok(out) => out,
                Err(e) => return Err(ctx.fail_snap(StepName::Diff, &e)),
            };
            ctx.step_process_with_note(
                StepName::Diff,
                &result,
                format!(
                    "{} added, {} modified, {} deleted",
                    diff.added.len(),
                    diff.modified.len(),
                    diff.deleted.len()
                ),
            )?;
            diff
        };

        // Map changed paths back to project-relative form via the union of
        // both snapshots' declared roots; filter excluded subpaths.
        let mut roots: Vec<String> = base
            .paths
            .iter()
            .chain(latest.paths.iter())
            .cloned()
            .collect();
        roots.sort_by_key(|r| std::cmp::Reverse(r.len()));
        roots.dedup();

        let mut changed: Vec<(String, String)> = Vec::new();
        for path in diff.changed_paths() {
            let Some(rel) = map_project_relative(path, &roots) else {
                return Err(ctx.fail(
                    StepName::Diff,
                    FailureKind::Runtime,
                    format!("changed path {path} is outside every snapshot root"),
                ));
            };
            if self.export_excluded(&rel) {
                continue;
            }
            changed.push((path.to_string(), rel));
        }
        let mut deleted: Vec<String> = Vec::new();
        for path in &diff.deleted {
            let Some(rel) = map_project_relative(path, &roots) else {
                return Err(ctx.fail(
                    StepName::Diff,
                    FailureKind::Runtime,
                    format!("deleted path {path} is outside every snapshot root"),
                ));
            };
            if self.export_excluded(&rel) {
                continue;
            }
            deleted.push(rel);
        }

        let scratch = self
            .settings
            .app
            .state_dir
            .join(format!(".bh-export-{}", ctx.record.id.short(8)));
        let result = self
            .export_delta_with_scratch(ctx, &latest, &changed, &deleted, &scratch)
            .await;
        if let Err(e) = fsutil::remove_tree(&scratch) {
            ctx.warn(format!("scratch cleanup failed: {e}"));
            let _ = ctx.save();
        }
        result
    }

    async fn export_delta_with_scratch(
        &self,
        ctx: &mut RunCtx,
        latest: &bh_snapshot::Snapshot,
        changed: &[(String, String)],
        deleted: &[String],
        scratch: &Path,
    ) -> Result<(), EngineError> {
        // Restore only the changed subset, in bounded include batches.
        ctx.heartbeat(StepName::Restore);
        let restore_target = scratch.join("restore");
        if let Err(e) = std::fs::create_dir_all(&restore_target) {
            return Err(ctx.fail(
                StepName::Restore,
                FailureKind::Runtime,
                format!("cannot create scratch dir: {e}"),
            ));
        }
        if changed.is_empty() {
            ctx.step_skipped(StepName::Restore, "no changed paths to restore")?;
        } else {
            let mut batches = 0;
            for chunk in changed.chunks(INCLUDE_BATCH) {
                let includes: Vec<String> = chunk.iter().map(|(abs, _)| abs.clone()).collect();
                if let Err(e) = self
                    .snap
                    .restore(
                        &latest.id,
                        &restore_target,
                        RestoreOpts {
                            includes,
                            heartbeat: Some(ctx.heartbeat_fn(StepName::Restore)),
                            ..RestoreOpts::default()
                        },
                    )
                    .await
                {
                    return Err(ctx.fail_snap(StepName::Restore, &e));
                }
                batches += 1;
            }
            ctx.step_note(
                StepName::Restore,
                format!("restored {} changed paths in {batches} batches", changed.len()),
            )?;
        }

        // Copy every changed entry into the bundle's files/ subtree. A
        // path missing from the restored subset aborts the export rather
        // than producing a silently incomplete bundle.
        let bundle_name = self.bundle_name("delta", latest.short());
        let bundle_dir = scratch.join(&bundle_name);
        let files_dir = bundle_dir.join("files");
        for (abs, rel) in changed {
            let src = restore_target.join(abs.trim_start_matches('/'));
            if std::fs::symlink_metadata(&src).is_err() {
                return Err(ctx.fail(
                    StepName::Restore,
                    FailureKind::Runtime,
                    format!(
                        "changed path {abs} is missing from the restored subset; \
                         aborting instead of producing an incomplete bundle"
                    ),
                ));
            }
            if let Err(e) = fsutil::copy_entry(&src, &files_dir.join(rel)) {
                return Err(ctx.fail(
                    StepName::Restore,
                    FailureKind::Runtime,
                    format!("cannot copy {abs} into the bundle: {e}"),
                ));
            }
        }
        std::fs::create_dir_all(&files_dir).ok();

        let docs = ExportDocs {
            readme: delta_readme(
                &self.settings.app.name,
                ctx.record.meta.baseline_snapshot_id.as_deref().unwrap_or(""),
                &latest.id,
                changed.len(),
                deleted.len(),
            ),
            manifest: serde_json::json!({
                "baseline_snapshot_id": ctx.record.meta.baseline_snapshot_id,
                "to_snapshot_id": latest.id,
                "generated_at": Utc::now(),
                "deleted": deleted,
            }),
            deleted: Some(deleted),
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
            kind: RunType::ExportDelta,
            created_at: Utc::now(),
            delete_after: Utc::now()
                + ChronoDuration::days(i64::from(self.settings.export.retention_days)),
            size_bytes: bundle.size_bytes,
            sha256: bundle.sha256.clone(),
        })?;
        ctx.save()?;
        Ok(())
    }

    fn export_excluded(&self, rel: &str) -> bool {
        if rel == self.settings.restore.env_file {
            return true;
        }
        self.settings.export.exclude.iter().any(|excluded| {
            let excluded = excluded.trim_matches('/');
            rel == excluded || rel.starts_with(&format!("{excluded}/"))
        })
    }
}

/// Map an absolute snapshot path to its project-relative form using the
/// longest matching declared root. The root itself maps to `None`.
fn map_project_relative(path: &str, roots_longest_first: &[String]) -> Option<String> {
    for root in roots_longest_first {
        let root = root.trim_end_matches('/');
        if let Some(rest) = path.strip_prefix(root) {
            let rel = rest.trim_start_matches('/');
            if rest.is_empty() || rest.starts_with('/') {
                if rel.is_empty() {
                    return None;
                }
                return Some(rel.to_string());
            }
        }
    }
    None
}

fn delta_readme(
    app: &str,
    baseline: &str,
    latest: &str,
    changed: usize,
    deleted: usize,
) -> String {
    format!(
        "Delta disaster-recovery bundle for {app}\n\
         ========================================\n\n\
         Baseline snapshot: {baseline}\n\
         Target snapshot:   {latest}\n\
         Changed entries:   {changed}\n\
         Deleted entries:   {deleted}\n\n\
         files/ holds every path added or modified since the baseline.\n\
         manifest.json lists the paths deleted since the baseline; the\n\
         restore tools remove them instead of copying.\n\n\
         Apply onto an unpacked full bundle:\n\
         \x20   TOOLS/restore.sh <full-bundle-root>\n\
         \x20   TOOLS\\restore.ps1 -Target <full-bundle-root>\n",
    )
}

#[cfg(test)]
#[path = "delta_tests.rs"]
mod tests;
