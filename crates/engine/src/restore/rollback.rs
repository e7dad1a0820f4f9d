// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verified rollback after a failed cutover.
//!
//! Outcomes are recorded per facet even when rollback itself partially
//! fails. Surfaced, never silently swallowed.

use std::path::Path;

use bh_core::{RollbackMeta, StepMeta, StepName, StepStatus};
use bh_db::DbConnection;
use chrono::Utc;
use tracing::{error, info};

use crate::engine::Engine;
use crate::run_ctx::RunCtx;

use super::{CutoverTracker, RestorePlan};

impl Engine {
    pub(crate) async fn rollback_restore(
        &self,
        ctx: &mut RunCtx,
        plan: &RestorePlan,
        tracker: &CutoverTracker,
    ) -> RollbackMeta {
        ctx.heartbeat(StepName::Rollback);
        let mut meta = RollbackMeta {
            attempted: true,
            ..RollbackMeta::default()
        };
        let mut errors: Vec<String> = Vec::new();
        let root = self.settings.app.project_root.clone();
        let parent = root.parent().unwrap_or(Path::new("/"));

        // Files first: with the old tree back in place, the safety dump
        // inside it becomes reachable for the database facet.
        if tracker.files_swapped {
            match &tracker.rollback_dir {
                Some(rollback_dir) => {
                    let mut ok = true;
                    if root.exists() {
                        let stamp = Utc::now().format("%Y%m%d%H%M%S");
                        let failed_dir = parent.join(format!("__failed_restore_{stamp}"));
                        if let Err(e) = std::fs::rename(&root, &failed_dir) {
                            ok = false;
                            errors.push(format!("could not move half-restored tree aside: {e}"));
                        }
                    }
                    if ok {
                        if let Err(e) = std::fs::rename(rollback_dir, &root) {
                            ok = false;
                            errors.push(format!("could not restore previous tree: {e}"));
                        }
                    }
                    meta.files_restored = Some(ok);
                    if ok {
                        info!("live directory restored from {}", rollback_dir.display());
                    }
                }
                None => {
                    meta.files_restored = Some(false);
                    errors.push("files were swapped but no rollback directory was recorded".into());
                }
            }
        }

        // Database: re-import from the safety dump when available, else
        // the staged dump.
        if tracker.db_wiped {
            let conn = DbConnection::from_settings(&self.settings);
            let candidates: Vec<_> = [plan.safety_dump.clone(), plan.staged_dump.clone()]
                .into_iter()
                .flatten()
                .collect();
            let mut ok = false;
            let mut last_error = None;
            for dump in &candidates {
                if !dump.is_file() {
                    continue;
                }
                match bh_db::import(&conn, dump).await {
                    Ok(_) => {
                        info!("database rolled back from {}", dump.display());
                        ok = true;
                        break;
                    }
                    Err(e) => last_error = Some(e.to_string()),
                }
            }
            if !ok {
                match last_error {
                    Some(e) => errors.push(format!("database rollback import failed: {e}")),
                    None => errors.push("no dump available for database rollback".into()),
                }
            }
            meta.db_restored = Some(ok);
        }

        let status = if errors.is_empty() {
            StepStatus::Ok
        } else {
            error!("rollback completed with errors: {}", errors.join("; "));
            StepStatus::Failed
        };
        if !errors.is_empty() {
            meta.error = Some(self.redactor.scrub(&errors.join("; ")));
        }
        let note = format!(
            "files_restored={:?} db_restored={:?}",
            meta.files_restored, meta.db_restored
        );
        let _ = ctx.step_entry(
            StepName::Rollback,
            status,
            StepMeta {
                note: Some(note),
                ..StepMeta::default()
            },
        );
        meta
    }
}
