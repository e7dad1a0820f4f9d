// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention cleanup jobs: expired export bundles and aged rollback
//! directories. Both support dry-run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::fsutil;

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
    pub dry_run: bool,
}

impl Engine {
    /// Remove export bundles past their deletion deadline. An explicit
    /// `older_than_days` overrides each entry's recorded deadline.
    pub fn cleanup_exports(
        &self,
        older_than_days: Option<u32>,
        dry_run: bool,
    ) -> Result<CleanupReport, EngineError> {
        let now = Utc::now();
        let mut report = CleanupReport {
            dry_run,
            ..CleanupReport::default()
        };

        let expired = |created_at: DateTime<Utc>, delete_after: DateTime<Utc>| match older_than_days
        {
            Some(days) => created_at + Duration::days(i64::from(days)) <= now,
            None => delete_after <= now,
        };

        if dry_run {
            for entry in self.exports.list()? {
                if expired(entry.created_at, entry.delete_after) {
                    report.removed.push(entry.bundle);
                } else {
                    report.kept.push(entry.bundle);
                }
            }
            return Ok(report);
        }

        let removed = self
            .exports
            .retain(|entry| !expired(entry.created_at, entry.delete_after))?;
        for entry in removed {
            match std::fs::remove_file(&entry.bundle) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(bundle = %entry.bundle.display(), "could not remove bundle: {e}"),
            }
            info!(bundle = %entry.bundle.display(), "expired export removed");
            report.removed.push(entry.bundle);
        }
        for entry in self.exports.list()? {
            report.kept.push(entry.bundle);
        }
        Ok(report)
    }

    /// Remove rollback and failed-restore directories older than the
    /// retention window, once the restore they belong to is confirmed
    /// done.
    pub fn cleanup_rollbacks(
        &self,
        older_than_days: Option<u32>,
        dry_run: bool,
    ) -> Result<CleanupReport, EngineError> {
        let days = older_than_days.unwrap_or(self.settings.restore.rollback_retention_days);
        let cutoff = std::time::SystemTime::now()
            .checked_sub(std::time::Duration::from_secs(u64::from(days) * 86_400))
            .unwrap_or(std::time::UNIX_EPOCH);

        let root = &self.settings.app.project_root;
        let parent = root.parent().unwrap_or(Path::new("/"));
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rollback_prefix = format!("{root_name}.rollback-");

        let mut report = CleanupReport {
            dry_run,
            ..CleanupReport::default()
        };
        let entries = match std::fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(bh_storage::StoreError::Io(e).into()),
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_rollback = name.starts_with(&rollback_prefix);
            let is_failed = name.starts_with("__failed_restore_");
            if !is_rollback && !is_failed {
                continue;
            }
            let path = entry.path();
            let old_enough = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|mtime| mtime <= cutoff)
                .unwrap_or(false);
            if !old_enough {
                report.kept.push(path);
                continue;
            }
            if dry_run {
                report.removed.push(path);
                continue;
            }
            match fsutil::remove_tree(&path) {
                Ok(()) => {
                    info!(dir = %path.display(), "aged rollback directory removed");
                    report.removed.push(path);
                }
                Err(e) => {
                    warn!(dir = %path.display(), "could not remove rollback dir: {e}");
                    report.kept.push(path);
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
