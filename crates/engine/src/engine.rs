// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared pipeline dependencies.

use std::sync::Arc;

use bh_core::{Redactor, Settings};
use bh_lock::{LockStore, OperationLock};
use bh_snapshot::SnapshotTool;
use bh_storage::{BaselineStore, ExportRegistry, RunStore};

use crate::fsutil::{FsProbe, SystemFsProbe};

/// Everything the pipelines share: the settings snapshot for this run,
/// the operation lock, the audit stores, and the snapshot tool.
pub struct Engine {
    pub settings: Settings,
    pub lock: OperationLock,
    pub runs: RunStore,
    pub baseline: BaselineStore,
    pub exports: ExportRegistry,
    pub snap: SnapshotTool,
    pub redactor: Redactor,
    pub(crate) fs_probe: Arc<dyn FsProbe>,
}

impl Engine {
    pub fn new(settings: Settings, lock_store: Arc<dyn LockStore>) -> Self {
        let state_dir = settings.app.state_dir.clone();
        let snap = SnapshotTool::new(&settings);
        let redactor = Redactor::new(settings.secret_values());
        Self {
            lock: OperationLock::new(lock_store),
            runs: RunStore::new(&state_dir),
            baseline: BaselineStore::new(&state_dir),
            exports: ExportRegistry::new(&state_dir),
            snap,
            redactor,
            settings,
            fs_probe: Arc::new(SystemFsProbe),
        }
    }

    /// Swap the filesystem probe (tests).
    pub fn with_fs_probe(mut self, probe: Arc<dyn FsProbe>) -> Self {
        self.fs_probe = probe;
        self
    }

    /// Standard tags on every snapshot this engine creates.
    pub(crate) fn snapshot_tags(&self, trigger: &str, extra: &[String]) -> Vec<String> {
        let mut tags = vec![
            format!("app:{}", self.settings.app.name),
            format!("env:{}", self.settings.app.environment),
            format!("host:{}", local_hostname()),
            format!("trigger:{trigger}"),
            "type:backup".to_string(),
        ];
        tags.extend(self.settings.backup.tags.iter().cloned());
        tags.extend(extra.iter().cloned());
        tags
    }

    /// Snapshot excludes: configured patterns plus the environment file,
    /// which is deliberately never captured.
    pub(crate) fn snapshot_excludes(&self) -> Vec<String> {
        let mut excludes = self.settings.backup.exclude.clone();
        excludes.push(
            self.settings
                .app
                .project_root
                .join(&self.settings.restore.env_file)
                .display()
                .to_string(),
        );
        excludes
    }
}

pub(crate) fn local_hostname() -> String {
    if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}
