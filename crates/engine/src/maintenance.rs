// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maintenance mode: a flag file with a per-run bypass secret.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Flag location relative to the project root.
const FLAG_REL: &str = "storage/framework/down";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceFlag {
    pub time: i64,
    pub secret: String,
}

/// Whether an up/down call changed anything. "Already down" and "already
/// up" are success, not failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceChange {
    Changed,
    Already,
}

#[derive(Clone)]
pub struct Maintenance {
    flag_path: PathBuf,
}

impl Maintenance {
    pub fn new(project_root: &Path) -> Self {
        Self {
            flag_path: project_root.join(FLAG_REL),
        }
    }

    pub fn flag_path(&self) -> &Path {
        &self.flag_path
    }

    /// Project-relative flag path, for sync excludes.
    pub fn flag_rel() -> &'static str {
        FLAG_REL
    }

    /// Random bypass secret recorded in the run's meta so an operator can
    /// inspect the site mid-restore.
    pub fn generate_secret() -> String {
        nanoid::nanoid!(32)
    }

    pub fn is_down(&self) -> bool {
        self.flag_path.is_file()
    }

    /// Enable maintenance mode.
    pub fn down(&self, secret: &str) -> io::Result<MaintenanceChange> {
        if self.is_down() {
            return Ok(MaintenanceChange::Already);
        }
        if let Some(parent) = self.flag_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let flag = MaintenanceFlag {
            time: Utc::now().timestamp(),
            secret: secret.to_string(),
        };
        let body = serde_json::to_vec_pretty(&flag)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.flag_path, body)?;
        Ok(MaintenanceChange::Changed)
    }

    /// Disable maintenance mode.
    pub fn up(&self) -> io::Result<MaintenanceChange> {
        match std::fs::remove_file(&self.flag_path) {
            Ok(()) => Ok(MaintenanceChange::Changed),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(MaintenanceChange::Already),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
