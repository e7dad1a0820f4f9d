// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Export registry: produced bundles and their deletion deadlines.

use crate::run_store::StoreError;
use bh_core::{RunId, RunType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub bundle: PathBuf,
    pub run_id: RunId,
    pub kind: RunType,
    pub created_at: DateTime<Utc>,
    /// The cleanup job removes the bundle file once this passes.
    pub delete_after: DateTime<Utc>,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Clone)]
pub struct ExportRegistry {
    path: PathBuf,
}

impl ExportRegistry {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("exports.json"),
        }
    }

    pub fn list(&self) -> Result<Vec<ExportEntry>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    pub fn add(&self, entry: ExportEntry) -> Result<(), StoreError> {
        let mut entries = self.list()?;
        entries.push(entry);
        self.save(&entries)
    }

    /// Keep only entries the predicate accepts, returning the removed ones.
    pub fn retain(
        &self,
        mut keep: impl FnMut(&ExportEntry) -> bool,
    ) -> Result<Vec<ExportEntry>, StoreError> {
        let entries = self.list()?;
        let (kept, removed): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| keep(e));
        self.save(&kept)?;
        Ok(removed)
    }

    fn save(&self, entries: &[ExportEntry]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "exports_tests.rs"]
mod tests;
