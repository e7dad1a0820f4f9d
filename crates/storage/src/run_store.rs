// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run record persistence.

use bh_core::{RunId, RunRecord, RunStatus, RunType};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state io: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization: {0}")]
    Json(#[from] serde_json::Error),
    #[error("run {0} not found")]
    NotFound(String),
}

/// Filters for listing run records.
#[derive(Debug, Clone, Default)]
pub struct RunQuery {
    pub run_type: Option<RunType>,
    pub status: Option<RunStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl RunQuery {
    fn matches(&self, record: &RunRecord) -> bool {
        if self.run_type.is_some_and(|t| t != record.run_type) {
            return false;
        }
        if self.status.is_some_and(|s| s != record.status) {
            return false;
        }
        if self.since.is_some_and(|since| record.started_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| record.started_at > until) {
            return false;
        }
        true
    }
}

/// One JSON file per run under `<state>/runs/`.
#[derive(Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("runs"),
        }
    }

    fn path_for(&self, id: &RunId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Persist the record. Called after every step-meta merge so a crash
    /// leaves a partial-but-useful trail on disk.
    pub fn save(&self, record: &RunRecord) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&record.id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn load(&self, id: &RunId) -> Result<RunRecord, StoreError> {
        let path = self.path_for(id);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    /// Matching records, newest first.
    pub fn list(&self, query: &RunQuery) -> Result<Vec<RunRecord>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<RunRecord>(&text) {
                Ok(record) => {
                    if query.matches(&record) {
                        records.push(record);
                    }
                }
                Err(e) => warn!(path = %path.display(), "skipping unreadable run record: {e}"),
            }
        }

        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

#[cfg(test)]
#[path = "run_store_tests.rs"]
mod tests;
