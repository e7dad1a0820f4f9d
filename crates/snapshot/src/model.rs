// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot-tool data models: list entries, id resolution, diff parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runner::SnapError;

/// One entry from `snapshots --json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(default)]
    pub short_id: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub hostname: String,
}

impl Snapshot {
    /// Display id: the tool's own short id when present, else an 8-char
    /// prefix of the full id.
    pub fn short(&self) -> &str {
        if self.short_id.is_empty() {
            bh_core::short(&self.id, 8)
        } else {
            &self.short_id
        }
    }

    fn matches(&self, query: &str) -> bool {
        self.id == query || self.short_id == query || self.id.starts_with(query)
    }
}

/// Resolve a snapshot by full id, short id, or unique prefix.
pub fn resolve_snapshot<'a>(
    snapshots: &'a [Snapshot],
    query: &str,
) -> Result<&'a Snapshot, SnapError> {
    if query.is_empty() {
        return Err(SnapError::NotFound {
            query: query.to_string(),
        });
    }
    let mut matches = snapshots.iter().filter(|s| s.matches(query));
    let Some(first) = matches.next() else {
        return Err(SnapError::NotFound {
            query: query.to_string(),
        });
    };
    if matches.next().is_some() {
        return Err(SnapError::Ambiguous {
            query: query.to_string(),
        });
    }
    Ok(first)
}

/// Path-level difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl SnapshotDiff {
    /// Parse line-oriented diff output: `<marker> <path>` with `+`/`-`/`M`
    /// markers (`A`/`D` aliases accepted). Summary and metadata lines are
    /// ignored.
    pub fn parse(text: &str) -> Self {
        let mut diff = SnapshotDiff::default();
        for line in text.lines() {
            let Some((marker, rest)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            let path = rest.trim_start();
            if path.is_empty() {
                continue;
            }
            match marker {
                "+" | "A" => diff.added.push(path.to_string()),
                "-" | "D" => diff.deleted.push(path.to_string()),
                "M" => diff.modified.push(path.to_string()),
                _ => {}
            }
        }
        diff
    }

    /// Paths that exist in the target snapshot (added + modified).
    pub fn changed_paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
