// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error vocabulary.
//!
//! Each crate defines its own error enum; the types here are the pieces
//! that cross crate boundaries: the configuration error that names exactly
//! which settings fields are missing, and the failure-kind tag recorded
//! into a run's audit meta.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One or more required settings fields are absent.
///
/// Raised before any subprocess is spawned or any filesystem mutation is
/// attempted. Never retried; the operator has to fix configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("missing required settings: {}", fields.join(", "))]
pub struct ConfigError {
    /// Dotted settings paths, e.g. `repository.password`.
    pub fields: Vec<String>,
}

impl ConfigError {
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Classification of a recorded run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing settings; surfaced immediately, never retried.
    Config,
    /// Non-zero subprocess exit.
    Process,
    /// Assertion-style failure: staging validation, insufficient space,
    /// filesystem mismatch, snapshot not found.
    Runtime,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FailureKind::Config => "config",
            FailureKind::Process => "process",
            FailureKind::Runtime => "runtime",
        })
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
