// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline-boundary errors.
//!
//! Step outcomes travel through the pipelines as recorded results; only
//! at the outer boundary do they become a raised [`EngineError`] for the
//! queue or CLI to observe.

use bh_core::{ConfigError, FailureKind, StepName};
use bh_db::DbError;
use bh_lock::LockError;
use bh_proc::RunnerError;
use bh_snapshot::SnapError;
use bh_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A pipeline step failed; the run record already carries the
    /// redacted detail.
    #[error("step {step} failed ({kind}): {message}")]
    Step {
        step: StepName,
        kind: FailureKind,
        message: String,
    },
}

/// Classify a snapshot-tool error for the audit record. The message for
/// process failures already went through the tool's redactor.
pub(crate) fn classify_snap(err: &SnapError) -> (FailureKind, String) {
    match err {
        SnapError::Config(e) => (FailureKind::Config, e.to_string()),
        SnapError::Process { message, hint, .. } => {
            let message = match hint {
                Some(hint) => format!("{message} (hint: {hint})"),
                None => message.clone(),
            };
            (FailureKind::Process, message)
        }
        SnapError::Runner(e) => (FailureKind::Process, e.to_string()),
        SnapError::NotFound { .. }
        | SnapError::Ambiguous { .. }
        | SnapError::EmptyPolicy
        | SnapError::Malformed(_) => (FailureKind::Runtime, err.to_string()),
    }
}

pub(crate) fn classify_db(err: &DbError) -> (FailureKind, String) {
    match err {
        DbError::Config(e) => (FailureKind::Config, e.to_string()),
        DbError::Process { .. } => (FailureKind::Process, err.to_string()),
        DbError::Runner(RunnerError::TimedOut { .. }) => (FailureKind::Process, err.to_string()),
        DbError::Runner(_) | DbError::Io(_) | DbError::EmptyDump(_) => {
            (FailureKind::Runtime, err.to_string())
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
