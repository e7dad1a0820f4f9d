// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline dispositions and lock-contention backoff.

use bh_core::RunRecord;
use std::time::Duration;

/// Increasing backoff delays for pipelines that self-requeue on lock
/// contention. Attempts past the table reuse the last delay.
const BACKOFF_SECS: [u64; 4] = [15, 60, 180, 600];

pub fn backoff_delay(attempt: u32) -> Duration {
    let idx = (attempt as usize).min(BACKOFF_SECS.len() - 1);
    Duration::from_secs(BACKOFF_SECS[idx])
}

/// What became of a pipeline invocation.
#[derive(Debug)]
pub enum Disposition {
    /// Ran to completion; the terminal record is attached.
    Completed(RunRecord),
    /// Lock contention: the caller should re-enqueue after `delay`.
    /// No audit record is created for a requeue.
    Requeue { attempt: u32, delay: Duration },
    /// Recorded as skipped (restore under contention); no mutation ran.
    Skipped(RunRecord),
}

impl Disposition {
    pub fn record(&self) -> Option<&RunRecord> {
        match self {
            Disposition::Completed(record) | Disposition::Skipped(record) => Some(record),
            Disposition::Requeue { .. } => None,
        }
    }
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
