// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bh-engine: the pipelines.
//!
//! Four pipelines (backup, restore, full export, delta export) plus the
//! forget and cleanup jobs. Each runs as one queued unit of work with
//! strictly sequential steps under the single operation lock, persisting
//! step metadata to the run record before advancing so a crash leaves a
//! useful trail.

pub mod backup;
pub mod cleanup;
pub mod engine;
pub mod error;
pub mod export;
pub mod forget;
pub mod fsutil;
pub mod maintenance;
pub mod outcome;
pub mod restore;
pub mod run_ctx;

#[cfg(test)]
pub(crate) mod test_support;

pub use backup::BackupOptions;
pub use cleanup::CleanupReport;
pub use engine::Engine;
pub use error::EngineError;
pub use export::FullExportOptions;
pub use fsutil::{FsProbe, SystemFsProbe};
pub use outcome::Disposition;
pub use restore::{CutoverMode, RestoreOptions, RestoreScope};
