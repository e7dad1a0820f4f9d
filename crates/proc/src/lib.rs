// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bh-proc: subprocess command runner.
//!
//! Wraps `tokio::process` with the pieces every Backhaul pipeline needs:
//! size-capped output capture, wall-clock duration, a hard timeout that
//! kills the child, an optional periodic heartbeat callback for lock
//! refresh during long runs, and optional JSON/NDJSON parsing of stdout.

pub mod result;
pub mod runner;

pub use result::{quote_arg, ProcessResult};
pub use runner::{CommandRunner, CommandSpec, Heartbeat, HeartbeatFn, RunnerError};
