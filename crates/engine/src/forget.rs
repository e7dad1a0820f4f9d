// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Standalone retention run (forget + prune).

use std::sync::Arc;
use std::time::Duration;

use bh_core::{RunType, StepName};
use tracing::warn;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::outcome::{backoff_delay, Disposition};
use crate::run_ctx::RunCtx;

impl Engine {
    pub async fn run_forget(&self, attempt: u32) -> Result<Disposition, EngineError> {
        let ttl = self.settings.backup.max_duration_secs;
        let Some(handle) = self
            .lock
            .acquire(RunType::ForgetSnapshot, ttl, Duration::from_secs(5), &[])
            .await?
        else {
            return Ok(Disposition::Requeue {
                attempt: attempt + 1,
                delay: backoff_delay(attempt),
            });
        };
        let handle = Arc::new(handle);
        let mut ctx = RunCtx::begin(
            RunType::ForgetSnapshot,
            self.runs.clone(),
            self.redactor.clone(),
            Arc::clone(&handle),
        )?;

        ctx.heartbeat(StepName::Forget);
        let outcome = match self.snap.forget(&self.settings.retention, true).await {
            Ok(result) => ctx.step_process(StepName::Forget, &result),
            Err(e) => Err(ctx.fail_snap(StepName::Forget, &e)),
        };

        if let Err(e) = handle.release() {
            warn!("lock release failed: {e}");
        }
        match outcome {
            Ok(()) => Ok(Disposition::Completed(ctx.succeed()?)),
            Err(e) => Err(e),
        }
    }
}
