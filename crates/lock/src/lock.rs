// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Acquire / heartbeat / release over a [`LockStore`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bh_core::{RunId, RunType};
use parking_lot::Mutex;
use tracing::warn;

use crate::info::OperationLockInfo;
use crate::store::{LockError, LockStore};

/// The one cluster-wide key serializing all pipelines.
pub const DEFAULT_LOCK_KEY: &str = "backhaul:operation";

const ACQUIRE_POLL: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct OperationLock {
    store: Arc<dyn LockStore>,
    key: String,
}

impl OperationLock {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self::with_key(store, DEFAULT_LOCK_KEY)
    }

    pub fn with_key(store: Arc<dyn LockStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Attempt the mutex for up to `block`. On success the info record is
    /// written and a handle returned. `None` means the window elapsed;
    /// callers self-requeue rather than busy-wait.
    pub async fn acquire(
        &self,
        run_type: RunType,
        ttl_secs: u64,
        block: Duration,
        context: &[(String, String)],
    ) -> Result<Option<LockHandle>, LockError> {
        let deadline = Instant::now() + block;
        loop {
            if self.store.try_acquire(&self.key, ttl_secs)? {
                let now = self.store.now_epoch_secs();
                let mut info = OperationLockInfo::new(run_type, ttl_secs, now);
                for (k, v) in context {
                    info.context.insert(k.clone(), v.clone());
                }
                self.store.write_info(&self.key, &info)?;
                return Ok(Some(LockHandle {
                    store: Arc::clone(&self.store),
                    key: self.key.clone(),
                    info: Mutex::new(info),
                    released: AtomicBool::new(false),
                }));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(ACQUIRE_POLL).await;
        }
    }

    /// Info record of the current holder, if any.
    pub fn read_info(&self) -> Result<Option<OperationLockInfo>, LockError> {
        self.store.read_info(&self.key)
    }

    /// True when a holder's last heartbeat is older than `threshold_secs`.
    /// Used by the operator `unlock --stale-only` action; absent info is
    /// not stale.
    pub fn is_stale(&self, threshold_secs: u64) -> Result<bool, LockError> {
        let Some(info) = self.store.read_info(&self.key)? else {
            return Ok(false);
        };
        let now = self.store.now_epoch_secs();
        Ok(now.saturating_sub(info.last_heartbeat_at) > threshold_secs)
    }

    /// Unconditionally clear mutex and info record. Manual operator
    /// escape hatch only.
    pub fn force_release(&self) -> Result<(), LockError> {
        self.store.force_clear(&self.key)
    }
}

/// Proof of holding the mutex. Releasing deletes the info record first so
/// the "info implies held" invariant is never observably violated.
pub struct LockHandle {
    store: Arc<dyn LockStore>,
    key: String,
    info: Mutex<OperationLockInfo>,
    released: AtomicBool,
}

impl LockHandle {
    /// Associate the audit run with the lock for collaborators to display.
    pub fn set_run_id(&self, run_id: &RunId) -> Result<(), LockError> {
        let mut info = self.info.lock();
        info.run_id = Some(run_id.clone());
        self.store.write_info(&self.key, &info)
    }

    /// Merge a context patch, refresh `last_heartbeat_at`, and re-persist
    /// with the same TTL.
    pub fn heartbeat(&self, patch: &[(String, String)]) -> Result<(), LockError> {
        let now = self.store.now_epoch_secs();
        let mut info = self.info.lock();
        info.heartbeat(patch, now);
        self.store.write_info(&self.key, &info)
    }

    /// Release mutex and delete the info record. Idempotent.
    pub fn release(&self) -> Result<(), LockError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.store.delete_info(&self.key)?;
        self.store.release(&self.key)
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if !self.released.load(Ordering::SeqCst) {
            if let Err(e) = self.release() {
                warn!("operation lock release on drop failed: {e}");
            }
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
