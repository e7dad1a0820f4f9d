// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock store trait and the in-memory implementation.

use crate::info::OperationLockInfo;
use bh_core::{Clock, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock info serialization: {0}")]
    Json(#[from] serde_json::Error),
}

/// A shared TTL store holding the mutex and its info record.
///
/// Object-safe so the engine can take `Arc<dyn LockStore>`. The store owns
/// the clock; TTL math and staleness checks use the store's time so tests
/// can drive a fake clock.
pub trait LockStore: Send + Sync {
    /// Attempt the mutex once. `true` on success. An expired holder's
    /// claim is reclaimable.
    fn try_acquire(&self, key: &str, ttl_secs: u64) -> Result<bool, LockError>;

    /// Release the mutex. Idempotent.
    fn release(&self, key: &str) -> Result<(), LockError>;

    /// Read the info record; an expired record reads as absent.
    fn read_info(&self, key: &str) -> Result<Option<OperationLockInfo>, LockError>;

    /// Persist the info record with its TTL.
    fn write_info(&self, key: &str, info: &OperationLockInfo) -> Result<(), LockError>;

    /// Delete the info record. Idempotent.
    fn delete_info(&self, key: &str) -> Result<(), LockError>;

    /// Unconditionally clear both mutex and info record. Operator escape
    /// hatch only.
    fn force_clear(&self, key: &str) -> Result<(), LockError>;

    fn now_epoch_secs(&self) -> u64;
}

#[derive(Default)]
struct MemoryState {
    /// key → mutex claim expiry (epoch seconds).
    claims: HashMap<String, u64>,
    infos: HashMap<String, OperationLockInfo>,
}

/// In-process lock store for tests.
pub struct MemoryLockStore<C: Clock = SystemClock> {
    state: Mutex<MemoryState>,
    clock: C,
}

impl MemoryLockStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryLockStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryLockStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }
}

impl<C: Clock> LockStore for MemoryLockStore<C> {
    fn try_acquire(&self, key: &str, ttl_secs: u64) -> Result<bool, LockError> {
        let now = self.clock.epoch_secs();
        let mut state = self.state.lock();
        match state.claims.get(key) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                state.claims.insert(key.to_string(), now + ttl_secs);
                Ok(true)
            }
        }
    }

    fn release(&self, key: &str) -> Result<(), LockError> {
        self.state.lock().claims.remove(key);
        Ok(())
    }

    fn read_info(&self, key: &str) -> Result<Option<OperationLockInfo>, LockError> {
        let now = self.clock.epoch_secs();
        let state = self.state.lock();
        Ok(state
            .infos
            .get(key)
            .filter(|info| !info.expired(now))
            .cloned())
    }

    fn write_info(&self, key: &str, info: &OperationLockInfo) -> Result<(), LockError> {
        let mut state = self.state.lock();
        state.infos.insert(key.to_string(), info.clone());
        // A heartbeat re-persist also extends the mutex claim.
        state.claims.insert(key.to_string(), info.expires_at);
        Ok(())
    }

    fn delete_info(&self, key: &str) -> Result<(), LockError> {
        self.state.lock().infos.remove(key);
        Ok(())
    }

    fn force_clear(&self, key: &str) -> Result<(), LockError> {
        let mut state = self.state.lock();
        state.claims.remove(key);
        state.infos.remove(key);
        Ok(())
    }

    fn now_epoch_secs(&self) -> u64 {
        self.clock.epoch_secs()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
