// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bh-lock: the single named operation lock.
//!
//! One mutex serializes backup, restore, forget, and export globally.
//! Next to the mutex lives an info record (holder, heartbeats, context)
//! that collaborators read to display "operation in progress". The two
//! stay consistent under one invariant: the info record exists only while
//! the mutex is held.
//!
//! The lock is an injected service behind [`LockStore`], not a process
//! mutex: worker processes on the same host coordinate through the
//! file-backed store, and a clustered deployment can supply its own
//! TTL store.

pub mod fs_store;
pub mod info;
pub mod lock;
pub mod store;

pub use fs_store::FsLockStore;
pub use info::OperationLockInfo;
pub use lock::{LockHandle, OperationLock, DEFAULT_LOCK_KEY};
pub use store::{LockError, LockStore, MemoryLockStore};
