// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bh_core::{FakeClock, RunType};
use std::time::Duration;

const KEY: &str = "backhaul:operation";

#[test]
fn second_acquire_fails_while_claim_live() {
    let store = MemoryLockStore::new();
    assert!(store.try_acquire(KEY, 600).unwrap());
    assert!(!store.try_acquire(KEY, 600).unwrap());
    store.release(KEY).unwrap();
    assert!(store.try_acquire(KEY, 600).unwrap());
}

#[test]
fn expired_claim_is_reclaimable() {
    let clock = FakeClock::new();
    let store = MemoryLockStore::with_clock(clock.clone());
    assert!(store.try_acquire(KEY, 60).unwrap());
    clock.advance(Duration::from_secs(61));
    assert!(store.try_acquire(KEY, 60).unwrap());
}

#[test]
fn expired_info_reads_as_absent() {
    let clock = FakeClock::new();
    let store = MemoryLockStore::with_clock(clock.clone());
    let info = OperationLockInfo::new(RunType::Backup, 60, store.now_epoch_secs());
    store.write_info(KEY, &info).unwrap();

    assert!(store.read_info(KEY).unwrap().is_some());
    clock.advance(Duration::from_secs(61));
    assert!(store.read_info(KEY).unwrap().is_none());
}

#[test]
fn force_clear_removes_claim_and_info() {
    let store = MemoryLockStore::new();
    assert!(store.try_acquire(KEY, 600).unwrap());
    let info = OperationLockInfo::new(RunType::Backup, 600, store.now_epoch_secs());
    store.write_info(KEY, &info).unwrap();

    store.force_clear(KEY).unwrap();
    assert!(store.read_info(KEY).unwrap().is_none());
    assert!(store.try_acquire(KEY, 600).unwrap());
}
