// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::MemoryLockStore;
use bh_core::{FakeClock, RunType};

fn lock_with_clock() -> (FakeClock, OperationLock) {
    let clock = FakeClock::new();
    let store = Arc::new(MemoryLockStore::with_clock(clock.clone()));
    (clock, OperationLock::new(store))
}

#[tokio::test]
async fn acquire_writes_info_and_release_deletes_it() {
    let (_clock, lock) = lock_with_clock();
    let handle = lock
        .acquire(RunType::Backup, 600, Duration::ZERO, &[])
        .await
        .unwrap()
        .unwrap();

    let info = lock.read_info().unwrap().unwrap();
    assert_eq!(info.run_type, RunType::Backup);
    assert_eq!(info.ttl_seconds, 600);
    assert_eq!(info.pid, std::process::id());

    handle.release().unwrap();
    assert!(lock.read_info().unwrap().is_none());

    // Mutex free again.
    assert!(lock
        .acquire(RunType::Restore, 600, Duration::ZERO, &[])
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn contended_acquire_returns_none_after_block_window() {
    let (_clock, lock) = lock_with_clock();
    let _held = lock
        .acquire(RunType::Backup, 600, Duration::ZERO, &[])
        .await
        .unwrap()
        .unwrap();

    let second = lock
        .acquire(RunType::Restore, 600, Duration::from_millis(300), &[])
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn blocked_acquire_proceeds_once_holder_releases() {
    let (_clock, lock) = lock_with_clock();
    let held = lock
        .acquire(RunType::Backup, 600, Duration::ZERO, &[])
        .await
        .unwrap()
        .unwrap();

    let contender = lock.clone();
    let waiter = tokio::spawn(async move {
        contender
            .acquire(RunType::ExportFull, 600, Duration::from_secs(5), &[])
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    held.release().unwrap();

    let acquired = waiter.await.unwrap().unwrap();
    assert!(acquired.is_some());
}

#[tokio::test]
async fn set_run_id_is_visible_to_readers() {
    let (_clock, lock) = lock_with_clock();
    let handle = lock
        .acquire(RunType::Backup, 600, Duration::ZERO, &[])
        .await
        .unwrap()
        .unwrap();
    let run_id = bh_core::RunId::from_string("run-test123");
    handle.set_run_id(&run_id).unwrap();

    let info = lock.read_info().unwrap().unwrap();
    assert_eq!(info.run_id, Some(run_id));
}

#[tokio::test]
async fn heartbeat_keeps_the_lock_fresh_past_its_original_ttl() {
    let (clock, lock) = lock_with_clock();
    let handle = lock
        .acquire(RunType::Restore, 60, Duration::ZERO, &[])
        .await
        .unwrap()
        .unwrap();

    clock.advance(Duration::from_secs(45));
    handle
        .heartbeat(&[("step".to_string(), "files_cutover".to_string())])
        .unwrap();
    clock.advance(Duration::from_secs(45));

    // 90s elapsed since acquire, but the heartbeat refreshed the TTL.
    let info = lock.read_info().unwrap().unwrap();
    assert_eq!(
        info.context.get("step").map(String::as_str),
        Some("files_cutover")
    );
    assert!(!lock.is_stale(60).unwrap());
}

#[tokio::test]
async fn stale_detection_uses_last_heartbeat() {
    let (clock, lock) = lock_with_clock();
    let _handle = lock
        .acquire(RunType::Backup, 3600, Duration::ZERO, &[])
        .await
        .unwrap()
        .unwrap();

    assert!(!lock.is_stale(300).unwrap());
    clock.advance(Duration::from_secs(301));
    assert!(lock.is_stale(300).unwrap());
}

#[tokio::test]
async fn absent_info_is_not_stale() {
    let (_clock, lock) = lock_with_clock();
    assert!(!lock.is_stale(0).unwrap());
}

#[tokio::test]
async fn force_release_clears_a_wedged_lock() {
    let (_clock, lock) = lock_with_clock();
    let handle = lock
        .acquire(RunType::Backup, 3600, Duration::ZERO, &[])
        .await
        .unwrap()
        .unwrap();

    lock.force_release().unwrap();
    assert!(lock.read_info().unwrap().is_none());
    assert!(lock
        .acquire(RunType::Restore, 600, Duration::ZERO, &[])
        .await
        .unwrap()
        .is_some());
    drop(handle);
}

#[tokio::test]
async fn dropping_the_handle_releases_as_a_safety_net() {
    let (_clock, lock) = lock_with_clock();
    {
        let _handle = lock
            .acquire(RunType::Backup, 600, Duration::ZERO, &[])
            .await
            .unwrap()
            .unwrap();
    }
    assert!(lock.read_info().unwrap().is_none());
}
