// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bh_core::{StepMeta, StepName, StepStatus};
use chrono::Duration;

fn store() -> (tempfile::TempDir, RunStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::new(dir.path());
    (dir, store)
}

fn finished(run_type: RunType, status: RunStatus, started_at: DateTime<Utc>) -> RunRecord {
    let mut rec = RunRecord::begin(run_type, started_at);
    rec.finish(status, started_at + Duration::seconds(5));
    rec
}

#[test]
fn save_and_load_roundtrip() {
    let (_dir, store) = store();
    let mut rec = RunRecord::begin(RunType::Backup, Utc::now());
    rec.push_step(
        StepName::Dump,
        StepStatus::Ok,
        StepMeta {
            exit_code: Some(0),
            ..StepMeta::default()
        },
    );
    store.save(&rec).unwrap();

    let loaded = store.load(&rec.id).unwrap();
    assert_eq!(loaded, rec);
}

#[test]
fn resave_after_each_step_overwrites_in_place() {
    let (_dir, store) = store();
    let mut rec = RunRecord::begin(RunType::Backup, Utc::now());
    store.save(&rec).unwrap();

    rec.push_step(StepName::Dump, StepStatus::Ok, StepMeta::default());
    store.save(&rec).unwrap();
    rec.push_step(StepName::Snapshot, StepStatus::Ok, StepMeta::default());
    store.save(&rec).unwrap();

    let loaded = store.load(&rec.id).unwrap();
    assert_eq!(loaded.meta.steps.len(), 2);
    assert_eq!(store.list(&RunQuery::default()).unwrap().len(), 1);
}

#[test]
fn load_missing_run_is_not_found() {
    let (_dir, store) = store();
    let err = store.load(&RunId::from_string("run-missing")).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn list_filters_by_type_and_status_newest_first() {
    let (_dir, store) = store();
    let base = Utc::now();
    let old_backup = finished(RunType::Backup, RunStatus::Success, base - Duration::hours(2));
    let new_backup = finished(RunType::Backup, RunStatus::Failed, base - Duration::hours(1));
    let restore = finished(RunType::Restore, RunStatus::Skipped, base);
    for rec in [&old_backup, &new_backup, &restore] {
        store.save(rec).unwrap();
    }

    let backups = store
        .list(&RunQuery {
            run_type: Some(RunType::Backup),
            ..RunQuery::default()
        })
        .unwrap();
    assert_eq!(backups.len(), 2);
    assert_eq!(backups[0].id, new_backup.id);

    let failed = store
        .list(&RunQuery {
            status: Some(RunStatus::Failed),
            ..RunQuery::default()
        })
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, new_backup.id);
}

#[test]
fn list_honors_time_range_and_limit() {
    let (_dir, store) = store();
    let base = Utc::now();
    for hours in 1..=5 {
        store
            .save(&finished(
                RunType::Backup,
                RunStatus::Success,
                base - Duration::hours(hours),
            ))
            .unwrap();
    }

    let recent = store
        .list(&RunQuery {
            since: Some(base - Duration::hours(3)),
            ..RunQuery::default()
        })
        .unwrap();
    assert_eq!(recent.len(), 3);

    let limited = store
        .list(&RunQuery {
            limit: Some(2),
            ..RunQuery::default()
        })
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[test]
fn unreadable_records_are_skipped_not_fatal() {
    let (dir, store) = store();
    store
        .save(&finished(RunType::Backup, RunStatus::Success, Utc::now()))
        .unwrap();
    std::fs::write(dir.path().join("runs/garbage.json"), "{ nope").unwrap();

    assert_eq!(store.list(&RunQuery::default()).unwrap().len(), 1);
}
