// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn read_before_any_write_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = BaselineStore::new(dir.path());
    assert!(store.read().unwrap().is_none());
}

#[test]
fn write_then_read_roundtrips_and_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let store = BaselineStore::new(dir.path());

    let first = ExportBaseline {
        snapshot_id: "aaaa1111bbbb".to_string(),
        short_id: "aaaa1111".to_string(),
        recorded_at: Utc::now(),
    };
    store.write(&first).unwrap();
    assert_eq!(store.read().unwrap().unwrap(), first);

    let second = ExportBaseline {
        snapshot_id: "cccc2222dddd".to_string(),
        short_id: "cccc2222".to_string(),
        recorded_at: Utc::now(),
    };
    store.write(&second).unwrap();
    assert_eq!(store.read().unwrap().unwrap(), second);
}
