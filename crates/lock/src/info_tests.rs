// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bh_core::RunType;

#[test]
fn new_info_sets_expiry_from_ttl() {
    let info = OperationLockInfo::new(RunType::Backup, 600, 1_000);
    assert_eq!(info.expires_at, 1_600);
    assert_eq!(info.last_heartbeat_at, 1_000);
    assert!(!info.expired(1_599));
    assert!(info.expired(1_600));
}

#[test]
fn heartbeat_merges_context_and_refreshes_expiry() {
    let mut info = OperationLockInfo::new(RunType::Restore, 600, 1_000);
    info.heartbeat(&[("step".to_string(), "preflight".to_string())], 1_100);
    info.heartbeat(&[("step".to_string(), "staged_restore".to_string())], 1_200);

    assert_eq!(info.context.get("step").map(String::as_str), Some("staged_restore"));
    assert_eq!(info.last_heartbeat_at, 1_200);
    assert_eq!(info.expires_at, 1_800);
}

#[test]
fn serializes_run_type_under_type_key() {
    let info = OperationLockInfo::new(RunType::ExportDelta, 60, 0);
    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["type"], "export_delta");
    assert!(json.get("run_id").is_none());
}
