// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::outcome::Disposition;
use crate::test_support::TestProject;
use bh_core::{RunStatus, RunType};
use bh_lock::MemoryLockStore;
use bh_storage::RunQuery;
use std::os::unix::fs::PermissionsExt as _;
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn archive_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).expect("open archive");
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive
        .entries()
        .expect("entries")
        .map(|e| {
            e.expect("entry")
                .path()
                .expect("path")
                .display()
                .to_string()
        })
        .collect()
}

pub(crate) fn read_archive_file(path: &Path, name_suffix: &str) -> Option<String> {
    let file = std::fs::File::open(path).expect("open archive");
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries().expect("entries") {
        let mut entry = entry.expect("entry");
        let entry_path = entry.path().expect("path").display().to_string();
        if entry_path.ends_with(name_suffix) {
            let mut body = String::new();
            std::io::Read::read_to_string(&mut entry, &mut body).expect("read");
            return Some(body);
        }
    }
    None
}

#[tokio::test]
async fn full_export_builds_a_registered_checksummed_bundle() {
    let project = TestProject::new();
    project.prepare_restore_payload();
    let engine = project.engine();

    let Disposition::Completed(record) = engine
        .run_export_full(FullExportOptions::default())
        .await
        .unwrap()
    else {
        panic!("expected completion");
    };
    assert_eq!(record.status, RunStatus::Success);
    assert_eq!(record.run_type, RunType::ExportFull);

    let bundle = record.meta.bundle.as_ref().unwrap();
    assert!(bundle.path.is_file());
    assert_eq!(bundle.size_bytes, std::fs::metadata(&bundle.path).unwrap().len());
    assert_eq!(bundle.sha256.len(), 64);

    // 0640 on the archive.
    let mode = std::fs::metadata(&bundle.path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o640);

    // Bundle layout: top-level folder with README, manifest, TOOLS, and
    // the project tree; the environment file is stripped.
    let name = bundle
        .path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .trim_end_matches(".tar.gz")
        .to_string();
    assert!(name.starts_with("demo-test-full-aabbccdd-"));
    let entries = archive_entries(&bundle.path);
    assert!(entries.contains(&format!("{name}/README.txt")));
    assert!(entries.contains(&format!("{name}/manifest.json")));
    assert!(entries.contains(&format!("{name}/TOOLS/restore.sh")));
    assert!(entries.contains(&format!("{name}/TOOLS/restore.ps1")));
    assert!(entries.contains(&format!("{name}/index.php")));
    assert!(!entries.iter().any(|e| e.ends_with("/.env")));

    let manifest = read_archive_file(&bundle.path, "manifest.json").unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(manifest["snapshot_id"], "aabbccdd11223344");

    // Baseline recorded for future deltas; export registered for cleanup.
    let baseline = engine.baseline.read().unwrap().unwrap();
    assert_eq!(baseline.snapshot_id, "aabbccdd11223344");
    let registry = engine.exports.list().unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry[0].bundle, bundle.path);

    // Scratch cleaned up.
    let leftovers: Vec<_> = std::fs::read_dir(&engine.settings.app.state_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".bh-export-"))
        .collect();
    assert!(leftovers.is_empty());
    assert!(engine.lock.read_info().unwrap().is_none());
}

#[tokio::test]
async fn explicit_snapshot_export_records_export_snapshot_type() {
    let project = TestProject::new();
    project.prepare_restore_payload();
    let engine = project.engine();

    let Disposition::Completed(record) = engine
        .run_export_full(FullExportOptions {
            snapshot: Some("aabbccdd".to_string()),
            ..FullExportOptions::default()
        })
        .await
        .unwrap()
    else {
        panic!("expected completion");
    };
    assert_eq!(record.run_type, RunType::ExportSnapshot);
    assert_eq!(record.meta.snapshot_id.as_deref(), Some("aabbccdd11223344"));
}

#[tokio::test]
async fn include_env_keeps_the_environment_file() {
    let project = TestProject::new();
    let payload = project.prepare_restore_payload();
    std::fs::write(payload.join(".env"), "APP_KEY=snapshotted").unwrap();
    let engine = project.engine();

    let Disposition::Completed(record) = engine
        .run_export_full(FullExportOptions {
            include_env: true,
            ..FullExportOptions::default()
        })
        .await
        .unwrap()
    else {
        panic!("expected completion");
    };
    let bundle = record.meta.bundle.as_ref().unwrap();
    assert!(archive_entries(&bundle.path)
        .iter()
        .any(|e| e.ends_with("/.env")));
}

#[tokio::test]
async fn contended_export_requeues() {
    let project = TestProject::new();
    let store = Arc::new(MemoryLockStore::new());
    let engine = project.engine_with(store.clone());
    let _held = engine
        .lock
        .acquire(RunType::Backup, 600, Duration::ZERO, &[])
        .await
        .unwrap()
        .unwrap();

    let disposition = engine
        .run_export_full(FullExportOptions::default())
        .await
        .unwrap();
    assert!(matches!(disposition, Disposition::Requeue { .. }));
    assert!(engine.runs.list(&RunQuery::default()).unwrap().is_empty());
}

#[tokio::test]
async fn failed_packaging_leaves_no_partial_archive() {
    let project = TestProject::new();
    // Payload without the project subtree → restore step fails to locate
    // the root and the run aborts before packaging.
    std::fs::create_dir_all(project.stub_dir.join("payload/unrelated")).unwrap();
    let engine = project.engine();

    let err = engine
        .run_export_full(FullExportOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Step { .. }));

    let export_dir = engine.settings.export_dir();
    let archives: Vec<_> = std::fs::read_dir(&export_dir)
        .map(|it| it.filter_map(|e| e.ok()).collect())
        .unwrap_or_default();
    assert!(archives.is_empty());
    assert!(engine.exports.list().unwrap().is_empty());
}
