// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for pipeline tests: a throwaway web project, a stub
//! snapshot tool, and a deterministic filesystem probe.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bh_core::{DbDriver, Settings};
use bh_lock::{LockStore, MemoryLockStore};

use crate::engine::Engine;
use crate::fsutil::{FsProbe, GIB};

pub(crate) struct FakeFsProbe {
    pub free: u64,
    pub same_fs: bool,
}

impl FsProbe for FakeFsProbe {
    fn free_space(&self, _path: &Path) -> std::io::Result<u64> {
        Ok(self.free)
    }

    fn same_filesystem(&self, _a: &Path, _b: &Path) -> std::io::Result<bool> {
        Ok(self.same_fs)
    }
}

pub(crate) fn zstd_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut encoder = zstd::stream::Encoder::new(&mut out, 3).expect("zstd encoder");
    encoder.write_all(data).expect("zstd write");
    encoder.finish().expect("zstd finish");
    out
}

/// The stub script stands in for the snapshot tool: canned JSON fixtures,
/// restores replayed from a payload tree, every call appended to a log.
const STUB_SCRIPT: &str = r#"#!/bin/sh
STUB_DIR="$(cd "$(dirname "$0")" && pwd)"
cmd="$1"; shift 2>/dev/null || true
echo "$cmd $*" >> "$STUB_DIR/calls.log"
case "$cmd" in
  version) echo "restic 0.17.0 compiled with go1.22" ;;
  snapshots) cat "$STUB_DIR/snapshots.json" ;;
  stats) cat "$STUB_DIR/stats.json" ;;
  diff) cat "$STUB_DIR/diff.txt" 2>/dev/null || true ;;
  forget) : ;;
  backup) : ;;
  restore)
    target=""
    prev=""
    for a in "$@"; do
      if [ "$prev" = "--target" ]; then target="$a"; fi
      prev="$a"
    done
    [ -n "$target" ] || exit 1
    mkdir -p "$target"
    if [ -d "$STUB_DIR/payload" ]; then
      cp -R "$STUB_DIR/payload/." "$target/"
    fi
    ;;
  *) echo "stub: unknown command $cmd" >&2; exit 1 ;;
esac
exit 0
"#;

pub(crate) struct TestProject {
    pub dir: tempfile::TempDir,
    pub settings: Settings,
    pub stub_dir: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let project_root = dir.path().join("project");
        let state_dir = dir.path().join("state");
        let stub_dir = dir.path().join("stub");

        // A minimal live web project.
        std::fs::create_dir_all(project_root.join("vendor")).expect("mkdir");
        std::fs::create_dir_all(project_root.join("database")).expect("mkdir");
        std::fs::create_dir_all(project_root.join("public")).expect("mkdir");
        std::fs::create_dir_all(project_root.join("storage/framework")).expect("mkdir");
        std::fs::create_dir_all(project_root.join("storage/app/backhaul")).expect("mkdir");
        std::fs::write(project_root.join("index.php"), "<?php // live v1").expect("write");
        std::fs::write(project_root.join("composer.json"), "{}").expect("write");
        std::fs::write(project_root.join("vendor/autoload.php"), "<?php").expect("write");
        std::fs::write(project_root.join(".env"), "APP_KEY=live-env-secret").expect("write");
        std::fs::write(project_root.join("database/db.sqlite"), b"live database v1")
            .expect("write");

        std::fs::create_dir_all(&state_dir).expect("mkdir");
        std::fs::create_dir_all(&stub_dir).expect("mkdir");

        let stub_bin = stub_dir.join("restic");
        std::fs::write(&stub_bin, STUB_SCRIPT).expect("write stub");
        let mut perms = std::fs::metadata(&stub_bin).expect("stat").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&stub_bin, perms).expect("chmod");

        let mut settings = Settings::default();
        settings.app.name = "demo".to_string();
        settings.app.environment = "test".to_string();
        settings.app.project_root = project_root.clone();
        settings.app.state_dir = state_dir;
        settings.repository.url = "/backups/repo".to_string();
        settings.repository.password = "repo-pass".to_string();
        settings.repository.bin = stub_bin;
        settings.database.driver = DbDriver::Sqlite;
        settings.database.sqlite_path = Some(project_root.join("database/db.sqlite"));

        let project = Self {
            dir,
            settings,
            stub_dir,
        };
        project.set_snapshots_single("aabbccdd11223344", "aabbccdd");
        project.set_stats(1024);
        project
    }

    pub fn project_root(&self) -> PathBuf {
        self.settings.app.project_root.clone()
    }

    pub fn engine(&self) -> Engine {
        self.engine_with(Arc::new(MemoryLockStore::new()))
    }

    pub fn engine_with(&self, store: Arc<dyn LockStore>) -> Engine {
        Engine::new(self.settings.clone(), store).with_fs_probe(Arc::new(FakeFsProbe {
            free: 100 * GIB,
            same_fs: true,
        }))
    }

    pub fn set_snapshots(&self, json: &str) {
        std::fs::write(self.stub_dir.join("snapshots.json"), json).expect("write snapshots");
    }

    pub fn set_snapshots_single(&self, id: &str, short_id: &str) {
        let root = self.project_root();
        self.set_snapshots(&format!(
            r#"[{{"id":"{id}","short_id":"{short_id}","time":"2026-07-01T00:00:00Z","paths":["{}"],"tags":["app:demo"],"hostname":"web1"}}]"#,
            root.display()
        ));
    }

    pub fn set_stats(&self, total_size: u64) {
        std::fs::write(
            self.stub_dir.join("stats.json"),
            format!(r#"{{"total_size": {total_size}, "total_file_count": 10}}"#),
        )
        .expect("write stats");
    }

    pub fn set_diff(&self, text: &str) {
        std::fs::write(self.stub_dir.join("diff.txt"), text).expect("write diff");
    }

    /// Directory inside the stub payload mirroring the absolute project
    /// root, as the tool would restore it under `--target`.
    pub fn payload_project_dir(&self) -> PathBuf {
        let root = self.project_root();
        let rel = root.strip_prefix("/").unwrap_or(&root);
        self.stub_dir.join("payload").join(rel)
    }

    /// Build a valid restorable payload: markers, vendored runtime, a
    /// staged dump, and a changed index.php.
    pub fn prepare_restore_payload(&self) -> PathBuf {
        let payload = self.payload_project_dir();
        std::fs::create_dir_all(payload.join("vendor")).expect("mkdir");
        std::fs::create_dir_all(payload.join("database")).expect("mkdir");
        std::fs::create_dir_all(payload.join("storage/app/backhaul")).expect("mkdir");
        std::fs::write(payload.join("index.php"), "<?php // restored v2").expect("write");
        std::fs::write(payload.join("composer.json"), "{}").expect("write");
        std::fs::write(payload.join("vendor/autoload.php"), "<?php").expect("write");
        std::fs::write(payload.join("restored-marker.txt"), "from snapshot").expect("write");
        std::fs::write(
            payload.join("storage/app/backhaul/db-20260701-000000.sqlite.zst"),
            zstd_bytes(b"restored database v2"),
        )
        .expect("write dump");
        payload
    }

    pub fn calls(&self) -> String {
        std::fs::read_to_string(self.stub_dir.join("calls.log")).unwrap_or_default()
    }
}
