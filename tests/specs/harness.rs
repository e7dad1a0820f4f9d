// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: a throwaway project, a stub snapshot tool, and a
//! settings file wired together for the `bh` binary.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const STUB_SCRIPT: &str = r#"#!/bin/sh
STUB_DIR="$(cd "$(dirname "$0")" && pwd)"
cmd="$1"; shift 2>/dev/null || true
echo "$cmd $*" >> "$STUB_DIR/calls.log"
case "$cmd" in
  version) echo "restic 0.17.0" ;;
  snapshots) cat "$STUB_DIR/snapshots.json" ;;
  stats) echo '{"total_size": 4096, "total_file_count": 4}' ;;
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

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config_path: PathBuf,
    pub stub_dir: PathBuf,
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let project_root = dir.path().join("project");
        let state_dir = dir.path().join("state");
        let stub_dir = dir.path().join("stub");

        std::fs::create_dir_all(project_root.join("vendor")).expect("mkdir");
        std::fs::create_dir_all(project_root.join("database")).expect("mkdir");
        std::fs::create_dir_all(project_root.join("storage/app/backhaul")).expect("mkdir");
        std::fs::write(project_root.join("index.php"), "<?php // live").expect("write");
        std::fs::write(project_root.join("composer.json"), "{}").expect("write");
        std::fs::write(project_root.join("vendor/autoload.php"), "<?php").expect("write");
        std::fs::write(project_root.join(".env"), "APP_KEY=live").expect("write");
        std::fs::write(project_root.join("database/db.sqlite"), b"sqlite v1").expect("write");

        std::fs::create_dir_all(&state_dir).expect("mkdir");
        std::fs::create_dir_all(&stub_dir).expect("mkdir");
        let stub_bin = stub_dir.join("restic");
        std::fs::write(&stub_bin, STUB_SCRIPT).expect("write stub");
        let mut perms = std::fs::metadata(&stub_bin).expect("stat").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&stub_bin, perms).expect("chmod");

        let config_path = dir.path().join("backhaul.toml");
        let mut config = std::fs::File::create(&config_path).expect("create config");
        write!(
            config,
            r#"[app]
name = "demo"
environment = "test"
project_root = "{project}"
state_dir = "{state}"

[repository]
url = "/backups/repo"
password = "repo-pass"
bin = "{bin}"

[database]
driver = "sqlite"
sqlite_path = "{project}/database/db.sqlite"
"#,
            project = project_root.display(),
            state = state_dir.display(),
            bin = stub_bin.display(),
        )
        .expect("write config");

        let fixture = Self {
            dir,
            config_path,
            stub_dir,
            project_root,
            state_dir,
        };
        fixture.set_snapshots(&[("base1111aaaa", "base1111", "2026-07-01T00:00:00Z")]);
        fixture
    }

    pub fn bh(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("bh").expect("bh binary");
        cmd.arg("--config").arg(&self.config_path);
        cmd
    }

    pub fn set_snapshots(&self, snaps: &[(&str, &str, &str)]) {
        let entries: Vec<String> = snaps
            .iter()
            .map(|(id, short, time)| {
                format!(
                    r#"{{"id":"{id}","short_id":"{short}","time":"{time}","paths":["{root}"],"tags":["app:demo"],"hostname":"web1"}}"#,
                    root = self.project_root.display()
                )
            })
            .collect();
        std::fs::write(
            self.stub_dir.join("snapshots.json"),
            format!("[{}]", entries.join(",")),
        )
        .expect("write snapshots");
    }

    pub fn set_diff(&self, lines: &[(&str, &str)]) {
        let body: String = lines
            .iter()
            .map(|(marker, rel)| {
                format!("{marker}    {}/{}\n", self.project_root.display(), rel)
            })
            .collect();
        std::fs::write(self.stub_dir.join("diff.txt"), body).expect("write diff");
    }

    /// The payload directory mirroring the absolute project root.
    pub fn payload_project_dir(&self) -> PathBuf {
        let rel = self
            .project_root
            .strip_prefix("/")
            .unwrap_or(&self.project_root);
        self.stub_dir.join("payload").join(rel)
    }

    pub fn write_payload_file(&self, rel: &str, contents: &str) {
        let path = self.payload_project_dir().join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, contents).expect("write payload file");
    }

    /// The export archive whose name contains `needle` (e.g. "-full-").
    pub fn export_matching(&self, needle: &str) -> PathBuf {
        let export_dir = self.state_dir.join("exports");
        std::fs::read_dir(&export_dir)
            .expect("export dir")
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().contains(needle))
                    .unwrap_or(false)
            })
            .expect("a matching export archive")
    }
}

/// Unpack a tar.gz with the system tar and return the bundle root.
pub fn unpack(archive: &Path, into: &Path) -> PathBuf {
    std::fs::create_dir_all(into).expect("mkdir");
    let status = std::process::Command::new("tar")
        .arg("-xzf")
        .arg(archive)
        .arg("-C")
        .arg(into)
        .status()
        .expect("run tar");
    assert!(status.success(), "tar extraction failed");
    std::fs::read_dir(into)
        .expect("read unpack dir")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.is_dir())
        .expect("bundle root")
}
