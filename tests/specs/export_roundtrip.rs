// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delta-on-full round trip: applying a delta bundle's restore script to
//! its full bundle reproduces the latest snapshot's file-presence set.

use super::harness::{unpack, Fixture};

fn stdout_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).into_owned()
}

#[test]
fn delta_applied_to_full_reproduces_the_latest_snapshot() {
    let fixture = Fixture::new();

    // Baseline snapshot contents.
    fixture.write_payload_file("index.php", "<?php // v1");
    fixture.write_payload_file("composer.json", "{}");
    fixture.write_payload_file("vendor/autoload.php", "<?php");
    fixture.write_payload_file("assets/a.txt", "unchanged");
    fixture.write_payload_file("assets/removed.txt", "going away");

    let assert = fixture.bh().args(["export", "full"]).assert().success();
    assert!(stdout_of(&assert).contains("export_full success"));
    let full_archive = fixture.export_matching("-full-");

    // The latest snapshot: index.php modified, new.txt added,
    // assets/removed.txt deleted.
    fixture.set_snapshots(&[
        ("base1111aaaa", "base1111", "2026-07-01T00:00:00Z"),
        ("head2222bbbb", "head2222", "2026-07-02T00:00:00Z"),
    ]);
    fixture.write_payload_file("index.php", "<?php // v2");
    fixture.write_payload_file("new.txt", "brand new");
    std::fs::remove_file(fixture.payload_project_dir().join("assets/removed.txt")).unwrap();
    fixture.set_diff(&[
        ("M", "index.php"),
        ("+", "new.txt"),
        ("-", "assets/removed.txt"),
    ]);

    let assert = fixture.bh().args(["export", "delta"]).assert().success();
    assert!(stdout_of(&assert).contains("export_delta success"));
    let delta_archive = fixture.export_matching("-delta-");

    // Unpack both bundles and apply the delta's restore tooling onto the
    // full bundle root.
    let work = fixture.dir.path().join("roundtrip");
    let full_root = unpack(&full_archive, &work.join("full"));
    let delta_root = unpack(&delta_archive, &work.join("delta"));

    let status = std::process::Command::new("sh")
        .arg(delta_root.join("TOOLS/restore.sh"))
        .arg(&full_root)
        .status()
        .unwrap();
    assert!(status.success(), "restore.sh failed");

    // File-presence set now matches the latest snapshot.
    assert_eq!(
        std::fs::read_to_string(full_root.join("index.php")).unwrap(),
        "<?php // v2"
    );
    assert_eq!(
        std::fs::read_to_string(full_root.join("new.txt")).unwrap(),
        "brand new"
    );
    assert_eq!(
        std::fs::read_to_string(full_root.join("assets/a.txt")).unwrap(),
        "unchanged"
    );
    assert!(!full_root.join("assets/removed.txt").exists());

    // The environment file stayed excluded end to end.
    assert!(!full_root.join(".env").exists());
}

#[test]
fn delta_without_a_prior_full_export_fails() {
    let fixture = Fixture::new();
    let assert = fixture.bh().args(["export", "delta"]).assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("no baseline"));
}
