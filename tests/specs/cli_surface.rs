// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::harness::Fixture;

fn stdout_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).into_owned()
}

fn stderr_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stderr).into_owned()
}

#[test]
fn runs_listing_starts_empty() {
    let fixture = Fixture::new();
    let assert = fixture.bh().arg("runs").assert().success();
    assert!(stdout_of(&assert).contains("no runs recorded"));
}

#[test]
fn unlock_without_a_holder_is_a_no_op() {
    let fixture = Fixture::new();
    let assert = fixture.bh().arg("unlock").assert().success();
    assert!(stdout_of(&assert).contains("no operation lock held"));
}

#[test]
fn restore_refuses_without_yes() {
    let fixture = Fixture::new();
    let assert = fixture.bh().args(["restore", "base1111"]).assert().failure();
    assert!(stderr_of(&assert).contains("--yes"));
}

#[test]
fn backup_end_to_end_records_a_successful_run() {
    let fixture = Fixture::new();
    let assert = fixture
        .bh()
        .args(["backup", "--trigger", "spec"])
        .assert()
        .success();
    assert!(stdout_of(&assert).contains("backup success"));

    let assert = fixture
        .bh()
        .args(["runs", "--type", "backup", "--status", "success"])
        .assert()
        .success();
    assert!(stdout_of(&assert).contains("backup"));

    // The dump landed inside the project tree.
    let dump_dir = fixture.project_root.join("storage/app/backhaul");
    assert!(std::fs::read_dir(dump_dir).unwrap().next().is_some());
}

#[test]
fn missing_config_is_a_clean_error() {
    let mut cmd = assert_cmd::Command::cargo_bin("bh").unwrap();
    let assert = cmd
        .arg("--config")
        .arg("/definitely/not/here.toml")
        .arg("runs")
        .assert()
        .failure();
    assert!(stderr_of(&assert).contains("loading settings"));
}
