// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bh_core::Settings;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;

fn stub_bin(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "#!/bin/sh\n{body}").unwrap();
    let mut perms = f.metadata().unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn mysql_conn(dump_bin: PathBuf) -> DbConnection {
    let mut settings = Settings::default();
    settings.database.database = "app".to_string();
    settings.database.username = "app".to_string();
    settings.database.exclude_tables = vec!["telescope_entries".to_string()];
    settings.database.dump_bin = Some(dump_bin);
    DbConnection::from_settings(&settings)
}

fn decompress(path: &Path) -> Vec<u8> {
    let file = std::fs::File::open(path).unwrap();
    let mut out = Vec::new();
    let mut decoder = zstd::stream::Decoder::new(file).unwrap();
    std::io::Read::read_to_end(&mut decoder, &mut out).unwrap();
    out
}

#[test]
fn mysql_args_include_flags_and_ignored_tables() {
    let conn = mysql_conn(PathBuf::from("mysqldump"));
    let args = mysql_dump_args(&conn, true);
    assert!(args.contains(&"--single-transaction".to_string()));
    assert!(args.contains(&"--events".to_string()));
    assert!(args.contains(&"--ignore-table=app.telescope_entries".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("app"));

    let reduced = mysql_dump_args(&conn, false);
    assert!(!reduced.contains(&"--events".to_string()));
    assert!(!reduced.contains(&"--routines".to_string()));
}

#[yare::parameterized(
    events_denied   = { "mysqldump: Error: Access denied; you need the PROCESS privilege for SHOW EVENTS", true },
    trigger_denied  = { "access denied for TRIGGERS", true },
    plain_denied    = { "Access denied for user 'app'@'host'", false },
    connect_refused = { "Can't connect to MySQL server", false },
)]
fn privilege_denial_detection(stderr: &str, expected: bool) {
    assert_eq!(privilege_denied(stderr), expected);
}

#[tokio::test]
async fn successful_dump_streams_compressed_output() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_bin(dir.path(), "mysqldump", "echo 'CREATE TABLE users (id int);'");
    let out = dir.path().join("dump.sql.zst");

    let outcome = dump(&mysql_conn(stub), &out).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.warnings.is_empty());
    assert!(outcome.bytes_written > 0);
    assert!(outcome.command.contains("--single-transaction"));
    assert_eq!(
        String::from_utf8(decompress(&out)).unwrap().trim(),
        "CREATE TABLE users (id int);"
    );
}

#[tokio::test]
async fn privilege_failure_retries_without_optional_flags() {
    let dir = tempfile::tempdir().unwrap();
    // Fails when the optional flags are present, succeeds without them.
    let body = r#"
for a in "$@"; do
  if [ "$a" = "--events" ]; then
    echo "mysqldump: Access denied; you need SHOW EVENTS privilege" >&2
    exit 2
  fi
done
echo 'CREATE TABLE users (id int);'
"#;
    let stub = stub_bin(dir.path(), "mysqldump", body);
    let out = dir.path().join("dump.sql.zst");

    let outcome = dump(&mysql_conn(stub), &out).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("--events"));
    assert!(String::from_utf8(decompress(&out)).unwrap().contains("CREATE TABLE"));
}

#[tokio::test]
async fn failing_retry_with_nonempty_dump_is_accepted_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let body = r#"
for a in "$@"; do
  if [ "$a" = "--events" ]; then
    echo "mysqldump: Access denied for SHOW EVENTS" >&2
    exit 2
  fi
done
echo 'CREATE TABLE users (id int);'
echo "mysqldump: Couldn't execute SHOW FUNCTION STATUS: warning only" >&2
exit 2
"#;
    let stub = stub_bin(dir.path(), "mysqldump", body);
    let out = dir.path().join("dump.sql.zst");

    let outcome = dump(&mysql_conn(stub), &out).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.warnings.len(), 2);
    assert!(outcome.warnings[1].contains("non-empty dump"));
}

#[tokio::test]
async fn unrelated_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_bin(
        dir.path(),
        "mysqldump",
        "echo \"Can't connect to MySQL server on '127.0.0.1'\" >&2; exit 2",
    );
    let out = dir.path().join("dump.sql.zst");

    let err = dump(&mysql_conn(stub), &out).await.unwrap_err();
    let DbError::Process { exit_code, stderr, .. } = err else {
        panic!("expected process error");
    };
    assert_eq!(exit_code, 2);
    assert!(stderr.contains("Can't connect"));
}

#[tokio::test]
async fn sqlite_dump_is_a_compressed_byte_copy() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.sqlite");
    std::fs::write(&db_path, b"raw sqlite bytes").unwrap();

    let mut settings = Settings::default();
    settings.database.driver = bh_core::DbDriver::Sqlite;
    settings.database.sqlite_path = Some(db_path);
    let conn = DbConnection::from_settings(&settings);

    let out = dir.path().join("dump.sqlite.zst");
    let outcome = dump(&conn, &out).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(decompress(&out), b"raw sqlite bytes");
}

#[tokio::test]
async fn missing_settings_surface_before_spawning() {
    let settings = Settings::default();
    let conn = DbConnection::from_settings(&settings);
    let out = std::env::temp_dir().join("never-written.zst");
    let err = dump(&conn, &out).await.unwrap_err();
    assert!(matches!(err, DbError::Config(_)));
}
