// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use bh_core::Settings;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

fn compress(data: &[u8], out: &Path) {
    let file = std::fs::File::create(out).unwrap();
    let mut encoder = zstd::stream::Encoder::new(file, 3).unwrap();
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap();
}

fn stub_bin(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "#!/bin/sh\n{body}").unwrap();
    let mut perms = f.metadata().unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[tokio::test]
async fn sqlite_import_replaces_the_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.sqlite");
    std::fs::write(&db_path, b"old contents").unwrap();
    std::fs::write(dir.path().join("db.sqlite-wal"), b"wal").unwrap();

    let dump_path = dir.path().join("dump.sqlite.zst");
    compress(b"restored contents", &dump_path);

    let mut settings = Settings::default();
    settings.database.driver = bh_core::DbDriver::Sqlite;
    settings.database.sqlite_path = Some(db_path.clone());
    let conn = DbConnection::from_settings(&settings);

    let outcome = import(&conn, &dump_path).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(std::fs::read(&db_path).unwrap(), b"restored contents");
    assert!(!dir.path().join("db.sqlite-wal").exists());
}

#[tokio::test]
async fn client_import_streams_decompressed_dump_to_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let received = dir.path().join("received.sql");
    let stub = stub_bin(
        dir.path(),
        "mysql",
        &format!("cat > {}", received.display()),
    );

    let dump_path = dir.path().join("dump.sql.zst");
    compress(b"INSERT INTO users VALUES (1);\n", &dump_path);

    let mut settings = Settings::default();
    settings.database.database = "app".to_string();
    settings.database.username = "app".to_string();
    settings.database.client_bin = Some(stub);
    let conn = DbConnection::from_settings(&settings);

    let outcome = import(&conn, &dump_path).await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.command.contains("dump.sql.zst"));
    assert_eq!(
        std::fs::read_to_string(&received).unwrap(),
        "INSERT INTO users VALUES (1);\n"
    );
}

#[tokio::test]
async fn failing_client_surfaces_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_bin(
        dir.path(),
        "mysql",
        "cat > /dev/null; echo 'ERROR 1044 (42000): Access denied' >&2; exit 1",
    );
    let dump_path = dir.path().join("dump.sql.zst");
    compress(b"SELECT 1;", &dump_path);

    let mut settings = Settings::default();
    settings.database.database = "app".to_string();
    settings.database.username = "app".to_string();
    settings.database.client_bin = Some(stub);
    let conn = DbConnection::from_settings(&settings);

    let err = import(&conn, &dump_path).await.unwrap_err();
    let DbError::Process { exit_code, stderr, .. } = err else {
        panic!("expected process error");
    };
    assert_eq!(exit_code, 1);
    assert!(stderr.contains("ERROR 1044"));
}

#[tokio::test]
async fn missing_dump_file_fails_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.database.database = "app".to_string();
    settings.database.username = "app".to_string();
    let conn = DbConnection::from_settings(&settings);

    let err = import(&conn, &dir.path().join("missing.zst")).await.unwrap_err();
    assert!(matches!(err, DbError::EmptyDump(_)));
}
