// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver-specific dumps, streamed through a zstd encoder to disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bh_core::DbDriver;
use bh_proc::quote_arg;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::conn::{DbConnection, DbError};

const ZSTD_LEVEL: i32 = 3;
const STDERR_CAP: usize = 64 * 1024;

/// Result of a completed (or accepted) dump.
#[derive(Debug, Clone)]
pub struct DumpOutcome {
    pub path: PathBuf,
    /// Compressed size on disk.
    pub bytes_written: u64,
    /// Non-fatal notes: dropped privilege flags, accepted warnings-only
    /// failures.
    pub warnings: Vec<String>,
    /// Effective exit code (0 when the dump was accepted).
    pub exit_code: i32,
    pub command: String,
    pub duration: Duration,
}

/// Dump the database to `out_path`, dispatching on the driver.
pub async fn dump(conn: &DbConnection, out_path: &Path) -> Result<DumpOutcome, DbError> {
    conn.require_fields()?;
    match conn.driver {
        DbDriver::Mysql => dump_mysql(conn, out_path).await,
        DbDriver::Postgres => dump_postgres(conn, out_path).await,
        DbDriver::Sqlite => dump_sqlite(conn, out_path),
    }
}

fn mysql_dump_args(conn: &DbConnection, with_optional: bool) -> Vec<String> {
    let mut args = vec!["--single-transaction".to_string(), "--quick".to_string()];
    if with_optional {
        args.push("--routines".to_string());
        args.push("--triggers".to_string());
        args.push("--events".to_string());
    }
    args.push(format!("--host={}", conn.host));
    if let Some(port) = conn.port {
        args.push(format!("--port={port}"));
    }
    args.push(format!("--user={}", conn.username));
    for table in &conn.exclude_tables {
        args.push(format!("--ignore-table={}.{}", conn.database, table));
    }
    args.push(conn.database.clone());
    args
}

/// A MySQL dump that fails solely on missing SHOW EVENTS/TRIGGERS/ROUTINE
/// privilege is retried without the optional flags. Pattern-matched on
/// stderr text; a lossy, best-effort compatibility shim.
fn privilege_denied(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("access denied")
        && ["events", "triggers", "routines", "procedure"]
            .iter()
            .any(|needle| lower.contains(needle))
}

async fn dump_mysql(conn: &DbConnection, out_path: &Path) -> Result<DumpOutcome, DbError> {
    let first = stream_to_zstd(conn, &mysql_dump_args(conn, true), out_path).await?;
    if first.exit_code == 0 {
        return finish(out_path, first, Vec::new());
    }
    if !privilege_denied(&first.stderr) {
        return Err(process_error("database dump", &first));
    }

    let mut warnings = vec![format!(
        "mysqldump lacked privileges for optional objects; retried without \
         --routines --triggers --events (stderr: {})",
        tail(&first.stderr)
    )];
    warn!("mysqldump privilege failure, retrying without optional flags");

    let retry = stream_to_zstd(conn, &mysql_dump_args(conn, false), out_path).await?;
    if retry.exit_code == 0 {
        return finish(out_path, retry, warnings);
    }

    // The retry failed too. Accept a non-empty dump with a recorded
    // warning instead of treating warnings-only noise as fatal.
    let size = std::fs::metadata(out_path).map(|m| m.len()).unwrap_or(0);
    if size > 0 {
        warnings.push(format!(
            "mysqldump exited {} but left a non-empty dump; accepting (stderr: {})",
            retry.exit_code,
            tail(&retry.stderr)
        ));
        let accepted = StreamCapture {
            exit_code: 0,
            ..retry
        };
        return finish(out_path, accepted, warnings);
    }
    Err(process_error("database dump", &retry))
}

async fn dump_postgres(conn: &DbConnection, out_path: &Path) -> Result<DumpOutcome, DbError> {
    let mut args = vec![
        "--format=plain".to_string(),
        "--no-owner".to_string(),
        "--no-privileges".to_string(),
        format!("--host={}", conn.host),
    ];
    if let Some(port) = conn.port {
        args.push(format!("--port={port}"));
    }
    args.push(format!("--username={}", conn.username));
    for table in &conn.exclude_tables {
        args.push(format!("--exclude-table={table}"));
    }
    args.push(conn.database.clone());

    let capture = stream_to_zstd(conn, &args, out_path).await?;
    if capture.exit_code != 0 {
        return Err(process_error("database dump", &capture));
    }
    finish(out_path, capture, Vec::new())
}

/// SQLite is a raw compressed byte copy of the database file.
fn dump_sqlite(conn: &DbConnection, out_path: &Path) -> Result<DumpOutcome, DbError> {
    let src = conn.sqlite_file()?;
    let start = Instant::now();
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut reader = std::fs::File::open(src)?;
    let out = std::fs::File::create(out_path)?;
    let mut encoder = zstd::stream::Encoder::new(out, ZSTD_LEVEL)?;
    std::io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.sync_all()?;

    let capture = StreamCapture {
        exit_code: 0,
        stderr: String::new(),
        duration: start.elapsed(),
        command: format!(
            "sqlite raw copy {} -> {}",
            quote_arg(&src.display().to_string()),
            quote_arg(&out_path.display().to_string())
        ),
    };
    finish(out_path, capture, Vec::new())
}

#[derive(Debug, Clone)]
struct StreamCapture {
    exit_code: i32,
    stderr: String,
    duration: Duration,
    command: String,
}

fn process_error(operation: &'static str, capture: &StreamCapture) -> DbError {
    DbError::Process {
        operation,
        exit_code: capture.exit_code,
        stderr: tail(&capture.stderr),
    }
}

fn tail(stderr: &str) -> String {
    crate::conn::stderr_tail(stderr, 400)
}

fn finish(
    out_path: &Path,
    capture: StreamCapture,
    warnings: Vec<String>,
) -> Result<DumpOutcome, DbError> {
    let bytes_written = std::fs::metadata(out_path).map(|m| m.len()).unwrap_or(0);
    if bytes_written == 0 {
        return Err(DbError::EmptyDump(out_path.to_path_buf()));
    }
    info!(path = %out_path.display(), bytes = bytes_written, "dump complete");
    Ok(DumpOutcome {
        path: out_path.to_path_buf(),
        bytes_written,
        warnings,
        exit_code: capture.exit_code,
        command: capture.command,
        duration: capture.duration,
    })
}

/// Spawn the dumper, stream its stdout through a zstd encoder into
/// `out_path`, and capture a bounded stderr tail for diagnosis.
async fn stream_to_zstd(
    conn: &DbConnection,
    args: &[String],
    out_path: &Path,
) -> Result<StreamCapture, DbError> {
    let program = conn.dump_bin();
    let start = Instant::now();
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let out = std::fs::File::create(out_path)?;
    let mut encoder = zstd::stream::Encoder::new(out, ZSTD_LEVEL)?;

    let mut command = tokio::process::Command::new(&program);
    command
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    if let Some((key, value)) = conn.password_env() {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|source| {
        DbError::Io(std::io::Error::new(
            source.kind(),
            format!("failed to spawn {}: {source}", program.display()),
        ))
    })?;

    let stderr_task = child.stderr.take().map(|mut reader| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if buf.len() < STDERR_CAP {
                            let take = n.min(STDERR_CAP - buf.len());
                            buf.extend_from_slice(&chunk[..take]);
                        }
                    }
                }
            }
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    if let Some(mut stdout) = child.stdout.take() {
        let mut chunk = [0u8; 64 * 1024];
        loop {
            let n = stdout.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            encoder.write_all(&chunk[..n])?;
        }
    }

    let status = child.wait().await?;
    encoder.finish()?.sync_all()?;

    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    let mut display = vec![quote_arg(&program.display().to_string())];
    display.extend(args.iter().map(|a| quote_arg(a)));

    Ok(StreamCapture {
        exit_code: status.code().unwrap_or(-1),
        stderr,
        duration: start.elapsed(),
        command: display.join(" "),
    })
}

#[cfg(test)]
#[path = "dump_tests.rs"]
mod tests;
