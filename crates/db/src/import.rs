// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream-import of a staged compressed dump.

use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use bh_core::DbDriver;
use bh_proc::quote_arg;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::conn::{DbConnection, DbError};

const STDERR_CAP: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub exit_code: i32,
    pub command: String,
    pub duration: Duration,
}

/// Import `dump_path` (zstd-compressed) into the live database.
pub async fn import(conn: &DbConnection, dump_path: &Path) -> Result<ImportOutcome, DbError> {
    conn.require_fields()?;
    if !dump_path.is_file() || std::fs::metadata(dump_path)?.len() == 0 {
        return Err(DbError::EmptyDump(dump_path.to_path_buf()));
    }
    let outcome = match conn.driver {
        DbDriver::Mysql => {
            let mut args = conn.client_args();
            args.push(conn.database.clone());
            stream_into_client(conn, args, dump_path).await?
        }
        DbDriver::Postgres => {
            let mut args = conn.client_args();
            args.extend([
                "--dbname".to_string(),
                conn.database.clone(),
                "-v".to_string(),
                "ON_ERROR_STOP=1".to_string(),
                "--quiet".to_string(),
            ]);
            stream_into_client(conn, args, dump_path).await?
        }
        DbDriver::Sqlite => import_sqlite(conn, dump_path)?,
    };
    info!(dump = %dump_path.display(), exit = outcome.exit_code, "database import complete");
    Ok(outcome)
}

/// SQLite import replaces the database file wholesale: decompress next to
/// the target, then rename into place.
fn import_sqlite(conn: &DbConnection, dump_path: &Path) -> Result<ImportOutcome, DbError> {
    let target = conn.sqlite_file()?.to_path_buf();
    let start = Instant::now();

    let mut tmp_name = target.as_os_str().to_owned();
    tmp_name.push(".restore-tmp");
    let tmp = std::path::PathBuf::from(tmp_name);

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dump = std::fs::File::open(dump_path)?;
    let mut decoder = zstd::stream::Decoder::new(dump)?;
    let mut out = std::fs::File::create(&tmp)?;
    std::io::copy(&mut decoder, &mut out)?;
    out.sync_all()?;
    drop(out);

    for sidecar in ["-wal", "-shm", "-journal"] {
        let mut side = target.as_os_str().to_owned();
        side.push(sidecar);
        let _ = std::fs::remove_file(std::path::PathBuf::from(side));
    }
    std::fs::rename(&tmp, &target)?;

    Ok(ImportOutcome {
        exit_code: 0,
        command: format!(
            "sqlite restore {} -> {}",
            quote_arg(&dump_path.display().to_string()),
            quote_arg(&target.display().to_string())
        ),
        duration: start.elapsed(),
    })
}

/// Decompress the dump and feed it to the client's stdin.
async fn stream_into_client(
    conn: &DbConnection,
    args: Vec<String>,
    dump_path: &Path,
) -> Result<ImportOutcome, DbError> {
    let program = conn.client_bin();
    let start = Instant::now();

    let mut command = tokio::process::Command::new(&program);
    command
        .args(&args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::null())
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
                match tokio::io::AsyncReadExt::read(&mut reader, &mut chunk).await {
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

    if let Some(mut stdin) = child.stdin.take() {
        let dump = std::fs::File::open(dump_path)?;
        let mut decoder = zstd::stream::Decoder::new(dump)?;
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let n = decoder.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            stdin.write_all(&chunk[..n]).await?;
        }
        stdin.shutdown().await?;
        drop(stdin);
    }

    let status = child.wait().await?;
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    let exit_code = status.code().unwrap_or(-1);
    if exit_code != 0 {
        return Err(DbError::Process {
            operation: "database import",
            exit_code,
            stderr: crate::conn::stderr_tail(&stderr, 400),
        });
    }

    let mut display = vec![quote_arg(&program.display().to_string())];
    display.extend(args.iter().map(|a| quote_arg(a)));
    display.push(format!("< {}", quote_arg(&dump_path.display().to_string())));

    Ok(ImportOutcome {
        exit_code,
        command: display.join(" "),
        duration: start.elapsed(),
    })
}

#[cfg(test)]
#[path = "import_tests.rs"]
mod tests;
