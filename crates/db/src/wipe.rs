// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Destructive schema wipe, honoring a preserve-list.

use std::time::Duration;

use bh_core::DbDriver;
use tracing::info;

use crate::conn::{check, DbConnection, DbError};

const WIPE_TIMEOUT: Duration = Duration::from_secs(600);

/// What a wipe removed and what it left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WipeOutcome {
    pub dropped_tables: Vec<String>,
    pub dropped_views: Vec<String>,
    pub preserved: Vec<String>,
}

/// Drop all application tables and views except `preserve`.
pub async fn wipe(conn: &DbConnection, preserve: &[String]) -> Result<WipeOutcome, DbError> {
    conn.require_fields()?;
    let outcome = match conn.driver {
        DbDriver::Mysql => wipe_mysql(conn, preserve).await?,
        DbDriver::Postgres => wipe_postgres(conn, preserve).await?,
        DbDriver::Sqlite => wipe_sqlite(conn, preserve).await?,
    };
    info!(
        tables = outcome.dropped_tables.len(),
        views = outcome.dropped_views.len(),
        preserved = outcome.preserved.len(),
        "database wipe complete"
    );
    Ok(outcome)
}

/// Split an enumeration into (to-drop, preserved).
fn partition_preserved(names: Vec<String>, preserve: &[String]) -> (Vec<String>, Vec<String>) {
    names
        .into_iter()
        .partition(|name| !preserve.iter().any(|p| p == name))
}

/// Parse `SHOW FULL TABLES` output: `<name>\t<BASE TABLE|VIEW>` per line.
fn parse_show_full_tables(output: &str) -> (Vec<String>, Vec<String>) {
    let mut tables = Vec::new();
    let mut views = Vec::new();
    for line in output.lines() {
        let Some((name, kind)) = line.split_once('\t') else {
            continue;
        };
        if kind.trim().eq_ignore_ascii_case("VIEW") {
            views.push(name.to_string());
        } else {
            tables.push(name.to_string());
        }
    }
    (tables, views)
}

/// One statement batch, foreign-key checks off for the duration.
fn mysql_wipe_sql(tables: &[String], views: &[String]) -> String {
    let mut sql = String::from("SET FOREIGN_KEY_CHECKS=0; ");
    if !views.is_empty() {
        let list: Vec<String> = views.iter().map(|v| format!("`{v}`")).collect();
        sql.push_str(&format!("DROP VIEW IF EXISTS {}; ", list.join(", ")));
    }
    if !tables.is_empty() {
        let list: Vec<String> = tables.iter().map(|t| format!("`{t}`")).collect();
        sql.push_str(&format!("DROP TABLE IF EXISTS {}; ", list.join(", ")));
    }
    sql.push_str("SET FOREIGN_KEY_CHECKS=1;");
    sql
}

fn postgres_wipe_sql(tables: &[String], views: &[String]) -> String {
    let mut statements = Vec::new();
    for view in views {
        statements.push(format!("DROP VIEW IF EXISTS \"{view}\" CASCADE;"));
    }
    for table in tables {
        statements.push(format!("DROP TABLE IF EXISTS \"{table}\" CASCADE;"));
    }
    statements.join(" ")
}

async fn wipe_mysql(conn: &DbConnection, preserve: &[String]) -> Result<WipeOutcome, DbError> {
    let mut args = conn.client_args();
    args.extend([
        "-N".to_string(),
        "-B".to_string(),
        "-e".to_string(),
        "SHOW FULL TABLES".to_string(),
        conn.database.clone(),
    ]);
    let listing = conn.run_client(args, WIPE_TIMEOUT).await?;
    if !listing.ok() {
        return Err(DbError::Process {
            operation: "table enumeration",
            exit_code: listing.exit_code,
            stderr: listing.stderr_tail(400).to_string(),
        });
    }

    let (tables, views) = parse_show_full_tables(&listing.stdout);
    let (drop_tables, mut preserved) = partition_preserved(tables, preserve);
    let (drop_views, preserved_views) = partition_preserved(views, preserve);
    preserved.extend(preserved_views);

    if !drop_tables.is_empty() || !drop_views.is_empty() {
        let mut args = conn.client_args();
        args.extend([
            "-e".to_string(),
            mysql_wipe_sql(&drop_tables, &drop_views),
            conn.database.clone(),
        ]);
        check(conn.run_client(args, WIPE_TIMEOUT).await?, "database wipe")?;
    }

    Ok(WipeOutcome {
        dropped_tables: drop_tables,
        dropped_views: drop_views,
        preserved,
    })
}

async fn wipe_postgres(conn: &DbConnection, preserve: &[String]) -> Result<WipeOutcome, DbError> {
    let tables = postgres_query(
        conn,
        "SELECT tablename FROM pg_tables WHERE schemaname = 'public'",
    )
    .await?;
    let views = postgres_query(
        conn,
        "SELECT viewname FROM pg_views WHERE schemaname = 'public'",
    )
    .await?;

    let (drop_tables, mut preserved) = partition_preserved(tables, preserve);
    let (drop_views, preserved_views) = partition_preserved(views, preserve);
    preserved.extend(preserved_views);

    if !drop_tables.is_empty() || !drop_views.is_empty() {
        let mut args = conn.client_args();
        args.extend([
            "--dbname".to_string(),
            conn.database.clone(),
            "-v".to_string(),
            "ON_ERROR_STOP=1".to_string(),
            "-c".to_string(),
            postgres_wipe_sql(&drop_tables, &drop_views),
        ]);
        check(conn.run_client(args, WIPE_TIMEOUT).await?, "database wipe")?;
    }

    Ok(WipeOutcome {
        dropped_tables: drop_tables,
        dropped_views: drop_views,
        preserved,
    })
}

async fn postgres_query(conn: &DbConnection, sql: &str) -> Result<Vec<String>, DbError> {
    let mut args = conn.client_args();
    args.extend([
        "--dbname".to_string(),
        conn.database.clone(),
        "-t".to_string(),
        "-A".to_string(),
        "-c".to_string(),
        sql.to_string(),
    ]);
    let result = conn.run_client(args, WIPE_TIMEOUT).await?;
    if !result.ok() {
        return Err(DbError::Process {
            operation: "table enumeration",
            exit_code: result.exit_code,
            stderr: result.stderr_tail(400).to_string(),
        });
    }
    Ok(result
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// SQLite import is a wholesale file replace, so with nothing to preserve
/// the wipe is a plain removal of the database file and its sidecars.
/// With a preserve-list, objects are enumerated from `sqlite_master` via
/// the client binary and dropped individually.
async fn wipe_sqlite(conn: &DbConnection, preserve: &[String]) -> Result<WipeOutcome, DbError> {
    let path = conn.sqlite_file()?.to_path_buf();
    if preserve.is_empty() {
        for sidecar in ["-wal", "-shm", "-journal"] {
            let mut side = path.as_os_str().to_owned();
            side.push(sidecar);
            let _ = std::fs::remove_file(std::path::PathBuf::from(side));
        }
        let removed = match std::fs::remove_file(&path) {
            Ok(()) => vec![path.display().to_string()],
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        return Ok(WipeOutcome {
            dropped_tables: removed,
            dropped_views: Vec::new(),
            preserved: Vec::new(),
        });
    }

    let listing = conn
        .run_client(
            vec![
                path.display().to_string(),
                "SELECT type || '|' || name FROM sqlite_master \
                 WHERE type IN ('table','view') AND name NOT LIKE 'sqlite_%'"
                    .to_string(),
            ],
            WIPE_TIMEOUT,
        )
        .await?;
    if !listing.ok() {
        return Err(DbError::Process {
            operation: "table enumeration",
            exit_code: listing.exit_code,
            stderr: listing.stderr_tail(400).to_string(),
        });
    }

    let mut tables = Vec::new();
    let mut views = Vec::new();
    for line in listing.stdout.lines() {
        match line.trim().split_once('|') {
            Some(("view", name)) => views.push(name.to_string()),
            Some((_, name)) => tables.push(name.to_string()),
            None => {}
        }
    }
    let (drop_tables, mut preserved) = partition_preserved(tables, preserve);
    let (drop_views, preserved_views) = partition_preserved(views, preserve);
    preserved.extend(preserved_views);

    let mut statements = Vec::new();
    for view in &drop_views {
        statements.push(format!("DROP VIEW IF EXISTS \"{view}\";"));
    }
    for table in &drop_tables {
        statements.push(format!("DROP TABLE IF EXISTS \"{table}\";"));
    }
    if !statements.is_empty() {
        let result = conn
            .run_client(
                vec![path.display().to_string(), statements.join(" ")],
                WIPE_TIMEOUT,
            )
            .await?;
        check(result, "database wipe")?;
    }

    Ok(WipeOutcome {
        dropped_tables: drop_tables,
        dropped_views: drop_views,
        preserved,
    })
}

#[cfg(test)]
#[path = "wipe_tests.rs"]
mod tests;
