// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection descriptor and client helpers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bh_core::{ConfigError, DbDriver, Settings};
use bh_proc::{CommandRunner, CommandSpec, ProcessResult, RunnerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("database io: {0}")]
    Io(#[from] std::io::Error),
    /// Non-zero client/dumper exit. The stderr here is raw; the engine
    /// scrubs secrets at the persistence boundary.
    #[error("{operation} failed (exit {exit_code}): {stderr}")]
    Process {
        operation: &'static str,
        exit_code: i32,
        stderr: String,
    },
    #[error("dump file {0} is missing or empty")]
    EmptyDump(PathBuf),
}

/// Everything needed to reach one database, resolved once per run from
/// the settings snapshot.
#[derive(Debug, Clone)]
pub struct DbConnection {
    pub driver: DbDriver,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub username: String,
    pub password: String,
    pub sqlite_path: Option<PathBuf>,
    pub exclude_tables: Vec<String>,
    dump_bin: Option<PathBuf>,
    client_bin: Option<PathBuf>,
}

impl DbConnection {
    pub fn from_settings(settings: &Settings) -> Self {
        let db = &settings.database;
        Self {
            driver: db.driver,
            host: db.host.clone(),
            port: db.port,
            database: db.database.clone(),
            username: db.username.clone(),
            password: db.password.clone(),
            sqlite_path: db.sqlite_path.clone(),
            exclude_tables: db.exclude_tables.clone(),
            dump_bin: db.dump_bin.clone(),
            client_bin: db.client_bin.clone(),
        }
    }

    /// Validate the fields this driver needs, naming the missing ones.
    pub fn require_fields(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        match self.driver {
            DbDriver::Mysql | DbDriver::Postgres => {
                if self.database.is_empty() {
                    missing.push("database.database");
                }
                if self.username.is_empty() {
                    missing.push("database.username");
                }
            }
            DbDriver::Sqlite => {
                if self
                    .sqlite_path
                    .as_ref()
                    .is_none_or(|p| p.as_os_str().is_empty())
                {
                    missing.push("database.sqlite_path");
                }
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(missing))
        }
    }

    pub fn dump_bin(&self) -> PathBuf {
        self.dump_bin.clone().unwrap_or_else(|| {
            PathBuf::from(match self.driver {
                DbDriver::Mysql => "mysqldump",
                DbDriver::Postgres => "pg_dump",
                // SQLite dumps are raw byte copies; no dumper involved.
                DbDriver::Sqlite => "sqlite3",
            })
        })
    }

    pub fn client_bin(&self) -> PathBuf {
        self.client_bin.clone().unwrap_or_else(|| {
            PathBuf::from(match self.driver {
                DbDriver::Mysql => "mysql",
                DbDriver::Postgres => "psql",
                DbDriver::Sqlite => "sqlite3",
            })
        })
    }

    /// Password environment variable for subprocesses.
    pub fn password_env(&self) -> Option<(&'static str, String)> {
        if self.password.is_empty() {
            return None;
        }
        match self.driver {
            DbDriver::Mysql => Some(("MYSQL_PWD", self.password.clone())),
            DbDriver::Postgres => Some(("PGPASSWORD", self.password.clone())),
            DbDriver::Sqlite => None,
        }
    }

    /// Common host/user args for the client binary.
    pub(crate) fn client_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self.driver {
            DbDriver::Mysql => {
                args.push(format!("--host={}", self.host));
                if let Some(port) = self.port {
                    args.push(format!("--port={port}"));
                }
                args.push(format!("--user={}", self.username));
            }
            DbDriver::Postgres => {
                args.push(format!("--host={}", self.host));
                if let Some(port) = self.port {
                    args.push(format!("--port={port}"));
                }
                args.push(format!("--username={}", self.username));
            }
            DbDriver::Sqlite => {}
        }
        args
    }

    /// Run the client binary with credentials in the environment.
    pub(crate) async fn run_client(
        &self,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<ProcessResult, DbError> {
        let mut spec = CommandSpec::new(self.client_bin()).args(args).timeout(timeout);
        if let Some((key, value)) = self.password_env() {
            spec = spec.env(key, value);
        }
        Ok(CommandRunner::run(spec).await?)
    }

    /// Connectivity probe used by restore preflight.
    pub async fn ping(&self) -> Result<(), DbError> {
        self.require_fields()?;
        match self.driver {
            DbDriver::Mysql => {
                let mut args = self.client_args();
                args.extend(["-e".to_string(), "SELECT 1".to_string()]);
                args.push(self.database.clone());
                let result = self.run_client(args, Duration::from_secs(30)).await?;
                check(result, "database ping")
            }
            DbDriver::Postgres => {
                let mut args = self.client_args();
                args.extend([
                    "--dbname".to_string(),
                    self.database.clone(),
                    "-c".to_string(),
                    "SELECT 1".to_string(),
                ]);
                let result = self.run_client(args, Duration::from_secs(30)).await?;
                check(result, "database ping")
            }
            DbDriver::Sqlite => {
                let path = self.sqlite_file()?;
                if path.is_file() {
                    Ok(())
                } else {
                    Err(DbError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("sqlite database {} not found", path.display()),
                    )))
                }
            }
        }
    }

    pub(crate) fn sqlite_file(&self) -> Result<&Path, ConfigError> {
        self.sqlite_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| ConfigError::new(["database.sqlite_path"]))
    }
}

pub(crate) fn check(result: ProcessResult, operation: &'static str) -> Result<(), DbError> {
    if result.ok() {
        Ok(())
    } else {
        Err(DbError::Process {
            operation,
            exit_code: result.exit_code,
            stderr: result.stderr_tail(400).to_string(),
        })
    }
}

/// Trailing portion of a captured stderr buffer, UTF-8 safe.
pub(crate) fn stderr_tail(stderr: &str, max: usize) -> String {
    let s = stderr.trim();
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}

#[cfg(test)]
#[path = "conn_tests.rs"]
mod tests;
