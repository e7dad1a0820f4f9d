// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Settings snapshot.
//!
//! Loaded once per pipeline run from a TOML file plus environment
//! overrides for secrets, and treated as a consistent snapshot for the
//! run's duration. Field presence is validated lazily at the point of
//! use, so the resulting [`ConfigError`] names exactly the fields the
//! failing operation needed.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Database driver, a closed set. MariaDB speaks the MySQL protocol and
/// shares the MySQL strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbDriver {
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(alias = "pgsql")]
    Postgres,
    Sqlite,
}

impl std::fmt::Display for DbDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DbDriver::Mysql => "mysql",
            DbDriver::Postgres => "postgres",
            DbDriver::Sqlite => "sqlite",
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Application name, used in snapshot tags and bundle names.
    pub name: String,
    /// Environment label (production, staging, ...).
    pub environment: String,
    /// Live project root that backups capture and restores replace.
    pub project_root: PathBuf,
    /// Where Backhaul keeps run records, baselines, and exports.
    pub state_dir: PathBuf,
}

fn default_snapshot_bin() -> PathBuf {
    PathBuf::from("restic")
}

fn default_tool_timeout() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    /// Repository address: local path or object-storage URL.
    pub url: String,
    /// Repository encryption password.
    pub password: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Snapshot tool binary.
    pub bin: PathBuf,
    /// Per-invocation subprocess timeout.
    pub timeout_secs: u64,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            password: String::new(),
            access_key_id: None,
            secret_access_key: None,
            bin: default_snapshot_bin(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

/// Keep-counts for pruning old snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub keep_last: Option<u32>,
    pub keep_daily: Option<u32>,
    pub keep_weekly: Option<u32>,
    pub keep_monthly: Option<u32>,
    pub keep_yearly: Option<u32>,
}

impl RetentionPolicy {
    /// True when no keep-count is configured; retention is then skipped.
    pub fn is_empty(&self) -> bool {
        [
            self.keep_last,
            self.keep_daily,
            self.keep_weekly,
            self.keep_monthly,
            self.keep_yearly,
        ]
        .iter()
        .all(|c| c.unwrap_or(0) == 0)
    }
}

fn default_dump_dir() -> PathBuf {
    PathBuf::from("storage/app/backhaul")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Paths to snapshot. Empty means the project root.
    pub include: Vec<PathBuf>,
    /// Exclude patterns passed through to the snapshot tool.
    pub exclude: Vec<String>,
    /// Extra tags on every snapshot.
    pub tags: Vec<String>,
    /// Where database dumps land, relative to the project root.
    pub dump_dir: PathBuf,
    /// Lock TTL and overall budget for a backup run.
    pub max_duration_secs: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            tags: Vec::new(),
            dump_dir: default_dump_dir(),
            max_duration_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub driver: DbDriver,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub username: String,
    pub password: String,
    /// SQLite database file (sqlite driver only).
    pub sqlite_path: Option<PathBuf>,
    /// Internal bookkeeping tables excluded from dumps.
    pub exclude_tables: Vec<String>,
    /// Tables/views never dropped by a restore wipe.
    pub preserve_tables: Vec<String>,
    /// Dumper binary override (mysqldump / pg_dump).
    pub dump_bin: Option<PathBuf>,
    /// Client binary override (mysql / psql / sqlite3).
    pub client_bin: Option<PathBuf>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            driver: DbDriver::Mysql,
            host: "127.0.0.1".to_string(),
            port: None,
            database: String::new(),
            username: String::new(),
            password: String::new(),
            sqlite_path: None,
            exclude_tables: Vec::new(),
            preserve_tables: Vec::new(),
            dump_bin: None,
            client_bin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreSettings {
    /// Take a safety dump+snapshot before cutover.
    pub safety_backup: bool,
    /// Environment file kept out of snapshots and carried across swaps.
    pub env_file: String,
    /// Lock TTL and overall budget for a restore run.
    pub max_duration_secs: u64,
    /// Days a rollback directory is retained before cleanup.
    pub rollback_retention_days: u32,
    /// Optional command run after cutover to restart worker processes.
    pub restart_workers_cmd: Option<Vec<String>>,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            safety_backup: true,
            env_file: ".env".to_string(),
            max_duration_secs: 7200,
            rollback_retention_days: 7,
            restart_workers_cmd: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Where bundles land. Defaults to `<state_dir>/exports`.
    pub output_dir: Option<PathBuf>,
    /// Project-relative subpaths stripped from bundles.
    pub exclude: Vec<String>,
    /// Days an export bundle is retained before cleanup.
    pub retention_days: u32,
    /// Lock TTL and overall budget for an export run.
    pub max_duration_secs: u64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            exclude: Vec::new(),
            retention_days: 14,
            max_duration_secs: 7200,
        }
    }
}

/// The full settings snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub repository: RepositorySettings,
    pub retention: RetentionPolicy,
    pub backup: BackupSettings,
    pub database: DatabaseSettings,
    pub restore: RestoreSettings,
    pub export: ExportSettings,
}

impl Settings {
    /// Load from a TOML file, apply environment overrides, and check the
    /// fields every pipeline needs up front.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings =
            toml::from_str(&text).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.apply_env_overrides();
        settings.validate_base()?;
        Ok(settings)
    }

    /// Secrets come from the environment when present, so the TOML file
    /// can stay free of credentials.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BACKHAUL_REPOSITORY_PASSWORD") {
            self.repository.password = v;
        }
        if let Ok(v) = std::env::var("BACKHAUL_AWS_ACCESS_KEY_ID") {
            self.repository.access_key_id = Some(v);
        }
        if let Ok(v) = std::env::var("BACKHAUL_AWS_SECRET_ACCESS_KEY") {
            self.repository.secret_access_key = Some(v);
        }
        if let Ok(v) = std::env::var("BACKHAUL_DB_PASSWORD") {
            self.database.password = v;
        }
    }

    fn validate_base(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.app.name.is_empty() {
            missing.push("app.name");
        }
        if self.app.project_root.as_os_str().is_empty() {
            missing.push("app.project_root");
        }
        if self.app.state_dir.as_os_str().is_empty() {
            missing.push("app.state_dir");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(missing))
        }
    }

    /// Paths the backup pipeline snapshots.
    pub fn backup_paths(&self) -> Vec<PathBuf> {
        if self.backup.include.is_empty() {
            vec![self.app.project_root.clone()]
        } else {
            self.backup.include.clone()
        }
    }

    /// Absolute dump directory inside the project.
    pub fn dump_dir(&self) -> PathBuf {
        self.app.project_root.join(&self.backup.dump_dir)
    }

    /// Where export bundles land.
    pub fn export_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| self.app.state_dir.join("exports"))
    }

    /// Every configured secret value, for the redactor.
    pub fn secret_values(&self) -> Vec<String> {
        let mut secrets = vec![
            self.repository.password.clone(),
            self.database.password.clone(),
        ];
        if let Some(v) = &self.repository.access_key_id {
            secrets.push(v.clone());
        }
        if let Some(v) = &self.repository.secret_access_key {
            secrets.push(v.clone());
        }
        secrets
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
