// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The snapshot-tool subprocess wrapper.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bh_core::{ConfigError, Redactor, RepositorySettings, RetentionPolicy, Settings};
use bh_proc::{CommandRunner, CommandSpec, Heartbeat, ProcessResult, RunnerError};
use tracing::debug;

use crate::model::{Snapshot, SnapshotDiff};

/// JSON-producing calls (snapshot lists, stats) can be large; capture more
/// than the default before truncating.
const JSON_CAPTURE_LIMIT: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SnapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    /// Non-zero exit. Output in `result` is already redacted; `hint` is a
    /// best-effort diagnosis appended for the operator.
    #[error("snapshot tool failed (exit {}): {message}", result.exit_code)]
    Process {
        message: String,
        result: Box<ProcessResult>,
        hint: Option<String>,
    },
    #[error("snapshot '{query}' not found")]
    NotFound { query: String },
    #[error("snapshot id '{query}' matches more than one snapshot")]
    Ambiguous { query: String },
    #[error("retention policy is empty; nothing to forget")]
    EmptyPolicy,
    #[error("unexpected snapshot tool output: {0}")]
    Malformed(String),
}

/// Filters for `snapshots --json`.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    pub tags: Vec<String>,
    pub host: Option<String>,
}

#[derive(Default)]
pub struct BackupOpts {
    pub excludes: Vec<String>,
    pub heartbeat: Option<Heartbeat>,
}

#[derive(Default)]
pub struct RestoreOpts {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub heartbeat: Option<Heartbeat>,
}

/// Stateless command builder over one external snapshot binary.
#[derive(Clone)]
pub struct SnapshotTool {
    repo: RepositorySettings,
    redactor: Redactor,
}

impl SnapshotTool {
    pub fn new(settings: &Settings) -> Self {
        Self {
            repo: settings.repository.clone(),
            redactor: Redactor::new(settings.secret_values()),
        }
    }

    pub fn from_parts(repo: RepositorySettings, redactor: Redactor) -> Self {
        Self { repo, redactor }
    }

    /// Repository credentials as process environment. Raises a
    /// [`ConfigError`] naming exactly the missing fields.
    fn credential_env(&self) -> Result<Vec<(String, String)>, ConfigError> {
        let mut missing = Vec::new();
        if self.repo.url.is_empty() {
            missing.push("repository.url");
        }
        if self.repo.password.is_empty() {
            missing.push("repository.password");
        }
        let wants_object_storage = self.repo.url.starts_with("s3:");
        if wants_object_storage && self.repo.access_key_id.as_deref().unwrap_or("").is_empty() {
            missing.push("repository.access_key_id");
        }
        if wants_object_storage
            && self
                .repo
                .secret_access_key
                .as_deref()
                .unwrap_or("")
                .is_empty()
        {
            missing.push("repository.secret_access_key");
        }
        if !missing.is_empty() {
            return Err(ConfigError::new(missing));
        }

        let mut env = vec![
            ("RESTIC_REPOSITORY".to_string(), self.repo.url.clone()),
            ("RESTIC_PASSWORD".to_string(), self.repo.password.clone()),
        ];
        if let Some(key) = &self.repo.access_key_id {
            env.push(("AWS_ACCESS_KEY_ID".to_string(), key.clone()));
        }
        if let Some(secret) = &self.repo.secret_access_key {
            env.push(("AWS_SECRET_ACCESS_KEY".to_string(), secret.clone()));
        }
        Ok(env)
    }

    async fn run(
        &self,
        args: Vec<String>,
        parse_json: bool,
        heartbeat: Option<Heartbeat>,
    ) -> Result<ProcessResult, SnapError> {
        let env = self.credential_env()?;
        let mut spec = CommandSpec::new(&self.repo.bin)
            .args(args)
            .timeout(Duration::from_secs(self.repo.timeout_secs));
        for (k, v) in env {
            spec = spec.env(k, v);
        }
        if parse_json {
            // Snapshot lists and diffs can be large; raise the cap so the
            // parser doesn't see a truncated document.
            spec = spec.expect_json().capture_limit(JSON_CAPTURE_LIMIT);
        }
        if let Some(hb) = heartbeat {
            spec = spec.heartbeat(hb);
        }

        let raw = CommandRunner::run(spec).await?;
        let result = self.redact_result(raw);
        debug!(cmd = %result.display_command(), exit = result.exit_code, "snapshot tool finished");

        if result.ok() {
            Ok(result)
        } else {
            Err(self.process_error(result))
        }
    }

    fn process_error(&self, result: ProcessResult) -> SnapError {
        let hint = failure_hint(&result.stderr);
        let message = self
            .redactor
            .scrub(result.stderr_tail(400))
            .trim()
            .to_string();
        SnapError::Process {
            message,
            result: Box::new(result),
            hint,
        }
    }

    /// Scrub secrets and embedded basic-auth from captured output before
    /// anything downstream can persist it.
    fn redact_result(&self, raw: ProcessResult) -> ProcessResult {
        ProcessResult {
            stdout: self.redactor.scrub(&raw.stdout),
            stderr: self.redactor.scrub(&raw.stderr),
            ..raw
        }
    }

    /// Connectivity and configuration probe.
    pub async fn version(&self) -> Result<ProcessResult, SnapError> {
        self.run(vec!["version".to_string()], false, None).await
    }

    pub async fn snapshots(
        &self,
        filter: &SnapshotFilter,
    ) -> Result<(Vec<Snapshot>, ProcessResult), SnapError> {
        let mut args = vec!["snapshots".to_string(), "--json".to_string()];
        for tag in &filter.tags {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }
        if let Some(host) = &filter.host {
            args.push("--host".to_string());
            args.push(host.clone());
        }
        let result = self.run(args, true, None).await?;
        let Some(json) = result.json.clone() else {
            return Err(SnapError::Malformed(
                "snapshots --json produced no parseable JSON".to_string(),
            ));
        };
        let snapshots: Vec<Snapshot> = serde_json::from_value(json)
            .map_err(|e| SnapError::Malformed(format!("snapshot list: {e}")))?;
        Ok((snapshots, result))
    }

    pub async fn backup(
        &self,
        paths: &[PathBuf],
        tags: &[String],
        opts: BackupOpts,
    ) -> Result<ProcessResult, SnapError> {
        let mut args = vec!["backup".to_string()];
        for tag in tags {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }
        for exclude in &opts.excludes {
            args.push("--exclude".to_string());
            args.push(exclude.clone());
        }
        args.extend(paths.iter().map(|p| p.display().to_string()));
        self.run(args, false, opts.heartbeat).await
    }

    pub async fn forget(
        &self,
        policy: &RetentionPolicy,
        prune: bool,
    ) -> Result<ProcessResult, SnapError> {
        if policy.is_empty() {
            return Err(SnapError::EmptyPolicy);
        }
        let mut args = vec!["forget".to_string()];
        let keeps = [
            ("--keep-last", policy.keep_last),
            ("--keep-daily", policy.keep_daily),
            ("--keep-weekly", policy.keep_weekly),
            ("--keep-monthly", policy.keep_monthly),
            ("--keep-yearly", policy.keep_yearly),
        ];
        for (flag, count) in keeps {
            if let Some(count) = count.filter(|c| *c > 0) {
                args.push(flag.to_string());
                args.push(count.to_string());
            }
        }
        if prune {
            args.push("--prune".to_string());
        }
        self.run(args, false, None).await
    }

    pub async fn restore(
        &self,
        snapshot_id: &str,
        target: &Path,
        opts: RestoreOpts,
    ) -> Result<ProcessResult, SnapError> {
        let mut args = vec![
            "restore".to_string(),
            snapshot_id.to_string(),
            "--target".to_string(),
            target.display().to_string(),
        ];
        for include in &opts.includes {
            args.push("--include".to_string());
            args.push(include.clone());
        }
        for exclude in &opts.excludes {
            args.push("--exclude".to_string());
            args.push(exclude.clone());
        }
        self.run(args, false, opts.heartbeat).await
    }

    pub async fn diff(
        &self,
        id_a: &str,
        id_b: &str,
        heartbeat: Option<Heartbeat>,
    ) -> Result<(SnapshotDiff, ProcessResult), SnapError> {
        let env = self.credential_env()?;
        let mut spec = CommandSpec::new(&self.repo.bin)
            .args(vec!["diff".to_string(), id_a.to_string(), id_b.to_string()])
            .timeout(Duration::from_secs(self.repo.timeout_secs))
            .capture_limit(JSON_CAPTURE_LIMIT);
        for (k, v) in env {
            spec = spec.env(k, v);
        }
        if let Some(hb) = heartbeat {
            spec = spec.heartbeat(hb);
        }
        let raw = CommandRunner::run(spec).await?;
        let result = self.redact_result(raw);
        if !result.ok() {
            return Err(self.process_error(result));
        }
        let diff = SnapshotDiff::parse(&result.stdout);
        Ok((diff, result))
    }

    /// Expected on-disk size of a snapshot, from the store's own
    /// accounting.
    pub async fn stats_restore_size(
        &self,
        snapshot_id: &str,
    ) -> Result<(u64, ProcessResult), SnapError> {
        let args = vec![
            "stats".to_string(),
            "--mode".to_string(),
            "restore-size".to_string(),
            "--json".to_string(),
            snapshot_id.to_string(),
        ];
        let result = self.run(args, true, None).await?;
        let size = result
            .json
            .as_ref()
            .and_then(|j| j.get("total_size"))
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                SnapError::Malformed("stats output missing total_size".to_string())
            })?;
        Ok((size, result))
    }
}

/// Best-effort failure diagnosis appended to process errors. Never fails
/// the call.
fn failure_hint(stderr: &str) -> Option<String> {
    let lower = stderr.to_lowercase();
    if lower.contains("is there a repository") || lower.contains("wrong password") {
        return Some(
            "the repository may be uninitialized or the password is wrong; \
             initialize it with the snapshot tool before retrying"
                .to_string(),
        );
    }
    let connectivity = lower.contains("connection refused")
        || lower.contains("proxyconnect")
        || lower.contains("i/o timeout")
        || lower.contains("no such host");
    if connectivity && proxy_configured() {
        return Some(
            "an HTTP(S) proxy is configured in this environment; verify it \
             allows access to the repository host"
                .to_string(),
        );
    }
    None
}

fn proxy_configured() -> bool {
    ["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"]
        .iter()
        .any(|k| std::env::var_os(k).is_some_and(|v| !v.is_empty()))
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
