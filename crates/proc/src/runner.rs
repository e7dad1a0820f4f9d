// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn-and-capture execution with timeout and heartbeat.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::AsyncReadExt;

use crate::result::{truncate_capture, ProcessResult};

/// Default output capture ceiling.
pub const DEFAULT_CAPTURE_LIMIT: usize = 64 * 1024;

/// Default heartbeat period during long subprocess runs.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

pub type HeartbeatFn = Arc<dyn Fn() + Send + Sync>;

/// Periodic callback invoked while the child runs. Used to refresh the
/// operation lock, not to yield output.
#[derive(Clone)]
pub struct Heartbeat {
    pub every: Duration,
    pub func: HeartbeatFn,
}

impl Heartbeat {
    pub fn new(func: HeartbeatFn) -> Self {
        Self {
            every: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            func,
        }
    }

    pub fn every(mut self, every: Duration) -> Self {
        self.every = every;
        self
    }
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeat").field("every", &self.every).finish()
    }
}

/// Everything needed to run one subprocess.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment. Credentials go here, never into `args`.
    pub envs: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    pub capture_limit: usize,
    /// Parse stdout as a single JSON document or NDJSON.
    pub parse_json: bool,
    pub heartbeat: Option<Heartbeat>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
            timeout: Duration::from_secs(3600),
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            parse_json: false,
            heartbeat: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    pub fn expect_json(mut self) -> Self {
        self.parse_json = true;
        self
    }

    pub fn heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {after:?} and was killed")]
    TimedOut { program: String, after: Duration },
    #[error("failed waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Stateless subprocess executor.
///
/// A non-zero exit is not an error at this layer; callers get the full
/// [`ProcessResult`] and decide. Errors are reserved for spawn failures
/// and timeouts.
pub struct CommandRunner;

impl CommandRunner {
    pub async fn run(spec: CommandSpec) -> Result<ProcessResult, RunnerError> {
        let program = spec.program.display().to_string();
        let started_at = Utc::now();
        let start = Instant::now();

        let cmd_span = tracing::info_span!(
            "proc.cmd",
            cmd = %program,
            exit_code = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &spec.envs {
            cmd.env(k, v);
        }
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|r| tokio::spawn(capture_capped(r, spec.capture_limit)));
        let stderr_task = child
            .stderr
            .take()
            .map(|r| tokio::spawn(capture_capped(r, spec.capture_limit)));

        let heartbeat = spec.heartbeat.clone();
        let tick_every = heartbeat
            .as_ref()
            .map(|h| h.every)
            .unwrap_or(Duration::from_secs(DEFAULT_HEARTBEAT_SECS));
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + tick_every, tick_every);

        let deadline = tokio::time::sleep(spec.timeout);
        tokio::pin!(deadline);

        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|source| RunnerError::Wait {
                        program: program.clone(),
                        source,
                    })?;
                }
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    return Err(RunnerError::TimedOut {
                        program,
                        after: spec.timeout,
                    });
                }
                _ = ticker.tick() => {
                    if let Some(hb) = &heartbeat {
                        (hb.func)();
                    }
                }
            }
        };

        let stdout_bytes = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let stderr_bytes = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        let duration = start.elapsed();
        let exit_code = status.code().unwrap_or(-1);
        cmd_span.record("exit_code", exit_code);
        cmd_span.record("duration_ms", duration.as_millis() as u64);

        let stdout = truncate_capture(&stdout_bytes, spec.capture_limit);
        let stderr = truncate_capture(&stderr_bytes, spec.capture_limit);
        let json = if spec.parse_json {
            parse_json_output(&stdout)
        } else {
            None
        };

        Ok(ProcessResult {
            program,
            args: spec.args,
            exit_code,
            duration,
            stdout,
            stderr,
            json,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes.
async fn capture_capped<R: tokio::io::AsyncRead + Unpin + Send>(
    mut reader: R,
    limit: usize,
) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if buf.len() < limit {
                    let take = n.min(limit - buf.len());
                    buf.extend_from_slice(&chunk[..take]);
                }
                // Keep draining past the cap so the child never blocks on
                // a full pipe.
            }
        }
    }
    buf
}

/// Accepts a single JSON document or newline-delimited JSON objects
/// (collected into an array). Malformed output parses to `None`.
fn parse_json_output(stdout: &str) -> Option<serde_json::Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let mut items = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(value) => items.push(value),
            Err(_) => return None,
        }
    }
    Some(serde_json::Value::Array(items))
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
