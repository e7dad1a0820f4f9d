// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured subprocess output.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of a single subprocess invocation. Immutable once built.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Program name (argv\[0\]).
    pub program: String,
    /// Full arguments (argv\[1..\]).
    pub args: Vec<String>,
    /// Exit code returned by the process (-1 when terminated by signal).
    pub exit_code: i32,
    /// Wall-clock duration.
    pub duration: Duration,
    /// First N bytes of captured stdout.
    pub stdout: String,
    /// First N bytes of captured stderr.
    pub stderr: String,
    /// Parsed stdout, when JSON output was requested and parseable.
    pub json: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProcessResult {
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }

    /// Shell-escaped echo of the argument vector, for display and audit
    /// records. Credentials never appear here; they travel via the
    /// process environment.
    pub fn display_command(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(quote_arg(&self.program));
        parts.extend(self.args.iter().map(|a| quote_arg(a)));
        parts.join(" ")
    }

    /// Trailing portion of stderr, for compact error messages.
    pub fn stderr_tail(&self, max: usize) -> &str {
        let s = self.stderr.trim_end();
        if s.len() <= max {
            return s;
        }
        let mut start = s.len() - max;
        while start < s.len() && !s.is_char_boundary(start) {
            start += 1;
        }
        &s[start..]
    }
}

/// Quote a single argument for shell-style display.
pub fn quote_arg(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Truncate a byte buffer to a UTF-8–safe string of at most `limit` bytes.
pub(crate) fn truncate_capture(bytes: &[u8], limit: usize) -> String {
    let s = String::from_utf8_lossy(bytes);
    if s.len() <= limit {
        return s.into_owned();
    }
    let mut end = limit.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
