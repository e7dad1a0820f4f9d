// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The companion info record for the operation mutex.

use bh_core::{RunId, RunType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who holds the lock, since when, and how fresh their heartbeat is.
///
/// Timestamps are whole seconds since the Unix epoch. Mutated only by the
/// current holder through heartbeat calls; read by anyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLockInfo {
    #[serde(rename = "type")]
    pub run_type: RunType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub started_at: u64,
    pub hostname: String,
    pub pid: u32,
    /// Equals the pipeline's declared maximum duration, so a crashed
    /// holder's record self-expires.
    pub ttl_seconds: u64,
    pub expires_at: u64,
    pub last_heartbeat_at: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl OperationLockInfo {
    pub fn new(run_type: RunType, ttl_seconds: u64, now: u64) -> Self {
        Self {
            run_type,
            run_id: None,
            started_at: now,
            hostname: local_hostname(),
            pid: std::process::id(),
            ttl_seconds,
            expires_at: now + ttl_seconds,
            last_heartbeat_at: now,
            context: BTreeMap::new(),
        }
    }

    pub fn expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Merge a context patch and refresh heartbeat + expiry.
    pub fn heartbeat(&mut self, patch: &[(String, String)], now: u64) {
        for (k, v) in patch {
            self.context.insert(k.clone(), v.clone());
        }
        self.last_heartbeat_at = now;
        self.expires_at = now + self.ttl_seconds;
    }
}

pub(crate) fn local_hostname() -> String {
    if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
#[path = "info_tests.rs"]
mod tests;
