// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret scrubbing for captured output and error messages.
//!
//! Every string that ends up in a persisted run record passes through a
//! [`Redactor`] first: subprocess stdout/stderr, command echoes, and
//! error messages alike, on success and on failure.

use regex::Regex;
use std::sync::OnceLock;

const MASK: &str = "[redacted]";

/// Matches `scheme://user:password@` userinfo embedded in URLs.
const URL_AUTH_PATTERN: &str = r"(?P<scheme>[a-zA-Z][a-zA-Z0-9+.-]*://)(?P<user>[^/@:\s]+):(?P<pass>[^/@\s]+)@";

fn url_auth_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(URL_AUTH_PATTERN).ok()).as_ref()
}

/// Scrubs configured secret values and embedded basic-auth credentials
/// from arbitrary text.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// Build a redactor over the given secret values. Empty strings are
    /// ignored; longer secrets are replaced first so a secret that contains
    /// another secret as a substring scrubs cleanly.
    pub fn new(secrets: impl IntoIterator<Item = String>) -> Self {
        let mut secrets: Vec<String> = secrets.into_iter().filter(|s| !s.is_empty()).collect();
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        secrets.dedup();
        Self { secrets }
    }

    /// Replace every configured secret and URL userinfo password in `text`.
    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            out = out.replace(secret.as_str(), MASK);
        }
        if let Some(re) = url_auth_re() {
            out = re
                .replace_all(&out, format!("${{scheme}}${{user}}:{MASK}@"))
                .into_owned();
        }
        out
    }

    /// Scrub an optional string in place.
    pub fn scrub_opt(&self, text: Option<&str>) -> Option<String> {
        text.map(|t| self.scrub(t))
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
