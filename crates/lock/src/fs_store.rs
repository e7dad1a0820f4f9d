// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed lock store: the single-host default.
//!
//! The mutex is an exclusively-locked lock file; the OS releases it when
//! the holding process exits, so a crashed worker never wedges the host.
//! The info record is a sibling JSON file with its expiry embedded;
//! expired records read as absent, which keeps the TTL semantics of a
//! networked store.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use parking_lot::Mutex;

use crate::info::OperationLockInfo;
use crate::store::{LockError, LockStore};

pub struct FsLockStore {
    dir: PathBuf,
    /// Held lock files by key. Dropping the handle releases the OS lock.
    held: Mutex<HashMap<String, File>>,
}

impl FsLockStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            held: Mutex::new(HashMap::new()),
        }
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", sanitize(key)))
    }

    fn info_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.info.json", sanitize(key)))
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn remove_if_exists(path: &Path) -> Result<(), LockError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl LockStore for FsLockStore {
    fn try_acquire(&self, key: &str, _ttl_secs: u64) -> Result<bool, LockError> {
        let mut held = self.held.lock();
        if held.contains_key(key) {
            return Ok(false);
        }
        std::fs::create_dir_all(&self.dir)?;
        // Open without truncating so we never wipe a live holder's PID.
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path(key))?;
        if file.try_lock_exclusive().is_err() {
            return Ok(false);
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        held.insert(key.to_string(), file);
        Ok(true)
    }

    fn release(&self, key: &str) -> Result<(), LockError> {
        if let Some(file) = self.held.lock().remove(key) {
            let _ = fs2::FileExt::unlock(&file);
        }
        Ok(())
    }

    fn read_info(&self, key: &str) -> Result<Option<OperationLockInfo>, LockError> {
        let path = self.info_path(key);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let info: OperationLockInfo = match serde_json::from_str(&text) {
            Ok(info) => info,
            // A torn write is treated as no info, not a hard failure.
            Err(_) => return Ok(None),
        };
        if info.expired(self.now_epoch_secs()) {
            return Ok(None);
        }
        Ok(Some(info))
    }

    fn write_info(&self, key: &str, info: &OperationLockInfo) -> Result<(), LockError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.info_path(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(info)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete_info(&self, key: &str) -> Result<(), LockError> {
        remove_if_exists(&self.info_path(key))
    }

    fn force_clear(&self, key: &str) -> Result<(), LockError> {
        // A live holder keeps its lock on the old inode; unlinking lets
        // the next acquire bind a fresh one. Manual escape hatch only.
        self.release(key)?;
        remove_if_exists(&self.lock_path(key))?;
        remove_if_exists(&self.info_path(key))
    }

    fn now_epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

#[cfg(test)]
#[path = "fs_store_tests.rs"]
mod tests;
