// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem helpers: worklist walking, space accounting, copies.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Free-space and filesystem-identity probe, injected so preflight tests
/// don't depend on the host's disks.
pub trait FsProbe: Send + Sync {
    fn free_space(&self, path: &Path) -> io::Result<u64>;
    fn same_filesystem(&self, a: &Path, b: &Path) -> io::Result<bool>;
}

pub struct SystemFsProbe;

impl FsProbe for SystemFsProbe {
    fn free_space(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }

    fn same_filesystem(&self, a: &Path, b: &Path) -> io::Result<bool> {
        Ok(std::fs::metadata(a)?.dev() == std::fs::metadata(b)?.dev())
    }
}

/// Required free space before a restore may mutate anything:
/// `ceil(expected × 1.15) + 2 GiB` when files are in scope, a flat 2 GiB
/// floor for database-only restores.
pub fn required_space(expected_bytes: u64, files_in_scope: bool) -> u64 {
    if !files_in_scope {
        return 2 * GIB;
    }
    let padded = (expected_bytes.saturating_mul(115)).div_ceil(100);
    padded + 2 * GIB
}

/// Total byte size of a directory tree, via an explicit worklist (no
/// recursion). Symlinks are counted by their own size, not followed.
pub fn dir_size(root: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    let mut worklist = vec![root.to_path_buf()];
    while let Some(dir) = worklist.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_dir() {
                worklist.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

/// Remove a tree with an explicit worklist: files first, then directories
/// children-before-parents. Missing root is a no-op.
pub fn remove_tree(root: &Path) -> io::Result<()> {
    let meta = match std::fs::symlink_metadata(root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if !meta.is_dir() {
        return std::fs::remove_file(root);
    }

    // Phase 1: walk, deleting files and collecting directories.
    let mut dirs = vec![root.to_path_buf()];
    let mut worklist = vec![root.to_path_buf()];
    while let Some(dir) = worklist.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                dirs.push(path.clone());
                worklist.push(path);
            } else {
                std::fs::remove_file(&path)?;
            }
        }
    }
    // Phase 2: directories in reverse discovery order, children before
    // parents, the invariant this walker exists to make explicit.
    for dir in dirs.iter().rev() {
        std::fs::remove_dir(dir)?;
    }
    Ok(())
}

/// Copy one entry (file, directory tree, or symlink) preserving symlinks.
pub fn copy_entry(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = std::fs::symlink_metadata(src)?;
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if meta.file_type().is_symlink() {
        let target = std::fs::read_link(src)?;
        if std::fs::symlink_metadata(dst).is_ok() {
            std::fs::remove_file(dst)?;
        }
        std::os::unix::fs::symlink(target, dst)?;
        return Ok(());
    }
    if meta.is_dir() {
        return copy_tree(src, dst);
    }
    std::fs::copy(src, dst)?;
    Ok(())
}

/// Copy a directory tree with a worklist, preserving symlinks.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    let mut worklist = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = worklist.pop() {
        for entry in std::fs::read_dir(&from)? {
            let entry = entry?;
            let from_path = entry.path();
            let to_path = to.join(entry.file_name());
            let file_type = entry.file_type()?;
            if file_type.is_symlink() {
                let target = std::fs::read_link(&from_path)?;
                std::os::unix::fs::symlink(target, &to_path)?;
            } else if file_type.is_dir() {
                std::fs::create_dir_all(&to_path)?;
                worklist.push((from_path, to_path));
            } else {
                std::fs::copy(&from_path, &to_path)?;
            }
        }
    }
    Ok(())
}

/// True when `path` exists and a file can be created inside it.
pub fn dir_writable(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    let probe = path.join(format!(".bh-writable-{}", std::process::id()));
    match std::fs::File::create(&probe) {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Newest regular file under `dir` (non-recursive), by modification time.
pub fn newest_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let mtime = meta.modified()?;
        if newest.as_ref().is_none_or(|(t, _)| mtime > *t) {
            newest = Some((mtime, entry.path()));
        }
    }
    Ok(newest.map(|(_, p)| p))
}

#[cfg(test)]
#[path = "fsutil_tests.rs"]
mod tests;
