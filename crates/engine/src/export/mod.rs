// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Disaster-recovery export bundles (full and delta).
//!
//! Both pipelines run under the operation lock, clean their scratch tree
//! unconditionally, and delete a partially written archive on failure so
//! corrupt output is never left discoverable.

mod delta;
mod full;

use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use bh_core::{BundleMeta, FailureKind, StepName};
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::run_ctx::RunCtx;

pub use full::FullExportOptions;

/// Archive entries are written 0640 and the archive itself matches.
const BUNDLE_MODE: u32 = 0o640;

#[derive(Debug, Clone, Default)]
pub struct ExportDocs<'a> {
    pub readme: String,
    pub manifest: serde_json::Value,
    /// Manifest-listed deleted paths, also written as `TOOLS/deleted.list`
    /// for the shell tools (delta bundles only).
    pub deleted: Option<&'a [String]>,
}

impl Engine {
    /// `<app>-<env>-<kind>-<shortid>-<timestamp>`
    pub(crate) fn bundle_name(&self, kind: &str, short_id: &str) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.settings.app.name,
            self.settings.app.environment,
            kind,
            short_id,
            Utc::now().format("%Y%m%d-%H%M%S")
        )
    }

    /// Write README, manifest, and the restore tooling into the bundle.
    pub(crate) fn write_bundle_docs(
        &self,
        bundle_dir: &Path,
        docs: &ExportDocs<'_>,
    ) -> std::io::Result<()> {
        std::fs::create_dir_all(bundle_dir)?;
        std::fs::write(bundle_dir.join("README.txt"), &docs.readme)?;
        std::fs::write(
            bundle_dir.join("manifest.json"),
            serde_json::to_vec_pretty(&docs.manifest)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
        )?;

        let tools = bundle_dir.join("TOOLS");
        std::fs::create_dir_all(&tools)?;
        std::fs::write(tools.join("restore.sh"), RESTORE_SH)?;
        std::fs::set_permissions(
            tools.join("restore.sh"),
            std::fs::Permissions::from_mode(0o755),
        )?;
        std::fs::write(tools.join("restore.ps1"), RESTORE_PS1)?;
        if let Some(deleted) = docs.deleted {
            let mut list = deleted.join("\n");
            if !list.is_empty() {
                list.push('\n');
            }
            std::fs::write(tools.join("deleted.list"), list)?;
        }
        Ok(())
    }

    /// Tar+gzip the bundle directory into the export output dir, record
    /// checksum and size, register it for retention cleanup. A partial
    /// archive is deleted on failure.
    pub(crate) fn package_bundle(
        &self,
        ctx: &mut RunCtx,
        bundle_dir: &Path,
        bundle_name: &str,
    ) -> Result<BundleMeta, EngineError> {
        ctx.heartbeat(StepName::Package);
        let out_dir = self.settings.export_dir();
        if let Err(e) = std::fs::create_dir_all(&out_dir) {
            return Err(ctx.fail(
                StepName::Package,
                FailureKind::Runtime,
                format!("cannot create export dir: {e}"),
            ));
        }
        let archive_path = out_dir.join(format!("{bundle_name}.tar.gz"));

        if let Err(e) = tar_gz(bundle_dir, bundle_name, &archive_path) {
            // Never leave a corrupt archive discoverable.
            let _ = std::fs::remove_file(&archive_path);
            return Err(ctx.fail(
                StepName::Package,
                FailureKind::Runtime,
                format!("packaging failed: {e}"),
            ));
        }
        if let Err(e) = std::fs::set_permissions(
            &archive_path,
            std::fs::Permissions::from_mode(BUNDLE_MODE),
        ) {
            let _ = std::fs::remove_file(&archive_path);
            return Err(ctx.fail(
                StepName::Package,
                FailureKind::Runtime,
                format!("cannot set archive permissions: {e}"),
            ));
        }

        let (size_bytes, sha256) = match archive_digest(&archive_path) {
            Ok(pair) => pair,
            Err(e) => {
                let _ = std::fs::remove_file(&archive_path);
                return Err(ctx.fail(
                    StepName::Package,
                    FailureKind::Runtime,
                    format!("checksum failed: {e}"),
                ));
            }
        };

        info!(archive = %archive_path.display(), size_bytes, "bundle packaged");
        ctx.step_note(
            StepName::Package,
            format!(
                "{} ({size_bytes} bytes, sha256 {sha256})",
                archive_path.display()
            ),
        )?;

        Ok(BundleMeta {
            path: archive_path,
            size_bytes,
            sha256,
        })
    }
}

fn tar_gz(bundle_dir: &Path, bundle_name: &str, out: &Path) -> std::io::Result<()> {
    let file = std::fs::File::create(out)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(bundle_name, bundle_dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?.sync_all()?;
    Ok(())
}

fn archive_digest(path: &Path) -> std::io::Result<(u64, String)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        hasher.update(&buf[..n]);
    }
    Ok((size, format!("{:x}", hasher.finalize())))
}

/// Applies a delta bundle onto an unpacked full bundle: copy `files/`
/// recursively, then remove the deleted paths listed by the manifest.
const RESTORE_SH: &str = r#"#!/bin/sh
# Apply this delta bundle onto an unpacked full bundle.
# Usage: TOOLS/restore.sh <full-bundle-root>
set -eu
TARGET="${1:?usage: restore.sh <full-bundle-root>}"
HERE="$(cd "$(dirname "$0")/.." && pwd)"
if [ -d "$HERE/files" ]; then
  cp -R "$HERE/files/." "$TARGET/"
fi
if [ -f "$HERE/TOOLS/deleted.list" ]; then
  while IFS= read -r path; do
    [ -n "$path" ] || continue
    rm -rf "$TARGET/${path#/}"
  done < "$HERE/TOOLS/deleted.list"
fi
echo "delta applied to $TARGET"
"#;

const RESTORE_PS1: &str = r#"# Apply this delta bundle onto an unpacked full bundle.
# Usage: TOOLS\restore.ps1 -Target <full-bundle-root>
param([Parameter(Mandatory = $true)][string]$Target)
$ErrorActionPreference = "Stop"
$Here = Split-Path -Parent $PSScriptRoot
$Files = Join-Path $Here "files"
if (Test-Path $Files) {
    Copy-Item -Path (Join-Path $Files "*") -Destination $Target -Recurse -Force
}
$Deleted = Join-Path $PSScriptRoot "deleted.list"
if (Test-Path $Deleted) {
    Get-Content $Deleted | Where-Object { $_ -ne "" } | ForEach-Object {
        $Victim = Join-Path $Target ($_ -replace '^/', '')
        if (Test-Path $Victim) { Remove-Item -Recurse -Force $Victim }
    }
}
Write-Output "delta applied to $Target"
"#;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
