// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline triggers: backup, restore, export, forget.

use anyhow::bail;
use bh_core::RunRecord;
use bh_engine::{
    BackupOptions, CutoverMode, Disposition, Engine, FullExportOptions, RestoreOptions,
    RestoreScope,
};

use crate::exit_error::{ExitError, EX_TEMPFAIL};

pub async fn backup(engine: &Engine, tags: Vec<String>, trigger: String) -> anyhow::Result<()> {
    let disposition = engine
        .run_backup(BackupOptions {
            tags,
            trigger,
            attempt: 0,
        })
        .await?;
    handle(disposition, "backup")
}

pub async fn restore(
    engine: &Engine,
    snapshot: String,
    scope: &str,
    mode: &str,
    no_safety_backup: bool,
    yes: bool,
) -> anyhow::Result<()> {
    let scope = match scope {
        "files" => RestoreScope::Files,
        "db" | "database" => RestoreScope::Database,
        "full" => RestoreScope::Full,
        other => bail!("unknown scope '{other}' (expected files, db, or full)"),
    };
    let mode = match mode {
        "atomic" => CutoverMode::Atomic,
        "rsync" => CutoverMode::Rsync,
        other => bail!("unknown mode '{other}' (expected atomic or rsync)"),
    };
    if !yes {
        bail!(
            "a restore destructively replaces {}; re-run with --yes to proceed",
            match scope {
                RestoreScope::Files => "the project files",
                RestoreScope::Database => "the database",
                RestoreScope::Full => "the project files and the database",
            }
        );
    }

    let disposition = engine
        .run_restore(RestoreOptions {
            snapshot,
            scope,
            mode,
            safety_backup: if no_safety_backup { Some(false) } else { None },
        })
        .await?;
    handle(disposition, "restore")
}

pub async fn export_full(
    engine: &Engine,
    snapshot: Option<String>,
    include_env: bool,
) -> anyhow::Result<()> {
    let disposition = engine
        .run_export_full(FullExportOptions {
            snapshot,
            include_env,
            attempt: 0,
        })
        .await?;
    handle(disposition, "export")
}

pub async fn export_delta(engine: &Engine) -> anyhow::Result<()> {
    let disposition = engine.run_export_delta(0).await?;
    handle(disposition, "delta export")
}

pub async fn forget(engine: &Engine) -> anyhow::Result<()> {
    let disposition = engine.run_forget(0).await?;
    handle(disposition, "forget")
}

fn handle(disposition: Disposition, what: &str) -> anyhow::Result<()> {
    match disposition {
        Disposition::Completed(record) => {
            print_record(&record);
            Ok(())
        }
        Disposition::Skipped(record) => {
            println!(
                "{what} skipped: {} (run {})",
                record.meta.skip_reason.as_deref().unwrap_or("unknown"),
                record.id
            );
            Ok(())
        }
        Disposition::Requeue { attempt, delay } => Err(ExitError::new(
            EX_TEMPFAIL,
            format!(
                "operation lock busy; retry {what} in {}s (attempt {attempt})",
                delay.as_secs()
            ),
        )
        .into()),
    }
}

fn print_record(record: &RunRecord) {
    println!("{} {} {}", record.id, record.run_type, record.status);
    for step in &record.meta.steps {
        let mut line = format!("  {} {}", step.step, step.status);
        if let Some(code) = step.meta.exit_code {
            line.push_str(&format!(" exit={code}"));
        }
        if let Some(note) = &step.meta.note {
            line.push_str(&format!(" ({note})"));
        }
        println!("{line}");
    }
    for warning in &record.meta.warnings {
        println!("  warning: {warning}");
    }
    if let Some(bundle) = &record.meta.bundle {
        println!(
            "  bundle: {} ({} bytes, sha256 {})",
            bundle.path.display(),
            bundle.size_bytes,
            bundle.sha256
        );
    }
    if let Some(rollback_dir) = &record.meta.rollback_dir {
        println!("  rollback dir retained: {}", rollback_dir.display());
    }
}
