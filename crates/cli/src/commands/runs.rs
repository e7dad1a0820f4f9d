// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run record listing and cleanup output.

use anyhow::bail;
use bh_core::{RunStatus, RunType};
use bh_engine::{CleanupReport, Engine};
use bh_storage::RunQuery;

pub fn list(
    engine: &Engine,
    run_type: Option<&str>,
    status: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    let query = RunQuery {
        run_type: run_type.map(parse_run_type).transpose()?,
        status: status.map(parse_status).transpose()?,
        limit: Some(limit),
        ..RunQuery::default()
    };
    let records = engine.runs.list(&query)?;
    if records.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }
    for record in records {
        let finished = record
            .finished_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let mut line = format!(
            "{}  {:<16} {:<8} started {}  finished {}",
            record.id,
            record.run_type.to_string(),
            record.status.to_string(),
            record.started_at.to_rfc3339(),
            finished
        );
        if let Some(error) = &record.meta.error {
            line.push_str(&format!("  [{} @ {}] {}", error.kind, error.step, error.message));
        }
        if let Some(reason) = &record.meta.skip_reason {
            line.push_str(&format!("  reason={reason}"));
        }
        println!("{line}");
    }
    Ok(())
}

fn parse_run_type(s: &str) -> anyhow::Result<RunType> {
    Ok(match s {
        "backup" => RunType::Backup,
        "restore" => RunType::Restore,
        "forget_snapshot" | "forget" => RunType::ForgetSnapshot,
        "export_snapshot" => RunType::ExportSnapshot,
        "export_full" => RunType::ExportFull,
        "export_delta" => RunType::ExportDelta,
        other => bail!("unknown run type '{other}'"),
    })
}

fn parse_status(s: &str) -> anyhow::Result<RunStatus> {
    Ok(match s {
        "running" => RunStatus::Running,
        "success" => RunStatus::Success,
        "failed" => RunStatus::Failed,
        "skipped" => RunStatus::Skipped,
        other => bail!("unknown status '{other}'"),
    })
}

pub fn print_cleanup(what: &str, report: &CleanupReport) {
    let verb = if report.dry_run { "would remove" } else { "removed" };
    println!("{what}: {verb} {} entries, kept {}", report.removed.len(), report.kept.len());
    for path in &report.removed {
        println!("  {verb} {}", path.display());
    }
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
