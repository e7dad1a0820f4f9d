// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bh: backup, restore, and disaster-recovery export for a web project.

mod commands;
mod exit_error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use exit_error::ExitError;

#[derive(Parser)]
#[command(name = "bh", about = "Backhaul: snapshot-backed backup and restore", version)]
struct Cli {
    /// Settings file (default: $BACKHAUL_CONFIG, then the user config dir,
    /// then /etc/backhaul.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the database, snapshot the project, apply retention.
    Backup {
        /// Extra snapshot tags.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Trigger label recorded on the snapshot.
        #[arg(long, default_value = "console")]
        trigger: String,
    },
    /// Destructively restore files and/or database from a snapshot.
    Restore {
        /// Snapshot id, short id, or unique prefix.
        snapshot: String,
        /// What to restore: files, db, or full.
        #[arg(long, default_value = "full")]
        scope: String,
        /// Cutover mode: atomic (two renames) or rsync (in-place sync).
        #[arg(long, default_value = "atomic")]
        mode: String,
        /// Skip the safety backup taken before cutover.
        #[arg(long)]
        no_safety_backup: bool,
        /// Required: restores are destructive.
        #[arg(long)]
        yes: bool,
    },
    /// Build disaster-recovery bundles.
    #[command(subcommand)]
    Export(ExportCommands),
    /// Prune old snapshots per the retention policy.
    Forget,
    /// List run records.
    Runs {
        /// Filter by run type (backup, restore, export_full, ...).
        #[arg(long = "type")]
        run_type: Option<String>,
        /// Filter by status (running, success, failed, skipped).
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Clear the operation lock.
    Unlock {
        /// Clear unconditionally.
        #[arg(long)]
        force: bool,
        /// Only clear when the holder's heartbeat is older than this.
        #[arg(long, default_value_t = 600)]
        stale_after_secs: u64,
    },
    /// Remove export bundles past their retention window.
    CleanupExports {
        #[arg(long)]
        older_than_days: Option<u32>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove aged rollback directories left by past restores.
    CleanupRollbacks {
        #[arg(long)]
        older_than_days: Option<u32>,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ExportCommands {
    /// Export the latest (or a specific) snapshot as a full bundle.
    Full {
        /// Export this snapshot instead of the latest.
        #[arg(long)]
        snapshot: Option<String>,
        /// Keep the environment file in the bundle.
        #[arg(long)]
        include_env: bool,
    },
    /// Export the changes since the recorded baseline.
    Delta,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ExitError>() {
                Some(exit) => {
                    eprintln!("bh: {exit}");
                    ExitCode::from(exit.code)
                }
                None => {
                    eprintln!("bh: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
