// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

mod pipelines;
mod runs;
mod unlock;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use bh_core::Settings;
use bh_engine::Engine;
use bh_lock::FsLockStore;

use crate::{Cli, Commands, ExportCommands};

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(cli.config.as_deref())?;
    let lock_store = Arc::new(FsLockStore::new(settings.app.state_dir.join("locks")));
    let engine = Engine::new(settings, lock_store);

    match cli.command {
        Commands::Backup { tags, trigger } => pipelines::backup(&engine, tags, trigger).await,
        Commands::Restore {
            snapshot,
            scope,
            mode,
            no_safety_backup,
            yes,
        } => pipelines::restore(&engine, snapshot, &scope, &mode, no_safety_backup, yes).await,
        Commands::Export(ExportCommands::Full {
            snapshot,
            include_env,
        }) => pipelines::export_full(&engine, snapshot, include_env).await,
        Commands::Export(ExportCommands::Delta) => pipelines::export_delta(&engine).await,
        Commands::Forget => pipelines::forget(&engine).await,
        Commands::Runs {
            run_type,
            status,
            limit,
        } => runs::list(&engine, run_type.as_deref(), status.as_deref(), limit),
        Commands::Unlock {
            force,
            stale_after_secs,
        } => unlock::unlock(&engine, force, stale_after_secs),
        Commands::CleanupExports {
            older_than_days,
            dry_run,
        } => {
            let report = engine.cleanup_exports(older_than_days, dry_run)?;
            runs::print_cleanup("exports", &report);
            Ok(())
        }
        Commands::CleanupRollbacks {
            older_than_days,
            dry_run,
        } => {
            let report = engine.cleanup_rollbacks(older_than_days, dry_run)?;
            runs::print_cleanup("rollbacks", &report);
            Ok(())
        }
    }
}

/// `--config`, `$BACKHAUL_CONFIG`, the user config dir, `/etc/backhaul.toml`.
fn load_settings(explicit: Option<&std::path::Path>) -> anyhow::Result<Settings> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    Settings::load(&path).with_context(|| format!("loading settings from {}", path.display()))
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("BACKHAUL_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    if let Some(config_dir) = dirs::config_dir() {
        let candidate = config_dir.join("backhaul/backhaul.toml");
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    let etc = PathBuf::from("/etc/backhaul.toml");
    if etc.is_file() {
        return Ok(etc);
    }
    bail!("no settings file found; pass --config or set BACKHAUL_CONFIG");
}
