// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator escape hatch for a wedged operation lock.

use anyhow::bail;
use bh_engine::Engine;

pub fn unlock(engine: &Engine, force: bool, stale_after_secs: u64) -> anyhow::Result<()> {
    let Some(info) = engine.lock.read_info()? else {
        println!("no operation lock held");
        return Ok(());
    };

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let heartbeat_age = now.saturating_sub(info.last_heartbeat_at);
    println!(
        "lock held by {} run {} on {} (pid {}), last heartbeat {heartbeat_age}s ago",
        info.run_type,
        info.run_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
        info.hostname,
        info.pid,
    );

    if !force && !engine.lock.is_stale(stale_after_secs)? {
        bail!(
            "holder's heartbeat is fresher than {stale_after_secs}s; \
             use --force to clear anyway"
        );
    }

    engine.lock.force_release()?;
    println!("operation lock cleared");
    Ok(())
}
