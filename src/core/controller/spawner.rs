// src/core/controller/spawner.rs

//! Spawning of aggregator daemons as external subprocesses.

use crate::core::topology::DesiredState;
use anyhow::Result;
use tokio::process::Command;
use tracing::{info, warn};

const LOG_DIR: &str = "log";
const DAEMON_BIN: &str = "ldmsd";
const MEMORY_LIMIT: &str = "2g";

/// Launches one `ldmsd` per aggregator host. Spawn failures are logged and do
/// not abort the monitor; the reconciler keeps polling until a daemon shows
/// up.
pub async fn spawn_aggregators(state: &DesiredState) -> Result<()> {
    tokio::fs::create_dir_all(LOG_DIR).await?;

    for (group, members) in &state.aggregators {
        for agg in members {
            let Some(host) = state.hosts.get(&agg.host) else {
                warn!(
                    "aggregator '{}' in group '{}' references unknown host '{}'",
                    agg.name, group, agg.host
                );
                continue;
            };
            let mut command = Command::new(DAEMON_BIN);
            command
                .arg("-x")
                .arg(format!("{}:{}", host.xprt, host.port))
                .arg("-a")
                .arg(&host.auth.name)
                .arg("-l")
                .arg(format!("{LOG_DIR}/{}.log", agg.name))
                .arg("-m")
                .arg(MEMORY_LIMIT)
                .arg("-r")
                .arg(format!("{LOG_DIR}/{}.pid", agg.name));

            match command.spawn() {
                Ok(child) => info!(
                    "spawned {DAEMON_BIN} for aggregator '{}' (pid {:?})",
                    agg.name,
                    child.id()
                ),
                Err(e) => warn!("failed to spawn {DAEMON_BIN} for '{}': {}", agg.name, e),
            }
        }
    }
    Ok(())
}
