// src/core/controller/mod.rs

//! The supervisor tying everything together.
//!
//! Two modes exist. Configure-once loads the declarative description, expands
//! it into the entity graph and replaces the datastore contents. Monitor
//! keeps the fleet converged: it reflects the desired state out of the
//! datastore, watches the commit sentinel for changes and runs a
//! reconciliation pass on a one second tick whenever an aggregator changed
//! state or the datastore changed. A single mutex serializes the watch
//! handler and the tick loop so at most one reconciliation runs at a time.

pub mod spawner;

use crate::config::ClusterConfig;
use crate::core::comm::{Communicator, ConnState, DaemonClient};
use crate::core::datastore::EtcdStore;
use crate::core::reconcile::{CommSet, Connector, Reconciler};
use crate::core::topology::{self, AggState, DesiredState, Host};
use crate::core::tree::Node;
use anyhow::Result;
use etcd_client::EventType;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Everything the watch handler and the tick loop contend for.
pub struct ControlState {
    pub desired: DesiredState,
    pub comms: CommSet,
    pub last_agg_state: IndexMap<String, AggState>,
    /// Set when the datastore changed since the last pass.
    pub store_dirty: bool,
}

fn default_connector(host: &Host) -> Box<dyn Communicator + Send> {
    Box::new(DaemonClient::new(host))
}

/// Configure-once mode: validate, expand and save. Nothing is written when
/// validation fails.
pub async fn configure(
    cluster: &ClusterConfig,
    prefix: &str,
    description: &Path,
) -> Result<()> {
    let tree = Node::from_yaml_file(description)?;
    let desired = topology::build(&tree)?;
    info!(
        "expanded description: {} hosts, {} aggregator groups, {} producer groups, {} sampler groups",
        desired.hosts.len(),
        desired.aggregators.len(),
        desired.producers.len(),
        desired.samplers.len()
    );

    let mut store = EtcdStore::connect(cluster, prefix).await?;
    store.save(&desired).await?;
    Ok(())
}

/// Monitor-forever mode. Runs until interrupted.
pub async fn run_monitor(
    cluster: &ClusterConfig,
    prefix: &str,
    start_aggregators: bool,
) -> Result<()> {
    let mut store = EtcdStore::connect(cluster, prefix).await?;
    let desired = store.load().await?;
    info!(
        "loaded desired state from '{}': {} hosts, {} aggregator groups",
        store.prefix(),
        desired.hosts.len(),
        desired.aggregators.len()
    );

    if start_aggregators {
        spawner::spawn_aggregators(&desired).await?;
    }

    // Open one long-lived communicator per aggregator.
    let mut comms: CommSet = HashMap::new();
    for (group, members) in &desired.aggregators {
        for agg in members {
            let Some(host) = desired.hosts.get(&agg.host) else {
                warn!(
                    "aggregator '{}' in group '{}' references unknown host '{}'",
                    agg.name, group, agg.host
                );
                continue;
            };
            let mut comm = default_connector(host);
            if let Err(e) = comm.connect().await {
                debug!("aggregator '{}' is not reachable yet: {}", agg.name, e);
            }
            comms.insert(agg.name.clone(), comm);
        }
    }

    let shared = Arc::new(Mutex::new(ControlState {
        desired,
        comms,
        last_agg_state: IndexMap::new(),
        store_dirty: true,
    }));

    // The watch task holds its own datastore client.
    let watch_store = EtcdStore::connect(cluster, prefix).await?;
    let watch_task = tokio::spawn(watch_loop(watch_store, shared.clone()));

    let mut tick = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let mut guard = shared.lock().await;
                run_cycle(&mut guard).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }
    watch_task.abort();
    Ok(())
}

/// One tick: sweep health, then run a full pass if any aggregator changed
/// state or a datastore change arrived since the last pass.
pub async fn run_cycle(control: &mut ControlState) {
    let ControlState {
        desired,
        comms,
        last_agg_state,
        store_dirty,
    } = control;

    let mut reconciler = Reconciler::new(desired, comms, &default_connector);
    let agg_state = reconciler.poll_health().await;

    let must_rebalance = agg_state != *last_agg_state || *store_dirty;
    if must_rebalance {
        debug!(
            "reconciling (state change: {}, datastore change: {})",
            agg_state != *last_agg_state,
            *store_dirty
        );
        reconciler.run_pass(&agg_state).await;
        if !reconciler.failed().is_empty() {
            debug!("pass finished with unreachable peers: {:?}", reconciler.failed());
        }
        *store_dirty = false;
    }
    *last_agg_state = agg_state;
}

/// Watches the commit sentinel and reloads the desired state on every `Put`.
/// The stream is re-established after transport errors.
async fn watch_loop(mut store: EtcdStore, shared: Arc<Mutex<ControlState>>) {
    loop {
        let (watcher, mut stream) = match store.watch_sentinel().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("failed to open datastore watch: {e}; retrying");
                tokio::time::sleep(WATCH_RETRY_DELAY).await;
                continue;
            }
        };
        // Keep the watcher alive for the lifetime of the stream.
        let _watcher = watcher;

        loop {
            match stream.message().await {
                Ok(Some(resp)) => {
                    for event in resp.events() {
                        if event.event_type() != EventType::Put {
                            continue;
                        }
                        if let Err(e) = handle_change(&mut store, &shared).await {
                            // Never let a handler error take the monitor down.
                            error!(
                                "configuration reload failed ({}:{}): {e:#}",
                                file!(),
                                line!()
                            );
                        }
                    }
                }
                Ok(None) => {
                    warn!("datastore watch stream ended; re-establishing");
                    break;
                }
                Err(e) => {
                    warn!("datastore watch stream failed: {e}; re-establishing");
                    break;
                }
            }
        }
        tokio::time::sleep(WATCH_RETRY_DELAY).await;
    }
}

/// Reloads the desired state and invokes the per-section diff handlers under
/// the reconciler mutex. Only the samplers handler does work; the other
/// sections are re-applied wholesale by the next pass.
async fn handle_change(store: &mut EtcdStore, shared: &Arc<Mutex<ControlState>>) -> Result<()> {
    let fresh = store.load().await?;
    let mut guard = shared.lock().await;
    info!(
        "datastore changed (last_updated {:.6}); reloading desired state",
        fresh.last_updated
    );

    let previous = std::mem::replace(&mut guard.desired, fresh);
    let ControlState {
        desired,
        comms,
        store_dirty,
        ..
    } = &mut *guard;

    restart_samplers(&previous, desired, comms, &default_connector).await;
    *store_dirty = true;
    Ok(())
}

/// The samplers section handler: stop every previously configured sampler
/// plugin so the next pass starts the new set cleanly.
pub async fn restart_samplers(
    previous: &DesiredState,
    _current: &DesiredState,
    comms: &mut CommSet,
    connector: &Connector,
) {
    for (key, group) in &previous.samplers {
        let names = match crate::core::expand::expand_many(group.names.split(',')) {
            Ok(names) => names,
            Err(e) => {
                warn!("sampler group '{key}' has an invalid names spec: {e}");
                continue;
            }
        };
        for name in names {
            let Some(host) = previous.hosts.get(&name) else {
                continue;
            };
            let comm = comms.entry(name.clone()).or_insert_with(|| connector(host));
            if comm.state() != ConnState::Connected {
                if let Err(e) = comm.connect().await {
                    debug!("sampler '{name}' unreachable during restart: {e}");
                    continue;
                }
            }
            for plugin in &group.plugins {
                match comm.plugn_stop(&plugin.name).await {
                    Ok(ack) if !ack.benign() => debug!(
                        "sampler '{name}': plugn_stop '{}' replied with code {}",
                        plugin.name, ack.errcode
                    ),
                    Err(e) => {
                        debug!("sampler '{name}' lost while stopping '{}': {e}", plugin.name);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}
