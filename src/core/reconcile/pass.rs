// src/core/reconcile/pass.rs

//! One reconciliation pass: drive every daemon toward the desired state.
//!
//! Every verb issued here is idempotent and safe to repeat; `EBUSY` and
//! `EEXIST` replies mean the previous pass already did the work. A pass never
//! rolls back on partial failure. A peer that fails a transport call is
//! skipped for the remainder of the pass and retried on the next tick.

use crate::core::comm::{Communicator, ConnState};
use crate::core::errors::ConductorError;
use crate::core::expand;
use crate::core::interval;
use crate::core::reconcile::balance::partition;
use crate::core::topology::{
    AggState, DesiredState, Host, Producer, SamplerPlugin, StorePolicy, Updater,
};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Communicators by entity name (aggregator name or sampler host name).
pub type CommSet = HashMap<String, Box<dyn Communicator + Send>>;

/// Builds a fresh communicator for a host the set does not know yet.
pub type Connector = dyn Fn(&Host) -> Box<dyn Communicator + Send> + Send + Sync;

/// Borrows the desired state and the communicator set for one pass.
pub struct Reconciler<'a> {
    state: &'a DesiredState,
    comms: &'a mut CommSet,
    connector: &'a Connector,
    /// Peers that failed a transport call this pass.
    failed: HashSet<String>,
}

impl<'a> Reconciler<'a> {
    pub fn new(state: &'a DesiredState, comms: &'a mut CommSet, connector: &'a Connector) -> Self {
        Self {
            state,
            comms,
            connector,
            failed: HashSet::new(),
        }
    }

    pub fn failed(&self) -> &HashSet<String> {
        &self.failed
    }

    /// Health sweep: reconnect every aggregator channel if needed and collect
    /// the observed daemon states. An unreachable peer is `stopped`; no error
    /// surfaces.
    pub async fn poll_health(&mut self) -> IndexMap<String, AggState> {
        let state = self.state;
        let connector = self.connector;

        let mut agg_state = IndexMap::new();
        for (group, members) in &state.aggregators {
            for agg in members {
                let observed = match state.hosts.get(&agg.host) {
                    Some(host) => {
                        let comm = self
                            .comms
                            .entry(agg.name.clone())
                            .or_insert_with(|| connector(host));
                        poll_one(comm.as_mut(), &agg.name, group).await
                    }
                    None => {
                        warn!(
                            "aggregator '{}' in group '{}' references unknown host '{}'",
                            agg.name, group, agg.host
                        );
                        AggState::Stopped
                    }
                };
                agg_state.insert(agg.name.clone(), observed);
            }
        }
        agg_state
    }

    /// Partitions each producer group across its ready aggregators. A group
    /// without a ready aggregator is left alone this pass.
    pub fn balance(
        &self,
        agg_state: &IndexMap<String, AggState>,
    ) -> IndexMap<String, IndexMap<String, Vec<String>>> {
        let mut assignments = IndexMap::new();
        for (group, producers) in &self.state.producers {
            let Some(members) = self.state.aggregators.get(group) else {
                warn!("producers target unknown aggregator group '{group}'; skipping");
                continue;
            };
            let ready: Vec<String> = members
                .iter()
                .filter(|agg| agg_state.get(&agg.name).copied() == Some(AggState::Ready))
                .map(|agg| agg.name.clone())
                .collect();
            if ready.is_empty() {
                debug!("group '{group}' has no ready aggregator; leaving producers in place");
                continue;
            }
            assignments.insert(group.clone(), partition(producers, &ready));
        }
        assignments
    }

    /// Runs steps 3 through 8 of a pass against the given health snapshot.
    pub async fn run_pass(&mut self, agg_state: &IndexMap<String, AggState>) {
        let assignments = self.balance(agg_state);
        self.apply_samplers().await;
        self.apply_producers().await;
        self.apply_updaters().await;
        self.apply_stores().await;
        self.apply_assignments(&assignments).await;
    }

    /// Sampler bring-up. A lost connection aborts that host's bring-up, never
    /// the pass.
    async fn apply_samplers(&mut self) {
        let state = self.state;
        let connector = self.connector;

        for (key, group) in &state.samplers {
            let names = match expand::expand_many(group.names.split(',')) {
                Ok(names) => names,
                Err(e) => {
                    warn!("sampler group '{key}' has an invalid names spec: {e}");
                    continue;
                }
            };
            for name in names {
                let Some(host) = state.hosts.get(&name) else {
                    warn!("sampler group '{key}' references unknown host '{name}'");
                    continue;
                };
                let comm = self
                    .comms
                    .entry(name.clone())
                    .or_insert_with(|| connector(host));
                if comm.state() != ConnState::Connected {
                    if let Err(e) = comm.connect().await {
                        warn!("sampler '{name}' is unreachable: {e}");
                        continue;
                    }
                }
                if let Err(e) = bring_up_sampler(comm.as_mut(), &name, &group.plugins).await {
                    warn!("sampler '{name}': bring-up aborted: {e}");
                }
            }
        }
    }

    /// Producer fan-out: every producer is added on every aggregator of its
    /// group, so a later failover is a start rather than a re-add.
    async fn apply_producers(&mut self) {
        let state = self.state;
        for (group, producers) in &state.producers {
            let Some(members) = state.aggregators.get(group) else {
                continue;
            };
            for agg in members {
                if self.failed.contains(&agg.name) {
                    continue;
                }
                let Some(comm) = connected(self.comms, &agg.name) else {
                    continue;
                };
                if let Err(e) = fan_out(comm, &agg.name, &state.hosts, producers).await {
                    warn!("aggregator '{}' in group '{group}': producer fan-out aborted: {e}", agg.name);
                    self.failed.insert(agg.name.clone());
                }
            }
        }
    }

    async fn apply_updaters(&mut self) {
        let state = self.state;
        for (group, updaters) in &state.updaters {
            let Some(members) = state.aggregators.get(group) else {
                warn!("updaters target unknown aggregator group '{group}'; skipping");
                continue;
            };
            for agg in members {
                if self.failed.contains(&agg.name) {
                    continue;
                }
                let Some(comm) = connected(self.comms, &agg.name) else {
                    continue;
                };
                if let Err(e) = apply_updaters_on(comm, &agg.name, updaters).await {
                    warn!("aggregator '{}' in group '{group}': updater apply aborted: {e}", agg.name);
                    self.failed.insert(agg.name.clone());
                }
            }
        }
    }

    async fn apply_stores(&mut self) {
        let state = self.state;
        for (group, stores) in &state.stores {
            let Some(members) = state.aggregators.get(group) else {
                warn!("stores target unknown aggregator group '{group}'; skipping");
                continue;
            };
            for agg in members {
                if self.failed.contains(&agg.name) {
                    continue;
                }
                let Some(comm) = connected(self.comms, &agg.name) else {
                    continue;
                };
                if let Err(e) = apply_stores_on(comm, &agg.name, stores).await {
                    warn!("aggregator '{}' in group '{group}': store apply aborted: {e}", agg.name);
                    self.failed.insert(agg.name.clone());
                }
            }
        }
    }

    /// Start/stop diff against the assignment. An aggregator of a balanced
    /// group with no share stops everything it is running.
    async fn apply_assignments(
        &mut self,
        assignments: &IndexMap<String, IndexMap<String, Vec<String>>>,
    ) {
        let state = self.state;
        for (group, per_agg) in assignments {
            let Some(members) = state.aggregators.get(group) else {
                continue;
            };
            for agg in members {
                if self.failed.contains(&agg.name) {
                    continue;
                }
                let Some(comm) = connected(self.comms, &agg.name) else {
                    continue;
                };
                let assigned = per_agg
                    .get(&agg.name)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                if let Err(e) = sync_assignment(comm, &agg.name, assigned).await {
                    warn!("aggregator '{}' in group '{group}': assignment sync aborted: {e}", agg.name);
                    self.failed.insert(agg.name.clone());
                }
            }
        }
    }
}

fn connected<'c>(comms: &'c mut CommSet, name: &str) -> Option<&'c mut (dyn Communicator + Send)> {
    match comms.get_mut(name) {
        Some(comm) if comm.state() == ConnState::Connected => Some(comm.as_mut()),
        _ => None,
    }
}

async fn poll_one(comm: &mut (dyn Communicator + Send), name: &str, group: &str) -> AggState {
    if comm.state() != ConnState::Connected {
        if let Err(e) = comm.reconnect().await {
            debug!("aggregator '{name}' in group '{group}' is unreachable: {e}");
            return AggState::Stopped;
        }
    }
    match comm.daemon_status().await {
        Ok(status) => status.state.parse().unwrap_or(AggState::Stopped),
        Err(e) => {
            debug!("aggregator '{name}' in group '{group}': daemon_status failed: {e}");
            AggState::Stopped
        }
    }
}

async fn bring_up_sampler(
    comm: &mut (dyn Communicator + Send),
    host_name: &str,
    plugins: &[SamplerPlugin],
) -> Result<(), ConductorError> {
    for plugin in plugins {
        let ack = comm.plugn_load(&plugin.name).await?;
        if !ack.benign() {
            warn!(
                "sampler '{host_name}': plugn_load '{}' failed with code {}",
                plugin.name, ack.errcode
            );
            continue;
        }
        let mut params = plugin.conf.clone();
        params.insert("producer".to_string(), host_name.to_string());
        params.insert(
            "instance".to_string(),
            format!("{host_name}/{}", plugin.name),
        );
        let ack = comm.plugn_config(&plugin.name, &params).await?;
        if !ack.benign() {
            warn!(
                "sampler '{host_name}': plugn_config '{}' failed with code {}",
                plugin.name, ack.errcode
            );
            continue;
        }
        let ack = comm.smplr_start(&plugin.name, &plugin.interval).await?;
        if !ack.benign() {
            warn!(
                "sampler '{host_name}': smplr_start '{}' failed with code {}",
                plugin.name, ack.errcode
            );
        }
    }
    Ok(())
}

async fn fan_out(
    comm: &mut (dyn Communicator + Send),
    agg: &str,
    hosts: &IndexMap<String, Host>,
    producers: &[Producer],
) -> Result<(), ConductorError> {
    let have: HashSet<String> = comm
        .prdcr_status()
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();

    for producer in producers {
        if have.contains(&producer.name) {
            continue;
        }
        let Some(host) = hosts.get(&producer.host) else {
            warn!(
                "producer '{}' references unknown host '{}'",
                producer.name, producer.host
            );
            continue;
        };
        let reconnect_us = match interval::to_micros(&producer.reconnect) {
            Ok(us) => us,
            Err(e) => {
                warn!("producer '{}': {e}", producer.name);
                continue;
            }
        };
        let ack = comm
            .prdcr_add(
                &producer.name,
                &producer.ptype.to_string(),
                &host.xprt,
                &host.addr,
                host.port,
                reconnect_us,
            )
            .await?;
        if !ack.benign() {
            warn!(
                "aggregator '{agg}': prdcr_add '{}' failed with code {}",
                producer.name, ack.errcode
            );
        }
    }
    Ok(())
}

async fn apply_updaters_on(
    comm: &mut (dyn Communicator + Send),
    agg: &str,
    updaters: &[Updater],
) -> Result<(), ConductorError> {
    for updater in updaters {
        let mode = match updater.mode() {
            Ok(mode) => mode,
            Err(e) => {
                warn!("updater '{}': {e}", updater.name);
                continue;
            }
        };
        let ack = comm.updtr_add(&updater.name, &mode).await?;
        if !ack.benign() {
            warn!(
                "aggregator '{agg}': updtr_add '{}' failed with code {}",
                updater.name, ack.errcode
            );
            continue;
        }
        for m in &updater.producers {
            let ack = comm.updtr_prdcr_add(&updater.name, &m.regex).await?;
            if !ack.benign() {
                warn!(
                    "aggregator '{agg}': updtr_prdcr_add '{}' '{}' failed with code {}",
                    updater.name, m.regex, ack.errcode
                );
            }
        }
        for set in &updater.sets {
            let field = set.field.map(|f| f.to_string());
            let ack = comm
                .updtr_match_add(&updater.name, &set.regex, field.as_deref())
                .await?;
            if !ack.benign() {
                warn!(
                    "aggregator '{agg}': updtr_match_add '{}' '{}' failed with code {}",
                    updater.name, set.regex, ack.errcode
                );
            }
        }
        let ack = comm.updtr_start(&updater.name).await?;
        if !ack.benign() {
            warn!(
                "aggregator '{agg}': updtr_start '{}' failed with code {}",
                updater.name, ack.errcode
            );
        }
    }
    Ok(())
}

async fn apply_stores_on(
    comm: &mut (dyn Communicator + Send),
    agg: &str,
    stores: &[StorePolicy],
) -> Result<(), ConductorError> {
    for policy in stores {
        let ack = comm.plugn_load(&policy.plugin.name).await?;
        if !ack.benign() {
            warn!(
                "aggregator '{agg}': plugn_load '{}' failed with code {}",
                policy.plugin.name, ack.errcode
            );
            continue;
        }
        let ack = comm.plugn_config(&policy.plugin.name, &policy.plugin.conf).await?;
        if !ack.benign() {
            warn!(
                "aggregator '{agg}': plugn_config '{}' failed with code {}",
                policy.plugin.name, ack.errcode
            );
        }
        let ack = comm
            .strgp_add(
                &policy.name,
                &policy.plugin.name,
                &policy.container,
                &policy.schema,
            )
            .await?;
        if !ack.benign() {
            warn!(
                "aggregator '{agg}': strgp_add '{}' failed with code {}",
                policy.name, ack.errcode
            );
            continue;
        }
        let ack = comm.strgp_prdcr_add(&policy.name, ".*").await?;
        if !ack.benign() {
            warn!(
                "aggregator '{agg}': strgp_prdcr_add '{}' failed with code {}",
                policy.name, ack.errcode
            );
        }
        let ack = comm.strgp_start(&policy.name).await?;
        if !ack.benign() {
            warn!(
                "aggregator '{agg}': strgp_start '{}' failed with code {}",
                policy.name, ack.errcode
            );
        }
    }
    Ok(())
}

async fn sync_assignment(
    comm: &mut (dyn Communicator + Send),
    agg: &str,
    assigned: &[String],
) -> Result<(), ConductorError> {
    let peers = comm.prdcr_status().await?;

    for name in assigned {
        if peers.iter().any(|p| p.name == *name && p.is_stopped()) {
            let ack = comm.prdcr_start(name).await?;
            if !ack.benign() {
                warn!(
                    "aggregator '{agg}': prdcr_start '{name}' failed with code {}",
                    ack.errcode
                );
            }
        }
    }

    for peer in &peers {
        if !peer.is_stopped() && !assigned.contains(&peer.name) {
            let ack = comm.prdcr_stop(&peer.name).await?;
            if !ack.benign() {
                warn!(
                    "aggregator '{agg}': prdcr_stop '{}' failed with code {}",
                    peer.name, ack.errcode
                );
            }
        }
    }
    Ok(())
}
