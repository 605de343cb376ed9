// src/core/datastore.rs

//! The consensus-backed configuration store.
//!
//! The desired state lives under `/<prefix>/` as the flat projection of the
//! entity graph. A save deletes the whole prefix, re-emits the projection and
//! finishes with the `last_updated` sentinel; that final write is the commit
//! point watchers observe.

use crate::config::ClusterConfig;
use crate::core::errors::ConductorError;
use crate::core::topology::{DesiredState, codec};
use crate::core::tree;
use etcd_client::{Client, ConnectOptions, DeleteOptions, GetOptions, WatchStream, Watcher};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Name of the commit sentinel key under the prefix.
pub const SENTINEL: &str = "last_updated";

/// A client handle on the datastore, scoped to one cluster prefix.
pub struct EtcdStore {
    client: Client,
    prefix: String,
}

impl EtcdStore {
    /// Connects to the first configured cluster member. Remaining members are
    /// reserved for future failover.
    pub async fn connect(cluster: &ClusterConfig, prefix: &str) -> Result<Self, ConductorError> {
        let member = cluster.members.first().ok_or_else(|| {
            ConductorError::Datastore("cluster members list is empty".to_string())
        })?;
        let endpoint = format!("http://{}:{}", member.host, member.port);
        let options = ConnectOptions::new()
            .with_connect_timeout(CONNECT_TIMEOUT)
            .with_keep_alive(KEEP_ALIVE_INTERVAL, KEEP_ALIVE_TIMEOUT);
        let client = Client::connect([endpoint.as_str()], Some(options)).await?;
        debug!("connected to datastore member {}", endpoint);
        Ok(Self {
            client,
            prefix: normalize_prefix(prefix),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn root(&self) -> String {
        format!("{}/", self.prefix)
    }

    pub fn sentinel_key(&self) -> String {
        format!("{}/{SENTINEL}", self.prefix)
    }

    /// Replaces the stored configuration with `state`. Individual key writes
    /// are best-effort; the sentinel write is the atomic commit point and its
    /// failure fails the save.
    pub async fn save(&mut self, state: &DesiredState) -> Result<(), ConductorError> {
        self.client
            .delete(self.root(), Some(DeleteOptions::new().with_prefix()))
            .await?;

        let pairs = codec::to_node(state).walk(&self.prefix);
        let total = pairs.len();
        for (key, value) in pairs {
            if let Err(e) = self.client.put(key.clone(), value, None).await {
                warn!("failed to write key '{}': {}", key, e);
            }
        }

        let stamp = format!(
            "{:.6}",
            chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
        );
        self.client.put(self.sentinel_key(), stamp, None).await?;
        info!(
            "saved {} keys under '{}/' and committed {}",
            total, self.prefix, SENTINEL
        );
        Ok(())
    }

    /// Reads the whole prefix range back into a `DesiredState`.
    pub async fn load(&mut self) -> Result<DesiredState, ConductorError> {
        let root = self.root();
        let resp = self
            .client
            .get(root.as_str(), Some(GetOptions::new().with_prefix()))
            .await?;

        let mut pairs = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let key = kv.key_str()?;
            let value = kv.value_str()?;
            let Some(rel) = key.strip_prefix(root.as_str()) else {
                continue;
            };
            pairs.push((rel.to_string(), value.to_string()));
        }

        codec::from_node(&tree::reflect(pairs))
    }

    /// Opens a watch on the commit sentinel. Each `Put` on it denotes one
    /// committed configuration change.
    pub async fn watch_sentinel(&mut self) -> Result<(Watcher, WatchStream), ConductorError> {
        Ok(self.client.watch(self.sentinel_key(), None).await?)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    format!("/{trimmed}")
}
