// src/core/topology/model.rs

//! Defines the entity types of the fleet topology and the `DesiredState`
//! snapshot the reconciler drives the daemons toward.

use crate::core::errors::ConductorError;
use crate::core::interval;
use indexmap::IndexMap;
use strum_macros::{Display, EnumString};

/// Default sample scheduling spec, passed verbatim to sampler daemons.
pub const DEFAULT_SAMPLE_INTERVAL: &str = "1.0s:0ms";

/// Default daemon transport tag.
pub const DEFAULT_XPRT: &str = "sock";

/// Authentication carried as opaque configuration for one daemon endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub name: String,
    pub conf: IndexMap<String, String>,
}

impl Auth {
    pub fn none() -> Self {
        Self {
            name: "none".to_string(),
            conf: IndexMap::new(),
        }
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self::none()
    }
}

/// A reachable daemon endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    pub addr: String,
    pub port: u16,
    pub xprt: String,
    pub auth: Auth,
}

/// The last observed state of an aggregator daemon. Only `ready` peers are
/// eligible for producer assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AggState {
    #[default]
    Stopped,
    Running,
    Ready,
    Error,
}

/// One aggregator daemon inside a load-balancing group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregator {
    pub name: String,
    /// Key into the hosts-by-name mapping.
    pub host: String,
    pub state: AggState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ProducerType {
    Active,
    Passive,
}

/// A pull source that every aggregator of the target group is configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer {
    pub name: String,
    pub host: String,
    /// Target aggregator group.
    pub group: String,
    pub ptype: ProducerType,
    /// Reconnect interval, parsed to microseconds when issued to daemons.
    pub reconnect: String,
    /// Updater names eligible to match this producer.
    pub updaters: Vec<String>,
}

/// Which metric-set attribute an updater match applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SetField {
    Inst,
    Schema,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetMatch {
    pub regex: String,
    pub field: Option<SetField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerMatch {
    pub regex: String,
}

/// A pull schedule applied by an aggregator group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Updater {
    pub name: String,
    pub group: String,
    pub interval: String,
    /// Automatic update mode, mutually exclusive with `push`.
    pub auto: Option<String>,
    /// Push update mode, mutually exclusive with `auto`.
    pub push: Option<String>,
    pub sets: Vec<SetMatch>,
    pub producers: Vec<ProducerMatch>,
}

/// How an updater is registered on a peer.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdaterMode {
    Interval(u64),
    Auto(String),
    Push(String),
}

impl Updater {
    /// Resolves the registration mode. Push wins over auto; the plain
    /// interval is parsed to microseconds.
    pub fn mode(&self) -> Result<UpdaterMode, ConductorError> {
        if let Some(push) = &self.push {
            return Ok(UpdaterMode::Push(push.clone()));
        }
        if let Some(auto) = &self.auto {
            return Ok(UpdaterMode::Auto(auto.clone()));
        }
        Ok(UpdaterMode::Interval(interval::to_micros(&self.interval)?))
    }
}

/// The storage plugin a policy executes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePlugin {
    pub name: String,
    pub conf: IndexMap<String, String>,
}

/// A storage policy executed by an aggregator group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePolicy {
    pub name: String,
    pub group: String,
    pub container: String,
    pub schema: String,
    pub plugin: StorePlugin,
}

/// One plugin entry of a sampler group configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerPlugin {
    pub name: String,
    pub interval: String,
    pub conf: IndexMap<String, String>,
}

/// A group of sampler daemons sharing a plugin configuration, keyed by the
/// raw range-notation spec of its host names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerGroup {
    pub names: String,
    pub plugins: Vec<SamplerPlugin>,
}

/// Immutable snapshot of the whole desired fleet configuration. Replaced
/// atomically through the datastore; never mutated in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DesiredState {
    pub hosts: IndexMap<String, Host>,
    /// Aggregators in declared order, by group.
    pub aggregators: IndexMap<String, Vec<Aggregator>>,
    /// Producers in declared order, by target group.
    pub producers: IndexMap<String, Vec<Producer>>,
    /// Updaters by group; names are unique within a group.
    pub updaters: IndexMap<String, Vec<Updater>>,
    /// Storage policies by group; names are unique within a group.
    pub stores: IndexMap<String, Vec<StorePolicy>>,
    /// Sampler groups keyed by their raw names spec.
    pub samplers: IndexMap<String, SamplerGroup>,
    /// Wall-clock seconds of the last committed save.
    pub last_updated: f64,
}
