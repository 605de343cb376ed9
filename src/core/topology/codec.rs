// src/core/topology/codec.rs

//! Rendering of the entity graph to and from the dynamic configuration tree
//! that backs the flat datastore projection.
//!
//! Shared objects (a host referenced from aggregators, producers and
//! samplers) are encoded by name through the hosts mapping, keeping the tree
//! acyclic and serializable.

use crate::core::errors::ConductorError;
use crate::core::topology::model::*;
use crate::core::tree::Node;
use indexmap::IndexMap;

/// Renders a `DesiredState` into a tree suitable for the flat projection.
/// The `last_updated` sentinel is written separately by the datastore.
pub fn to_node(state: &DesiredState) -> Node {
    let mut root = Node::map();

    let mut hosts = Node::map();
    for (name, host) in &state.hosts {
        hosts.insert(name.clone(), host_node(host));
    }
    root.insert("hosts", hosts);

    let mut aggregators = Node::map();
    for (group, members) in &state.aggregators {
        let items = members.iter().map(aggregator_node).collect();
        aggregators.insert(group.clone(), Node::Seq(items));
    }
    root.insert("aggregators", aggregators);

    let mut producers = Node::map();
    for (group, members) in &state.producers {
        let items = members.iter().map(producer_node).collect();
        producers.insert(group.clone(), Node::Seq(items));
    }
    root.insert("producers", producers);

    let mut updaters = Node::map();
    for (group, members) in &state.updaters {
        let mut by_name = Node::map();
        for updater in members {
            by_name.insert(updater.name.clone(), updater_node(updater));
        }
        updaters.insert(group.clone(), by_name);
    }
    root.insert("updaters", updaters);

    let mut stores = Node::map();
    for (group, members) in &state.stores {
        let mut by_name = Node::map();
        for policy in members {
            by_name.insert(policy.name.clone(), store_node(policy));
        }
        stores.insert(group.clone(), by_name);
    }
    root.insert("stores", stores);

    let mut samplers = Node::map();
    for (key, sampler_group) in &state.samplers {
        samplers.insert(key.clone(), sampler_node(sampler_group));
    }
    root.insert("samplers", samplers);

    root
}

fn string_map_node(map: &IndexMap<String, String>) -> Node {
    let mut out = Node::map();
    for (key, value) in map {
        out.insert(key.clone(), Node::leaf(value.clone()));
    }
    out
}

fn host_node(host: &Host) -> Node {
    let mut out = Node::map();
    out.insert("addr", Node::leaf(host.addr.clone()));
    out.insert("port", Node::leaf(host.port.to_string()));
    out.insert("xprt", Node::leaf(host.xprt.clone()));
    let mut auth = Node::map();
    auth.insert("name", Node::leaf(host.auth.name.clone()));
    auth.insert("config", string_map_node(&host.auth.conf));
    out.insert("auth", auth);
    out
}

fn aggregator_node(agg: &Aggregator) -> Node {
    let mut out = Node::map();
    out.insert("name", Node::leaf(agg.name.clone()));
    out.insert("host", Node::leaf(agg.host.clone()));
    out.insert("state", Node::leaf(agg.state.to_string()));
    out
}

fn producer_node(producer: &Producer) -> Node {
    let mut out = Node::map();
    out.insert("name", Node::leaf(producer.name.clone()));
    out.insert("host", Node::leaf(producer.host.clone()));
    out.insert("type", Node::leaf(producer.ptype.to_string()));
    out.insert("reconnect", Node::leaf(producer.reconnect.clone()));
    let updaters = producer
        .updaters
        .iter()
        .map(|name| Node::leaf(name.clone()))
        .collect();
    out.insert("updaters", Node::Seq(updaters));
    out
}

fn updater_node(updater: &Updater) -> Node {
    let mut out = Node::map();
    out.insert("interval", Node::leaf(updater.interval.clone()));
    if let Some(auto) = &updater.auto {
        out.insert("auto", Node::leaf(auto.clone()));
    }
    if let Some(push) = &updater.push {
        out.insert("push", Node::leaf(push.clone()));
    }
    let sets = updater
        .sets
        .iter()
        .map(|set| {
            let mut node = Node::map();
            node.insert("regex", Node::leaf(set.regex.clone()));
            if let Some(field) = set.field {
                node.insert("field", Node::leaf(field.to_string()));
            }
            node
        })
        .collect();
    out.insert("sets", Node::Seq(sets));
    let producers = updater
        .producers
        .iter()
        .map(|m| {
            let mut node = Node::map();
            node.insert("regex", Node::leaf(m.regex.clone()));
            node
        })
        .collect();
    out.insert("producers", Node::Seq(producers));
    out
}

fn store_node(policy: &StorePolicy) -> Node {
    let mut out = Node::map();
    out.insert("container", Node::leaf(policy.container.clone()));
    out.insert("schema", Node::leaf(policy.schema.clone()));
    let mut plugin = Node::map();
    plugin.insert("name", Node::leaf(policy.plugin.name.clone()));
    plugin.insert("config", string_map_node(&policy.plugin.conf));
    out.insert("plugin", plugin);
    out
}

fn sampler_node(group: &SamplerGroup) -> Node {
    let mut out = Node::map();
    let plugins = group
        .plugins
        .iter()
        .map(|plugin| {
            let mut node = Node::map();
            node.insert("name", Node::leaf(plugin.name.clone()));
            node.insert("interval", Node::leaf(plugin.interval.clone()));
            node.insert("config", string_map_node(&plugin.conf));
            node
        })
        .collect();
    out.insert("config", Node::Seq(plugins));
    out
}

/// Rebuilds a `DesiredState` from a reflected tree.
pub fn from_node(root: &Node) -> Result<DesiredState, ConductorError> {
    let mut state = DesiredState::default();

    if let Some(hosts) = root.get("hosts").and_then(Node::as_map) {
        for (name, node) in hosts {
            state.hosts.insert(name.clone(), host_from(name, node)?);
        }
    }

    if let Some(groups) = root.get("aggregators").and_then(Node::as_map) {
        for (group, members) in groups {
            let mut out = Vec::new();
            for node in seq_of(members, "aggregators", group)? {
                out.push(aggregator_from(node, group)?);
            }
            state.aggregators.insert(group.clone(), out);
        }
    }

    if let Some(groups) = root.get("producers").and_then(Node::as_map) {
        for (group, members) in groups {
            let mut out = Vec::new();
            for node in seq_of(members, "producers", group)? {
                out.push(producer_from(node, group)?);
            }
            state.producers.insert(group.clone(), out);
        }
    }

    if let Some(groups) = root.get("updaters").and_then(Node::as_map) {
        for (group, members) in groups {
            let by_name = members.as_map().ok_or_else(|| {
                ConductorError::BadDescription(format!(
                    "updaters group '{group}' is not a mapping"
                ))
            })?;
            let mut out = Vec::new();
            for (name, node) in by_name {
                out.push(updater_from(name, node, group)?);
            }
            state.updaters.insert(group.clone(), out);
        }
    }

    if let Some(groups) = root.get("stores").and_then(Node::as_map) {
        for (group, members) in groups {
            let by_name = members.as_map().ok_or_else(|| {
                ConductorError::BadDescription(format!("stores group '{group}' is not a mapping"))
            })?;
            let mut out = Vec::new();
            for (name, node) in by_name {
                out.push(store_from(name, node, group)?);
            }
            state.stores.insert(group.clone(), out);
        }
    }

    if let Some(groups) = root.get("samplers").and_then(Node::as_map) {
        for (key, node) in groups {
            state.samplers.insert(key.clone(), sampler_from(key, node)?);
        }
    }

    if let Some(stamp) = root.get_str("last_updated") {
        state.last_updated = stamp.parse().unwrap_or_default();
    }

    Ok(state)
}

fn seq_of<'a>(node: &'a Node, section: &str, group: &str) -> Result<&'a [Node], ConductorError> {
    node.as_seq().ok_or_else(|| {
        ConductorError::BadDescription(format!("{section} group '{group}' is not a list"))
    })
}

fn field<'a>(node: &'a Node, what: &str, key: &str) -> Result<&'a str, ConductorError> {
    node.get_str(key)
        .ok_or_else(|| ConductorError::BadDescription(format!("{what} is missing '{key}'")))
}

fn string_map_from(node: Option<&Node>) -> Result<IndexMap<String, String>, ConductorError> {
    let Some(node) = node else {
        return Ok(IndexMap::new());
    };
    let entries = node
        .as_map()
        .ok_or_else(|| ConductorError::BadDescription("expected a string mapping".into()))?;
    let mut out = IndexMap::new();
    for (key, child) in entries {
        let value = child.as_str().ok_or_else(|| {
            ConductorError::BadDescription(format!("'{key}' must be a scalar"))
        })?;
        out.insert(key.clone(), value.to_string());
    }
    Ok(out)
}

fn host_from(name: &str, node: &Node) -> Result<Host, ConductorError> {
    let what = format!("host '{name}'");
    let port = field(node, &what, "port")?;
    let port: u16 = port
        .parse()
        .map_err(|_| ConductorError::BadDescription(format!("{what}: invalid port '{port}'")))?;
    let auth = match node.get("auth") {
        Some(auth) => Auth {
            name: auth.get_str("name").unwrap_or("none").to_string(),
            conf: string_map_from(auth.get("config"))?,
        },
        None => Auth::none(),
    };
    Ok(Host {
        name: name.to_string(),
        addr: field(node, &what, "addr")?.to_string(),
        port,
        xprt: node.get_str("xprt").unwrap_or(DEFAULT_XPRT).to_string(),
        auth,
    })
}

fn aggregator_from(node: &Node, group: &str) -> Result<Aggregator, ConductorError> {
    let what = format!("aggregator in group '{group}'");
    let state = field(node, &what, "state")?;
    Ok(Aggregator {
        name: field(node, &what, "name")?.to_string(),
        host: field(node, &what, "host")?.to_string(),
        state: state.parse().map_err(|_| {
            ConductorError::BadDescription(format!("{what}: unknown state '{state}'"))
        })?,
    })
}

fn producer_from(node: &Node, group: &str) -> Result<Producer, ConductorError> {
    let what = format!("producer in group '{group}'");
    let ptype = field(node, &what, "type")?;
    let updaters = match node.get("updaters") {
        Some(list) => list
            .as_seq()
            .ok_or_else(|| {
                ConductorError::BadDescription(format!("{what}: 'updaters' is not a list"))
            })?
            .iter()
            .filter_map(Node::as_str)
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };
    Ok(Producer {
        name: field(node, &what, "name")?.to_string(),
        host: field(node, &what, "host")?.to_string(),
        group: group.to_string(),
        ptype: ptype.parse().map_err(|_| {
            ConductorError::BadDescription(format!("{what}: unknown type '{ptype}'"))
        })?,
        reconnect: field(node, &what, "reconnect")?.to_string(),
        updaters,
    })
}

fn updater_from(name: &str, node: &Node, group: &str) -> Result<Updater, ConductorError> {
    let what = format!("updater '{name}'");
    let mut sets = Vec::new();
    if let Some(list) = node.get("sets").and_then(Node::as_seq) {
        for set in list {
            let regex = field(set, &what, "regex")?.to_string();
            let fld = match set.get_str("field") {
                Some(value) => Some(value.parse().map_err(|_| {
                    ConductorError::BadDescription(format!(
                        "{what}: unknown match field '{value}'"
                    ))
                })?),
                None => None,
            };
            sets.push(SetMatch { regex, field: fld });
        }
    }
    let mut producers = Vec::new();
    if let Some(list) = node.get("producers").and_then(Node::as_seq) {
        for m in list {
            producers.push(ProducerMatch {
                regex: field(m, &what, "regex")?.to_string(),
            });
        }
    }
    Ok(Updater {
        name: name.to_string(),
        group: group.to_string(),
        interval: field(node, &what, "interval")?.to_string(),
        auto: node.get_str("auto").map(str::to_string),
        push: node.get_str("push").map(str::to_string),
        sets,
        producers,
    })
}

fn store_from(name: &str, node: &Node, group: &str) -> Result<StorePolicy, ConductorError> {
    let what = format!("store '{name}'");
    let plugin = node
        .get("plugin")
        .ok_or_else(|| ConductorError::BadDescription(format!("{what} is missing 'plugin'")))?;
    Ok(StorePolicy {
        name: name.to_string(),
        group: group.to_string(),
        container: field(node, &what, "container")?.to_string(),
        schema: field(node, &what, "schema")?.to_string(),
        plugin: StorePlugin {
            name: field(plugin, &what, "name")?.to_string(),
            conf: string_map_from(plugin.get("config"))?,
        },
    })
}

fn sampler_from(key: &str, node: &Node) -> Result<SamplerGroup, ConductorError> {
    let what = format!("sampler group '{key}'");
    let mut plugins = Vec::new();
    if let Some(list) = node.get("config").and_then(Node::as_seq) {
        for item in list {
            plugins.push(SamplerPlugin {
                name: field(item, &what, "name")?.to_string(),
                interval: item
                    .get_str("interval")
                    .unwrap_or(DEFAULT_SAMPLE_INTERVAL)
                    .to_string(),
                conf: string_map_from(item.get("config"))?,
            });
        }
    }
    Ok(SamplerGroup {
        names: key.to_string(),
        plugins,
    })
}
