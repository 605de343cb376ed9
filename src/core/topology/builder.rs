// src/core/topology/builder.rs

//! Validation and cross-expansion of the declarative description tree into
//! the in-memory entity graph.
//!
//! Cross-references between sections (a producer's target group, the
//! producer-name patterns of an updater) are deliberately not resolved here;
//! the aggregator daemons evaluate them server-side.

use crate::core::errors::ConductorError;
use crate::core::expand;
use crate::core::interval;
use crate::core::topology::model::*;
use crate::core::tree::Node;
use indexmap::IndexMap;

/// Builds a validated `DesiredState` from a parsed description tree.
pub fn build(description: &Node) -> Result<DesiredState, ConductorError> {
    let mut state = DesiredState::default();

    if let Some(section) = description.get("hosts") {
        build_hosts(section, &mut state)?;
    }
    if let Some(section) = description.get("aggregators") {
        build_aggregators(section, &mut state)?;
    }
    if let Some(section) = description.get("producers") {
        build_producers(section, &mut state)?;
    }
    if let Some(section) = description.get("updaters") {
        build_updaters(section, &mut state)?;
    }
    if let Some(section) = description.get("stores") {
        build_stores(section, &mut state)?;
    }
    if let Some(section) = description.get("samplers") {
        build_samplers(section, &mut state)?;
    }

    Ok(state)
}

fn entries<'a>(section: &'a Node, name: &str) -> Result<&'a [Node], ConductorError> {
    section
        .as_seq()
        .ok_or_else(|| ConductorError::BadDescription(format!("section '{name}' must be a list")))
}

fn require<'a>(entry: &'a Node, section: &str, key: &str) -> Result<&'a Node, ConductorError> {
    entry
        .get(key)
        .ok_or_else(|| ConductorError::MissingAttribute(section.to_string(), key.to_string()))
}

fn require_str<'a>(entry: &'a Node, section: &str, key: &str) -> Result<&'a str, ConductorError> {
    require(entry, section, key)?.as_str().ok_or_else(|| {
        ConductorError::BadDescription(format!("'{key}' in section '{section}' must be a scalar"))
    })
}

/// Accepts a single spec string or an ordered list of them.
fn spec_strings(node: &Node, section: &str, key: &str) -> Result<Vec<String>, ConductorError> {
    match node {
        Node::Leaf(value) => Ok(vec![value.clone()]),
        Node::Seq(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ConductorError::BadDescription(format!(
                        "'{key}' in section '{section}' must hold strings"
                    ))
                })
            })
            .collect(),
        Node::Map(_) => Err(ConductorError::BadDescription(format!(
            "'{key}' in section '{section}' must be a string or list"
        ))),
    }
}

fn expand_attr(entry: &Node, section: &str, key: &str) -> Result<Vec<String>, ConductorError> {
    expand::expand_many(spec_strings(require(entry, section, key)?, section, key)?)
}

/// Converts a mapping of scalar leaves into a plain string map.
fn leaf_map(node: &Node, what: &str) -> Result<IndexMap<String, String>, ConductorError> {
    let entries = node
        .as_map()
        .ok_or_else(|| ConductorError::BadDescription(format!("'{what}' must be a mapping")))?;
    let mut out = IndexMap::new();
    for (key, child) in entries {
        let value = child.as_str().ok_or_else(|| {
            ConductorError::BadDescription(format!("'{what}.{key}' must be a scalar"))
        })?;
        out.insert(key.clone(), value.to_string());
    }
    Ok(out)
}

fn parse_auth(entry: &Node) -> Result<Auth, ConductorError> {
    let Some(auth) = entry.get("auth") else {
        return Ok(Auth::none());
    };
    match auth {
        Node::Leaf(name) if !name.is_empty() => Ok(Auth {
            name: name.clone(),
            conf: IndexMap::new(),
        }),
        Node::Leaf(_) => Ok(Auth::none()),
        Node::Map(_) => {
            let name = auth
                .get_str("name")
                .unwrap_or("none")
                .to_string();
            let conf = match auth.get("config") {
                Some(conf) => leaf_map(conf, "auth.config")?,
                None => IndexMap::new(),
            };
            Ok(Auth { name, conf })
        }
        Node::Seq(_) => Err(ConductorError::BadDescription(
            "'auth' must be a name or a mapping".to_string(),
        )),
    }
}

fn build_hosts(section: &Node, state: &mut DesiredState) -> Result<(), ConductorError> {
    for entry in entries(section, "hosts")? {
        let names = expand_attr(entry, "hosts", "names")?;
        let addrs = expand_attr(entry, "hosts", "hosts")?;
        let ports = expand_attr(entry, "hosts", "ports")?;

        if names.len() != addrs.len() * ports.len() {
            return Err(ConductorError::ArityMismatch("hosts".to_string()));
        }

        let xprt = entry.get_str("xprt").unwrap_or(DEFAULT_XPRT).to_string();
        let auth = parse_auth(entry)?;

        // Names are consumed in row-major order: host outer, port inner.
        let mut names = names.into_iter();
        for addr in &addrs {
            for port in &ports {
                let port: u16 = port.parse().map_err(|_| {
                    ConductorError::BadDescription(format!("invalid port '{port}'"))
                })?;
                let Some(name) = names.next() else {
                    return Err(ConductorError::ArityMismatch("hosts".to_string()));
                };
                if state.hosts.contains_key(&name) {
                    return Err(ConductorError::DuplicateHost(name));
                }
                state.hosts.insert(
                    name.clone(),
                    Host {
                        name,
                        addr: addr.clone(),
                        port,
                        xprt: xprt.clone(),
                        auth: auth.clone(),
                    },
                );
            }
        }
    }
    Ok(())
}

fn build_aggregators(section: &Node, state: &mut DesiredState) -> Result<(), ConductorError> {
    for entry in entries(section, "aggregators")? {
        let names = expand_attr(entry, "aggregators", "names")?;
        let group = require_str(entry, "aggregators", "group")?.to_string();
        let hosts = expand_attr(entry, "aggregators", "hosts")?;

        if names.len() != hosts.len() {
            return Err(ConductorError::ArityMismatch("aggregators".to_string()));
        }

        let members = state.aggregators.entry(group.clone()).or_default();
        for (name, host) in names.into_iter().zip(hosts) {
            if members.iter().any(|agg| agg.name == name) {
                return Err(ConductorError::DuplicateName {
                    section: "aggregators".to_string(),
                    group,
                    name,
                });
            }
            if !state.hosts.contains_key(&host) {
                return Err(ConductorError::UnknownHost(host));
            }
            members.push(Aggregator {
                name,
                host,
                state: AggState::Stopped,
            });
        }
    }
    Ok(())
}

fn build_producers(section: &Node, state: &mut DesiredState) -> Result<(), ConductorError> {
    for entry in entries(section, "producers")? {
        let names = expand_attr(entry, "producers", "names")?;
        let hosts = expand_attr(entry, "producers", "hosts")?;
        let updaters = spec_strings(
            require(entry, "producers", "updaters")?,
            "producers",
            "updaters",
        )?;
        let reconnect = require_str(entry, "producers", "reconnect")?.to_string();
        let ptype: ProducerType = require_str(entry, "producers", "type")?
            .parse()
            .map_err(|_| {
                ConductorError::BadDescription("producer 'type' must be active or passive".into())
            })?;
        let group = require_str(entry, "producers", "group")?.to_string();

        if names.len() != hosts.len() {
            return Err(ConductorError::ArityMismatch("producers".to_string()));
        }
        // Fail early on a reconnect interval no daemon would accept.
        interval::to_micros(&reconnect)?;

        let members = state.producers.entry(group.clone()).or_default();
        for (name, host) in names.into_iter().zip(hosts) {
            if !state.hosts.contains_key(&host) {
                return Err(ConductorError::UnknownHost(host));
            }
            members.push(Producer {
                name,
                host,
                group: group.clone(),
                ptype,
                reconnect: reconnect.clone(),
                updaters: updaters.clone(),
            });
        }
    }
    Ok(())
}

fn checked_regex(pattern: &str) -> Result<String, ConductorError> {
    regex::Regex::new(pattern)
        .map_err(|e| ConductorError::InvalidRegex(pattern.to_string(), e.to_string()))?;
    Ok(pattern.to_string())
}

fn build_updaters(section: &Node, state: &mut DesiredState) -> Result<(), ConductorError> {
    for entry in entries(section, "updaters")? {
        let name = require_str(entry, "updaters", "name")?.to_string();
        let group = require_str(entry, "updaters", "group")?.to_string();
        let interval_spec = require_str(entry, "updaters", "interval")?.to_string();
        interval::to_micros(&interval_spec)?;

        let auto = entry.get_str("auto").map(str::to_string);
        let push = entry.get_str("push").map(str::to_string);
        if auto.is_some() && push.is_some() {
            return Err(ConductorError::ConflictingMode(name));
        }

        let mut sets = Vec::new();
        for set in require(entry, "updaters", "sets")?.as_seq().ok_or_else(|| {
            ConductorError::BadDescription("updater 'sets' must be a list".into())
        })? {
            let regex = checked_regex(require_str(set, "updaters", "regex")?)?;
            let field = match set.get_str("field") {
                Some(field) => Some(field.parse().map_err(|_| {
                    ConductorError::BadDescription(
                        "set match 'field' must be inst or schema".into(),
                    )
                })?),
                None => None,
            };
            sets.push(SetMatch { regex, field });
        }

        let mut producers = Vec::new();
        for m in require(entry, "updaters", "producers")?
            .as_seq()
            .ok_or_else(|| {
                ConductorError::BadDescription("updater 'producers' must be a list".into())
            })?
        {
            producers.push(ProducerMatch {
                regex: checked_regex(require_str(m, "updaters", "regex")?)?,
            });
        }

        let members = state.updaters.entry(group.clone()).or_default();
        if members.iter().any(|u| u.name == name) {
            return Err(ConductorError::DuplicateName {
                section: "updaters".to_string(),
                group,
                name,
            });
        }
        members.push(Updater {
            name,
            group,
            interval: interval_spec,
            auto,
            push,
            sets,
            producers,
        });
    }
    Ok(())
}

fn build_stores(section: &Node, state: &mut DesiredState) -> Result<(), ConductorError> {
    for entry in entries(section, "stores")? {
        let name = require_str(entry, "stores", "name")?.to_string();
        let group = require_str(entry, "stores", "group")?.to_string();
        let container = require_str(entry, "stores", "container")?.to_string();
        let schema = require_str(entry, "stores", "schema")?.to_string();

        let plugin = require(entry, "stores", "plugin")?;
        let plugin_name = require_str(plugin, "stores", "name")?.to_string();
        let plugin_conf = leaf_map(require(plugin, "stores", "config")?, "plugin.config")?;

        let members = state.stores.entry(group.clone()).or_default();
        if members.iter().any(|s| s.name == name) {
            return Err(ConductorError::DuplicateName {
                section: "stores".to_string(),
                group,
                name,
            });
        }
        members.push(StorePolicy {
            name,
            group,
            container,
            schema,
            plugin: StorePlugin {
                name: plugin_name,
                conf: plugin_conf,
            },
        });
    }
    Ok(())
}

fn build_samplers(section: &Node, state: &mut DesiredState) -> Result<(), ConductorError> {
    for entry in entries(section, "samplers")? {
        let specs = spec_strings(require(entry, "samplers", "names")?, "samplers", "names")?;
        // The raw spec is the group key; fail now if it cannot expand.
        expand::expand_many(&specs)?;
        let key = specs.join(",");

        let mut plugins = Vec::new();
        if let Some(config) = entry.get("config") {
            let items = config.as_seq().ok_or_else(|| {
                ConductorError::BadDescription("sampler 'config' must be a list".into())
            })?;
            for item in items {
                let plugin_name = require_str(item, "samplers", "name")?.to_string();
                let interval_spec = item
                    .get_str("interval")
                    .unwrap_or(DEFAULT_SAMPLE_INTERVAL)
                    .to_string();
                let mut conf = IndexMap::new();
                if let Some(entries) = item.as_map() {
                    for (param, child) in entries {
                        if param == "name" || param == "interval" {
                            continue;
                        }
                        let value = child.as_str().ok_or_else(|| {
                            ConductorError::BadDescription(format!(
                                "sampler plugin parameter '{param}' must be a scalar"
                            ))
                        })?;
                        conf.insert(param.clone(), value.to_string());
                    }
                }
                plugins.push(SamplerPlugin {
                    name: plugin_name,
                    interval: interval_spec,
                    conf,
                });
            }
        }

        // Mapping semantics: a duplicate key keeps the last entry.
        state.samplers.insert(
            key.clone(),
            SamplerGroup {
                names: key,
                plugins,
            },
        );
    }
    Ok(())
}
