// src/core/tree.rs

//! The dynamic configuration tree and its flat key/value projection.
//!
//! `Node` is the tagged tree every configuration document passes through: the
//! YAML description reader produces one, the topology codec renders the entity
//! graph into one, and the datastore reflect routine rebuilds one from a flat
//! key range. Mappings keep insertion order; sequence indices are projected as
//! zero-padded decimals so the datastore's lexicographic order matches numeric
//! order.

use crate::core::errors::ConductorError;
use indexmap::IndexMap;
use serde_yaml::Value as Yaml;
use std::path::Path;

/// Width of a projected sequence index. Six digits keeps lexicographic and
/// numeric ordering identical for any realistic fleet.
const INDEX_WIDTH: usize = 6;

/// A dynamically shaped configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Map(IndexMap<String, Node>),
    Seq(Vec<Node>),
    Leaf(String),
}

impl Node {
    pub fn map() -> Self {
        Node::Map(IndexMap::new())
    }

    pub fn leaf(value: impl Into<String>) -> Self {
        Node::Leaf(value.into())
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Node]> {
        match self {
            Node::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Mapping lookup. Returns `None` for non-mapping nodes.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_map().and_then(|entries| entries.get(key))
    }

    /// Mapping lookup of a leaf value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_str)
    }

    /// Inserts into a mapping node. No-op on other node kinds.
    pub fn insert(&mut self, key: impl Into<String>, child: Node) {
        if let Node::Map(entries) = self {
            entries.insert(key.into(), child);
        }
    }

    /// Converts a parsed YAML document into a `Node` tree. Scalars become
    /// string leaves. Falsiness is decided here, while the original scalar
    /// kind is still known: `null`, `false` and numeric zero become the empty
    /// leaf, which the projection later skips. A string `"0"` stays truthy.
    pub fn from_yaml(value: &Yaml) -> Result<Self, ConductorError> {
        match value {
            Yaml::Null => Ok(Node::Leaf(String::new())),
            Yaml::Bool(false) => Ok(Node::Leaf(String::new())),
            Yaml::Bool(true) => Ok(Node::Leaf(true.to_string())),
            Yaml::Number(n) if n.as_f64() == Some(0.0) => Ok(Node::Leaf(String::new())),
            Yaml::Number(n) => Ok(Node::Leaf(n.to_string())),
            Yaml::String(s) => Ok(Node::Leaf(s.clone())),
            Yaml::Sequence(items) => {
                let children = items
                    .iter()
                    .map(Node::from_yaml)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Node::Seq(children))
            }
            Yaml::Mapping(entries) => {
                let mut out = IndexMap::new();
                for (key, child) in entries {
                    let key = match key {
                        Yaml::String(s) => s.clone(),
                        Yaml::Number(n) => n.to_string(),
                        Yaml::Bool(b) => b.to_string(),
                        other => {
                            return Err(ConductorError::BadDescription(format!(
                                "mapping key must be a scalar, got {other:?}"
                            )));
                        }
                    };
                    out.insert(key, Node::from_yaml(child)?);
                }
                Ok(Node::Map(out))
            }
            Yaml::Tagged(tagged) => Node::from_yaml(&tagged.value),
        }
    }

    /// Reads and parses a YAML description file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConductorError> {
        let content = std::fs::read_to_string(path)?;
        let value: Yaml = serde_yaml::from_str(&content)?;
        Node::from_yaml(&value)
    }

    /// Projects the tree into flat `(key, value)` pairs rooted at `prefix`.
    /// Empty leaves are skipped, which also drops scalars that were falsy at
    /// ingestion.
    pub fn walk(&self, prefix: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.walk_into(prefix, &mut out);
        out
    }

    fn walk_into(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        match self {
            Node::Leaf(value) => {
                if !value.is_empty() {
                    out.push((prefix.to_string(), value.clone()));
                }
            }
            Node::Map(entries) => {
                for (key, child) in entries {
                    child.walk_into(&format!("{prefix}/{key}"), out);
                }
            }
            Node::Seq(items) => {
                for (index, child) in items.iter().enumerate() {
                    child.walk_into(&format!("{prefix}/{index:0w$}", w = INDEX_WIDTH), out);
                }
            }
        }
    }
}

/// Rebuilds a tree from flat `(key, value)` pairs. A path segment composed
/// entirely of decimal digits denotes a sequence index; anything else is a
/// mapping key. The container kind at each level is decided by the class of
/// the next path segment.
pub fn reflect<I>(pairs: I) -> Node
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut root = Node::map();
    for (key, value) in pairs {
        let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            continue;
        }
        fill(&mut root, &segments, value);
    }
    root
}

fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn fill(node: &mut Node, segments: &[&str], value: String) {
    let Some((segment, rest)) = segments.split_first() else {
        *node = Node::Leaf(value);
        return;
    };

    if is_index(segment) {
        let Ok(index) = segment.parse::<usize>() else {
            return;
        };
        if !matches!(node, Node::Seq(_)) {
            *node = Node::Seq(Vec::new());
        }
        let Node::Seq(items) = node else { unreachable!() };
        while items.len() <= index {
            items.push(Node::Leaf(String::new()));
        }
        fill(&mut items[index], rest, value);
    } else {
        if !matches!(node, Node::Map(_)) {
            *node = Node::map();
        }
        let Node::Map(entries) = node else { unreachable!() };
        let child = entries
            .entry(segment.to_string())
            .or_insert_with(|| Node::Leaf(String::new()));
        fill(child, rest, value);
    }
}
