// src/config.rs

//! Loading of the cluster (datastore members) configuration file.

use anyhow::Result;
use serde::Deserialize;
use tokio::fs;

/// The datastore cluster description. The controller talks to the first
/// member; the rest are reserved for future failover.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Optional default key prefix; the command line overrides it.
    pub cluster: Option<String>,

    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub host: String,

    #[serde(default = "default_member_port")]
    pub port: u16,
}

fn default_member_port() -> u16 {
    2379
}

impl ClusterConfig {
    pub async fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: ClusterConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
