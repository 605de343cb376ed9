// src/core/errors.rs

//! Defines the primary error type for the entire application.

use thiserror::Error;

/// The main error enum, representing all possible failures within the control plane.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum ConductorError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid name spec '{0}'")]
    InvalidSpec(String),

    #[error("Invalid interval '{0}'")]
    InvalidInterval(String),

    #[error("Section '{0}' is missing required attribute '{1}'")]
    MissingAttribute(String, String),

    #[error("Section '{0}': name count does not match host/port arity")]
    ArityMismatch(String),

    #[error("Host name '{0}' is defined more than once")]
    DuplicateHost(String),

    #[error("Section '{section}': duplicate name '{name}' in group '{group}'")]
    DuplicateName {
        section: String,
        group: String,
        name: String,
    },

    #[error("Updater '{0}': 'auto' and 'push' are mutually exclusive")]
    ConflictingMode(String),

    #[error("Unknown host '{0}'")]
    UnknownHost(String),

    #[error("Invalid match pattern '{0}': {1}")]
    InvalidRegex(String, String),

    #[error("Malformed description: {0}")]
    BadDescription(String),

    #[error("Datastore error: {0}")]
    Datastore(String),

    #[error("Daemon transport error: {0}")]
    Transport(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Read timeout while waiting for daemon reply")]
    ReplyTimeout,

    #[error("Daemon connection is not established")]
    NotConnected,

    #[error("Unexpected daemon reply: {0}")]
    BadReply(String),
}

// --- From trait implementations for easy error conversion ---

impl From<serde_yaml::Error> for ConductorError {
    fn from(e: serde_yaml::Error) -> Self {
        ConductorError::BadDescription(e.to_string())
    }
}

impl From<toml::de::Error> for ConductorError {
    fn from(e: toml::de::Error) -> Self {
        ConductorError::BadDescription(e.to_string())
    }
}

impl From<serde_json::Error> for ConductorError {
    fn from(e: serde_json::Error) -> Self {
        ConductorError::BadReply(e.to_string())
    }
}

impl From<etcd_client::Error> for ConductorError {
    fn from(e: etcd_client::Error) -> Self {
        ConductorError::Datastore(e.to_string())
    }
}
