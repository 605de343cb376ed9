// src/core/mod.rs

//! The central module containing the core logic and data structures of Conductor.

pub mod comm;
pub mod controller;
pub mod datastore;
pub mod errors;
pub mod expand;
pub mod interval;
pub mod reconcile;
pub mod topology;
pub mod tree;

pub use errors::ConductorError;
pub use topology::DesiredState;
pub use tree::Node;
