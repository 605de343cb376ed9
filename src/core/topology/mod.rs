// src/core/topology/mod.rs

//! The in-memory entity graph built from the declarative fleet description.

pub mod builder;
pub mod codec;
pub mod model;

pub use builder::build;
pub use model::{
    AggState, Aggregator, Auth, DesiredState, Host, Producer, ProducerMatch, ProducerType,
    SamplerGroup, SamplerPlugin, SetField, SetMatch, StorePlugin, StorePolicy, Updater,
    UpdaterMode,
};
