// src/core/reconcile/mod.rs

//! The reconciliation engine: health polling, per-group load balancing and
//! the idempotent apply of the desired state to every daemon.

pub mod balance;
pub mod pass;

pub use balance::partition;
pub use pass::{CommSet, Connector, Reconciler};
