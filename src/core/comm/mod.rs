// src/core/comm/mod.rs

//! The abstract command channel to one daemon.
//!
//! Every configuration verb the reconciler issues goes through the
//! `Communicator` trait, which keeps the wire protocol replaceable and lets
//! tests script peers. Operations return an `Ack` whose error code follows the
//! daemon convention: `0` is success, `EBUSY` and `EEXIST` mean the requested
//! state already holds and are absorbed on idempotent verbs.

pub mod client;

use crate::core::errors::ConductorError;
use crate::core::topology::UpdaterMode;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;

pub use client::DaemonClient;

/// The peer already holds the requested state.
pub const EBUSY: i32 = 16;
/// The requested object already exists on the peer.
pub const EEXIST: i32 = 17;

/// Connection lifecycle of one daemon channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Outcome of one configuration verb.
#[derive(Debug, Clone, Default)]
pub struct Ack {
    pub errcode: i32,
    pub msg: Option<String>,
}

impl Ack {
    pub fn ok(&self) -> bool {
        self.errcode == 0
    }

    /// Success, or an error code the caller treats as already-done.
    pub fn benign(&self) -> bool {
        self.ok() || self.errcode == EBUSY || self.errcode == EEXIST
    }
}

/// Liveness report of a daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonStatus {
    pub state: String,
}

/// One producer as reported by an aggregator peer.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerProducer {
    pub name: String,
    pub state: String,
}

impl PeerProducer {
    pub fn is_stopped(&self) -> bool {
        self.state.eq_ignore_ascii_case("stopped")
    }
}

/// One sampler plugin as reported by a sampler peer.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerPlugin {
    pub name: String,
    pub state: String,
}

/// The capability set of one daemon control channel.
#[async_trait]
pub trait Communicator: Send {
    fn state(&self) -> ConnState;

    async fn connect(&mut self) -> Result<(), ConductorError>;
    async fn reconnect(&mut self) -> Result<(), ConductorError>;
    async fn close(&mut self);

    async fn daemon_status(&mut self) -> Result<DaemonStatus, ConductorError>;

    async fn prdcr_status(&mut self) -> Result<Vec<PeerProducer>, ConductorError>;
    async fn prdcr_add(
        &mut self,
        name: &str,
        ptype: &str,
        xprt: &str,
        host: &str,
        port: u16,
        reconnect_us: u64,
    ) -> Result<Ack, ConductorError>;
    async fn prdcr_start(&mut self, name: &str) -> Result<Ack, ConductorError>;
    async fn prdcr_stop(&mut self, name: &str) -> Result<Ack, ConductorError>;

    async fn updtr_add(&mut self, name: &str, mode: &UpdaterMode)
    -> Result<Ack, ConductorError>;
    async fn updtr_prdcr_add(&mut self, updtr: &str, regex: &str)
    -> Result<Ack, ConductorError>;
    async fn updtr_match_add(
        &mut self,
        updtr: &str,
        regex: &str,
        field: Option<&str>,
    ) -> Result<Ack, ConductorError>;
    async fn updtr_start(&mut self, name: &str) -> Result<Ack, ConductorError>;

    async fn plugn_load(&mut self, name: &str) -> Result<Ack, ConductorError>;
    async fn plugn_config(
        &mut self,
        name: &str,
        params: &IndexMap<String, String>,
    ) -> Result<Ack, ConductorError>;
    async fn plugn_stop(&mut self, name: &str) -> Result<Ack, ConductorError>;

    async fn smplr_start(&mut self, name: &str, interval: &str)
    -> Result<Ack, ConductorError>;
    async fn smplr_status(&mut self) -> Result<Vec<PeerPlugin>, ConductorError>;

    async fn strgp_add(
        &mut self,
        name: &str,
        plugin: &str,
        container: &str,
        schema: &str,
    ) -> Result<Ack, ConductorError>;
    async fn strgp_prdcr_add(&mut self, name: &str, regex: &str)
    -> Result<Ack, ConductorError>;
    async fn strgp_start(&mut self, name: &str) -> Result<Ack, ConductorError>;
}
