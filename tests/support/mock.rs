// tests/support/mock.rs

//! A scripted `Communicator` for reconciler tests. Every verb is recorded in
//! an inspectable command log, and the fake peer mimics the daemon's
//! already-done replies (`EBUSY`/`EEXIST`) so idempotence can be observed.

use async_trait::async_trait;
use conductor::core::comm::{
    Ack, Communicator, ConnState, DaemonStatus, EBUSY, EEXIST, PeerPlugin, PeerProducer,
};
use conductor::core::errors::ConductorError;
use conductor::core::topology::UpdaterMode;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MockInner {
    /// What `daemon_status` reports, e.g. "ready".
    pub daemon_state: String,
    /// Producer name to state, in add order.
    pub producers: Vec<(String, String)>,
    pub updaters: HashSet<String>,
    pub updater_producers: HashSet<(String, String)>,
    pub updater_matches: HashSet<(String, String)>,
    pub started_updaters: HashSet<String>,
    pub plugins: HashSet<String>,
    pub started_samplers: HashSet<String>,
    pub storage_policies: HashSet<String>,
    pub started_policies: HashSet<String>,
    /// Every verb issued against this peer, in order.
    pub log: Vec<String>,
    pub fail_connect: bool,
    pub fail_status: bool,
}

pub struct MockComm {
    state: ConnState,
    inner: Arc<Mutex<MockInner>>,
}

/// Builds a connected mock peer reporting `daemon_state`, returning the
/// shared handle used to script and inspect it.
pub fn mock_peer(daemon_state: &str) -> (Box<dyn Communicator + Send>, Arc<Mutex<MockInner>>) {
    let inner = Arc::new(Mutex::new(MockInner {
        daemon_state: daemon_state.to_string(),
        ..MockInner::default()
    }));
    let comm = MockComm {
        state: ConnState::Connected,
        inner: inner.clone(),
    };
    (Box::new(comm), inner)
}

/// A peer that refuses every connection attempt.
pub fn unreachable_peer() -> (Box<dyn Communicator + Send>, Arc<Mutex<MockInner>>) {
    let inner = Arc::new(Mutex::new(MockInner {
        fail_connect: true,
        ..MockInner::default()
    }));
    let comm = MockComm {
        state: ConnState::Disconnected,
        inner: inner.clone(),
    };
    (Box::new(comm), inner)
}

impl MockComm {
    fn record(&self, line: String) {
        self.inner.lock().unwrap().log.push(line);
    }
}

fn ack(errcode: i32) -> Result<Ack, ConductorError> {
    Ok(Ack { errcode, msg: None })
}

#[async_trait]
impl Communicator for MockComm {
    fn state(&self) -> ConnState {
        self.state
    }

    async fn connect(&mut self) -> Result<(), ConductorError> {
        if self.inner.lock().unwrap().fail_connect {
            self.state = ConnState::Disconnected;
            return Err(ConductorError::Transport("connection refused".into()));
        }
        self.state = ConnState::Connected;
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), ConductorError> {
        self.state = ConnState::Disconnected;
        self.connect().await
    }

    async fn close(&mut self) {
        self.state = ConnState::Disconnected;
    }

    async fn daemon_status(&mut self) -> Result<DaemonStatus, ConductorError> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_status {
            return Err(ConductorError::Transport("status refused".into()));
        }
        Ok(DaemonStatus {
            state: inner.daemon_state.clone(),
        })
    }

    async fn prdcr_status(&mut self) -> Result<Vec<PeerProducer>, ConductorError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .producers
            .iter()
            .map(|(name, state)| PeerProducer {
                name: name.clone(),
                state: state.clone(),
            })
            .collect())
    }

    async fn prdcr_add(
        &mut self,
        name: &str,
        ptype: &str,
        xprt: &str,
        host: &str,
        port: u16,
        reconnect_us: u64,
    ) -> Result<Ack, ConductorError> {
        self.record(format!(
            "prdcr_add {name} {ptype} {xprt} {host}:{port} {reconnect_us}"
        ));
        let mut inner = self.inner.lock().unwrap();
        if inner.producers.iter().any(|(n, _)| n == name) {
            return ack(EBUSY);
        }
        inner.producers.push((name.to_string(), "STOPPED".into()));
        ack(0)
    }

    async fn prdcr_start(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.record(format!("prdcr_start {name}"));
        let mut inner = self.inner.lock().unwrap();
        match inner.producers.iter_mut().find(|(n, _)| n == name) {
            Some((_, state)) if state == "STOPPED" => {
                *state = "RUNNING".into();
                ack(0)
            }
            Some(_) => ack(EBUSY),
            None => ack(2),
        }
    }

    async fn prdcr_stop(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.record(format!("prdcr_stop {name}"));
        let mut inner = self.inner.lock().unwrap();
        match inner.producers.iter_mut().find(|(n, _)| n == name) {
            Some((_, state)) if state != "STOPPED" => {
                *state = "STOPPED".into();
                ack(0)
            }
            Some(_) => ack(EBUSY),
            None => ack(2),
        }
    }

    async fn updtr_add(
        &mut self,
        name: &str,
        mode: &UpdaterMode,
    ) -> Result<Ack, ConductorError> {
        let mode = match mode {
            UpdaterMode::Interval(us) => format!("interval={us}"),
            UpdaterMode::Auto(auto) => format!("auto={auto}"),
            UpdaterMode::Push(push) => format!("push={push}"),
        };
        self.record(format!("updtr_add {name} {mode}"));
        let mut inner = self.inner.lock().unwrap();
        if !inner.updaters.insert(name.to_string()) {
            return ack(EBUSY);
        }
        ack(0)
    }

    async fn updtr_prdcr_add(
        &mut self,
        updtr: &str,
        regex: &str,
    ) -> Result<Ack, ConductorError> {
        self.record(format!("updtr_prdcr_add {updtr} {regex}"));
        let mut inner = self.inner.lock().unwrap();
        if !inner
            .updater_producers
            .insert((updtr.to_string(), regex.to_string()))
        {
            return ack(EEXIST);
        }
        ack(0)
    }

    async fn updtr_match_add(
        &mut self,
        updtr: &str,
        regex: &str,
        field: Option<&str>,
    ) -> Result<Ack, ConductorError> {
        match field {
            Some(field) => self.record(format!("updtr_match_add {updtr} {regex} match={field}")),
            None => self.record(format!("updtr_match_add {updtr} {regex}")),
        }
        let mut inner = self.inner.lock().unwrap();
        if !inner
            .updater_matches
            .insert((updtr.to_string(), regex.to_string()))
        {
            return ack(EEXIST);
        }
        ack(0)
    }

    async fn updtr_start(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.record(format!("updtr_start {name}"));
        let mut inner = self.inner.lock().unwrap();
        if !inner.started_updaters.insert(name.to_string()) {
            return ack(EBUSY);
        }
        ack(0)
    }

    async fn plugn_load(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.record(format!("plugn_load {name}"));
        let mut inner = self.inner.lock().unwrap();
        if !inner.plugins.insert(name.to_string()) {
            return ack(EEXIST);
        }
        ack(0)
    }

    async fn plugn_config(
        &mut self,
        name: &str,
        params: &IndexMap<String, String>,
    ) -> Result<Ack, ConductorError> {
        let rendered: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        self.record(format!("plugn_config {name} {}", rendered.join(" ")));
        ack(0)
    }

    async fn plugn_stop(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.record(format!("plugn_stop {name}"));
        let mut inner = self.inner.lock().unwrap();
        inner.started_samplers.remove(name);
        if !inner.plugins.remove(name) {
            return ack(2);
        }
        ack(0)
    }

    async fn smplr_start(
        &mut self,
        name: &str,
        interval: &str,
    ) -> Result<Ack, ConductorError> {
        self.record(format!("smplr_start {name} {interval}"));
        let mut inner = self.inner.lock().unwrap();
        if !inner.started_samplers.insert(name.to_string()) {
            return ack(EBUSY);
        }
        ack(0)
    }

    async fn smplr_status(&mut self) -> Result<Vec<PeerPlugin>, ConductorError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .started_samplers
            .iter()
            .map(|name| PeerPlugin {
                name: name.clone(),
                state: "running".into(),
            })
            .collect())
    }

    async fn strgp_add(
        &mut self,
        name: &str,
        plugin: &str,
        container: &str,
        schema: &str,
    ) -> Result<Ack, ConductorError> {
        self.record(format!("strgp_add {name} {plugin} {container} {schema}"));
        let mut inner = self.inner.lock().unwrap();
        if !inner.storage_policies.insert(name.to_string()) {
            return ack(EBUSY);
        }
        ack(0)
    }

    async fn strgp_prdcr_add(
        &mut self,
        name: &str,
        regex: &str,
    ) -> Result<Ack, ConductorError> {
        self.record(format!("strgp_prdcr_add {name} {regex}"));
        ack(0)
    }

    async fn strgp_start(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.record(format!("strgp_start {name}"));
        let mut inner = self.inner.lock().unwrap();
        if !inner.started_policies.insert(name.to_string()) {
            return ack(EBUSY);
        }
        ack(0)
    }
}
