// src/core/comm/client.rs

//! The concrete control-channel client: newline-delimited JSON requests over
//! a TCP stream, one reply per request.

use crate::core::comm::{
    Ack, Communicator, ConnState, DaemonStatus, PeerPlugin, PeerProducer,
};
use crate::core::errors::ConductorError;
use crate::core::topology::{Host, UpdaterMode};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_LINE: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct WireReply {
    #[allow(dead_code)]
    id: u64,
    errcode: i32,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

/// A control connection to one daemon.
pub struct DaemonClient {
    addr: String,
    port: u16,
    auth_name: String,
    auth_conf: IndexMap<String, String>,
    framed: Option<Framed<TcpStream, LinesCodec>>,
    state: ConnState,
    next_id: u64,
}

impl DaemonClient {
    pub fn new(host: &Host) -> Self {
        Self {
            addr: host.addr.clone(),
            port: host.port,
            auth_name: host.auth.name.clone(),
            auth_conf: host.auth.conf.clone(),
            framed: None,
            state: ConnState::Disconnected,
            next_id: 0,
        }
    }

    fn drop_connection(&mut self) {
        self.framed = None;
        self.state = ConnState::Disconnected;
    }

    /// Sends one request and waits for its reply line.
    async fn send(
        &mut self,
        verb: &str,
        params: Value,
    ) -> Result<(i32, Option<String>, Option<Value>), ConductorError> {
        let Some(framed) = self.framed.as_mut() else {
            return Err(ConductorError::NotConnected);
        };
        self.next_id += 1;
        let request = json!({ "request": verb, "id": self.next_id, "params": params });

        if let Err(e) = framed.send(request.to_string()).await {
            self.drop_connection();
            return Err(ConductorError::Transport(e.to_string()));
        }

        let line = match tokio::time::timeout(READ_TIMEOUT, framed.next()).await {
            Err(_) => {
                self.drop_connection();
                return Err(ConductorError::ReplyTimeout);
            }
            Ok(None) => {
                self.drop_connection();
                return Err(ConductorError::ConnectionClosed);
            }
            Ok(Some(Err(e))) => {
                self.drop_connection();
                return Err(ConductorError::Transport(e.to_string()));
            }
            Ok(Some(Ok(line))) => line,
        };

        let reply: WireReply = serde_json::from_str(&line)?;
        Ok((reply.errcode, reply.msg, reply.result))
    }

    /// Sends a verb whose reply is a plain acknowledgement.
    async fn command(&mut self, verb: &str, params: Value) -> Result<Ack, ConductorError> {
        let (errcode, msg, _) = self.send(verb, params).await?;
        Ok(Ack { errcode, msg })
    }

    /// Sends a verb and decodes its `result` payload.
    async fn query<T: serde::de::DeserializeOwned>(
        &mut self,
        verb: &str,
    ) -> Result<T, ConductorError> {
        let (errcode, msg, result) = self.send(verb, json!({})).await?;
        if errcode != 0 {
            return Err(ConductorError::BadReply(format!(
                "{verb} failed with code {errcode}: {}",
                msg.unwrap_or_default()
            )));
        }
        let payload = result.ok_or_else(|| {
            ConductorError::BadReply(format!("{verb} reply carried no result"))
        })?;
        Ok(serde_json::from_value(payload)?)
    }
}

#[async_trait]
impl Communicator for DaemonClient {
    fn state(&self) -> ConnState {
        self.state
    }

    async fn connect(&mut self) -> Result<(), ConductorError> {
        self.state = ConnState::Connecting;
        let target = format!("{}:{}", self.addr, self.port);
        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(target.as_str()))
            .await
        {
            Err(_) => {
                self.state = ConnState::Disconnected;
                return Err(ConductorError::Transport(format!(
                    "connect to {target} timed out"
                )));
            }
            Ok(Err(e)) => {
                self.state = ConnState::Disconnected;
                return Err(ConductorError::Transport(e.to_string()));
            }
            Ok(Ok(stream)) => stream,
        };
        self.framed = Some(Framed::new(
            stream,
            LinesCodec::new_with_max_length(MAX_LINE),
        ));
        self.state = ConnState::Connected;

        if self.auth_name != "none" {
            let params = json!({ "name": self.auth_name, "config": self.auth_conf });
            let ack = self.command("auth", params).await?;
            if !ack.ok() {
                self.drop_connection();
                return Err(ConductorError::Transport(format!(
                    "authentication '{}' rejected with code {}",
                    self.auth_name, ack.errcode
                )));
            }
        }
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), ConductorError> {
        self.drop_connection();
        self.connect().await
    }

    async fn close(&mut self) {
        self.state = ConnState::Closing;
        self.drop_connection();
    }

    async fn daemon_status(&mut self) -> Result<DaemonStatus, ConductorError> {
        self.query("daemon_status").await
    }

    async fn prdcr_status(&mut self) -> Result<Vec<PeerProducer>, ConductorError> {
        self.query("prdcr_status").await
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
        self.command(
            "prdcr_add",
            json!({
                "name": name,
                "type": ptype,
                "xprt": xprt,
                "host": host,
                "port": port,
                "reconnect": reconnect_us,
            }),
        )
        .await
    }

    async fn prdcr_start(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.command("prdcr_start", json!({ "name": name })).await
    }

    async fn prdcr_stop(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.command("prdcr_stop", json!({ "name": name })).await
    }

    async fn updtr_add(
        &mut self,
        name: &str,
        mode: &UpdaterMode,
    ) -> Result<Ack, ConductorError> {
        let params = match mode {
            UpdaterMode::Interval(us) => json!({ "name": name, "interval": us }),
            UpdaterMode::Auto(auto) => json!({ "name": name, "auto": auto }),
            UpdaterMode::Push(push) => json!({ "name": name, "push": push }),
        };
        self.command("updtr_add", params).await
    }

    async fn updtr_prdcr_add(
        &mut self,
        updtr: &str,
        regex: &str,
    ) -> Result<Ack, ConductorError> {
        self.command("updtr_prdcr_add", json!({ "name": updtr, "regex": regex }))
            .await
    }

    async fn updtr_match_add(
        &mut self,
        updtr: &str,
        regex: &str,
        field: Option<&str>,
    ) -> Result<Ack, ConductorError> {
        let params = match field {
            Some(field) => json!({ "name": updtr, "regex": regex, "match": field }),
            None => json!({ "name": updtr, "regex": regex }),
        };
        self.command("updtr_match_add", params).await
    }

    async fn updtr_start(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.command("updtr_start", json!({ "name": name })).await
    }

    async fn plugn_load(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.command("plugn_load", json!({ "name": name })).await
    }

    async fn plugn_config(
        &mut self,
        name: &str,
        params: &IndexMap<String, String>,
    ) -> Result<Ack, ConductorError> {
        self.command("plugn_config", json!({ "name": name, "params": params }))
            .await
    }

    async fn plugn_stop(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.command("plugn_stop", json!({ "name": name })).await
    }

    async fn smplr_start(
        &mut self,
        name: &str,
        interval: &str,
    ) -> Result<Ack, ConductorError> {
        self.command("smplr_start", json!({ "name": name, "interval": interval }))
            .await
    }

    async fn smplr_status(&mut self) -> Result<Vec<PeerPlugin>, ConductorError> {
        self.query("smplr_status").await
    }

    async fn strgp_add(
        &mut self,
        name: &str,
        plugin: &str,
        container: &str,
        schema: &str,
    ) -> Result<Ack, ConductorError> {
        self.command(
            "strgp_add",
            json!({
                "name": name,
                "plugin": plugin,
                "container": container,
                "schema": schema,
            }),
        )
        .await
    }

    async fn strgp_prdcr_add(
        &mut self,
        name: &str,
        regex: &str,
    ) -> Result<Ack, ConductorError> {
        self.command("strgp_prdcr_add", json!({ "name": name, "regex": regex }))
            .await
    }

    async fn strgp_start(&mut self, name: &str) -> Result<Ack, ConductorError> {
        self.command("strgp_start", json!({ "name": name })).await
    }
}
