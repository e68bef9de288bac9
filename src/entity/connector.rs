//! TCP connector entity: connect with resolution and automatic reconnect
//!
//! A connector owns at most one live connection. A periodic interval is the
//! sole reconnect driver: every tick attempts a connect if nothing is
//! connected, and every teardown (connect failure or connection loss) fires
//! the stop callback and waits for the next tick. Reconnecting continues
//! until the application calls `stop`.

use crate::config::NetConfig;
use crate::entity::common::EntityCommon;
use crate::error::{Error, Result};
use crate::handle::{IoReadyCb, IoStopCb, NetEntity, SingleIo};
use crate::io::tcp::{IoNotifier, TcpIo};
use crate::metrics;
use crate::resolver;
use crate::sync::lock;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Connector lifecycle phase, observable through
/// [`EntityHandle::state`](crate::EntityHandle::state)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Idle,
    Resolving,
    Connecting,
    Connected,
    WaitingToReconnect,
    Stopped,
}

/// Net entity that maintains one outbound TCP connection, reconnecting on
/// a fixed interval after every loss.
pub struct TcpConnector {
    self_ref: Weak<TcpConnector>,
    entity: EntityCommon<TcpIo>,
    state: Mutex<ConnectorState>,
    endpoints: Mutex<Vec<SocketAddr>>,
    remote_host: String,
    remote_port: u16,
    reconnect: Duration,
    cfg: NetConfig,
    run_task: Mutex<Option<JoinHandle<()>>>,
    disconnected: Notify,
}

impl TcpConnector {
    pub(crate) fn with_host(
        host: impl Into<String>,
        port: u16,
        reconnect: Duration,
        cfg: NetConfig,
    ) -> Arc<Self> {
        Self::build(host.into(), port, Vec::new(), reconnect, cfg)
    }

    pub(crate) fn with_endpoints(
        endpoints: Vec<SocketAddr>,
        reconnect: Duration,
        cfg: NetConfig,
    ) -> Arc<Self> {
        Self::build(String::new(), 0, endpoints, reconnect, cfg)
    }

    fn build(
        host: String,
        port: u16,
        endpoints: Vec<SocketAddr>,
        reconnect: Duration,
        cfg: NetConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|w| Self {
            self_ref: w.clone(),
            entity: EntityCommon::new(),
            state: Mutex::new(ConnectorState::Idle),
            endpoints: Mutex::new(endpoints),
            remote_host: host,
            remote_port: port,
            reconnect,
            cfg,
            run_task: Mutex::new(None),
            disconnected: Notify::new(),
        })
    }

    /// Current lifecycle phase
    pub fn state(&self) -> ConnectorState {
        *lock(&self.state)
    }

    pub fn is_started(&self) -> bool {
        self.entity.is_started()
    }

    /// Begin resolving/connecting. Must be called within a tokio runtime;
    /// `false` means already started.
    pub fn start(&self, io_ready: IoReadyCb<TcpIo>, stop_cb: Option<IoStopCb<TcpIo>>) -> bool {
        if !self.entity.start(io_ready, stop_cb) {
            return false;
        }
        metrics::global().entity_started();
        if let Some(me) = self.self_ref.upgrade() {
            *lock(&self.run_task) = Some(tokio::spawn(me.run()));
        }
        true
    }

    /// Cancel the reconnect driver and any in-flight resolve, close the
    /// active connection, and fire one final stop callback with
    /// [`Error::TcpConnectorStopped`].
    pub fn stop(&self) -> bool {
        if !self.entity.stop() {
            return false;
        }
        if let Some(task) = lock(&self.run_task).take() {
            task.abort();
        }
        for io in self.entity.take_handlers() {
            io.close();
        }
        self.set_state(ConnectorState::Stopped);
        self.entity
            .call_stop_cb(None, &Error::TcpConnectorStopped, 0);
        info!(host = %self.describe_remote(), "TCP connector stopped");
        true
    }

    fn set_state(&self, next: ConnectorState) {
        let mut st = lock(&self.state);
        trace!(from = ?*st, to = ?next, "connector state change");
        *st = next;
    }

    fn describe_remote(&self) -> String {
        if self.remote_host.is_empty() {
            lock(&self.endpoints)
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "<no endpoints>".to_string())
        } else {
            format!("{}:{}", self.remote_host, self.remote_port)
        }
    }

    async fn run(self: Arc<Self>) {
        // an empty endpoint list means resolution is needed first
        let mut endpoints = lock(&self.endpoints).clone();
        if endpoints.is_empty() {
            self.set_state(ConnectorState::Resolving);
            match resolver::resolve_endpoints(&self.remote_host, self.remote_port).await {
                Ok(resolved) => {
                    debug!(host = %self.remote_host, count = resolved.len(), "resolved endpoints");
                    *lock(&self.endpoints) = resolved.clone();
                    endpoints = resolved;
                }
                Err(e) => {
                    error!(host = %self.remote_host, error = %e, "endpoint resolution failed");
                    self.entity.call_stop_cb(None, &e, 0);
                    self.stop();
                    return;
                }
            }
        }

        let mut ticks = interval(self.reconnect);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if !self.entity.is_started() {
                return;
            }
            self.set_state(ConnectorState::Connecting);
            match Self::connect_any(&endpoints).await {
                Ok((stream, peer)) => {
                    let io = TcpIo::new(stream, peer, self.notifier(), self.cfg.read_chunk_size);
                    self.entity.add_handler(io.clone());
                    self.set_state(ConnectorState::Connected);
                    info!(peer = %peer, "TCP connection established");
                    self.entity.call_io_ready_cb(&io, 1);

                    self.disconnected.notified().await;
                    if !self.entity.is_started() {
                        return;
                    }
                    self.set_state(ConnectorState::WaitingToReconnect);
                }
                Err(e) => {
                    warn!(remote = %self.describe_remote(), error = %e,
                          retry_in = ?self.reconnect, "connect attempt failed");
                    self.entity.call_stop_cb(None, &e, 0);
                    self.set_state(ConnectorState::WaitingToReconnect);
                }
            }
        }
    }

    /// Try each endpoint in order, returning the first established stream
    async fn connect_any(endpoints: &[SocketAddr]) -> Result<(TcpStream, SocketAddr)> {
        let mut last_err: Option<Error> = None;
        for ep in endpoints {
            match TcpStream::connect(ep).await {
                Ok(stream) => {
                    let peer = stream.peer_addr().map_err(Error::Io)?;
                    return Ok((stream, peer));
                }
                Err(e) => {
                    trace!(endpoint = %ep, error = %e, "endpoint connect failed");
                    last_err = Some(Error::Io(e));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::config("no endpoints to connect")))
    }

    fn notifier(&self) -> IoNotifier {
        let weak = self.self_ref.clone();
        Arc::new(move |err, io| {
            if let Some(connector) = weak.upgrade() {
                connector.notify_io(err, io);
            }
        })
    }

    /// The connection reported an error or shutdown request: close it,
    /// tell the application, and wake the reconnect driver.
    fn notify_io(&self, err: Error, io: Arc<TcpIo>) {
        io.close();
        if self.entity.remove_handler(&io).is_some() {
            debug!(peer = %io.remote_addr(), error = %err, "TCP connection lost");
            self.entity.call_stop_cb(Some(&io), &err, 0);
        }
        self.disconnected.notify_one();
    }
}

impl crate::handle::EntityHandle<TcpConnector> {
    /// Lifecycle phase of the referenced connector
    pub fn state(&self) -> Result<ConnectorState> {
        self.upgrade().map(|c| c.state()).ok_or(Error::HandleExpired)
    }
}

impl NetEntity for TcpConnector {
    type Io = TcpIo;

    fn start_entity(&self, io_ready: IoReadyCb<TcpIo>, stop_cb: Option<IoStopCb<TcpIo>>) -> bool {
        self.start(io_ready, stop_cb)
    }

    fn stop_entity(&self) -> bool {
        self.stop()
    }

    fn entity_started(&self) -> bool {
        self.is_started()
    }
}

impl SingleIo for TcpConnector {}
