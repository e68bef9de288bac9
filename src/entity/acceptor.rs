//! TCP acceptor entity: listen-and-accept loop tracking live connections

use crate::config::NetConfig;
use crate::entity::common::EntityCommon;
use crate::error::Error;
use crate::handle::{IoReadyCb, IoStopCb, NetEntity};
use crate::io::tcp::{IoNotifier, TcpIo};
use crate::metrics;
use crate::sync::lock;

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Net entity that listens on a local endpoint and creates one [`TcpIo`]
/// per accepted connection.
///
/// Created through [`Net::make_tcp_acceptor`](crate::Net::make_tcp_acceptor)
/// and driven through an [`EntityHandle`](crate::EntityHandle). The handler
/// count reported to the state-change callbacks always equals the size of
/// the live-connection set after the insert or remove has taken effect.
pub struct TcpAcceptor {
    self_ref: Weak<TcpAcceptor>,
    entity: EntityCommon<TcpIo>,
    local_req: SocketAddr,
    reuse_addr: bool,
    cfg: NetConfig,
    local_addr: Mutex<Option<SocketAddr>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpAcceptor {
    pub(crate) fn new(local: SocketAddr, reuse_addr: bool, cfg: NetConfig) -> Arc<Self> {
        Arc::new_cyclic(|w| Self {
            self_ref: w.clone(),
            entity: EntityCommon::new(),
            local_req: local,
            reuse_addr,
            cfg,
            local_addr: Mutex::new(None),
            accept_task: Mutex::new(None),
        })
    }

    /// Local endpoint actually bound, available once `start` has succeeded.
    /// Useful when binding to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    pub fn is_started(&self) -> bool {
        self.entity.is_started()
    }

    /// Bind, listen, and begin accepting. Must be called within a tokio
    /// runtime. A bind failure is reported through the stop callback and
    /// leaves the entity stopped; `false` means already started.
    pub fn start(&self, io_ready: IoReadyCb<TcpIo>, stop_cb: Option<IoStopCb<TcpIo>>) -> bool {
        if !self.entity.start(io_ready, stop_cb) {
            return false;
        }
        metrics::global().entity_started();
        match self.bind_and_listen() {
            Ok(listener) => {
                let bound = listener.local_addr().ok();
                *lock(&self.local_addr) = bound;
                info!(addr = ?bound, "TCP acceptor listening");
                if let Some(me) = self.self_ref.upgrade() {
                    *lock(&self.accept_task) = Some(tokio::spawn(me.accept_loop(listener)));
                }
                true
            }
            Err(e) => {
                error!(addr = %self.local_req, error = %e, "TCP acceptor bind failed");
                let err = Error::Io(e);
                self.entity.call_stop_cb(None, &err, 0);
                self.entity.stop();
                true
            }
        }
    }

    /// Cancel the accept loop and close every live connection, firing the
    /// stop callback once per connection with [`Error::TcpAcceptorStopped`].
    pub fn stop(&self) -> bool {
        if !self.entity.stop() {
            return false;
        }
        if let Some(task) = lock(&self.accept_task).take() {
            task.abort();
        }
        let handlers = self.entity.take_handlers();
        let mut remaining = handlers.len();
        for io in handlers {
            io.close();
            remaining -= 1;
            self.entity
                .call_stop_cb(Some(&io), &Error::TcpAcceptorStopped, remaining);
        }
        info!(addr = ?self.local_addr(), "TCP acceptor stopped");
        true
    }

    fn bind_and_listen(&self) -> io::Result<TcpListener> {
        let socket = if self.local_req.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if self.reuse_addr {
            socket.set_reuseaddr(true)?;
        }
        socket.bind(self.local_req)?;
        socket.listen(self.cfg.accept_backlog)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let io = TcpIo::new(stream, peer, self.notifier(), self.cfg.read_chunk_size);
                    let count = self.entity.add_handler(io.clone());
                    debug!(peer = %peer, connections = count, "accepted TCP connection");
                    self.entity.call_io_ready_cb(&io, count);
                }
                Err(e) => {
                    if !self.entity.is_started() {
                        return;
                    }
                    error!(error = %e, "accept failed, stopping acceptor");
                    let err = Error::Io(e);
                    self.entity.call_stop_cb(None, &err, self.entity.handler_count());
                    self.stop();
                    return;
                }
            }
        }
    }

    fn notifier(&self) -> IoNotifier {
        let weak = self.self_ref.clone();
        Arc::new(move |err, io| {
            if let Some(acceptor) = weak.upgrade() {
                acceptor.notify_io(err, io);
            }
        })
    }

    /// A handler reported an error or a shutdown request: close it, drop it
    /// from the set, and tell the application.
    fn notify_io(&self, err: Error, io: Arc<TcpIo>) {
        io.close();
        if let Some(count) = self.entity.remove_handler(&io) {
            debug!(peer = %io.remote_addr(), connections = count, error = %err, "TCP connection closed");
            self.entity.call_stop_cb(Some(&io), &err, count);
        }
    }
}

impl crate::handle::EntityHandle<TcpAcceptor> {
    /// Local endpoint the referenced acceptor is bound to, once started
    pub fn local_addr(&self) -> crate::error::Result<Option<SocketAddr>> {
        self.upgrade()
            .map(|a| a.local_addr())
            .ok_or(Error::HandleExpired)
    }
}

impl NetEntity for TcpAcceptor {
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
