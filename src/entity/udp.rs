//! UDP endpoint: one object acting as both net entity and IO handler
//!
//! UDP has no connections, so the entity and its single IO handler collapse
//! into one type. A [`UdpIo`] binds (or opens unbound for send-only use),
//! runs one receive loop where every datagram is one message, and chains
//! sends exactly like the TCP write path but addressed per datagram.

use crate::buffer::SharedBuf;
use crate::config::NetConfig;
use crate::entity::common::EntityCommon;
use crate::error::{Error, Result};
use crate::handle::{ErrCb, IoBase, IoHandle, IoReadyCb, IoStopCb, NetEntity, SingleIo};
use crate::io::common::IoCommon;
use crate::io::output::{OutputQueueElement, OutputQueueStats};
use crate::metrics;
use crate::sync::lock;

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, Weak};
use tokio::net::UdpSocket;
use tokio::runtime::Handle as RtHandle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Application callback receiving each datagram, a weak handle for replies,
/// and the sender's endpoint. Returning `false` tears the entity down with
/// [`Error::MessageHandlerTerminated`].
pub type UdpMsgHandler = Box<dyn FnMut(&[u8], IoHandle<UdpIo>, SocketAddr) -> bool + Send>;

pub(crate) enum UdpMode {
    /// Bind to `local`, or open unbound (OS-assigned port) for send-only use
    Unicast { local: Option<SocketAddr> },
    /// Reuse-address bind on `port` joined to the multicast `group`
    MulticastV4 { group: Ipv4Addr, port: u16 },
}

/// UDP net entity and IO handler in one
pub struct UdpIo {
    self_ref: Weak<UdpIo>,
    entity: EntityCommon<UdpIo>,
    common: IoCommon,
    mode: UdpMode,
    cfg: NetConfig,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    default_dest: Mutex<Option<SocketAddr>>,
    err_cb: Mutex<Option<ErrCb<UdpIo>>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    rt: Mutex<Option<RtHandle>>,
}

impl UdpIo {
    pub(crate) fn new(mode: UdpMode, cfg: NetConfig) -> Arc<Self> {
        Arc::new_cyclic(|w| Self {
            self_ref: w.clone(),
            entity: EntityCommon::new(),
            common: IoCommon::new(),
            mode,
            cfg,
            socket: Mutex::new(None),
            local_addr: Mutex::new(None),
            default_dest: Mutex::new(None),
            err_cb: Mutex::new(None),
            recv_task: Mutex::new(None),
            rt: Mutex::new(None),
        })
    }

    /// Local endpoint actually bound, available once `start` has succeeded
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    pub fn is_started(&self) -> bool {
        self.entity.is_started()
    }

    pub fn is_io_started(&self) -> bool {
        self.common.is_io_started()
    }

    pub fn output_queue_stats(&self) -> OutputQueueStats {
        self.common.output_queue_stats()
    }

    /// Bind the socket and report readiness through `io_ready`. Must be
    /// called within a tokio runtime. A bind failure is reported through
    /// the error and stop callbacks and leaves the entity stopped; `false`
    /// means already started.
    pub fn start(&self, io_ready: IoReadyCb<UdpIo>, stop_cb: Option<IoStopCb<UdpIo>>) -> bool {
        if !self.entity.start(io_ready, stop_cb) {
            return false;
        }
        metrics::global().entity_started();
        match self.bind_socket() {
            Ok(socket) => {
                let socket = Arc::new(socket);
                let bound = socket.local_addr().ok();
                *lock(&self.socket) = Some(socket);
                *lock(&self.local_addr) = bound;
                *lock(&self.rt) = Some(RtHandle::current());
                metrics::global().handler_created();
                info!(addr = ?bound, "UDP entity ready");
                if let Some(me) = self.self_ref.upgrade() {
                    self.entity.call_io_ready_cb(&me, 1);
                }
                true
            }
            Err(e) => {
                error!(error = %e, "UDP bind failed");
                let err = Error::Io(e);
                self.err_notify(&err);
                self.entity.call_stop_cb(None, &err, 0);
                self.entity.stop();
                true
            }
        }
    }

    /// Like [`start`](Self::start), with an extra callback for non-fatal
    /// errors (send failures, datagram-level problems).
    pub fn start_with_err_cb(
        &self,
        io_ready: IoReadyCb<UdpIo>,
        stop_cb: Option<IoStopCb<UdpIo>>,
        err_cb: ErrCb<UdpIo>,
    ) -> bool {
        *lock(&self.err_cb) = Some(err_cb);
        self.start(io_ready, stop_cb)
    }

    /// Begin the receive loop: each datagram up to `max_size` bytes is one
    /// message. `default_dest`, when given, becomes the target for `send`
    /// calls without an explicit endpoint. May succeed once; later calls
    /// return `false`.
    pub fn start_io(
        &self,
        max_size: usize,
        handler: UdpMsgHandler,
        default_dest: Option<SocketAddr>,
    ) -> bool {
        if !self.common.set_io_started() {
            return false;
        }
        if default_dest.is_some() {
            *lock(&self.default_dest) = default_dest;
        }
        let Some(socket) = lock(&self.socket).clone() else {
            // start has not succeeded yet; nothing to read from
            self.common.stop();
            return false;
        };
        let Some(me) = self.self_ref.upgrade() else {
            return false;
        };
        let size = if max_size == 0 {
            self.cfg.default_max_datagram
        } else {
            max_size
        };
        let rt = lock(&self.rt).clone();
        if let Some(rt) = rt {
            *lock(&self.recv_task) = Some(rt.spawn(me.recv_loop(socket, size, handler)));
            true
        } else {
            false
        }
    }

    /// Mark IO started without a receive loop, for send-only endpoints
    pub fn start_io_send_only(&self, default_dest: Option<SocketAddr>) -> bool {
        if !self.common.set_io_started() {
            return false;
        }
        if default_dest.is_some() {
            *lock(&self.default_dest) = default_dest;
        }
        true
    }

    /// Queue a datagram to the default destination
    pub fn send(&self, buf: SharedBuf) -> bool {
        self.send_to(buf, None)
    }

    /// Queue a datagram to `dest`, or the default destination when `None`.
    /// A send with no resolvable destination is rejected locally (no
    /// callback fires).
    pub fn send_to(&self, buf: SharedBuf, dest: Option<SocketAddr>) -> bool {
        if !self.common.is_io_started() {
            return false;
        }
        let resolved = dest.or(*lock(&self.default_dest));
        if resolved.is_none() {
            warn!("UDP send rejected: no destination endpoint");
            return false;
        }
        let socket = lock(&self.socket).clone();
        let rt = lock(&self.rt).clone();
        let (Some(socket), Some(rt), Some(me)) = (socket, rt, self.self_ref.upgrade()) else {
            return false;
        };
        if !self.common.start_write_setup(buf.clone(), resolved) {
            // queued behind the in-flight send, or raced with a stop
            return true;
        }
        rt.spawn(me.send_chain(socket, OutputQueueElement::new(buf, resolved)));
        true
    }

    /// Stop through the IO-handler path; same teardown as
    /// [`stop`](Self::stop) but reported as [`Error::UdpIoHandlerStopped`].
    pub fn stop_io(&self) -> bool {
        self.shutdown(Error::UdpIoHandlerStopped)
    }

    /// Close the socket and stop the entity, firing the stop callback with
    /// [`Error::UdpEntityStopped`].
    pub fn stop(&self) -> bool {
        self.shutdown(Error::UdpEntityStopped)
    }

    fn shutdown(&self, reason: Error) -> bool {
        if !self.entity.stop() {
            return false;
        }
        self.common.stop();
        if let Some(task) = lock(&self.recv_task).take() {
            task.abort();
        }
        if lock(&self.socket).take().is_some() {
            metrics::global().handler_closed();
        }
        self.err_notify(&reason);
        let me = self.self_ref.upgrade();
        self.entity.call_stop_cb(me.as_ref(), &reason, 0);
        info!(addr = ?self.local_addr(), reason = %reason, "UDP entity stopped");
        true
    }

    fn err_notify(&self, err: &Error) {
        let cb = lock(&self.err_cb).clone();
        if let Some(cb) = cb {
            cb(IoHandle::new(self.self_ref.clone()), err);
        }
    }

    fn bind_socket(&self) -> io::Result<UdpSocket> {
        let std_socket = match &self.mode {
            UdpMode::Unicast { local: Some(addr) } => std::net::UdpSocket::bind(addr)?,
            UdpMode::Unicast { local: None } => {
                // send-only: OS-assigned port on the wildcard address
                std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?
            }
            UdpMode::MulticastV4 { group, port } => {
                // receivers share the port, so reuse-address is required
                let socket = socket2::Socket::new(
                    socket2::Domain::IPV4,
                    socket2::Type::DGRAM,
                    Some(socket2::Protocol::UDP),
                )?;
                socket.set_reuse_address(true)?;
                let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, *port).into();
                socket.bind(&bind_addr.into())?;
                let std_socket: std::net::UdpSocket = socket.into();
                std_socket.join_multicast_v4(group, &Ipv4Addr::UNSPECIFIED)?;
                std_socket
            }
        };
        std_socket.set_nonblocking(true)?;
        UdpSocket::from_std(std_socket)
    }

    async fn recv_loop(self: Arc<Self>, socket: Arc<UdpSocket>, max_size: usize, mut handler: UdpMsgHandler) {
        let handle = IoHandle::new(self.self_ref.clone());
        let mut buf = vec![0u8; max_size];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((n, sender)) => {
                    metrics::global().message_delivered(n);
                    if !handler(&buf[..n], handle.clone(), sender) {
                        self.shutdown(Error::MessageHandlerTerminated);
                        return;
                    }
                }
                Err(e) => {
                    if !self.entity.is_started() {
                        return;
                    }
                    debug!(error = %e, "UDP receive failed, stopping entity");
                    self.shutdown(Error::Io(e));
                    return;
                }
            }
        }
    }

    async fn send_chain(self: Arc<Self>, socket: Arc<UdpSocket>, first: OutputQueueElement) {
        let mut elem = first;
        loop {
            let dest = match elem.dest.or(*lock(&self.default_dest)) {
                Some(d) => d,
                None => {
                    trace!("queued UDP send dropped: no destination");
                    match self.common.next_queued() {
                        Some(next) => {
                            elem = next;
                            continue;
                        }
                        None => return,
                    }
                }
            };
            match socket.send_to(&elem.buf, dest).await {
                Ok(n) => metrics::global().bytes_sent(n),
                Err(e) => {
                    debug!(dest = %dest, error = %e, "UDP send failed, stopping entity");
                    self.shutdown(Error::Io(e));
                    return;
                }
            }
            match self.common.next_queued() {
                Some(next) => elem = next,
                None => return,
            }
        }
    }
}

impl IoBase for UdpIo {
    fn io_started(&self) -> bool {
        self.is_io_started()
    }

    fn queue_stats(&self) -> OutputQueueStats {
        self.output_queue_stats()
    }

    fn halt_io(&self) -> bool {
        self.stop_io()
    }
}

impl NetEntity for UdpIo {
    type Io = UdpIo;

    fn start_entity(&self, io_ready: IoReadyCb<UdpIo>, stop_cb: Option<IoStopCb<UdpIo>>) -> bool {
        self.start(io_ready, stop_cb)
    }

    fn stop_entity(&self) -> bool {
        self.stop()
    }

    fn entity_started(&self) -> bool {
        self.is_started()
    }
}

impl SingleIo for UdpIo {}

impl crate::handle::EntityHandle<UdpIo> {
    /// Start with the UDP-only non-fatal error callback installed
    pub fn start_with_err_cb(
        &self,
        io_ready: IoReadyCb<UdpIo>,
        stop_cb: IoStopCb<UdpIo>,
        err_cb: ErrCb<UdpIo>,
    ) -> bool {
        match self.upgrade() {
            Some(u) => u.start_with_err_cb(io_ready, Some(stop_cb), err_cb),
            None => false,
        }
    }

    /// Local endpoint the referenced entity is bound to, once started
    pub fn local_addr(&self) -> Result<Option<SocketAddr>> {
        self.upgrade()
            .map(|u| u.local_addr())
            .ok_or(Error::HandleExpired)
    }
}

impl IoHandle<UdpIo> {
    /// Begin the receive loop on the referenced entity; see
    /// [`UdpIo::start_io`]
    pub fn start_io(
        &self,
        max_size: usize,
        handler: UdpMsgHandler,
        default_dest: Option<SocketAddr>,
    ) -> bool {
        match self.upgrade() {
            Some(u) => u.start_io(max_size, handler, default_dest),
            None => false,
        }
    }

    /// Mark the referenced entity send-only; see
    /// [`UdpIo::start_io_send_only`]
    pub fn start_io_send_only(&self, default_dest: Option<SocketAddr>) -> bool {
        match self.upgrade() {
            Some(u) => u.start_io_send_only(default_dest),
            None => false,
        }
    }

    /// Queue a datagram to the default destination
    pub fn send(&self, buf: SharedBuf) -> bool {
        match self.upgrade() {
            Some(u) => u.send(buf),
            None => false,
        }
    }

    /// Queue a datagram to an explicit destination
    pub fn send_to(&self, buf: SharedBuf, dest: SocketAddr) -> bool {
        match self.upgrade() {
            Some(u) => u.send_to(buf, Some(dest)),
            None => false,
        }
    }

    /// Local endpoint of the referenced entity
    pub fn local_addr(&self) -> Result<Option<SocketAddr>> {
        self.upgrade()
            .map(|u| u.local_addr())
            .ok_or(Error::HandleExpired)
    }
}
