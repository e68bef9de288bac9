//! TCP IO handler: framed read loop and chained write path
//!
//! A [`TcpIo`] owns exactly one connected socket. It is created by an
//! acceptor (one per accepted connection) or a connector (exactly one), and
//! destroyed when the owning entity drops its reference after a shutdown
//! notification. Applications only ever see it through an
//! [`IoHandle<TcpIo>`].
//!
//! The read side runs as one spawned task holding a strong self-reference,
//! so the loop survives the application dropping every handle. Errors and
//! message-handler rejections are reported to the owning entity through the
//! notifier callback; the entity decides to close and remove the handler.
//! Write-side errors are deliberately swallowed: the concurrent read will
//! observe the closure, and the read path is the single error channel.

use crate::buffer::SharedBuf;
use crate::error::Error;
use crate::handle::{IoBase, IoHandle};
use crate::io::common::IoCommon;
use crate::io::output::{OutputQueueElement, OutputQueueStats};
use crate::metrics;
use crate::sync::lock;

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle as RtHandle;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Framing callback for header-framed connections: inspects the bytes
/// accumulated so far and returns how many *additional* bytes are needed.
/// Returning 0 means the message is complete and is delivered.
pub type FrameFn = Box<dyn FnMut(&mut [u8]) -> usize + Send>;

/// Application callback receiving each framed message, a weak handle for
/// replies, and the remote endpoint. Returning `false` tears the connection
/// down with [`Error::MessageHandlerTerminated`].
pub type TcpMsgHandler = Box<dyn FnMut(&[u8], IoHandle<TcpIo>, SocketAddr) -> bool + Send>;

/// Callback a `TcpIo` uses to report errors and shutdown requests to its
/// owning entity, together with a strong reference to itself.
pub(crate) type IoNotifier = Arc<dyn Fn(Error, Arc<TcpIo>) + Send + Sync>;

/// Policy deciding where one message ends in the TCP byte stream
pub enum Framing {
    /// Read a fixed-size header, then ask `frame` for the remaining byte
    /// count until it returns 0; the full accumulated message is delivered.
    HeaderAndBody { header_size: usize, frame: FrameFn },
    /// Read until the literal byte sequence appears; the message including
    /// the delimiter is delivered. Bytes past the delimiter stay buffered
    /// for the next match.
    Delimiter(Vec<u8>),
    /// Every message is exactly this many bytes
    FixedSize(usize),
}

fn null_frame(_: &mut [u8]) -> usize {
    0
}

/// IO handler for one TCP connection
pub struct TcpIo {
    self_ref: Weak<TcpIo>,
    common: IoCommon,
    remote: SocketAddr,
    notifier: IoNotifier,
    read_half: Mutex<Option<OwnedReadHalf>>,
    write_half: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    read_chunk: usize,
    rt: RtHandle,
}

impl TcpIo {
    pub(crate) fn new(
        stream: TcpStream,
        remote: SocketAddr,
        notifier: IoNotifier,
        read_chunk: usize,
    ) -> Arc<Self> {
        let (rd, wr) = stream.into_split();
        let io = Arc::new_cyclic(|w| Self {
            self_ref: w.clone(),
            common: IoCommon::new(),
            remote,
            notifier,
            read_half: Mutex::new(Some(rd)),
            write_half: Arc::new(tokio::sync::Mutex::new(wr)),
            read_task: Mutex::new(None),
            read_chunk,
            rt: RtHandle::current(),
        });
        metrics::global().handler_created();
        io
    }

    /// Remote endpoint of the connection
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn is_io_started(&self) -> bool {
        self.common.is_io_started()
    }

    pub fn output_queue_stats(&self) -> OutputQueueStats {
        self.common.output_queue_stats()
    }

    /// Begin reading with the chosen framing. May succeed exactly once per
    /// handler; later calls (and invalid framing parameters) return `false`.
    pub fn start_io(&self, framing: Framing, handler: TcpMsgHandler) -> bool {
        match &framing {
            Framing::HeaderAndBody { header_size: 0, .. } => {
                warn!(remote = %self.remote, "start_io rejected: zero header size");
                return false;
            }
            Framing::Delimiter(d) if d.is_empty() => {
                warn!(remote = %self.remote, "start_io rejected: empty delimiter");
                return false;
            }
            Framing::FixedSize(0) => {
                warn!(remote = %self.remote, "start_io rejected: zero read size");
                return false;
            }
            _ => {}
        }
        if !self.common.set_io_started() {
            return false;
        }
        let Some(rd) = lock(&self.read_half).take() else {
            // socket already closed by the entity
            self.common.stop();
            return false;
        };
        let Some(me) = self.self_ref.upgrade() else {
            return false;
        };
        let task = match framing {
            Framing::HeaderAndBody { header_size, frame } => self
                .rt
                .spawn(me.read_loop_framed(rd, header_size, frame, handler)),
            Framing::Delimiter(delim) => self.rt.spawn(me.read_loop_delimited(rd, delim, handler)),
            Framing::FixedSize(size) => self
                .rt
                .spawn(me.read_loop_framed(rd, size, Box::new(null_frame), handler)),
        };
        *lock(&self.read_task) = Some(task);
        true
    }

    /// Begin a discarding read loop: one byte at a time, nothing delivered.
    /// Keeps the connection drained when only the send side matters.
    pub fn start_io_discard(&self) -> bool {
        self.start_io(Framing::FixedSize(1), Box::new(|_, _, _| true))
    }

    /// Request a graceful shutdown; the owning entity closes the socket and
    /// fires its stop callback with [`Error::TcpIoHandlerStopped`].
    pub fn stop_io(&self) -> bool {
        if !self.common.is_io_started() {
            return false;
        }
        self.notify(Error::TcpIoHandlerStopped);
        true
    }

    /// Queue `buf` for transmission. Callable from any thread; returns
    /// `false` when the handler is already stopped (the buffer is dropped).
    pub fn send(&self, buf: SharedBuf) -> bool {
        if !self.common.is_io_started() {
            return false;
        }
        if !self.common.start_write_setup(buf.clone(), None) {
            // queued behind the in-flight write, or raced with a stop
            return true;
        }
        if let Some(me) = self.self_ref.upgrade() {
            self.rt.spawn(me.write_chain(buf));
        }
        true
    }

    /// Close the socket and stop both loops. Only the owning entity calls
    /// this; all error reporting has already happened through the notifier.
    pub(crate) fn close(&self) {
        if !self.common.stop() {
            return;
        }
        if let Some(task) = lock(&self.read_task).take() {
            task.abort();
        }
        // read half may still be parked here if start_io never ran
        drop(lock(&self.read_half).take());
        let wr = self.write_half.clone();
        self.rt.spawn(async move {
            let _ = wr.lock().await.shutdown().await;
        });
        metrics::global().handler_closed();
        trace!(remote = %self.remote, "TCP IO handler closed");
    }

    fn notify(&self, err: Error) {
        if let Some(me) = self.self_ref.upgrade() {
            (self.notifier)(err, me);
        }
    }

    async fn read_loop_framed(
        self: Arc<Self>,
        mut rd: OwnedReadHalf,
        header_size: usize,
        mut frame: FrameFn,
        mut handler: TcpMsgHandler,
    ) {
        let handle = IoHandle::new(self.self_ref.clone());
        let mut msg = vec![0u8; header_size];
        let mut filled = 0usize;
        loop {
            if let Err(e) = rd.read_exact(&mut msg[filled..]).await {
                self.notify(Error::Io(e));
                return;
            }
            let additional = frame(&mut msg);
            if additional == 0 {
                metrics::global().message_delivered(msg.len());
                if !handler(&msg, handle.clone(), self.remote) {
                    self.notify(Error::MessageHandlerTerminated);
                    return;
                }
                msg.truncate(header_size);
                filled = 0;
            } else {
                filled = msg.len();
                msg.resize(filled + additional, 0);
            }
        }
    }

    async fn read_loop_delimited(
        self: Arc<Self>,
        mut rd: OwnedReadHalf,
        delim: Vec<u8>,
        mut handler: TcpMsgHandler,
    ) {
        let handle = IoHandle::new(self.self_ref.clone());
        let mut acc: Vec<u8> = Vec::with_capacity(self.read_chunk);
        let mut chunk = vec![0u8; self.read_chunk];
        loop {
            // deliver every complete message already buffered; bytes past
            // the delimiter stay for the next match
            while let Some(pos) = find_subsequence(&acc, &delim) {
                let end = pos + delim.len();
                metrics::global().message_delivered(end);
                if !handler(&acc[..end], handle.clone(), self.remote) {
                    self.notify(Error::MessageHandlerTerminated);
                    return;
                }
                acc.drain(..end);
            }
            match rd.read(&mut chunk).await {
                Ok(0) => {
                    self.notify(Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof)));
                    return;
                }
                Ok(n) => acc.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    self.notify(Error::Io(e));
                    return;
                }
            }
        }
    }

    async fn write_chain(self: Arc<Self>, first: SharedBuf) {
        let mut elem = OutputQueueElement::new(first, None);
        loop {
            let result = {
                let mut wr = self.write_half.lock().await;
                wr.write_all(&elem.buf).await
            };
            if let Err(e) = result {
                trace!(remote = %self.remote, error = %e, "write failed, read side reports the closure");
                return;
            }
            metrics::global().bytes_sent(elem.buf.len());
            match self.common.next_queued() {
                Some(next) => elem = next,
                None => return,
            }
        }
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

impl IoBase for TcpIo {
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

impl IoHandle<TcpIo> {
    /// Begin reading on the referenced handler; see [`TcpIo::start_io`]
    pub fn start_io(&self, framing: Framing, handler: TcpMsgHandler) -> bool {
        match self.upgrade() {
            Some(h) => h.start_io(framing, handler),
            None => false,
        }
    }

    /// Begin a discarding read loop; see [`TcpIo::start_io_discard`]
    pub fn start_io_discard(&self) -> bool {
        match self.upgrade() {
            Some(h) => h.start_io_discard(),
            None => false,
        }
    }

    /// Queue `buf` for transmission on the referenced handler
    pub fn send(&self, buf: SharedBuf) -> bool {
        match self.upgrade() {
            Some(h) => h.send(buf),
            None => false,
        }
    }

    /// Remote endpoint of the referenced connection
    pub fn remote_addr(&self) -> crate::error::Result<SocketAddr> {
        self.upgrade()
            .map(|h| h.remote_addr())
            .ok_or(Error::HandleExpired)
    }
}
