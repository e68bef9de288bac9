//! # netplex - many TCP/UDP endpoints, one event loop
//!
//! An async networking library for hosting hundreds to thousands of
//! simultaneous TCP and UDP endpoints, hiding the awkward parts of
//! non-blocking socket programming: buffer lifetimes, read-completion
//! plumbing, reconnect logic, message framing, and safe handoff of
//! per-connection handles.
//!
//! ## Features
//!
//! - **Value-typed handles**: applications hold cheap, copyable weak
//!   handles; the library owns the sockets and tears them down safely
//! - **Pluggable TCP framing**: header-plus-callback, delimiter, or
//!   fixed-size message boundaries
//! - **Automatic reconnect**: connectors retry on a fixed interval until
//!   stopped, with no application involvement
//! - **Bounded write path**: one write in flight per connection, later
//!   sends queued FIFO with observable stats
//! - **Wait queue**: a closable MPMC FIFO for surfacing events to
//!   application threads, usable standalone
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use netplex::{Framing, Net, SharedBuf};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let net = Net::new();
//!     let connector = net.make_tcp_connector("127.0.0.1", 8000, Duration::from_secs(1));
//!     connector.start(
//!         Arc::new(|io, _count| {
//!             // connection ready: begin line-framed reads and say hello
//!             io.start_io(
//!                 Framing::Delimiter(b"\r\n".to_vec()),
//!                 Box::new(|msg, io, _peer| {
//!                     println!("received {} bytes", msg.len());
//!                     io.send(SharedBuf::from(&b"ack\r\n"[..]));
//!                     true
//!                 }),
//!             );
//!             io.send(SharedBuf::from(&b"hello\r\n"[..]));
//!         }),
//!         Arc::new(|_io, err, _count| {
//!             eprintln!("connection down: {err}");
//!         }),
//!     );
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------+
//! |   Net facade              |  factories, entity ownership
//! +---------------------------+
//! |   Entity layer            |  TcpAcceptor, TcpConnector, UdpIo
//! +---------------------------+
//! |   IO handler layer        |  TcpIo framing/write engine, IoCommon
//! +---------------------------+
//! |   Primitives              |  SharedBuf, WaitQueue, handles
//! +---------------------------+
//! ```
//!
//! All IO completions run on the tokio runtime the entities were started
//! on. `send` and `stop` may be called from any thread; everything else is
//! driven from the state-change and message-handler callbacks.

pub mod buffer;
pub mod config;
pub mod error;
pub mod io;
pub mod metrics;
pub mod queue;

#[cfg(feature = "tokio")]
pub mod delivery;
#[cfg(feature = "tokio")]
pub mod entity;
#[cfg(feature = "tokio")]
pub mod handle;
#[cfg(feature = "tokio")]
pub mod net;
#[cfg(feature = "tokio")]
pub mod resolver;

mod sync;

pub use buffer::{MutableBuf, SharedBuf};
pub use config::NetConfig;
pub use error::{Error, Result};
pub use io::output::OutputQueueStats;
pub use queue::{PushError, WaitQueue};

#[cfg(feature = "tokio")]
pub use delivery::{start_with_futures, start_with_wait_queue, IoFuturePair, IoStateChange};
#[cfg(feature = "tokio")]
pub use entity::{ConnectorState, TcpAcceptor, TcpConnector, UdpIo, UdpMsgHandler};
#[cfg(feature = "tokio")]
pub use handle::{EntityHandle, ErrCb, IoHandle, IoReadyCb, IoStopCb};
#[cfg(feature = "tokio")]
pub use io::tcp::{FrameFn, Framing, TcpIo, TcpMsgHandler};
#[cfg(feature = "tokio")]
pub use net::Net;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
