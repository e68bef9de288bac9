//! IO handler layer: per-connection read/write engines and their shared
//! state

pub(crate) mod common;
pub mod output;
#[cfg(feature = "tokio")]
pub mod tcp;

pub use output::OutputQueueStats;
#[cfg(feature = "tokio")]
pub use tcp::{FrameFn, Framing, TcpIo, TcpMsgHandler};
