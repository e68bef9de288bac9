//! Net entity layer: socket-role state machines (acceptor, connector, UDP)

pub mod acceptor;
pub(crate) mod common;
pub mod connector;
pub mod udp;

pub use acceptor::TcpAcceptor;
pub use connector::{ConnectorState, TcpConnector};
pub use udp::{UdpIo, UdpMsgHandler};
