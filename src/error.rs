//! Error types for net entity and IO handler operations

use std::io;
use thiserror::Error;

/// Result type for netplex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced through entity state-change callbacks or returned from
/// handle operations.
///
/// The `*Stopped` variants are graceful-shutdown codes: they report which
/// lifecycle path tore an IO handler or entity down, and carry no OS error.
/// Transport-level failures pass through as [`Error::Io`].
#[derive(Error, Debug)]
pub enum Error {
    /// OS-level socket or resolver errors, passed through unchanged
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A handle operation was attempted after the referent was destroyed
    #[error("weak handle expired")]
    HandleExpired,

    /// The application message handler returned `false`
    #[error("message handler requested shutdown")]
    MessageHandlerTerminated,

    /// A TCP IO handler was stopped through `stop_io`
    #[error("TCP IO handler stopped")]
    TcpIoHandlerStopped,

    /// A UDP IO handler was stopped through `stop_io`
    #[error("UDP IO handler stopped")]
    UdpIoHandlerStopped,

    /// A UDP entity was stopped through `stop`
    #[error("UDP entity stopped")]
    UdpEntityStopped,

    /// A TCP acceptor was stopped, closing its live connections
    #[error("TCP acceptor stopped")]
    TcpAcceptorStopped,

    /// A TCP connector was stopped through `stop`
    #[error("TCP connector stopped")]
    TcpConnectorStopped,

    /// Hostname resolution produced no usable endpoints
    #[error("could not resolve {host}:{port}")]
    Resolve { host: String, port: u16 },

    /// Invalid configuration or factory arguments
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Create a resolution error
    pub fn resolve(host: impl Into<String>, port: u16) -> Self {
        Error::Resolve {
            host: host.into(),
            port,
        }
    }

    /// Check whether this is a graceful lifecycle code rather than a failure
    pub fn is_stop_code(&self) -> bool {
        matches!(
            self,
            Error::TcpIoHandlerStopped
                | Error::UdpIoHandlerStopped
                | Error::UdpEntityStopped
                | Error::TcpAcceptorStopped
                | Error::TcpConnectorStopped
        )
    }

    /// Check whether this error carries an OS-level error code
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Check whether this error indicates the peer went away
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_code_predicate() {
        assert!(Error::TcpConnectorStopped.is_stop_code());
        assert!(Error::UdpEntityStopped.is_stop_code());
        assert!(!Error::HandleExpired.is_stop_code());
        assert!(!Error::MessageHandlerTerminated.is_stop_code());
    }

    #[test]
    fn test_disconnect_predicate() {
        let reset = Error::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_disconnect());
        assert!(reset.is_io());
        assert!(!Error::TcpAcceptorStopped.is_disconnect());
    }

    #[test]
    fn test_config_display() {
        let e = Error::config("zero read size");
        assert_eq!(e.to_string(), "configuration error: zero read size");
    }
}
