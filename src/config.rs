//! Library-wide tuning knobs

use crate::error::{Error, Result};

/// Configuration applied to every entity a [`Net`](crate::Net) facade
/// creates.
///
/// Per-entity parameters (endpoints, reconnect interval, framing, datagram
/// size) are passed at the factory or `start_io` call; this struct carries
/// only the knobs that are sensible library-wide.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Read granularity for delimiter-framed TCP connections
    pub read_chunk_size: usize,
    /// Listen backlog for TCP acceptors
    pub accept_backlog: u32,
    /// Receive buffer size used when UDP `start_io` is given a zero max size
    pub default_max_datagram: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 1024,
            accept_backlog: 1024,
            default_max_datagram: 1500,
        }
    }
}

impl NetConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delimiter-mode read granularity
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Set the TCP listen backlog
    pub fn accept_backlog(mut self, backlog: u32) -> Self {
        self.accept_backlog = backlog;
        self
    }

    /// Set the fallback UDP receive size
    pub fn default_max_datagram(mut self, size: usize) -> Self {
        self.default_max_datagram = size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.read_chunk_size == 0 {
            return Err(Error::config("read chunk size must be greater than 0"));
        }
        if self.accept_backlog == 0 {
            return Err(Error::config("accept backlog must be greater than 0"));
        }
        if self.default_max_datagram == 0 {
            return Err(Error::config("default max datagram must be greater than 0"));
        }
        Ok(())
    }
}
