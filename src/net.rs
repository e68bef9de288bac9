//! Application facade owning the net entities
//!
//! Handles are weak, so something must hold the strong references: a
//! [`Net`] value owns every entity it creates and releases them on
//! [`remove`](Net::remove_tcp_acceptor) or drop. Factory methods hand back
//! [`EntityHandle`]s ready for `start`.

use crate::config::NetConfig;
use crate::entity::acceptor::TcpAcceptor;
use crate::entity::connector::TcpConnector;
use crate::entity::udp::{UdpIo, UdpMode};
use crate::error::Result;
use crate::handle::EntityHandle;
use crate::sync::lock;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Factory and owner of net entities
#[derive(Default)]
pub struct Net {
    cfg: NetConfig,
    acceptors: Mutex<Vec<Arc<TcpAcceptor>>>,
    connectors: Mutex<Vec<Arc<TcpConnector>>>,
    udp_entities: Mutex<Vec<Arc<UdpIo>>>,
}

impl Net {
    /// Create a facade with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a facade with a custom configuration
    pub fn with_config(cfg: NetConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            ..Self::default()
        })
    }

    /// Create a TCP acceptor listening on `local` once started
    pub fn make_tcp_acceptor(&self, local: SocketAddr, reuse_addr: bool) -> EntityHandle<TcpAcceptor> {
        let acceptor = TcpAcceptor::new(local, reuse_addr, self.cfg.clone());
        let handle = EntityHandle::new(Arc::downgrade(&acceptor));
        lock(&self.acceptors).push(acceptor);
        debug!(addr = %local, "created TCP acceptor");
        handle
    }

    /// Create a TCP connector that resolves `host:port` at start and
    /// reconnects every `reconnect` after a loss
    pub fn make_tcp_connector(
        &self,
        host: &str,
        port: u16,
        reconnect: Duration,
    ) -> EntityHandle<TcpConnector> {
        let connector = TcpConnector::with_host(host, port, reconnect, self.cfg.clone());
        let handle = EntityHandle::new(Arc::downgrade(&connector));
        lock(&self.connectors).push(connector);
        debug!(host, port, "created TCP connector");
        handle
    }

    /// Create a TCP connector over an already-resolved endpoint list,
    /// tried in order on every attempt
    pub fn make_tcp_connector_with_endpoints(
        &self,
        endpoints: Vec<SocketAddr>,
        reconnect: Duration,
    ) -> EntityHandle<TcpConnector> {
        let connector = TcpConnector::with_endpoints(endpoints, reconnect, self.cfg.clone());
        let handle = EntityHandle::new(Arc::downgrade(&connector));
        lock(&self.connectors).push(connector);
        handle
    }

    /// Create a unicast UDP entity. `local` of `None` opens the socket on
    /// an OS-assigned port, typically for send-only use.
    pub fn make_udp_unicast(&self, local: Option<SocketAddr>) -> EntityHandle<UdpIo> {
        let udp = UdpIo::new(UdpMode::Unicast { local }, self.cfg.clone());
        let handle = EntityHandle::new(Arc::downgrade(&udp));
        lock(&self.udp_entities).push(udp);
        debug!(addr = ?local, "created UDP unicast entity");
        handle
    }

    /// Create a UDP entity that joins `group` on `port` with a
    /// reuse-address bind, so several receivers can share the group
    pub fn make_udp_multicast_receiver(&self, group: Ipv4Addr, port: u16) -> EntityHandle<UdpIo> {
        let udp = UdpIo::new(UdpMode::MulticastV4 { group, port }, self.cfg.clone());
        let handle = EntityHandle::new(Arc::downgrade(&udp));
        lock(&self.udp_entities).push(udp);
        debug!(group = %group, port, "created UDP multicast receiver");
        handle
    }

    /// Stop and release an acceptor; `true` if it was owned here
    pub fn remove_tcp_acceptor(&self, handle: &EntityHandle<TcpAcceptor>) -> bool {
        match handle.upgrade() {
            Some(target) => {
                target.stop();
                let mut owned = lock(&self.acceptors);
                let before = owned.len();
                owned.retain(|a| !Arc::ptr_eq(a, &target));
                owned.len() != before
            }
            None => false,
        }
    }

    /// Stop and release a connector; `true` if it was owned here
    pub fn remove_tcp_connector(&self, handle: &EntityHandle<TcpConnector>) -> bool {
        match handle.upgrade() {
            Some(target) => {
                target.stop();
                let mut owned = lock(&self.connectors);
                let before = owned.len();
                owned.retain(|c| !Arc::ptr_eq(c, &target));
                owned.len() != before
            }
            None => false,
        }
    }

    /// Stop and release a UDP entity; `true` if it was owned here
    pub fn remove_udp(&self, handle: &EntityHandle<UdpIo>) -> bool {
        match handle.upgrade() {
            Some(target) => {
                target.stop();
                let mut owned = lock(&self.udp_entities);
                let before = owned.len();
                owned.retain(|u| !Arc::ptr_eq(u, &target));
                owned.len() != before
            }
            None => false,
        }
    }

    /// Number of entities currently owned
    pub fn entity_count(&self) -> usize {
        lock(&self.acceptors).len() + lock(&self.connectors).len() + lock(&self.udp_entities).len()
    }

    /// Stop every owned entity; ownership is retained so handles stay valid
    pub fn stop_all(&self) {
        for a in lock(&self.acceptors).iter() {
            a.stop();
        }
        for c in lock(&self.connectors).iter() {
            c.stop();
        }
        for u in lock(&self.udp_entities).iter() {
            u.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_and_remove() {
        let net = Net::new();
        let acc = net.make_tcp_acceptor("127.0.0.1:0".parse().expect("addr"), false);
        let conn = net.make_tcp_connector("127.0.0.1", 7000, Duration::from_secs(1));
        assert_eq!(net.entity_count(), 2);
        assert!(acc.is_valid());

        assert!(net.remove_tcp_acceptor(&acc));
        assert!(!acc.is_valid());
        assert!(!net.remove_tcp_acceptor(&acc));
        assert_eq!(net.entity_count(), 1);

        assert!(net.remove_tcp_connector(&conn));
        assert_eq!(net.entity_count(), 0);
    }

    #[test]
    fn test_multicast_factory() {
        let net = Net::new();
        let receiver = net.make_udp_multicast_receiver("239.255.0.1".parse().expect("group"), 5000);
        assert!(receiver.is_valid());
        assert_eq!(receiver.is_started().expect("live handle"), false);
        assert!(net.remove_udp(&receiver));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Net::with_config(NetConfig::new().read_chunk_size(0)).is_err());
    }

    #[test]
    fn test_handles_expire_on_drop() {
        let handle = {
            let net = Net::new();
            net.make_udp_unicast(None)
        };
        assert!(!handle.is_valid());
        assert!(!handle.stop());
        assert!(handle.is_started().is_err());
    }
}
