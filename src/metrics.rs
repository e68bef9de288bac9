//! Process-wide counters for entities, handlers, and traffic
//!
//! Plain atomics, no exporter. Read them through [`global`] and
//! [`GlobalMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::LazyLock;

/// Global metrics collector
#[derive(Debug, Default)]
pub struct GlobalMetrics {
    /// Entities started over the process lifetime
    pub entities_started: AtomicU64,
    /// IO handlers created
    pub handlers_created: AtomicU64,
    /// IO handlers closed
    pub handlers_closed: AtomicU64,
    /// Currently live IO handlers
    pub active_handlers: AtomicUsize,
    /// Messages delivered to application handlers
    pub messages_delivered: AtomicU64,
    /// Payload bytes written to sockets
    pub total_bytes_sent: AtomicU64,
    /// Payload bytes delivered to application handlers
    pub total_bytes_received: AtomicU64,
}

impl GlobalMetrics {
    pub fn entity_started(&self) {
        self.entities_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_created(&self) {
        self.handlers_created.fetch_add(1, Ordering::Relaxed);
        self.active_handlers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_closed(&self) {
        self.handlers_closed.fetch_add(1, Ordering::Relaxed);
        self.active_handlers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_delivered(&self, bytes: usize) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self, bytes: usize) {
        self.total_bytes_sent
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entities_started: self.entities_started.load(Ordering::Relaxed),
            handlers_created: self.handlers_created.load(Ordering::Relaxed),
            handlers_closed: self.handlers_closed.load(Ordering::Relaxed),
            active_handlers: self.active_handlers.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            total_bytes_sent: self.total_bytes_sent.load(Ordering::Relaxed),
            total_bytes_received: self.total_bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the global counters at a point in time
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub entities_started: u64,
    pub handlers_created: u64,
    pub handlers_closed: u64,
    pub active_handlers: usize,
    pub messages_delivered: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
}

static GLOBAL_METRICS: LazyLock<GlobalMetrics> = LazyLock::new(GlobalMetrics::default);

/// Access the process-wide metrics collector
pub fn global() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}
