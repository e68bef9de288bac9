//! Value-typed weak handles to entities and IO handlers
//!
//! Applications never hold a strong reference to an entity or an IO
//! handler. They hold [`EntityHandle`] / [`IoHandle`] values: cheap-to-copy
//! weak references that upgrade on every operation and fail softly once the
//! referent is gone. This is what makes it safe to keep a handle in a
//! callback or another thread while the library tears the underlying
//! connection down.
//!
//! Comparison and hashing are by referent identity: all handles to the same
//! live object are equal, and every dead or default-constructed handle is
//! equal to every other dead handle and sorts before the live ones.

use crate::error::{Error, Result};
use crate::io::output::OutputQueueStats;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Callback invoked when a new IO handler is ready; receives the handler's
/// weak handle and the entity's current handler count.
pub type IoReadyCb<H> = Arc<dyn Fn(IoHandle<H>, usize) + Send + Sync>;

/// Callback invoked when an IO handler (or the entity itself) shuts down;
/// receives the affected handle (possibly expired), the reason, and the
/// remaining handler count. No methods may be called on the handle.
pub type IoStopCb<H> = Arc<dyn Fn(IoHandle<H>, &Error, usize) + Send + Sync>;

/// UDP-only callback for non-fatal errors
pub type ErrCb<H> = Arc<dyn Fn(IoHandle<H>, &Error) + Send + Sync>;

/// A net entity as seen through an [`EntityHandle`]: something that can be
/// started with the two state-change callbacks and stopped.
pub trait NetEntity: Send + Sync + 'static {
    /// IO handler type this entity delivers through its ready callback
    type Io: Send + Sync + 'static;

    fn start_entity(&self, io_ready: IoReadyCb<Self::Io>, stop_cb: Option<IoStopCb<Self::Io>>)
        -> bool;
    fn stop_entity(&self) -> bool;
    fn entity_started(&self) -> bool;
}

/// Marker for entities with exactly one IO handler over their lifetime
/// (TCP connector, UDP). Future-based delivery is only offered for these;
/// an acceptor produces many start/stop transitions and cannot satisfy a
/// one-shot future.
pub trait SingleIo: NetEntity {}

/// Operations common to every IO handler, used by the generic
/// [`IoHandle`] methods.
pub trait IoBase: Send + Sync + 'static {
    fn io_started(&self) -> bool;
    fn queue_stats(&self) -> OutputQueueStats;
    fn halt_io(&self) -> bool;
}

/// Weak value handle to a net entity (acceptor, connector, UDP endpoint)
pub struct EntityHandle<E> {
    inner: Weak<E>,
}

/// Weak value handle to an IO handler
pub struct IoHandle<H> {
    inner: Weak<H>,
}

impl<E> EntityHandle<E> {
    pub(crate) fn new(inner: Weak<E>) -> Self {
        Self { inner }
    }

    /// Check whether the underlying entity is still alive
    pub fn is_valid(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<E>> {
        self.inner.upgrade()
    }
}

impl<E: NetEntity> EntityHandle<E> {
    /// Start the entity with both state-change callbacks.
    ///
    /// Returns `false` if the handle is expired or the entity was already
    /// started.
    pub fn start(&self, io_ready: IoReadyCb<E::Io>, stop_cb: IoStopCb<E::Io>) -> bool {
        match self.upgrade() {
            Some(e) => e.start_entity(io_ready, Some(stop_cb)),
            None => false,
        }
    }

    /// Start the entity with only the IO-ready callback; shutdown
    /// transitions are logged but not delivered.
    pub fn start_ready_only(&self, io_ready: IoReadyCb<E::Io>) -> bool {
        match self.upgrade() {
            Some(e) => e.start_entity(io_ready, None),
            None => false,
        }
    }

    /// Stop the entity, closing its sockets and IO handlers.
    ///
    /// Returns `false` if the handle is expired or the entity was already
    /// stopped.
    pub fn stop(&self) -> bool {
        match self.upgrade() {
            Some(e) => e.stop_entity(),
            None => false,
        }
    }

    /// Query whether `start` has been called
    pub fn is_started(&self) -> Result<bool> {
        self.upgrade()
            .map(|e| e.entity_started())
            .ok_or(Error::HandleExpired)
    }
}

impl<H> IoHandle<H> {
    pub(crate) fn new(inner: Weak<H>) -> Self {
        Self { inner }
    }

    /// Check whether the underlying IO handler is still alive
    pub fn is_valid(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<H>> {
        self.inner.upgrade()
    }
}

impl<H: IoBase> IoHandle<H> {
    /// Query whether `start_io` has been called on the handler
    pub fn is_io_started(&self) -> Result<bool> {
        self.upgrade()
            .map(|h| h.io_started())
            .ok_or(Error::HandleExpired)
    }

    /// Snapshot of the handler's outbound queue
    pub fn output_queue_stats(&self) -> Result<OutputQueueStats> {
        self.upgrade()
            .map(|h| h.queue_stats())
            .ok_or(Error::HandleExpired)
    }

    /// Request a graceful shutdown of this handler; the owning entity
    /// performs the close and fires its stop callback.
    ///
    /// Returns `false` if the handle is expired or IO was never started.
    pub fn stop_io(&self) -> bool {
        match self.upgrade() {
            Some(h) => h.halt_io(),
            None => false,
        }
    }
}

// Identity comparison semantics shared by both handle types. Two handles
// are equal when they refer to the same live allocation; all dead handles
// (expired or default-constructed) are equal to each other and order before
// live ones.

macro_rules! handle_impls {
    ($name:ident) => {
        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self { inner: Weak::new() }
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                Self {
                    inner: self.inner.clone(),
                }
            }
        }

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("ptr", &self.inner.as_ptr())
                    .field("valid", &self.is_valid())
                    .finish()
            }
        }

        impl<T> PartialEq for $name<T> {
            fn eq(&self, other: &Self) -> bool {
                match (self.inner.upgrade(), other.inner.upgrade()) {
                    (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
                    (None, None) => true,
                    _ => false,
                }
            }
        }

        impl<T> Eq for $name<T> {}

        impl<T> PartialOrd for $name<T> {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl<T> Ord for $name<T> {
            fn cmp(&self, other: &Self) -> Ordering {
                match (self.inner.upgrade(), other.inner.upgrade()) {
                    (Some(a), Some(b)) => (Arc::as_ptr(&a) as usize).cmp(&(Arc::as_ptr(&b) as usize)),
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                }
            }
        }

        impl<T> Hash for $name<T> {
            fn hash<H2: Hasher>(&self, state: &mut H2) {
                match self.inner.upgrade() {
                    Some(a) => (Arc::as_ptr(&a) as usize).hash(state),
                    None => 0usize.hash(state),
                }
            }
        }
    };
}

handle_impls!(EntityHandle);
handle_impls!(IoHandle);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Dummy;

    #[test]
    fn test_default_handles_compare_equal() {
        let a: IoHandle<Dummy> = IoHandle::default();
        let b: IoHandle<Dummy> = IoHandle::default();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert!(!a.is_valid());
    }

    #[test]
    fn test_live_handle_identity() {
        let target = Arc::new(Dummy);
        let a = IoHandle::new(Arc::downgrade(&target));
        let b = a.clone();
        let empty: IoHandle<Dummy> = IoHandle::default();
        assert_eq!(a, b);
        assert_ne!(a, empty);
        assert!(empty < a);
        assert!(a.is_valid());

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
    }

    #[test]
    fn test_expired_equals_default() {
        let a = {
            let target = Arc::new(Dummy);
            IoHandle::new(Arc::downgrade(&target))
        };
        let empty: IoHandle<Dummy> = IoHandle::default();
        assert!(!a.is_valid());
        assert_eq!(a, empty);
    }

    #[test]
    fn test_distinct_targets_not_equal() {
        let x = Arc::new(Dummy);
        let y = Arc::new(Dummy);
        let hx = EntityHandle::new(Arc::downgrade(&x));
        let hy = EntityHandle::new(Arc::downgrade(&y));
        assert_ne!(hx, hy);
        assert_ne!(hx.cmp(&hy), Ordering::Equal);
    }
}
