//! Lifecycle scaffolding shared by acceptor, connector, and UDP entities
//!
//! Owns the started flag, the two application state-change callbacks, and
//! the set of live IO handlers. Callbacks are cloned out of their slots
//! before invocation so application code never runs under an internal lock
//! and may call back into the entity.

use crate::error::Error;
use crate::handle::{IoHandle, IoReadyCb, IoStopCb};
use crate::sync::lock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) struct EntityCommon<H> {
    started: AtomicBool,
    io_ready_cb: Mutex<Option<IoReadyCb<H>>>,
    stop_cb: Mutex<Option<IoStopCb<H>>>,
    handlers: Mutex<Vec<Arc<H>>>,
}

impl<H> EntityCommon<H> {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            io_ready_cb: Mutex::new(None),
            stop_cb: Mutex::new(None),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Flip started false -> true and install the callbacks; false if the
    /// entity was already started.
    pub fn start(&self, io_ready: IoReadyCb<H>, stop_cb: Option<IoStopCb<H>>) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *lock(&self.io_ready_cb) = Some(io_ready);
        *lock(&self.stop_cb) = stop_cb;
        true
    }

    /// Flip started true -> false; false if already stopped
    pub fn stop(&self) -> bool {
        self.started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Insert a live handler; returns the new handler count
    pub fn add_handler(&self, h: Arc<H>) -> usize {
        let mut set = lock(&self.handlers);
        set.push(h);
        set.len()
    }

    /// Remove a handler by identity; returns the remaining count, or `None`
    /// when the handler was not in the set (already removed elsewhere).
    pub fn remove_handler(&self, h: &Arc<H>) -> Option<usize> {
        let mut set = lock(&self.handlers);
        let before = set.len();
        set.retain(|x| !Arc::ptr_eq(x, h));
        if set.len() == before {
            None
        } else {
            Some(set.len())
        }
    }

    /// Take every live handler out of the set
    pub fn take_handlers(&self) -> Vec<Arc<H>> {
        std::mem::take(&mut *lock(&self.handlers))
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.handlers).len()
    }

    /// Invoke the IO-ready callback with a weak handle to `h`
    pub fn call_io_ready_cb(&self, h: &Arc<H>, count: usize) {
        let cb = lock(&self.io_ready_cb).clone();
        if let Some(cb) = cb {
            cb(IoHandle::new(Arc::downgrade(h)), count);
        }
    }

    /// Invoke the stop callback with a weak handle to `h`, or an empty
    /// handle when no specific handler is involved.
    pub fn call_stop_cb(&self, h: Option<&Arc<H>>, err: &Error, count: usize) {
        let cb = lock(&self.stop_cb).clone();
        if let Some(cb) = cb {
            let handle = match h {
                Some(h) => IoHandle::new(Arc::downgrade(h)),
                None => IoHandle::default(),
            };
            cb(handle, err, count);
        }
    }
}
