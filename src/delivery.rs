//! Delivery adapters bridging state-change callbacks to application threads
//!
//! Two strategies for getting an [`IoHandle`] out of the event loop and
//! into application code:
//!
//! 1. **Futures** ([`start_with_futures`]): a one-shot pair resolving on the
//!    first IO start and first IO stop. Only offered for entities with a
//!    single IO handler (connector, UDP) — an acceptor's many transitions
//!    cannot be expressed by one-shot futures, and the [`SingleIo`] bound
//!    rejects it at compile time.
//! 2. **Wait queue** ([`start_with_wait_queue`]): every transition pushed
//!    into a caller-supplied [`WaitQueue`]. Works for every entity and is
//!    the required form for acceptors.

use crate::error::{Error, Result};
use crate::handle::{EntityHandle, IoHandle, IoReadyCb, IoStopCb, NetEntity, SingleIo};
use crate::queue::WaitQueue;
use crate::sync::lock;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::trace;

/// One IO state transition as delivered through a wait queue
pub struct IoStateChange<H> {
    /// Handle to the IO handler involved; expired for entity-level stops
    pub handle: IoHandle<H>,
    /// Entity handler count after the transition
    pub count: usize,
    /// `true` for IO-ready transitions, `false` for stops
    pub starting: bool,
}

impl<H> Clone for IoStateChange<H> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            count: self.count,
            starting: self.starting,
        }
    }
}

/// Start `entity`, pushing every IO state change into `queue`.
///
/// On each IO-ready transition, `io_start` runs synchronously *before* the
/// event is pushed, so reads can already be in progress by the time a
/// consumer pops the event. Returns what `EntityHandle::start` returns.
pub fn start_with_wait_queue<E, F>(
    entity: &EntityHandle<E>,
    io_start: F,
    queue: Arc<WaitQueue<IoStateChange<E::Io>>>,
) -> bool
where
    E: NetEntity,
    F: Fn(IoHandle<E::Io>, usize) + Send + Sync + 'static,
{
    let ready_q = queue.clone();
    let io_ready: IoReadyCb<E::Io> = Arc::new(move |handle, count| {
        io_start(handle.clone(), count);
        if ready_q
            .push(IoStateChange {
                handle,
                count,
                starting: true,
            })
            .is_err()
        {
            trace!("io-ready event dropped: wait queue closed or full");
        }
    });
    let stop_cb: IoStopCb<E::Io> = Arc::new(move |handle, _err, count| {
        if queue
            .push(IoStateChange {
                handle,
                count,
                starting: false,
            })
            .is_err()
        {
            trace!("io-stop event dropped: wait queue closed or full");
        }
    });
    entity.start(io_ready, stop_cb)
}

/// One-shot futures resolving on the first IO start and first IO stop
pub struct IoFuturePair<H> {
    /// Resolves with the IO handle when the entity's handler is ready
    pub start: oneshot::Receiver<IoHandle<H>>,
    /// Resolves when that handler stops; the handle may be expired and no
    /// methods may be called on it
    pub stop: oneshot::Receiver<IoHandle<H>>,
}

/// Start a single-IO entity and deliver its handler through futures.
///
/// Fails with [`Error::HandleExpired`] when the entity is gone or was
/// already started.
pub fn start_with_futures<E>(entity: &EntityHandle<E>) -> Result<IoFuturePair<E::Io>>
where
    E: NetEntity + SingleIo,
{
    let (start_tx, start_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel();
    let start_tx = Mutex::new(Some(start_tx));
    let stop_tx = Mutex::new(Some(stop_tx));

    let io_ready: IoReadyCb<E::Io> = Arc::new(move |handle, _count| {
        if let Some(tx) = lock(&start_tx).take() {
            let _ = tx.send(handle);
        }
    });
    let stop_cb: IoStopCb<E::Io> = Arc::new(move |handle, _err, _count| {
        if let Some(tx) = lock(&stop_tx).take() {
            let _ = tx.send(handle);
        }
    });
    if entity.start(io_ready, stop_cb) {
        Ok(IoFuturePair {
            start: start_rx,
            stop: stop_rx,
        })
    } else {
        Err(Error::HandleExpired)
    }
}
