//! Closable multi-producer multi-consumer wait queue
//!
//! [`WaitQueue`] is the one primitive in this crate that crosses threads with
//! locking: a strict-FIFO queue guarded by a mutex and one condition
//! variable. It backs the wait-queue delivery adapter and is usable on its
//! own for handing work between application threads.
//!
//! Closing is part of the protocol rather than an afterthought: a closed
//! queue rejects pushes, lets consumers drain what remains, and then hands
//! them `None` so reader loops terminate without a sentinel value.

use crate::sync::{lock, wait};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use thiserror::Error;

/// Why a [`WaitQueue::push`] was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The queue has been closed
    #[error("wait queue is closed")]
    Closed,
    /// A bounded queue is at capacity
    #[error("wait queue is full")]
    Full,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
    capacity: Option<usize>,
}

/// Thread-safe FIFO with blocking and non-blocking pop, optional capacity
/// bound, and idempotent close.
///
/// Multiple producers and multiple consumers may share one queue through an
/// `Arc`. Ordering is strict FIFO as observed under the queue lock; each
/// push wakes at most one waiting consumer.
pub struct WaitQueue<T> {
    inner: Mutex<Inner<T>>,
    readers: Condvar,
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WaitQueue<T> {
    /// Create an unbounded queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
                capacity: None,
            }),
            readers: Condvar::new(),
        }
    }

    /// Create a queue that refuses pushes beyond `capacity` queued elements
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                capacity: Some(capacity),
            }),
            readers: Condvar::new(),
        }
    }

    /// Append a value, waking at most one waiting consumer.
    ///
    /// Fails with [`PushError::Closed`] after [`close`](Self::close), or
    /// [`PushError::Full`] when a bounded queue is at capacity.
    pub fn push(&self, value: T) -> Result<(), PushError> {
        let mut q = lock(&self.inner);
        if q.closed {
            return Err(PushError::Closed);
        }
        if let Some(cap) = q.capacity {
            if q.items.len() >= cap {
                return Err(PushError::Full);
            }
        }
        q.items.push_back(value);
        self.readers.notify_one();
        Ok(())
    }

    /// Remove and return the oldest value, blocking while the queue is open
    /// and empty.
    ///
    /// Returns `None` only when the queue is closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        let mut q = lock(&self.inner);
        loop {
            if let Some(v) = q.items.pop_front() {
                return Some(v);
            }
            if q.closed {
                return None;
            }
            q = wait(&self.readers, q);
        }
    }

    /// Remove and return the oldest value without blocking.
    ///
    /// Returns `None` whenever the queue is empty, closed or not.
    pub fn try_pop(&self) -> Option<T> {
        lock(&self.inner).items.pop_front()
    }

    /// Close the queue and wake every waiting consumer. Idempotent.
    ///
    /// Queued values remain poppable; further pushes fail.
    pub fn close(&self) {
        let mut q = lock(&self.inner);
        q.closed = true;
        self.readers.notify_all();
    }

    /// Reopen a closed queue. Permitted only while the queue is empty;
    /// returns whether the queue is now open.
    pub fn open(&self) -> bool {
        let mut q = lock(&self.inner);
        if q.items.is_empty() {
            q.closed = false;
            true
        } else {
            false
        }
    }

    /// Number of queued values. Snapshot only, unsynchronized with
    /// concurrent pushes and pops.
    pub fn len(&self) -> usize {
        lock(&self.inner).items.len()
    }

    /// Check whether the queue is currently empty
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).items.is_empty()
    }

    /// Check whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }
}
