//! State shared by every IO handler: the started flag and the
//! write-in-flight / output-queue pair.
//!
//! The write-side invariant lives here: at most one write is in flight per
//! handler. A send that arrives while a write is outstanding is queued; the
//! completion path pops the next element and keeps the flag set, or clears
//! it when the queue drains. `send` is callable from any thread, so the
//! flag and queue sit behind one short mutex.

use crate::buffer::SharedBuf;
use crate::io::output::{OutputQueue, OutputQueueElement, OutputQueueStats};
use crate::sync::lock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

struct WriteState {
    write_in_flight: bool,
    queue: OutputQueue,
}

pub(crate) struct IoCommon {
    io_started: AtomicBool,
    write: Mutex<WriteState>,
}

impl IoCommon {
    pub fn new() -> Self {
        Self {
            io_started: AtomicBool::new(false),
            write: Mutex::new(WriteState {
                write_in_flight: false,
                queue: OutputQueue::new(),
            }),
        }
    }

    pub fn is_io_started(&self) -> bool {
        self.io_started.load(Ordering::Acquire)
    }

    /// Flip started false -> true; false if already started.
    pub fn set_io_started(&self) -> bool {
        self.io_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Flip started true -> false; false if already stopped. Pending queued
    /// sends are released.
    pub fn stop(&self) -> bool {
        if self
            .io_started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        lock(&self.write).queue.clear();
        true
    }

    /// Decide what happens to an outbound buffer.
    ///
    /// Returns `true` when the caller now owns the in-flight slot and must
    /// start the write. Returns `false` when the buffer was queued behind an
    /// outstanding write, or dropped because the handler is stopped.
    pub fn start_write_setup(&self, buf: SharedBuf, dest: Option<SocketAddr>) -> bool {
        if !self.is_io_started() {
            return false;
        }
        let mut st = lock(&self.write);
        if st.write_in_flight {
            st.queue.push(OutputQueueElement::new(buf, dest));
            return false;
        }
        st.write_in_flight = true;
        true
    }

    /// Called on write completion: pop the next queued send, or clear the
    /// in-flight flag when nothing is waiting.
    pub fn next_queued(&self) -> Option<OutputQueueElement> {
        let mut st = lock(&self.write);
        match st.queue.pop() {
            Some(elem) => Some(elem),
            None => {
                st.write_in_flight = false;
                None
            }
        }
    }

    pub fn output_queue_stats(&self) -> OutputQueueStats {
        lock(&self.write).queue.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(n: usize) -> SharedBuf {
        SharedBuf::from(vec![0u8; n])
    }

    #[test]
    fn test_started_cas() {
        let c = IoCommon::new();
        assert!(!c.is_io_started());
        assert!(c.set_io_started());
        assert!(!c.set_io_started());
        assert!(c.is_io_started());
        assert!(c.stop());
        assert!(!c.stop());
    }

    #[test]
    fn test_send_before_start_is_dropped() {
        let c = IoCommon::new();
        assert!(!c.start_write_setup(buf(4), None));
        assert_eq!(c.output_queue_stats(), OutputQueueStats::default());
    }

    #[test]
    fn test_single_write_in_flight() {
        let c = IoCommon::new();
        assert!(c.set_io_started());

        // first send owns the in-flight slot
        assert!(c.start_write_setup(buf(3), None));
        // subsequent sends queue
        assert!(!c.start_write_setup(buf(5), None));
        assert!(!c.start_write_setup(buf(7), None));
        let stats = c.output_queue_stats();
        assert_eq!(stats.queue_size, 2);
        assert_eq!(stats.bytes_queued, 12);

        // completion drains in order, keeping the slot occupied
        assert_eq!(c.next_queued().expect("queued").buf.len(), 5);
        assert_eq!(c.next_queued().expect("queued").buf.len(), 7);
        // queue empty: slot released
        assert!(c.next_queued().is_none());
        assert!(c.start_write_setup(buf(1), None));
    }

    #[test]
    fn test_stop_releases_queued_sends() {
        let c = IoCommon::new();
        assert!(c.set_io_started());
        assert!(c.start_write_setup(buf(1), None));
        assert!(!c.start_write_setup(buf(2), None));
        assert!(c.stop());
        assert_eq!(c.output_queue_stats().queue_size, 0);
        assert!(!c.start_write_setup(buf(3), None));
    }
}
