//! Shared helpers for netplex integration tests

#![allow(dead_code)]

use netplex::FrameFn;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Opt-in tracing output for debugging test runs (RUST_LOG=trace)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Poll until `counter` reaches `target` or the deadline passes
pub async fn wait_for_count(counter: &AtomicUsize, target: usize, deadline: Duration) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if counter.load(Ordering::SeqCst) >= target {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    counter.load(Ordering::SeqCst) >= target
}

/// Build a test-protocol message: two-byte big-endian body length + body
pub fn frame_msg(body: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(2 + body.len());
    msg.extend_from_slice(&(body.len() as u16).to_be_bytes());
    msg.extend_from_slice(body);
    msg
}

/// Framing callback for the two-byte length-header protocol: after the
/// header is read it reports the body length, after the body it reports
/// completion.
pub fn header_frame() -> FrameFn {
    Box::new(|bytes: &mut [u8]| {
        if bytes.len() == 2 {
            u16::from_be_bytes([bytes[0], bytes[1]]) as usize
        } else {
            0
        }
    })
}
