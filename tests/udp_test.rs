//! UDP entity tests: echo pair, send-only endpoints, lifecycle

mod common;

use netplex::{start_with_futures, Error, IoHandle, Net, SharedBuf, UdpIo};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

fn local_any() -> SocketAddr {
    "127.0.0.1:0".parse().expect("loopback addr")
}

async fn started_udp(net: &Net, local: Option<SocketAddr>) -> (netplex::EntityHandle<UdpIo>, IoHandle<UdpIo>) {
    let entity = net.make_udp_unicast(local);
    let futures = start_with_futures(&entity).expect("udp start");
    let io = timeout(Duration::from_secs(5), futures.start)
        .await
        .expect("udp ready within deadline")
        .expect("start future fulfilled");
    (entity, io)
}

#[tokio::test]
async fn test_udp_echo_pair_two_hundred_datagrams() {
    common::init_tracing();
    const DATAGRAMS: usize = 200;
    let net = Net::new();

    // echo side: every datagram goes straight back to its sender
    let (echo_entity, echo_io) = started_udp(&net, Some(local_any())).await;
    let echo_addr = echo_entity
        .local_addr()
        .expect("live handle")
        .expect("bound");
    assert!(echo_io.start_io(
        1024,
        Box::new(|bytes, io, sender| {
            io.send_to(SharedBuf::from(bytes), sender);
            true
        }),
        None,
    ));

    // client side: default destination is the echo endpoint
    let (client_entity, client_io) = started_udp(&net, Some(local_any())).await;
    let client_addr = client_entity
        .local_addr()
        .expect("live handle")
        .expect("bound");

    let received = Arc::new(AtomicUsize::new(0));
    let senders_match = Arc::new(AtomicBool::new(true));
    let received2 = received.clone();
    let senders_match2 = senders_match.clone();
    assert!(client_io.start_io(
        1024,
        Box::new(move |_bytes, _io, sender| {
            if sender != echo_addr {
                senders_match2.store(false, Ordering::SeqCst);
            }
            received2.fetch_add(1, Ordering::SeqCst);
            true
        }),
        Some(echo_addr),
    ));

    for i in 0..DATAGRAMS {
        let payload = format!("datagram-{i}");
        assert!(client_io.send(SharedBuf::from(payload.as_bytes())));
        if i % 20 == 19 {
            // give loopback receive buffers a chance to drain
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    assert!(common::wait_for_count(&received, DATAGRAMS, Duration::from_secs(10)).await);
    assert_eq!(received.load(Ordering::SeqCst), DATAGRAMS);
    assert!(
        senders_match.load(Ordering::SeqCst),
        "sender endpoint always equals the echo side's bind endpoint"
    );
    // sanity: the echo side really saw our bind endpoint, not a wildcard
    assert_ne!(client_addr.port(), 0);
    net.stop_all();
}

#[tokio::test]
async fn test_udp_send_only_endpoint() {
    common::init_tracing();
    let net = Net::new();

    let sink_payloads: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_count = Arc::new(AtomicUsize::new(0));
    let (sink_entity, sink_io) = started_udp(&net, Some(local_any())).await;
    let sink_addr = sink_entity
        .local_addr()
        .expect("live handle")
        .expect("bound");
    let sink_payloads2 = sink_payloads.clone();
    let sink_count2 = sink_count.clone();
    assert!(sink_io.start_io(
        256,
        Box::new(move |bytes, _io, _sender| {
            sink_payloads2.lock().expect("lock").push(bytes.to_vec());
            sink_count2.fetch_add(1, Ordering::SeqCst);
            true
        }),
        None,
    ));

    // unbound local endpoint: socket opens on an OS-assigned port, no reads
    let (_sender_entity, sender_io) = started_udp(&net, None).await;
    assert!(sender_io.start_io_send_only(Some(sink_addr)));
    assert!(sender_io.send(SharedBuf::from(&b"alpha"[..])));
    assert!(sender_io.send(SharedBuf::from(&b"beta"[..])));

    assert!(common::wait_for_count(&sink_count, 2, Duration::from_secs(5)).await);
    assert_eq!(
        *sink_payloads.lock().expect("lock"),
        vec![b"alpha".to_vec(), b"beta".to_vec()]
    );
    net.stop_all();
}

#[tokio::test]
async fn test_udp_send_without_destination_rejected() {
    common::init_tracing();
    let net = Net::new();
    let (_entity, io) = started_udp(&net, Some(local_any())).await;
    assert!(io.start_io_send_only(None));
    // no explicit destination and no default: rejected locally
    assert!(!io.send(SharedBuf::from(&b"nowhere"[..])));
    net.stop_all();
}

#[tokio::test]
async fn test_udp_send_before_start_io_rejected() {
    common::init_tracing();
    let net = Net::new();
    let (_entity, io) = started_udp(&net, Some(local_any())).await;
    let dest: SocketAddr = "127.0.0.1:9".parse().expect("addr");
    assert!(!io.send_to(SharedBuf::from(&b"early"[..]), dest));
}

#[tokio::test]
async fn test_udp_stop_fires_entity_stopped() {
    common::init_tracing();
    let net = Net::new();
    let entity = net.make_udp_unicast(Some(local_any()));

    let ready = Arc::new(AtomicUsize::new(0));
    let saw_entity_stopped = Arc::new(AtomicBool::new(false));
    let ready2 = ready.clone();
    let saw2 = saw_entity_stopped.clone();
    assert!(entity.start(
        Arc::new(move |io: IoHandle<UdpIo>, count| {
            assert!(io.is_valid());
            assert_eq!(count, 1);
            ready2.fetch_add(1, Ordering::SeqCst);
        }),
        Arc::new(move |_io, err, count| {
            if matches!(err, Error::UdpEntityStopped) {
                saw2.store(true, Ordering::SeqCst);
            }
            assert_eq!(count, 0);
        }),
    ));
    assert!(common::wait_for_count(&ready, 1, Duration::from_secs(5)).await);

    assert!(entity.stop());
    assert!(!entity.stop());
    assert!(saw_entity_stopped.load(Ordering::SeqCst));
    assert_eq!(entity.is_started().expect("live handle"), false);
}

#[tokio::test]
async fn test_udp_message_handler_false_tears_down() {
    common::init_tracing();
    let net = Net::new();

    let receiver = net.make_udp_unicast(Some(local_any()));
    let stop_events = Arc::new(AtomicUsize::new(0));
    let saw_terminated = Arc::new(AtomicBool::new(false));
    let err_terminated = Arc::new(AtomicBool::new(false));

    let stop_events2 = stop_events.clone();
    let saw2 = saw_terminated.clone();
    let err2 = err_terminated.clone();
    assert!(receiver.start_with_err_cb(
        Arc::new(|io: IoHandle<UdpIo>, _count| {
            // every datagram poisons the handler
            io.start_io(256, Box::new(|_bytes, _io, _sender| false), None);
        }),
        Arc::new(move |_io, err, _count| {
            if matches!(err, Error::MessageHandlerTerminated) {
                saw2.store(true, Ordering::SeqCst);
            }
            stop_events2.fetch_add(1, Ordering::SeqCst);
        }),
        Arc::new(move |_io, err| {
            if matches!(err, Error::MessageHandlerTerminated) {
                err2.store(true, Ordering::SeqCst);
            }
        }),
    ));
    let receiver_addr = receiver.local_addr().expect("live handle").expect("bound");

    let (_sender_entity, sender_io) = started_udp(&net, None).await;
    assert!(sender_io.start_io_send_only(Some(receiver_addr)));
    assert!(sender_io.send(SharedBuf::from(&b"poison"[..])));

    // the handler's false return stops the whole entity
    assert!(common::wait_for_count(&stop_events, 1, Duration::from_secs(5)).await);
    assert!(saw_terminated.load(Ordering::SeqCst));
    assert!(err_terminated.load(Ordering::SeqCst));
    assert_eq!(receiver.is_started().expect("live handle"), false);
    net.stop_all();
}
