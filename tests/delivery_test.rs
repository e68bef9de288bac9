//! Delivery adapter tests: wait-queue streams and future pairs

mod common;

use netplex::{
    start_with_futures, start_with_wait_queue, Framing, IoHandle, IoStateChange, Net, SharedBuf,
    TcpIo, WaitQueue,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_acceptor_events_through_wait_queue() {
    common::init_tracing();
    let net = Net::new();
    let acceptor = net.make_tcp_acceptor("127.0.0.1:0".parse().expect("addr"), true);

    let events: Arc<WaitQueue<IoStateChange<TcpIo>>> = Arc::new(WaitQueue::new());
    let msg_count = Arc::new(AtomicUsize::new(0));

    let msg_count2 = msg_count.clone();
    // io_start runs before the event is pushed, so reads are already active
    // when a consumer observes the ready event
    assert!(start_with_wait_queue(
        &acceptor,
        move |io, _count| {
            let msg_count = msg_count2.clone();
            io.start_io(
                Framing::Delimiter(b"\n".to_vec()),
                Box::new(move |_msg, _io, _peer| {
                    msg_count.fetch_add(1, Ordering::SeqCst);
                    true
                }),
            );
        },
        events.clone(),
    ));
    let addr = acceptor
        .local_addr()
        .expect("live handle")
        .expect("bound");

    let connector = net.make_tcp_connector("127.0.0.1", addr.port(), Duration::from_millis(100));
    let futures = start_with_futures(&connector).expect("connector start");
    let io = timeout(Duration::from_secs(5), futures.start)
        .await
        .expect("connect within deadline")
        .expect("start future fulfilled");
    assert!(io.start_io_discard());
    assert!(io.send(SharedBuf::from(&b"one\n"[..])));

    // ready event for the accepted connection
    let events2 = events.clone();
    let ready = timeout(
        Duration::from_secs(5),
        tokio::task::spawn_blocking(move || events2.pop()),
    )
    .await
    .expect("event within deadline")
    .expect("join")
    .expect("queue open");
    assert!(ready.starting);
    assert_eq!(ready.count, 1);
    assert!(ready.handle.is_valid());

    assert!(common::wait_for_count(&msg_count, 1, Duration::from_secs(5)).await);

    // dropping the connector produces a stop event with zero connections
    assert!(connector.stop());
    let events3 = events.clone();
    let stopped = timeout(
        Duration::from_secs(5),
        tokio::task::spawn_blocking(move || events3.pop()),
    )
    .await
    .expect("event within deadline")
    .expect("join")
    .expect("queue open");
    assert!(!stopped.starting);
    assert_eq!(stopped.count, 0);

    net.stop_all();
    events.close();
}

#[tokio::test]
async fn test_future_pair_resolves_start_then_stop() {
    common::init_tracing();
    let net = Net::new();
    let acceptor = net.make_tcp_acceptor("127.0.0.1:0".parse().expect("addr"), true);
    assert!(acceptor.start(
        Arc::new(|io: IoHandle<TcpIo>, _count| {
            io.start_io_discard();
        }),
        Arc::new(|_io, _err, _count| {}),
    ));
    let addr = acceptor
        .local_addr()
        .expect("live handle")
        .expect("bound");

    let connector = net.make_tcp_connector("127.0.0.1", addr.port(), Duration::from_secs(1));
    let futures = start_with_futures(&connector).expect("connector start");

    let io = timeout(Duration::from_secs(5), futures.start)
        .await
        .expect("start future within deadline")
        .expect("start future fulfilled");
    assert!(io.is_valid());
    assert!(io.start_io_discard());

    // closing the peer resolves the stop future
    assert!(acceptor.stop());
    let _ = timeout(Duration::from_secs(5), futures.stop)
        .await
        .expect("stop future within deadline");

    net.stop_all();
}

#[tokio::test]
async fn test_future_pair_fails_on_second_start() {
    common::init_tracing();
    let net = Net::new();
    let connector =
        net.make_tcp_connector_with_endpoints(vec!["127.0.0.1:9".parse().expect("addr")], Duration::from_secs(1));
    assert!(start_with_futures(&connector).is_ok());
    // entity already started: adapter refuses rather than clobbering state
    assert!(start_with_futures(&connector).is_err());
    connector.stop();
}
