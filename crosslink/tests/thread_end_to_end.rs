//! End-to-end scenarios for the blocking model.

use crosslink::thread::{Broker, ConnectHandlers, MessageQueue, QueueBroker};
use crosslink::{BrokerRegistry, Error};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn brokers(names: &[&str]) -> Vec<Broker> {
    let registry = BrokerRegistry::new();
    names
        .iter()
        .map(|name| Broker::with_registry(name, registry.clone()).unwrap())
        .collect()
}

#[test]
fn fifty_bytes_from_a_to_b() {
    let mut pair = brokers(&["a", "b"]);
    let b = pair.pop().unwrap();
    let a = pair.pop().unwrap();

    let connector = thread::spawn(move || {
        let channel = a.connect("b", 80).expect("b is registered");
        let payload: Vec<u8> = (0..50).collect();
        let mut sent = 0;
        while sent < payload.len() {
            sent += channel.write(&payload[sent..]).unwrap();
        }
        channel
    });

    let channel = b.accept(80).unwrap();
    let mut buf = [0u8; 50];
    let mut read = 0;
    while read < 50 {
        read += channel.read(&mut buf[read..]).unwrap();
    }
    connector.join().unwrap();

    let expected: Vec<u8> = (0..50).collect();
    assert_eq!(&buf[..], &expected[..]);
    assert_eq!(channel.remote_name(), "a");
}

#[test]
fn transfer_needs_many_ring_rounds() {
    let mut pair = brokers(&["a", "b"]);
    let b = pair.pop().unwrap();
    let a = pair.pop().unwrap();

    let payload: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
    let expected = payload.clone();

    let writer = thread::spawn(move || {
        let channel = a.connect("b", 80).unwrap();
        let mut sent = 0;
        while sent < payload.len() {
            sent += channel.write(&payload[sent..]).unwrap();
        }
        channel.disconnect();
    });

    let channel = b.accept(80).unwrap();
    let mut received = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        match channel.read(&mut chunk) {
            Ok(count) => received.extend_from_slice(&chunk[..count]),
            Err(Error::Disconnected) => break,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    writer.join().unwrap();
    assert_eq!(received, expected);
}

#[test]
fn message_queues_preserve_boundaries_and_order() {
    let mut pair = brokers(&["a", "b"]);
    let b = pair.pop().unwrap();
    let a = pair.pop().unwrap();

    let sizes = [0usize, 1, 100, 255, 256, 257, 4096];
    let sender = thread::spawn(move || {
        let queue = MessageQueue::new(a.connect("b", 80).unwrap());
        for (i, size) in sizes.iter().enumerate() {
            queue.send(&vec![i as u8; *size]).unwrap();
        }
    });

    let queue = MessageQueue::new(b.accept(80).unwrap());
    for (i, size) in sizes.iter().enumerate() {
        let msg = queue.receive().unwrap();
        assert_eq!(msg.len(), *size, "message {i}");
        assert!(msg.iter().all(|byte| *byte == i as u8), "message {i}");
    }
    sender.join().unwrap();
}

#[test]
fn disconnect_unblocks_parked_threads_on_both_ends() {
    let mut pair = brokers(&["a", "b"]);
    let b = pair.pop().unwrap();
    let a = pair.pop().unwrap();

    let reader = thread::spawn(move || {
        let channel = b.accept(80).unwrap();
        let mut buf = [0u8; 8];
        channel.read(&mut buf)
    });
    let channel = a.connect("b", 80).unwrap();
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    channel.disconnect();
    let result = reader.join().unwrap();
    assert!(matches!(result, Err(Error::Disconnected)));
    assert!(started.elapsed() < Duration::from_secs(2), "unblocking took too long");
}

#[test]
fn queue_broker_serves_and_unbinds() {
    let mut pair = brokers(&["a", "b"]);
    let b = pair.pop().unwrap();
    let a = pair.pop().unwrap();
    let server = QueueBroker::new(b);
    let client = QueueBroker::new(a);

    let (accepted_tx, accepted_rx) = mpsc::channel();
    assert!(server.bind(80, move |queue: MessageQueue| {
        // echo one message back
        let msg = queue.receive().unwrap();
        queue.send(&msg).unwrap();
        accepted_tx.send(()).unwrap();
    }));

    for round in 0u8..3 {
        let (reply_tx, reply_rx) = mpsc::channel();
        assert!(client.connect(
            "b",
            80,
            ConnectHandlers {
                connected: move |queue: MessageQueue| {
                    queue.send(&[round; 16]).unwrap();
                    reply_tx.send(queue.receive().unwrap()).unwrap();
                },
                refused: || panic!("never refused"),
            },
        ));
        let reply = reply_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply.as_ref(), &[round; 16]);
        accepted_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    assert!(!client.unbind(80), "client never bound the port");
    assert!(server.unbind(80));
    // once the accept cycle drains, the port is bindable again
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if server.bind(80, |_queue: MessageQueue| {}) {
            break;
        }
        assert!(Instant::now() < deadline, "port never drained");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn bind_then_immediate_unbind_delivers_nothing() {
    let mut pair = brokers(&["a", "b"]);
    let b = pair.pop().unwrap();
    drop(pair);
    let server = QueueBroker::new(b);

    let (tx, rx) = mpsc::channel();
    assert!(server.bind(80, move |queue: MessageQueue| {
        tx.send(queue).unwrap();
    }));
    assert!(server.unbind(80));
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
}
