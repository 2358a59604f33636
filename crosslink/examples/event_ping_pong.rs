//! Event-model ping-pong over message queues: every step is a posted task.
//!
//! Run with `RUST_LOG=debug cargo run --example event_ping_pong` to see the
//! broker activity.

use bytes::Bytes;
use crosslink::event::{Broker, MessageQueue, QueueBroker, QueueConnectHandlers, QueueListener};
use crosslink::EventPump;
use std::sync::mpsc;
use std::time::Duration;

struct Echo {
    queue: MessageQueue,
}

impl QueueListener for Echo {
    fn on_message(&mut self, msg: Bytes) {
        println!("server got {:?}", String::from_utf8_lossy(&msg));
        self.queue.send(&msg);
    }

    fn on_closed(&mut self) {
        println!("server side closed");
    }
}

struct Printer {
    replies: mpsc::Sender<Bytes>,
}

impl QueueListener for Printer {
    fn on_message(&mut self, msg: Bytes) {
        println!("client got {:?}", String::from_utf8_lossy(&msg));
        self.replies.send(msg).unwrap();
    }

    fn on_closed(&mut self) {
        println!("client side closed");
    }
}

fn main() -> crosslink::Result<()> {
    crosslink::dev_tracing::init_tracing();

    let pump = EventPump::new();
    let server = QueueBroker::new(Broker::new("server", pump.handle())?);
    let client = QueueBroker::new(Broker::new("client", pump.handle())?);

    server.bind(80, |queue: MessageQueue| {
        queue.set_listener(Echo {
            queue: queue.clone(),
        });
    });

    let (connected_tx, connected_rx) = mpsc::channel();
    client.connect(
        "server",
        80,
        QueueConnectHandlers {
            connected: move |queue: MessageQueue| connected_tx.send(queue).unwrap(),
            refused: || panic!("server not found"),
        },
    );
    let queue = connected_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("connection");

    let (replies_tx, replies_rx) = mpsc::channel();
    queue.set_listener(Printer {
        replies: replies_tx,
    });

    for round in 0..5 {
        queue.send(format!("ping {round}").as_bytes());
        replies_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("reply");
    }

    queue.close();
    server.unbind(80);
    pump.stop();
    Ok(())
}
