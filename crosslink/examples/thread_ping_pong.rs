//! Blocking-model ping-pong over message queues.
//!
//! Run with `RUST_LOG=debug cargo run --example thread_ping_pong` to see the
//! broker activity.

use crosslink::thread::{Broker, MessageQueue};
use std::thread;

fn main() -> crosslink::Result<()> {
    crosslink::dev_tracing::init_tracing();

    let server = Broker::new("server")?;
    let client = Broker::new("client")?;

    let echo = thread::spawn(move || {
        let queue = MessageQueue::new(server.accept(80).unwrap());
        for _ in 0..5 {
            let msg = queue.receive().unwrap();
            println!("server got {:?}", String::from_utf8_lossy(&msg));
            queue.send(&msg).unwrap();
        }
    });

    let queue = MessageQueue::new(client.connect("server", 80).expect("server is registered"));
    for round in 0..5 {
        queue.send(format!("ping {round}").as_bytes())?;
        let reply = queue.receive()?;
        println!("client got {:?}", String::from_utf8_lossy(&reply));
    }

    echo.join().unwrap();
    Ok(())
}
