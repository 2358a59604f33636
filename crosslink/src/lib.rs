//! # Crosslink
//!
//! A named-endpoint communication substrate: point-to-point, full-duplex
//! byte channels established through rendez-vous brokers, with a
//! length-prefixed message-queue layer on top.
//!
//! ## Architecture
//!
//! Crosslink is structured as a small kernel with two interchangeable
//! execution models:
//!
//! - **`crosslink-core`**: ring buffers, broker registry, frame codec,
//!   executor boundary
//! - **`crosslink-thread`**: blocking model — one caller thread parks per
//!   pending operation, monitors do the waking
//! - **`crosslink-event`**: event model — a single dispatch thread runs
//!   every listener as a posted task, nothing blocks
//! - **`crosslink`**: public API surface (this crate)
//!
//! Both models speak the same protocol: the same rendez-vous matching, the
//! same cross-linked ring pairs, the same 4-byte big-endian framing and the
//! same 1-byte bind/unbind control payload.
//!
//! ## Quick Start
//!
//! ```rust
//! use crosslink::thread::{Broker, MessageQueue};
//! use crosslink::BrokerRegistry;
//! use std::thread;
//!
//! # fn main() -> crosslink::Result<()> {
//! let registry = BrokerRegistry::new();
//! let server = Broker::with_registry("server", registry.clone())?;
//! let client = Broker::with_registry("client", registry)?;
//!
//! let acceptor = thread::spawn(move || {
//!     let channel = server.accept(80).unwrap();
//!     let queue = MessageQueue::new(channel);
//!     queue.receive().unwrap()
//! });
//!
//! let channel = client.connect("server", 80).expect("server is registered");
//! let queue = MessageQueue::new(channel);
//! queue.send(b"hello")?;
//!
//! assert_eq!(acceptor.join().unwrap().as_ref(), b"hello");
//! # Ok(())
//! # }
//! ```

pub mod dev_tracing;

pub use crosslink_core::error::{Error, Result};
pub use crosslink_core::executor::{EventPump, Executor, ExecutorHandle, Task};
pub use crosslink_core::frame;
pub use crosslink_core::registry::BrokerRegistry;
pub use crosslink_core::ring::{RingBuffer, RingError, DEFAULT_CAPACITY};

/// Blocking execution model.
pub use crosslink_thread as thread;

/// Event-driven execution model.
pub use crosslink_event as event;

// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::{BrokerRegistry, Error, EventPump, Executor, ExecutorHandle, Result};
}
