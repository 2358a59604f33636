//! # Crosslink Event Model
//!
//! Single-threaded event-dispatch execution model: nothing blocks, pending
//! operations are queued requests, and completions are listener callbacks
//! that only ever run as tasks posted to the host executor.
//!
//! - [`Broker`]: accept/connect matching into linked channel pairs, both
//!   completions posted, never invoked inline
//! - [`Channel`]: full-duplex byte stream driven by per-direction FIFO
//!   request queues and buffer-readiness callbacks
//! - [`MessageQueue`]: length-prefixed messages with continuous listener
//!   delivery
//! - [`QueueBroker`]: bind/unbind/connect for message queues, unbind
//!   traveling as an ordinary connection with a control payload
//!
//! Registration calls (`accept`, `connect`, `read`, `write`, `bind`,
//! `unbind`) may come from arbitrary threads; only listener invocations are
//! serialized on the dispatch thread. Wire-level behavior is identical to
//! `crosslink-thread`.

#![cfg_attr(not(test), deny(unsafe_code))]
#![allow(clippy::module_name_repetitions)]

pub mod broker;
pub mod channel;
pub mod listener;
pub mod queue;
pub mod queue_broker;

#[cfg(test)]
pub(crate) mod test_support;

pub use broker::{global_registry, Broker};
pub use channel::Channel;
pub use listener::{
    AcceptListener, ConnectHandlers, ConnectListener, QueueAcceptListener, QueueConnectHandlers,
    QueueConnectListener, QueueListener, ReadListener, WriteListener,
};
pub use queue::MessageQueue;
pub use queue_broker::{QueueBroker, CTRL_REGULAR, CTRL_UNBIND};
