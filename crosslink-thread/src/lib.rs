//! # Crosslink Thread Model
//!
//! Blocking execution model: one caller thread parks per pending operation,
//! synchronization is monitor-based (mutex + condvar per shared resource).
//!
//! - [`Broker`]: rendez-vous matching of `accept` and `connect` into linked
//!   channel pairs, FIFO per port
//! - [`Channel`]: full-duplex byte stream over a cross-linked ring pair
//! - [`MessageQueue`]: length-prefixed messages over a channel
//! - [`QueueBroker`]: bind/unbind/connect for message queues, unbind
//!   traveling as an ordinary connection with a control payload
//!
//! Wire-level behavior is identical to `crosslink-event`; only the
//! suspension mechanism differs.

#![cfg_attr(not(test), deny(unsafe_code))]
#![allow(clippy::module_name_repetitions)]

pub mod broker;
pub mod channel;
pub mod queue;
pub mod queue_broker;
mod rendezvous;

pub use broker::{global_registry, Broker};
pub use channel::Channel;
pub use queue::MessageQueue;
pub use queue_broker::{
    ConnectHandlers, QueueAcceptListener, QueueBroker, QueueConnectListener, CTRL_REGULAR,
    CTRL_UNBIND,
};
