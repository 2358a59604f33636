//! bind/unbind/connect for message queues over the event broker.
//!
//! Every accepted queue opens with a one-byte control message:
//! [`CTRL_UNBIND`] tells the accept cycle to stop (an unbind travels as an
//! ordinary connection to oneself), anything else marks a regular connection
//! that is handed to the bind listener before acceptance is re-armed.
//!
//! A port unbinding stays in a draining set until its accept cycle consumes
//! the unbind payload, so a concurrent bind cannot race the old cycle for
//! the broker's single accept slot.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use hashbrown::HashSet;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::broker::Broker;
use super::channel::Channel;
use super::listener::{
    ConnectHandlers, QueueAcceptListener, QueueConnectListener,
};
use super::queue::MessageQueue;

/// Control payload value stopping a bind's accept cycle.
pub const CTRL_UNBIND: u8 = 0;
/// Control payload value opening a regular connection.
pub const CTRL_REGULAR: u8 = 1;

type SharedAcceptListener = Arc<Mutex<Box<dyn QueueAcceptListener>>>;

/// Broker facade producing [`MessageQueue`]s with bind/unbind semantics.
#[derive(Clone)]
pub struct QueueBroker {
    inner: Arc<QueueBrokerInner>,
}

struct QueueBrokerInner {
    broker: Broker,
    state: Mutex<BindState>,
}

#[derive(Default)]
struct BindState {
    bound: HashSet<u16>,
    // unbind signalled but not yet observed by the accept cycle
    draining: HashSet<u16>,
}

impl QueueBroker {
    /// Layers queue semantics over `broker`.
    #[must_use]
    pub fn new(broker: Broker) -> Self {
        Self {
            inner: Arc::new(QueueBrokerInner {
                broker,
                state: Mutex::new(BindState::default()),
            }),
        }
    }

    /// Name of the underlying broker.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.broker.name()
    }

    /// The underlying broker.
    #[must_use]
    pub fn broker(&self) -> &Broker {
        &self.inner.broker
    }

    /// Accepts connections on `port` until [`unbind`](Self::unbind),
    /// delivering each regular queue to `listener` (as a posted task).
    /// Returns false if the port is already bound (or still draining a
    /// previous unbind).
    pub fn bind(&self, port: u16, listener: impl QueueAcceptListener) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.bound.contains(&port) || state.draining.contains(&port) {
                return false;
            }
            state.bound.insert(port);
        }
        debug!(name = self.name(), port, "port bound");
        let listener: Box<dyn QueueAcceptListener> = Box::new(listener);
        self.arm_accept(port, Arc::new(Mutex::new(listener)));
        true
    }

    /// Stops accepting on `port` by connecting to it and sending the unbind
    /// payload. Returns false if the port is not bound. Queues already
    /// delivered stay connected.
    pub fn unbind(&self, port: u16) -> bool {
        {
            let mut state = self.inner.state.lock();
            if !state.bound.remove(&port) {
                return false;
            }
            state.draining.insert(port);
        }
        debug!(name = self.name(), port, "port unbinding");

        let connected = self.inner.broker.connect(
            self.name(),
            port,
            ConnectHandlers {
                connected: |channel: Channel| {
                    let queue = MessageQueue::new(channel);
                    queue.send(&[CTRL_UNBIND]);
                },
                refused: || {},
            },
        );
        if !connected {
            // unreachable: this broker is registered under its own name
            warn!(port, "unbind connect refused");
            self.inner.state.lock().draining.remove(&port);
            return false;
        }
        true
    }

    /// Connects to `port` of the queue broker named `name`; the listener
    /// receives the queue (after the regular-connection payload is sent) or
    /// a refusal when no broker has that name. All listener invocations are
    /// posted.
    pub fn connect(&self, name: &str, port: u16, listener: impl QueueConnectListener) -> bool {
        if !self.inner.broker.knows(name) {
            let listener: Box<dyn QueueConnectListener> = Box::new(listener);
            self.inner
                .broker
                .executor()
                .post(Box::new(move || listener.on_refused()));
            return false;
        }
        let executor = self.inner.broker.executor();
        let connected = self.inner.broker.connect(
            name,
            port,
            ConnectHandlers {
                connected: move |channel: Channel| {
                    let queue = MessageQueue::new(channel);
                    queue.send(&[CTRL_REGULAR]);
                    let listener: Box<dyn QueueConnectListener> = Box::new(listener);
                    executor.post(Box::new(move || listener.on_connected(queue)));
                },
                refused: || {},
            },
        );
        debug_assert!(connected, "registry entries are never removed");
        connected
    }

    /// Arms one acceptance on `port`; every accepted channel first gives up
    /// its control payload before the cycle decides to deliver or stop.
    fn arm_accept(&self, port: u16, listener: SharedAcceptListener) {
        let queue_broker = self.clone();
        let armed = self.inner.broker.accept(port, move |channel: Channel| {
            queue_broker.on_accepted(port, channel, listener);
        });
        if let Err(err) = armed {
            // the cycle owns this port's accept slot
            warn!(port, %err, "bind accept cycle aborted");
        }
    }

    /// Runs on the dispatch thread for every accepted channel.
    fn on_accepted(&self, port: u16, channel: Channel, listener: SharedAcceptListener) {
        let queue = MessageQueue::new(channel);
        let queue_broker = self.clone();
        let control_queue = queue.clone();
        queue.read_first(move |control: Bytes| {
            if control.as_ref() == [CTRL_UNBIND] {
                control_queue.close();
                let mut state = queue_broker.inner.state.lock();
                state.bound.remove(&port);
                state.draining.remove(&port);
                drop(state);
                debug!(port, "accept cycle stopped");
            } else {
                let deliver = Arc::clone(&listener);
                let delivered = control_queue.clone();
                queue_broker
                    .inner
                    .broker
                    .executor()
                    .post(Box::new(move || {
                        deliver.lock().on_accepted(delivered);
                    }));
                let rearm = {
                    let state = queue_broker.inner.state.lock();
                    state.bound.contains(&port) || state.draining.contains(&port)
                };
                if rearm {
                    queue_broker.arm_accept(port, listener);
                }
            }
        });
    }
}

impl fmt::Debug for QueueBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueBroker")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
