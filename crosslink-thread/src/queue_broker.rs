//! bind/unbind/connect for message queues over the blocking broker.
//!
//! Every accepted queue opens with a one-byte control message:
//! [`CTRL_UNBIND`] tells the accept loop to stop (an unbind travels as an
//! ordinary connection to oneself), anything else marks a regular connection
//! that is handed to the bind listener.
//!
//! The blocking model has no executor, so listeners run on the queue
//! broker's internal worker threads; `bind`, `unbind` and `connect` never
//! block the caller.

use std::fmt;
use std::sync::Arc;
use std::thread;

use hashbrown::HashSet;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::broker::Broker;
use super::queue::MessageQueue;

/// Control payload value stopping a bind's accept loop.
pub const CTRL_UNBIND: u8 = 0;
/// Control payload value opening a regular connection.
pub const CTRL_REGULAR: u8 = 1;

/// Invoked (on a worker thread) for every regular connection accepted on a
/// bound port.
pub trait QueueAcceptListener: Send + 'static {
    fn on_accepted(&mut self, queue: MessageQueue);
}

impl<F: FnMut(MessageQueue) + Send + 'static> QueueAcceptListener for F {
    fn on_accepted(&mut self, queue: MessageQueue) {
        self(queue)
    }
}

/// Invoked (on a worker thread) with the outcome of a connect.
pub trait QueueConnectListener: Send + 'static {
    fn on_connected(self: Box<Self>, queue: MessageQueue);
    fn on_refused(self: Box<Self>);
}

/// Adapter turning a pair of closures into a [`QueueConnectListener`].
pub struct ConnectHandlers<C, R> {
    pub connected: C,
    pub refused: R,
}

impl<C, R> QueueConnectListener for ConnectHandlers<C, R>
where
    C: FnOnce(MessageQueue) + Send + 'static,
    R: FnOnce() + Send + 'static,
{
    fn on_connected(self: Box<Self>, queue: MessageQueue) {
        let Self { connected, .. } = *self;
        connected(queue);
    }

    fn on_refused(self: Box<Self>) {
        let Self { refused, .. } = *self;
        refused();
    }
}

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
    // unbind signalled but not yet observed by the accept loop
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
    /// delivering each regular queue to `listener`. Returns false if the
    /// port is already bound (or still draining a previous unbind).
    pub fn bind<L: QueueAcceptListener>(&self, port: u16, listener: L) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.bound.contains(&port) || state.draining.contains(&port) {
                return false;
            }
            state.bound.insert(port);
        }
        debug!(name = self.name(), port, "port bound");

        let inner = Arc::clone(&self.inner);
        let mut listener = listener;
        let spawned = thread::Builder::new()
            .name(format!("crosslink-bind-{port}"))
            .spawn(move || loop {
                let channel = match inner.broker.accept(port) {
                    Ok(channel) => channel,
                    Err(err) => {
                        // the loop owns this port's accept slot
                        warn!(port, %err, "bind accept loop aborted");
                        break;
                    }
                };
                let queue = MessageQueue::new(channel);
                match queue.receive() {
                    Ok(control) if control.as_ref() == [CTRL_UNBIND] => {
                        queue.close();
                        let mut state = inner.state.lock();
                        state.bound.remove(&port);
                        state.draining.remove(&port);
                        debug!(port, "accept loop stopped");
                        break;
                    }
                    Ok(_control) => {
                        listener.on_accepted(queue);
                        let state = inner.state.lock();
                        if !state.bound.contains(&port) && !state.draining.contains(&port) {
                            break;
                        }
                    }
                    Err(_) => {
                        // peer vanished before sending its control byte
                        queue.close();
                        let state = inner.state.lock();
                        if !state.bound.contains(&port) && !state.draining.contains(&port) {
                            break;
                        }
                    }
                }
            });
        if spawned.is_err() {
            let mut state = self.inner.state.lock();
            state.bound.remove(&port);
            return false;
        }
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

        let broker = self.inner.broker.clone();
        let name = self.name().to_string();
        let spawned = thread::Builder::new()
            .name(format!("crosslink-unbind-{port}"))
            .spawn(move || match broker.connect(&name, port) {
                Some(channel) => {
                    let queue = MessageQueue::new(channel);
                    if queue.send(&[CTRL_UNBIND]).is_err() {
                        warn!(port, "unbind signal lost");
                    }
                }
                None => warn!(port, "unbind connect refused"),
            });
        if let Err(err) = spawned {
            warn!(port, %err, "failed to spawn unbind worker");
        }
        true
    }

    /// Connects to `port` of the queue broker named `name`; the listener
    /// receives the queue (after the regular-connection payload is sent) or
    /// a refusal when no broker has that name.
    pub fn connect<L: QueueConnectListener>(&self, name: &str, port: u16, listener: L) -> bool {
        let broker = self.inner.broker.clone();
        let remote = name.to_string();
        let listener = Box::new(listener);
        let spawned = thread::Builder::new()
            .name("crosslink-connect".into())
            .spawn(move || match broker.connect(&remote, port) {
                None => listener.on_refused(),
                Some(channel) => {
                    let queue = MessageQueue::new(channel);
                    match queue.send(&[CTRL_REGULAR]) {
                        Ok(()) => listener.on_connected(queue),
                        Err(_) => warn!(remote = %remote, port, "connection lost before handshake"),
                    }
                }
            });
        spawned.is_ok()
    }
}

impl fmt::Debug for QueueBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueBroker")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
