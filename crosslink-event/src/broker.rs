//! Event-driven rendez-vous broker.
//!
//! Matching is driven entirely by `accept`/`connect` calls; nothing blocks.
//! An unmatched accept parks its listener in the port table (one per port at
//! most); unmatched connects queue FIFO per port. When the two sides meet,
//! the broker builds one linked channel pair and posts both completion
//! tasks — listeners only ever run as scheduled tasks, so a completion can
//! never reenter the port table mid-update.
//!
//! Registration calls may come from arbitrary threads; the port table has
//! its own lock, and cross-broker matching happens under the target
//! broker's lock.

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::trace;

use crosslink_core::executor::ExecutorHandle;
use crosslink_core::registry::BrokerRegistry;
use crosslink_core::ring::DEFAULT_CAPACITY;
use crosslink_core::{Error, Result};

use super::channel::Channel;
use super::listener::{AcceptListener, ConnectListener};

static GLOBAL_REGISTRY: Lazy<BrokerRegistry<Broker>> = Lazy::new(BrokerRegistry::new);

/// Process-wide registry used by [`Broker::new`].
#[must_use]
pub fn global_registry() -> &'static BrokerRegistry<Broker> {
    &GLOBAL_REGISTRY
}

struct PendingConnect {
    // broker name of the connecting side, for labeling the pair
    origin: String,
    listener: Box<dyn ConnectListener>,
}

#[derive(Default)]
struct PortTable {
    accepting: HashMap<u16, Box<dyn AcceptListener>>,
    connecting: HashMap<u16, VecDeque<PendingConnect>>,
}

/// Named endpoint matching `accept` and `connect` into channel pairs.
///
/// Cheap to clone; all clones are the same broker.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    name: String,
    capacity: usize,
    executor: ExecutorHandle,
    registry: BrokerRegistry<Broker>,
    ports: Mutex<PortTable>,
}

impl Broker {
    /// Creates a broker registered in the process-wide registry.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NameTaken`] if the name is already in use.
    pub fn new(name: &str, executor: ExecutorHandle) -> Result<Self> {
        Self::with_registry(name, executor, global_registry().clone())
    }

    /// Creates a broker registered in an explicit registry (isolated tests,
    /// embedded setups).
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NameTaken`] if the name is already in use.
    pub fn with_registry(
        name: &str,
        executor: ExecutorHandle,
        registry: BrokerRegistry<Broker>,
    ) -> Result<Self> {
        let broker = Self {
            inner: Arc::new(BrokerInner {
                name: name.to_string(),
                capacity: DEFAULT_CAPACITY,
                executor,
                registry: registry.clone(),
                ports: Mutex::new(PortTable::default()),
            }),
        };
        registry.register(name, broker.clone())?;
        Ok(broker)
    }

    /// This broker's registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn executor(&self) -> ExecutorHandle {
        Arc::clone(&self.inner.executor)
    }

    pub(crate) fn knows(&self, name: &str) -> bool {
        // the registry only ever grows, so a positive answer stays true
        self.inner.registry.contains(name)
    }

    /// Registers `listener` to accept one connection on `port`. If a connect
    /// listener is already queued, the oldest one is matched immediately and
    /// both completions are posted.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AcceptPending`] if a listener is already
    /// accepting on this port.
    pub fn accept(&self, port: u16, listener: impl AcceptListener) -> Result<()> {
        let mut ports = self.inner.ports.lock();
        if ports.accepting.contains_key(&port) {
            return Err(Error::AcceptPending(port));
        }
        let waiting = ports
            .connecting
            .get_mut(&port)
            .and_then(VecDeque::pop_front);
        match waiting {
            Some(pending) => {
                trace!(port, peer = pending.origin.as_str(), "accept matched a queued connect");
                self.complete(Box::new(listener), pending, port);
            }
            None => {
                ports.accepting.insert(port, Box::new(listener));
            }
        }
        Ok(())
    }

    /// Connects to port `port` of the broker registered under `name`.
    /// Returns false if no broker has that name (the listener is then never
    /// invoked). If the target has an accept pending, both completions are
    /// posted; otherwise the listener queues FIFO behind earlier connects.
    pub fn connect(&self, name: &str, port: u16, listener: impl ConnectListener) -> bool {
        let Some(target) = self.inner.registry.lookup(name) else {
            return false;
        };
        let pending = PendingConnect {
            origin: self.name().to_string(),
            listener: Box::new(listener),
        };
        let mut ports = target.inner.ports.lock();
        match ports.accepting.remove(&port) {
            Some(accept_listener) => {
                trace!(port, peer = pending.origin.as_str(), "connect matched a pending accept");
                target.complete(accept_listener, pending, port);
            }
            None => {
                ports
                    .connecting
                    .entry(port)
                    .or_default()
                    .push_back(pending);
            }
        }
        true
    }

    /// Builds the linked pair and posts both completions. `self` is always
    /// the accepting broker.
    fn complete(&self, accept_listener: Box<dyn AcceptListener>, pending: PendingConnect, port: u16) {
        let (accept_channel, connect_channel) = Channel::pair(
            self.name(),
            &pending.origin,
            port,
            self.inner.capacity,
            self.executor(),
        );
        let executor = &self.inner.executor;
        executor.post(Box::new(move || {
            accept_listener.on_accepted(accept_channel);
        }));
        let connect_listener = pending.listener;
        executor.post(Box::new(move || {
            connect_listener.on_connected(connect_channel);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ConnectHandlers;
    use crate::test_support::ManualExecutor;
    use bytes::Bytes;
    use std::sync::Mutex as StdMutex;

    fn pair_of_brokers() -> (Broker, Broker, Arc<ManualExecutor>) {
        let executor = ManualExecutor::new();
        let registry = BrokerRegistry::new();
        let a = Broker::with_registry("a", executor.as_handle(), registry.clone()).unwrap();
        let b = Broker::with_registry("b", executor.as_handle(), registry).unwrap();
        (a, b, executor)
    }

    #[test]
    fn accept_then_connect() {
        let (a, b, executor) = pair_of_brokers();
        let accepted = Arc::new(StdMutex::new(None));
        let connected = Arc::new(StdMutex::new(None));

        let sink = Arc::clone(&accepted);
        b.accept(80, move |channel: Channel| {
            *sink.lock().unwrap() = Some(channel);
        })
        .unwrap();

        let sink = Arc::clone(&connected);
        assert!(a.connect(
            "b",
            80,
            ConnectHandlers {
                connected: move |channel: Channel| *sink.lock().unwrap() = Some(channel),
                refused: || panic!("never refused"),
            },
        ));
        // completions are posted, not inline
        assert!(accepted.lock().unwrap().is_none());
        executor.run_until_idle();

        let accepted = accepted.lock().unwrap().take().unwrap();
        let connected = connected.lock().unwrap().take().unwrap();
        assert_eq!(accepted.remote_name(), "a");
        assert_eq!(connected.remote_name(), "b");
        assert_eq!(accepted.port(), 80);
    }

    #[test]
    fn connect_then_accept() {
        let (a, b, executor) = pair_of_brokers();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        assert!(a.connect(
            "b",
            80,
            ConnectHandlers {
                connected: move |channel: Channel| sink.lock().unwrap().push(channel),
                refused: || panic!("never refused"),
            },
        ));
        executor.run_until_idle();
        assert!(seen.lock().unwrap().is_empty(), "connect must queue");

        let sink = Arc::clone(&seen);
        b.accept(80, move |channel: Channel| sink.lock().unwrap().push(channel))
            .unwrap();
        executor.run_until_idle();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn second_accept_on_same_port_fails() {
        let (_a, b, _executor) = pair_of_brokers();
        b.accept(80, |_channel: Channel| {}).unwrap();
        assert!(matches!(
            b.accept(80, |_channel: Channel| {}),
            Err(Error::AcceptPending(80))
        ));
    }

    #[test]
    fn unknown_name_returns_false_without_invoking() {
        let (a, _b, executor) = pair_of_brokers();
        assert!(!a.connect(
            "nowhere",
            80,
            ConnectHandlers {
                connected: |_channel: Channel| panic!("never invoked"),
                refused: || panic!("never invoked"),
            },
        ));
        executor.run_until_idle();
    }

    #[test]
    fn queued_connects_match_fifo() {
        let (a, b, executor) = pair_of_brokers();
        let order = Arc::new(StdMutex::new(Vec::new()));

        for tag in 0..3u8 {
            let order = Arc::clone(&order);
            assert!(a.connect(
                "b",
                80,
                ConnectHandlers {
                    connected: move |channel: Channel| {
                        order.lock().unwrap().push(tag);
                        // identify ourselves so the data path is covered too
                        channel
                            .write(Bytes::from(vec![tag]), |_d: Bytes, _w: usize| {})
                            .unwrap();
                    },
                    refused: || panic!("never refused"),
                },
            ));
        }
        for _ in 0..3 {
            b.accept(80, |_channel: Channel| {}).unwrap();
            executor.run_until_idle();
        }
        assert_eq!(order.lock().unwrap().as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn end_to_end_bytes_across_brokers() {
        let (a, b, executor) = pair_of_brokers();
        let received = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&received);
        b.accept(80, move |channel: Channel| {
            fn pump(channel: &Channel, sink: Arc<StdMutex<Vec<u8>>>) {
                let retry = channel.clone();
                channel
                    .read(50, move |data: Bytes| {
                        let mut sink_guard = sink.lock().unwrap();
                        sink_guard.extend_from_slice(&data);
                        let done = sink_guard.len() >= 50;
                        drop(sink_guard);
                        if !done {
                            pump(&retry, sink);
                        }
                    })
                    .unwrap();
            }
            pump(&channel, sink);
        })
        .unwrap();

        assert!(a.connect(
            "b",
            80,
            ConnectHandlers {
                connected: |channel: Channel| {
                    let payload: Vec<u8> = (0..50).collect();
                    channel
                        .write(Bytes::from(payload), |_d: Bytes, _w: usize| {})
                        .unwrap();
                },
                refused: || panic!("never refused"),
            },
        ));
        executor.run_until_idle();

        let expected: Vec<u8> = (0..50).collect();
        assert_eq!(*received.lock().unwrap(), expected);
    }
}
