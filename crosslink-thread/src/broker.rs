//! Blocking rendez-vous broker.
//!
//! Per port the broker is in one of three states: no rendez-vous, one-sided
//! (a parked accept or a FIFO queue of parked connects), or matched. An
//! accept matches the oldest waiting connect; a connect matches the single
//! waiting accept. The matching side removes the rendez-vous from the port
//! table before either side leaves it, builds one linked channel pair and
//! hands the parked side its end.

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::trace;

use crosslink_core::registry::BrokerRegistry;
use crosslink_core::ring::DEFAULT_CAPACITY;
use crosslink_core::{Error, Result};

use super::channel::Channel;
use super::rendezvous::{Pending, RendezVous};

static GLOBAL_REGISTRY: Lazy<BrokerRegistry<Broker>> = Lazy::new(BrokerRegistry::new);

/// Process-wide registry used by [`Broker::new`].
#[must_use]
pub fn global_registry() -> &'static BrokerRegistry<Broker> {
    &GLOBAL_REGISTRY
}

enum Matching {
    Matched(Arc<RendezVous>),
    Parked(Arc<RendezVous>),
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
    registry: BrokerRegistry<Broker>,
    ports: Mutex<HashMap<u16, VecDeque<Arc<RendezVous>>>>,
}

impl Broker {
    /// Creates a broker registered in the process-wide registry.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NameTaken`] if the name is already in use.
    pub fn new(name: &str) -> Result<Self> {
        Self::with_registry(name, global_registry().clone())
    }

    /// Creates a broker registered in an explicit registry (isolated tests,
    /// embedded setups).
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NameTaken`] if the name is already in use.
    pub fn with_registry(name: &str, registry: BrokerRegistry<Broker>) -> Result<Self> {
        let broker = Self {
            inner: Arc::new(BrokerInner {
                name: name.to_string(),
                capacity: DEFAULT_CAPACITY,
                registry: registry.clone(),
                ports: Mutex::new(HashMap::new()),
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

    /// Accepts one connection on `port`, blocking until a connect arrives.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AcceptPending`] if another accept is already
    /// parked on this port; at most one accept may be pending per port.
    pub fn accept(&self, port: u16) -> Result<Channel> {
        let matching = {
            let mut ports = self.inner.ports.lock();
            let queue = ports.entry(port).or_default();
            if queue.iter().any(|r| r.has_accept()) {
                return Err(Error::AcceptPending(port));
            }
            match queue.pop_front() {
                // oldest waiting connect, removed before anyone joins
                Some(waiting) => Matching::Matched(waiting),
                None => {
                    let rdv = Arc::new(RendezVous::new(Pending::Accept, self.name().to_string()));
                    queue.push_back(Arc::clone(&rdv));
                    Matching::Parked(rdv)
                }
            }
        };
        match matching {
            Matching::Matched(rdv) => {
                let (accept_channel, connect_channel) =
                    Channel::pair(self.name(), rdv.origin_name(), port, self.inner.capacity);
                trace!(port, peer = rdv.origin_name(), "accept matched a waiting connect");
                rdv.fulfil(connect_channel);
                Ok(accept_channel)
            }
            Matching::Parked(rdv) => Ok(rdv.join()),
        }
    }

    /// Connects to port `port` of the broker registered under `name`,
    /// blocking until an accept arrives. Returns `None` if no broker has
    /// that name. Multiple simultaneous connects to the same (name, port)
    /// are legal and served FIFO against arriving accepts.
    #[must_use]
    pub fn connect(&self, name: &str, port: u16) -> Option<Channel> {
        let target = self.inner.registry.lookup(name)?;
        let matching = {
            let mut ports = target.inner.ports.lock();
            let queue = ports.entry(port).or_default();
            match queue.pop_front() {
                // a parked accept is only ever alone in the queue
                Some(head) if head.has_accept() => Matching::Matched(head),
                head => {
                    if let Some(head) = head {
                        queue.push_front(head);
                    }
                    let rdv = Arc::new(RendezVous::new(Pending::Connect, self.name().to_string()));
                    queue.push_back(Arc::clone(&rdv));
                    Matching::Parked(rdv)
                }
            }
        };
        match matching {
            Matching::Matched(rdv) => {
                let (accept_channel, connect_channel) = Channel::pair(
                    rdv.origin_name(),
                    self.name(),
                    port,
                    target.inner.capacity,
                );
                trace!(port, peer = rdv.origin_name(), "connect matched a waiting accept");
                rdv.fulfil(accept_channel);
                Some(connect_channel)
            }
            Matching::Parked(rdv) => Some(rdv.join()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn pair_of_brokers() -> (Broker, Broker) {
        let registry = BrokerRegistry::new();
        let a = Broker::with_registry("a", registry.clone()).unwrap();
        let b = Broker::with_registry("b", registry).unwrap();
        (a, b)
    }

    #[test]
    fn accept_then_connect() {
        let (a, b) = pair_of_brokers();
        let acceptor = thread::spawn(move || b.accept(80).unwrap());
        thread::sleep(Duration::from_millis(20));
        let connected = a.connect("b", 80).unwrap();
        let accepted = acceptor.join().unwrap();

        assert_eq!(accepted.remote_name(), "a");
        assert_eq!(connected.remote_name(), "b");
        assert_eq!(connected.port(), 80);
    }

    #[test]
    fn connect_then_accept() {
        let (a, b) = pair_of_brokers();
        let connector = thread::spawn(move || a.connect("b", 80).unwrap());
        thread::sleep(Duration::from_millis(20));
        let accepted = b.accept(80).unwrap();
        let connected = connector.join().unwrap();

        let payload: Vec<u8> = (0..50).collect();
        let mut sent = 0;
        while sent < payload.len() {
            sent += connected.write(&payload[sent..]).unwrap();
        }
        let mut buf = [0u8; 50];
        let mut read = 0;
        while read < 50 {
            read += accepted.read(&mut buf[read..]).unwrap();
        }
        assert_eq!(&buf[..], &payload[..]);
    }

    #[test]
    fn second_accept_on_same_port_fails() {
        let (_a, b) = pair_of_brokers();
        let parked = {
            let b = b.clone();
            thread::spawn(move || b.accept(80))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(matches!(b.accept(80), Err(Error::AcceptPending(80))));

        // release the parked accept so the thread can finish
        let registry_peer = b.clone();
        thread::spawn(move || {
            let _ = registry_peer.connect("b", 80);
        });
        parked.join().unwrap().unwrap();
    }

    #[test]
    fn accepts_on_distinct_ports_coexist() {
        let (a, b) = pair_of_brokers();
        let first = {
            let b = b.clone();
            thread::spawn(move || b.accept(80).unwrap())
        };
        let second = {
            let b = b.clone();
            thread::spawn(move || b.accept(81).unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        a.connect("b", 81).unwrap();
        a.connect("b", 80).unwrap();
        first.join().unwrap();
        second.join().unwrap();
    }

    #[test]
    fn unknown_name_is_not_an_error() {
        let (a, _b) = pair_of_brokers();
        assert!(a.connect("nowhere", 80).is_none());
    }

    #[test]
    fn waiting_connects_are_served_fifo() {
        let (a, b) = pair_of_brokers();
        let mut connectors = Vec::new();
        for tag in 0u8..3 {
            let a = a.clone();
            connectors.push(thread::spawn(move || {
                let channel = a.connect("b", 80).unwrap();
                // identify this connector to the acceptor
                channel.write(&[tag]).unwrap();
                let mut ack = [0u8; 1];
                channel.read(&mut ack).unwrap();
            }));
            // give each connect time to park, fixing the arrival order
            thread::sleep(Duration::from_millis(30));
        }

        let mut order = Vec::new();
        for _ in 0..3 {
            let channel = b.accept(80).unwrap();
            let mut tag = [0u8; 1];
            channel.read(&mut tag).unwrap();
            order.push(tag[0]);
            channel.write(&[0xAC]).unwrap();
        }
        for connector in connectors {
            connector.join().unwrap();
        }
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn global_registry_round_trip() {
        // unique names: the global registry is shared by the whole test binary
        let x = Broker::new("broker-global-x").unwrap();
        let _y = Broker::new("broker-global-y").unwrap();
        assert!(Broker::new("broker-global-x").is_err());
        assert!(global_registry().contains("broker-global-y"));
        drop(x);
    }
}
