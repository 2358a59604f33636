//! Process-wide broker-name registry.
//!
//! Brokers register a globally unique name here so `connect` can reach them.
//! The registry is a concurrent map behind an `Arc`, cheap to clone and safe
//! to share across threads. Each execution model keeps a lazily-initialized
//! process-wide instance, but brokers also take an explicit registry so the
//! core stays testable in isolation.
//!
//! Names are never removed: a registered broker stays reachable for the
//! lifetime of the process.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Error, Result};

/// Concurrent name -> broker map.
///
/// Generic over the broker handle type so both execution models share one
/// implementation.
pub struct BrokerRegistry<B> {
    brokers: Arc<DashMap<String, B>>,
}

impl<B> BrokerRegistry<B> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            brokers: Arc::new(DashMap::new()),
        }
    }

    /// Stores `broker` under `name`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NameTaken`] if the name is already registered.
    /// The check-and-insert is atomic, so two racing registrations of the
    /// same name cannot both succeed.
    pub fn register(&self, name: &str, broker: B) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.brokers.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::NameTaken(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(broker);
                tracing::debug!(name, "broker registered");
                Ok(())
            }
        }
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.brokers.contains_key(name)
    }

    /// Number of registered brokers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.brokers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }
}

impl<B: Clone> BrokerRegistry<B> {
    /// Looks up the broker registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<B> {
        self.brokers.get(name).map(|entry| entry.value().clone())
    }
}

impl<B> Clone for BrokerRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            brokers: Arc::clone(&self.brokers),
        }
    }
}

impl<B> Default for BrokerRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let registry = BrokerRegistry::new();
        registry.register("alpha", 1u32).unwrap();
        registry.register("beta", 2u32).unwrap();

        assert_eq!(registry.lookup("alpha"), Some(1));
        assert_eq!(registry.lookup("beta"), Some(2));
        assert_eq!(registry.lookup("gamma"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let registry = BrokerRegistry::new();
        registry.register("alpha", 1u32).unwrap();

        let err = registry.register("alpha", 2u32).unwrap_err();
        assert!(matches!(err, Error::NameTaken(name) if name == "alpha"));
        // the original registration survives
        assert_eq!(registry.lookup("alpha"), Some(1));
    }

    #[test]
    fn clones_share_state() {
        let registry = BrokerRegistry::new();
        let other = registry.clone();
        registry.register("alpha", 1u32).unwrap();
        assert_eq!(other.lookup("alpha"), Some(1));
    }

    #[test]
    fn instances_are_isolated() {
        let one: BrokerRegistry<u32> = BrokerRegistry::new();
        let two: BrokerRegistry<u32> = BrokerRegistry::new();
        one.register("alpha", 1).unwrap();
        assert!(!two.contains("alpha"));
    }
}
