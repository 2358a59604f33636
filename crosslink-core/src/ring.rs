//! Fixed-capacity byte ring, the unit of flow control.
//!
//! One slot is sacrificed to tell a full ring from an empty one:
//! `head == tail` is empty and `(head + 1) % capacity == tail` is full, so a
//! ring of capacity C stores at most C - 1 bytes.
//!
//! The event model installs readiness hooks at construction time. Hooks are
//! edge-triggered: a push into a previously-empty ring fires `on_readable`, a
//! pull from a previously-full ring fires `on_writable`, and steady-state
//! transitions fire nothing, so hook volume is bounded by state-edge
//! crossings. A hook runs under whatever lock guards the ring; it must only
//! post work, never run it.

use std::fmt;

use thiserror::Error;

/// Ring capacity used by channels unless overridden.
pub const DEFAULT_CAPACITY: usize = 256;

/// Ring state errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    /// No free slot left
    #[error("ring buffer full")]
    Full,

    /// No byte available
    #[error("ring buffer empty")]
    Empty,
}

/// Readiness hook fired on an edge transition.
pub type ReadinessHook = Box<dyn Fn() + Send>;

/// Fixed-capacity circular byte store.
pub struct RingBuffer {
    bytes: Box<[u8]>,
    head: usize,
    tail: usize,
    on_readable: Option<ReadinessHook>,
    on_writable: Option<ReadinessHook>,
}

impl RingBuffer {
    /// Creates a ring with [`DEFAULT_CAPACITY`] slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a ring with `capacity` slots, storing up to `capacity - 1`
    /// bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity < 2`: a one-slot ring could never hold a byte.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 2, "ring capacity must be at least 2");
        Self {
            bytes: vec![0; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            on_readable: None,
            on_writable: None,
        }
    }

    /// Installs the hook fired when a push makes the ring non-empty.
    pub fn set_readable_hook(&mut self, hook: ReadinessHook) {
        self.on_readable = Some(hook);
    }

    /// Installs the hook fired when a pull makes the ring non-full.
    pub fn set_writable_hook(&mut self, hook: ReadinessHook) {
        self.on_writable = Some(hook);
    }

    /// Total number of slots (one of which is never stored into).
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Number of bytes currently stored.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        (self.head + self.bytes.len() - self.tail) % self.bytes.len()
    }

    /// Returns true if no byte is stored.
    #[inline]
    #[must_use]
    pub fn empty(&self) -> bool {
        self.tail == self.head
    }

    /// Returns true if no free slot is left.
    #[inline]
    #[must_use]
    pub fn full(&self) -> bool {
        (self.head + 1) % self.bytes.len() == self.tail
    }

    /// Stores one byte.
    ///
    /// # Errors
    ///
    /// Fails with [`RingError::Full`] when no slot is free.
    pub fn push(&mut self, byte: u8) -> Result<(), RingError> {
        let next = (self.head + 1) % self.bytes.len();
        if next == self.tail {
            return Err(RingError::Full);
        }
        let was_empty = self.empty();
        self.bytes[self.head] = byte;
        self.head = next;
        if was_empty {
            if let Some(hook) = &self.on_readable {
                hook();
            }
        }
        Ok(())
    }

    /// Takes the oldest stored byte.
    ///
    /// # Errors
    ///
    /// Fails with [`RingError::Empty`] when nothing is stored.
    pub fn pull(&mut self) -> Result<u8, RingError> {
        if self.tail == self.head {
            return Err(RingError::Empty);
        }
        let was_full = self.full();
        let byte = self.bytes[self.tail];
        self.tail = (self.tail + 1) % self.bytes.len();
        if was_full {
            if let Some(hook) = &self.on_writable {
                hook();
            }
        }
        Ok(byte)
    }

    /// Pushes from `src` until the ring fills or `src` runs out; returns the
    /// number of bytes stored.
    pub fn push_from(&mut self, src: &[u8]) -> usize {
        let mut count = 0;
        while count < src.len() {
            match self.push(src[count]) {
                Ok(()) => count += 1,
                Err(_) => break,
            }
        }
        count
    }

    /// Pulls into `dst` until the ring drains or `dst` fills; returns the
    /// number of bytes taken.
    pub fn pull_into(&mut self, dst: &mut [u8]) -> usize {
        let mut count = 0;
        while count < dst.len() {
            match self.pull() {
                Ok(byte) => {
                    dst[count] = byte;
                    count += 1;
                }
                Err(_) => break,
            }
        }
        count
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
