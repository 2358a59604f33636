//! Blocking full-duplex channel over a cross-linked ring pair.
//!
//! A connected pair is two [`Channel`] handles into one shared [`Link`]. The
//! link owns both rings, so one side's read ring is the other side's write
//! ring and the cross-link invariant holds structurally. Each ring has its
//! own mutex and condvar; readers park while their ring is empty, writers
//! while theirs is full, and every mutation wakes the ring's waiters.
//!
//! Disconnection is a flag, not deletion: either side may disconnect at any
//! time, both flags are observed by the wait loops, and the link is freed
//! only when both handles drop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crosslink_core::ring::RingBuffer;
use crosslink_core::{Error, Result};

/// Which end of a link a handle is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Side {
    A,
    B,
}

impl Side {
    pub(crate) fn peer(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// One ring plus its monitor.
struct Buffer {
    ring: Mutex<RingBuffer>,
    ready: Condvar,
}

impl Buffer {
    fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(RingBuffer::with_capacity(capacity)),
            ready: Condvar::new(),
        }
    }
}

/// Shared state of a linked channel pair.
///
/// `buffers[0]` carries A -> B traffic, `buffers[1]` carries B -> A.
/// `names[0]` is A's broker name, `names[1]` is B's.
struct Link {
    port: u16,
    names: [String; 2],
    buffers: [Buffer; 2],
    disconnected: [AtomicBool; 2],
}

impl Link {
    fn buffer(&self, side: Side) -> &Buffer {
        &self.buffers[side.index()]
    }

    fn flag(&self, side: Side) -> &AtomicBool {
        &self.disconnected[side.index()]
    }
}

/// One end of a connected channel pair.
pub struct Channel {
    link: Arc<Link>,
    side: Side,
}

impl Channel {
    /// Builds a linked pair. The first handle belongs to the broker named
    /// `a_name`, the second to `b_name`.
    pub(crate) fn pair(a_name: &str, b_name: &str, port: u16, capacity: usize) -> (Self, Self) {
        let link = Arc::new(Link {
            port,
            names: [a_name.to_string(), b_name.to_string()],
            buffers: [Buffer::new(capacity), Buffer::new(capacity)],
            disconnected: [AtomicBool::new(false), AtomicBool::new(false)],
        });
        (
            Self {
                link: Arc::clone(&link),
                side: Side::A,
            },
            Self {
                link,
                side: Side::B,
            },
        )
    }

    /// Reads up to `buf.len()` bytes, blocking while nothing is available.
    ///
    /// Short reads are legal and expected: once at least one byte is
    /// available, whatever is there (up to `buf.len()`) is returned.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Disconnected`] if this end is disconnected, or
    /// once the peer is disconnected and the incoming ring has drained (this
    /// end disconnects itself in that case).
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.disconnected() {
            return Err(Error::Disconnected);
        }
        let incoming = self.link.buffer(self.side.peer());
        let mut ring = incoming.ring.lock();
        while ring.empty() {
            if self.disconnected() || self.peer_disconnected() {
                drop(ring);
                self.disconnect();
                return Err(Error::Disconnected);
            }
            incoming.ready.wait(&mut ring);
        }
        let count = ring.pull_into(buf);
        // wake writers parked on a full ring (and any other reader)
        incoming.ready.notify_all();
        Ok(count)
    }

    /// Writes up to `buf.len()` bytes, blocking while the outgoing ring is
    /// full. Returns the number of bytes accepted (a short write is legal).
    ///
    /// If the peer disconnected while the ring is full, returns `Ok(0)`
    /// without erroring so a writer can drain once; if the peer disconnected
    /// and the incoming ring has drained, this end disconnects itself and
    /// errors.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Disconnected`] as described above.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.disconnected() {
            return Err(Error::Disconnected);
        }
        if self.peer_disconnected() && self.incoming_drained() {
            self.disconnect();
            return Err(Error::Disconnected);
        }
        let outgoing = self.link.buffer(self.side);
        let mut ring = outgoing.ring.lock();
        while ring.full() {
            if self.disconnected() {
                return Err(Error::Disconnected);
            }
            if self.peer_disconnected() {
                return Ok(0);
            }
            outgoing.ready.wait(&mut ring);
        }
        let count = ring.push_from(buf);
        outgoing.ready.notify_all();
        Ok(count)
    }

    /// Disconnects this end and wakes every thread parked on either ring.
    ///
    /// Idempotent and thread-safe; the peer observes the flag on its next
    /// read or write.
    pub fn disconnect(&self) {
        if self.link.flag(self.side).swap(true, Ordering::SeqCst) {
            return;
        }
        trace!(channel = %self, "disconnected");
        for buffer in &self.link.buffers {
            // taking the lock orders the flag store before any future wait
            let _ring = buffer.ring.lock();
            buffer.ready.notify_all();
        }
    }

    /// Returns true once this end is disconnected.
    #[must_use]
    pub fn disconnected(&self) -> bool {
        self.link.flag(self.side).load(Ordering::SeqCst)
    }

    fn peer_disconnected(&self) -> bool {
        self.link.flag(self.side.peer()).load(Ordering::SeqCst)
    }

    // Checked before taking the outgoing lock so two writers never hold both
    // ring locks at once.
    fn incoming_drained(&self) -> bool {
        self.link.buffer(self.side.peer()).ring.lock().empty()
    }

    /// Name of the broker owning the other end.
    #[must_use]
    pub fn remote_name(&self) -> &str {
        &self.link.names[self.side.peer().index()]
    }

    /// Name of the broker owning this end.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.link.names[self.side.index()]
    }

    /// Port the pair was matched on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.link.port
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{port}-{}:{port}",
            self.local_name(),
            self.remote_name(),
            port = self.link.port
        )
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel[{self}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn bytes_cross_the_link_in_order() {
        let (a, b) = Channel::pair("a", "b", 80, 256);
        let payload: Vec<u8> = (0..50).collect();
        assert_eq!(a.write(&payload).unwrap(), 50);

        let mut buf = [0u8; 50];
        let mut read = 0;
        while read < 50 {
            read += b.read(&mut buf[read..]).unwrap();
        }
        assert_eq!(&buf[..], &payload[..]);
    }

    #[test]
    fn both_directions_are_independent() {
        let (a, b) = Channel::pair("a", "b", 80, 16);
        a.write(b"ping").unwrap();
        b.write(b"pong").unwrap();

        let mut buf = [0u8; 4];
        b.read(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        a.read(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn transfer_larger_than_capacity() {
        let (a, b) = Channel::pair("a", "b", 80, 8);
        let payload: Vec<u8> = (0..=255).cycle().take(1024).collect();
        let expected = payload.clone();

        let writer = thread::spawn(move || {
            let mut sent = 0;
            while sent < payload.len() {
                sent += a.write(&payload[sent..]).unwrap();
            }
        });

        let mut received = Vec::with_capacity(1024);
        let mut chunk = [0u8; 32];
        while received.len() < 1024 {
            let n = b.read(&mut chunk).unwrap();
            received.extend_from_slice(&chunk[..n]);
        }
        writer.join().unwrap();
        assert_eq!(received, expected);
    }

    #[test]
    fn read_errors_once_peer_gone_and_drained() {
        let (a, b) = Channel::pair("a", "b", 80, 16);
        a.write(b"last").unwrap();
        a.disconnect();

        let mut buf = [0u8; 16];
        // the buffered bytes are still readable
        assert_eq!(b.read(&mut buf).unwrap(), 4);
        // then the disconnect surfaces and sticks
        assert!(matches!(b.read(&mut buf), Err(Error::Disconnected)));
        assert!(b.disconnected());
    }

    #[test]
    fn write_returns_zero_when_peer_gone_while_full() {
        let (a, b) = Channel::pair("a", "b", 80, 4);
        // fill the outgoing ring (3 usable slots), leave it unread
        assert_eq!(a.write(&[1, 2, 3, 4]).unwrap(), 3);
        b.disconnect();
        assert_eq!(a.write(&[5]).unwrap(), 0);
    }

    #[test]
    fn disconnect_unblocks_a_parked_reader() {
        let (a, b) = Channel::pair("a", "b", 80, 16);
        let reader = thread::spawn(move || {
            let mut buf = [0u8; 8];
            b.read(&mut buf)
        });
        thread::sleep(Duration::from_millis(50));
        a.disconnect();
        let result = reader.join().unwrap();
        assert!(matches!(result, Err(Error::Disconnected)));
    }

    #[test]
    fn disconnect_unblocks_a_parked_writer() {
        let (a, b) = Channel::pair("a", "b", 80, 4);
        assert_eq!(a.write(&[1, 2, 3]).unwrap(), 3);
        let writer = thread::spawn(move || a.write(&[4, 5, 6]));
        thread::sleep(Duration::from_millis(50));
        b.disconnect();
        // peer disconnected while the ring was full: a drain-once zero write
        assert_eq!(writer.join().unwrap().unwrap(), 0);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (a, _b) = Channel::pair("a", "b", 80, 16);
        a.disconnect();
        a.disconnect();
        assert!(a.disconnected());
    }

    #[test]
    fn metadata_accessors() {
        let (a, b) = Channel::pair("left", "right", 4242, 16);
        assert_eq!(a.local_name(), "left");
        assert_eq!(a.remote_name(), "right");
        assert_eq!(b.remote_name(), "left");
        assert_eq!(b.port(), 4242);
    }
}
