//! Event-driven full-duplex channel.
//!
//! Each end keeps FIFO read/write request queues and one busy flag per
//! direction, so at most one queued request per direction runs at a time —
//! always as a posted task, never inline. A request that finds its ring
//! empty (or full) stays queued with the busy flag cleared; the ring's
//! edge-triggered readiness hook posts the head again once the state
//! crossing happens. The hooks are installed while the link is built, so no
//! request can ever be enqueued against an unwired ring.
//!
//! The link state lives behind one mutex because `read`/`write`/`disconnect`
//! may be called from arbitrary threads; the lock is never held while a
//! listener runs.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::trace;

use crosslink_core::executor::ExecutorHandle;
use crosslink_core::ring::RingBuffer;
use crosslink_core::{Error, Result};

use super::listener::{ReadListener, WriteListener};

/// Which end of a link a handle is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Side {
    A,
    B,
}

impl Side {
    fn peer(self) -> Self {
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

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Direction {
    Read,
    Write,
}

struct ReadRequest {
    max: usize,
    listener: Box<dyn ReadListener>,
}

struct WriteRequest {
    data: Bytes,
    listener: Box<dyn WriteListener>,
}

#[derive(Default)]
struct EndState {
    disconnected: bool,
    read_queue: VecDeque<ReadRequest>,
    write_queue: VecDeque<WriteRequest>,
    reading: bool,
    writing: bool,
}

/// `rings[0]` carries A -> B traffic, `rings[1]` carries B -> A.
struct LinkState {
    rings: [RingBuffer; 2],
    ends: [EndState; 2],
}

pub(crate) struct Link {
    port: u16,
    names: [String; 2],
    executor: ExecutorHandle,
    state: Mutex<LinkState>,
}

/// Posts a dispatch for `side`'s stalled direction once its ring crosses the
/// readiness edge. Runs under the link lock, so it only posts.
fn readiness_hook(
    link: Weak<Link>,
    executor: ExecutorHandle,
    side: Side,
    direction: Direction,
) -> crosslink_core::ring::ReadinessHook {
    Box::new(move || {
        let link = link.clone();
        executor.post(Box::new(move || {
            if let Some(link) = link.upgrade() {
                link.resume(side, direction);
            }
        }));
    })
}

impl Link {
    /// Re-arms a stalled, non-empty request queue after a readiness edge.
    fn resume(self: &Arc<Self>, side: Side, direction: Direction) {
        let mut state = self.state.lock();
        let end = &mut state.ends[side.index()];
        match direction {
            Direction::Read => {
                if !end.read_queue.is_empty() && !end.reading {
                    end.reading = true;
                    self.post_dispatch(side, Direction::Read);
                }
            }
            Direction::Write => {
                if !end.write_queue.is_empty() && !end.writing {
                    end.writing = true;
                    self.post_dispatch(side, Direction::Write);
                }
            }
        }
    }

    fn post_dispatch(self: &Arc<Self>, side: Side, direction: Direction) {
        let link = Arc::clone(self);
        self.executor.post(Box::new(move || match direction {
            Direction::Read => link.run_read(side),
            Direction::Write => link.run_write(side),
        }));
    }

    /// Executes the head read request of `side`. Runs as a posted task.
    fn run_read(self: &Arc<Self>, side: Side) {
        let mut state = self.state.lock();
        let peer_disconnected = state.ends[side.peer().index()].disconnected;
        let LinkState { rings, ends } = &mut *state;
        let in_ring = &mut rings[side.peer().index()];
        let end = &mut ends[side.index()];

        if end.disconnected {
            end.read_queue.clear();
            end.reading = false;
            return;
        }
        if in_ring.empty() {
            // leave the request queued; the readable hook re-arms the queue
            end.reading = false;
            return;
        }
        let Some(request) = end.read_queue.pop_front() else {
            end.reading = false;
            return;
        };

        let mut data = BytesMut::with_capacity(request.max.min(in_ring.len()));
        while data.len() < request.max {
            match in_ring.pull() {
                Ok(byte) => data.extend_from_slice(&[byte]),
                Err(_) => break,
            }
        }
        let data = data.freeze();
        let listener = request.listener;
        self.executor.post(Box::new(move || listener.on_read(data)));

        if in_ring.empty() && peer_disconnected {
            // nothing left to drain from a dead peer
            end.disconnected = true;
            end.read_queue.clear();
            end.reading = false;
            return;
        }
        if !in_ring.empty() && !end.read_queue.is_empty() {
            // more data and more requests: keep the busy flag up and go on
            self.post_dispatch(side, Direction::Read);
        } else {
            end.reading = false;
        }
    }

    /// Executes the head write request of `side`. Runs as a posted task.
    fn run_write(self: &Arc<Self>, side: Side) {
        let mut state = self.state.lock();
        let peer_disconnected = state.ends[side.peer().index()].disconnected;
        let LinkState { rings, ends } = &mut *state;
        let in_empty = rings[side.peer().index()].empty();
        let out_ring = &mut rings[side.index()];
        let end = &mut ends[side.index()];

        if end.disconnected {
            end.write_queue.clear();
            end.writing = false;
            return;
        }
        if out_ring.full() {
            // leave the request queued; the writable hook re-arms the queue
            end.writing = false;
            return;
        }
        if peer_disconnected && in_empty {
            end.disconnected = true;
            end.write_queue.clear();
            end.writing = false;
            return;
        }
        let Some(request) = end.write_queue.pop_front() else {
            end.writing = false;
            return;
        };

        let mut written = 0;
        while written < request.data.len() {
            match out_ring.push(request.data[written]) {
                Ok(()) => written += 1,
                Err(_) => break,
            }
        }
        let listener = request.listener;
        let data = request.data;
        self.executor
            .post(Box::new(move || listener.on_written(data, written)));

        if !out_ring.full() && !end.write_queue.is_empty() {
            self.post_dispatch(side, Direction::Write);
        } else {
            end.writing = false;
        }
    }
}

/// One end of a connected channel pair.
///
/// Cheap to clone; all clones are the same end.
#[derive(Clone)]
pub struct Channel {
    link: Arc<Link>,
    side: Side,
}

impl Channel {
    /// Builds a linked pair with readiness hooks wired before either handle
    /// exists. The first handle belongs to the broker named `a_name`.
    pub(crate) fn pair(
        a_name: &str,
        b_name: &str,
        port: u16,
        capacity: usize,
        executor: ExecutorHandle,
    ) -> (Self, Self) {
        let link = Arc::new_cyclic(|weak: &Weak<Link>| {
            let mut ab = RingBuffer::with_capacity(capacity);
            ab.set_readable_hook(readiness_hook(
                weak.clone(),
                executor.clone(),
                Side::B,
                Direction::Read,
            ));
            ab.set_writable_hook(readiness_hook(
                weak.clone(),
                executor.clone(),
                Side::A,
                Direction::Write,
            ));
            let mut ba = RingBuffer::with_capacity(capacity);
            ba.set_readable_hook(readiness_hook(
                weak.clone(),
                executor.clone(),
                Side::A,
                Direction::Read,
            ));
            ba.set_writable_hook(readiness_hook(
                weak.clone(),
                executor.clone(),
                Side::B,
                Direction::Write,
            ));
            Link {
                port,
                names: [a_name.to_string(), b_name.to_string()],
                executor,
                state: Mutex::new(LinkState {
                    rings: [ab, ba],
                    ends: [EndState::default(), EndState::default()],
                }),
            }
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

    /// Queues a read of up to `max` bytes; `listener` is posted with exactly
    /// the bytes read (at least one once the ring is non-empty).
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Disconnected`] if this end is already
    /// disconnected; the listener is then never invoked.
    pub fn read(&self, max: usize, listener: impl ReadListener) -> Result<()> {
        let mut state = self.link.state.lock();
        let end = &mut state.ends[self.side.index()];
        if end.disconnected {
            return Err(Error::Disconnected);
        }
        end.read_queue.push_back(ReadRequest {
            max,
            listener: Box::new(listener),
        });
        if !end.reading {
            end.reading = true;
            self.link.post_dispatch(self.side, Direction::Read);
        }
        Ok(())
    }

    /// Queues a write of `data`; `listener` is posted with the submitted
    /// data and the number of bytes accepted this round (resubmit the rest
    /// on a short count).
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Disconnected`] if this end is already
    /// disconnected; the listener is then never invoked.
    pub fn write(&self, data: Bytes, listener: impl WriteListener) -> Result<()> {
        let mut state = self.link.state.lock();
        let end = &mut state.ends[self.side.index()];
        if end.disconnected {
            return Err(Error::Disconnected);
        }
        end.write_queue.push_back(WriteRequest {
            data,
            listener: Box::new(listener),
        });
        if !end.writing {
            end.writing = true;
            self.link.post_dispatch(self.side, Direction::Write);
        }
        Ok(())
    }

    /// Disconnects this end. Idempotent and thread-safe.
    ///
    /// Pending requests of this end are aborted by a posted dispatch (their
    /// listeners are never invoked); the peer observes the flag through its
    /// own dispatches.
    pub fn disconnect(&self) {
        let mut state = self.link.state.lock();
        let end = &mut state.ends[self.side.index()];
        if end.disconnected {
            return;
        }
        end.disconnected = true;
        trace!(channel = %self, "disconnected");
        if !end.read_queue.is_empty() && !end.reading {
            end.reading = true;
            self.link.post_dispatch(self.side, Direction::Read);
        }
        if !end.write_queue.is_empty() && !end.writing {
            end.writing = true;
            self.link.post_dispatch(self.side, Direction::Write);
        }
    }

    /// Returns true once this end is disconnected.
    #[must_use]
    pub fn disconnected(&self) -> bool {
        self.link.state.lock().ends[self.side.index()].disconnected
    }

    pub(crate) fn executor(&self) -> ExecutorHandle {
        Arc::clone(&self.link.executor)
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
