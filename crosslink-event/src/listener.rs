//! Listener contracts invoked by the event-driven components.
//!
//! Every listener is invoked as a task posted to the executor, never inline
//! from the call that triggered it, and never concurrently for the same
//! channel or queue. Single-method listeners have blanket closure impls;
//! two-method listeners come with closure-pair adapters.

use bytes::Bytes;

use super::channel::Channel;
use super::queue::MessageQueue;

/// Completion of one read request, with exactly the bytes read.
pub trait ReadListener: Send + 'static {
    fn on_read(self: Box<Self>, data: Bytes);
}

impl<F: FnOnce(Bytes) + Send + 'static> ReadListener for F {
    fn on_read(self: Box<Self>, data: Bytes) {
        (*self)(data)
    }
}

/// Completion of one write request: the submitted data and how many of its
/// bytes were accepted this round (a short count means resubmit the rest).
pub trait WriteListener: Send + 'static {
    fn on_written(self: Box<Self>, data: Bytes, written: usize);
}

impl<F: FnOnce(Bytes, usize) + Send + 'static> WriteListener for F {
    fn on_written(self: Box<Self>, data: Bytes, written: usize) {
        (*self)(data, written)
    }
}

/// Completion of a pending accept.
pub trait AcceptListener: Send + 'static {
    fn on_accepted(self: Box<Self>, channel: Channel);
}

impl<F: FnOnce(Channel) + Send + 'static> AcceptListener for F {
    fn on_accepted(self: Box<Self>, channel: Channel) {
        (*self)(channel)
    }
}

/// Completion of a pending connect.
///
/// `on_refused` exists for symmetry with the queue layer; the broker itself
/// reports an unknown name synchronously (`connect` returns false) and never
/// invokes it.
pub trait ConnectListener: Send + 'static {
    fn on_connected(self: Box<Self>, channel: Channel);
    fn on_refused(self: Box<Self>);
}

/// Adapter turning a pair of closures into a [`ConnectListener`].
pub struct ConnectHandlers<C, R> {
    pub connected: C,
    pub refused: R,
}

impl<C, R> ConnectListener for ConnectHandlers<C, R>
where
    C: FnOnce(Channel) + Send + 'static,
    R: FnOnce() + Send + 'static,
{
    fn on_connected(self: Box<Self>, channel: Channel) {
        let Self { connected, .. } = *self;
        connected(channel);
    }

    fn on_refused(self: Box<Self>) {
        let Self { refused, .. } = *self;
        refused();
    }
}

/// Continuous reception on a message queue.
pub trait QueueListener: Send + 'static {
    /// One complete message.
    fn on_message(&mut self, msg: Bytes);
    /// The queue closed; fired exactly once.
    fn on_closed(&mut self);
}

/// Invoked for every regular connection accepted on a bound port.
pub trait QueueAcceptListener: Send + 'static {
    fn on_accepted(&mut self, queue: MessageQueue);
}

impl<F: FnMut(MessageQueue) + Send + 'static> QueueAcceptListener for F {
    fn on_accepted(&mut self, queue: MessageQueue) {
        self(queue)
    }
}

/// Outcome of a queue-broker connect.
pub trait QueueConnectListener: Send + 'static {
    fn on_connected(self: Box<Self>, queue: MessageQueue);
    fn on_refused(self: Box<Self>);
}

/// Adapter turning a pair of closures into a [`QueueConnectListener`].
pub struct QueueConnectHandlers<C, R> {
    pub connected: C,
    pub refused: R,
}

impl<C, R> QueueConnectListener for QueueConnectHandlers<C, R>
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
