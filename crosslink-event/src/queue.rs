//! Event-driven message queue: length-prefixed framing over a channel.
//!
//! Reception is a pump: chunked channel reads feed a persistent frame
//! decoder, and every complete message is posted to the queue listener.
//! Sending serializes whole frames through an internal queue so concurrent
//! `send` calls can never interleave a split frame; partial writes are
//! resubmitted from the write-completion callback.
//!
//! The queue lock is never held while a listener runs: deliveries take the
//! listener out, invoke it, and put it back, which is safe because all
//! deliveries run sequentially on the dispatch thread.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use crosslink_core::executor::ExecutorHandle;
use crosslink_core::frame::{self, FrameDecoder};

use super::channel::Channel;
use super::listener::QueueListener;

// Chunk size requested from the channel by the read pump.
const READ_CHUNK: usize = 256;

type FirstMessageHook = Box<dyn FnOnce(Bytes) + Send>;

/// Framed messaging endpoint over one [`Channel`].
///
/// Cheap to clone; all clones are the same queue.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    channel: Channel,
    executor: ExecutorHandle,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    decoder: FrameDecoder,
    // decoded before any consumer was attached
    backlog: VecDeque<Bytes>,
    listener: Option<Box<dyn QueueListener>>,
    first: Option<FirstMessageHook>,
    pump_armed: bool,
    send_queue: VecDeque<Bytes>,
    sending: bool,
    close_notified: bool,
}

impl MessageQueue {
    /// Wraps a connected channel.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        let executor = channel.executor();
        Self {
            inner: Arc::new(QueueInner {
                channel,
                executor,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Arms continuous reception. Only the first call starts the read loop;
    /// later calls are ignored. Messages that arrived before the listener
    /// was set are delivered first, in order. On a queue that is already
    /// closed the listener only sees `on_closed`.
    pub fn set_listener(&self, listener: impl QueueListener) {
        let needs_close = {
            let mut state = self.inner.state.lock();
            if state.listener.is_some() {
                return;
            }
            if self.inner.channel.disconnected() {
                if !state.close_notified {
                    state.close_notified = true;
                    let mut listener = listener;
                    self.inner
                        .executor
                        .post(Box::new(move || listener.on_closed()));
                }
                return;
            }
            state.listener = Some(Box::new(listener));
            while let Some(msg) = state.backlog.pop_front() {
                self.post_delivery(msg);
            }
            !self.arm_pump(&mut state)
        };
        if needs_close {
            self.close();
        }
    }

    /// Sends one message. Returns false (without sending) if the payload is
    /// unframable or the queue is already closed; a disconnection during
    /// transmission is silent to the caller but closes the queue.
    pub fn send(&self, msg: &[u8]) -> bool {
        let Ok(frame) = frame::encode(msg) else {
            return false;
        };
        if self.closed() {
            return false;
        }
        let submit = {
            let mut state = self.inner.state.lock();
            state.send_queue.push_back(frame);
            if state.sending {
                None
            } else {
                state.sending = true;
                state.send_queue.front().cloned()
            }
        };
        if let Some(frame) = submit {
            self.submit_write(frame);
        }
        true
    }

    /// Disconnects the underlying channel and notifies the listener exactly
    /// once. Idempotent.
    pub fn close(&self) {
        self.inner.channel.disconnect();
        let notify = {
            let mut state = self.inner.state.lock();
            state.send_queue.clear();
            state.sending = false;
            state.first = None;
            if state.close_notified {
                None
            } else {
                match state.listener.take() {
                    Some(listener) => {
                        state.close_notified = true;
                        Some(listener)
                    }
                    None => None,
                }
            }
        };
        if let Some(mut listener) = notify {
            trace!(queue = %self, "closing");
            self.inner
                .executor
                .post(Box::new(move || listener.on_closed()));
        }
    }

    /// Mirrors the channel's disconnected state.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.channel.disconnected()
    }

    /// Name of the broker owning the other end.
    #[must_use]
    pub fn remote_name(&self) -> &str {
        self.inner.channel.remote_name()
    }

    /// Port the underlying channel was matched on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.channel.port()
    }

    /// Hands the next complete message to `hook` (posted), starting the read
    /// pump if needed. Used by the queue broker to take the control payload
    /// before the user listener attaches.
    pub(crate) fn read_first(&self, hook: impl FnOnce(Bytes) + Send + 'static) {
        let needs_close = {
            let mut state = self.inner.state.lock();
            if let Some(msg) = state.backlog.pop_front() {
                let hook: FirstMessageHook = Box::new(hook);
                self.inner.executor.post(Box::new(move || hook(msg)));
                false
            } else {
                state.first = Some(Box::new(hook));
                !self.arm_pump(&mut state)
            }
        };
        if needs_close {
            self.close();
        }
    }

    /// Submits the next chunked read; returns false once the channel is
    /// gone.
    fn arm_pump(&self, state: &mut QueueState) -> bool {
        if state.pump_armed {
            return true;
        }
        let queue = self.clone();
        match self
            .inner
            .channel
            .read(READ_CHUNK, move |data: Bytes| queue.on_chunk(&data))
        {
            Ok(()) => {
                state.pump_armed = true;
                true
            }
            Err(_) => false,
        }
    }

    /// Runs on the dispatch thread for every chunk the channel delivers.
    fn on_chunk(&self, data: &Bytes) {
        let mut broken = false;
        {
            let mut state = self.inner.state.lock();
            state.pump_armed = false;
            state.decoder.extend(data);
            loop {
                match state.decoder.next_message() {
                    Ok(Some(msg)) => {
                        if let Some(hook) = state.first.take() {
                            self.inner.executor.post(Box::new(move || hook(msg)));
                        } else if state.listener.is_some() {
                            self.post_delivery(msg);
                        } else {
                            state.backlog.push_back(msg);
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        broken = true;
                        break;
                    }
                }
            }
            if !broken {
                // keep pumping while someone is consuming
                if state.listener.is_some() || state.first.is_some() {
                    broken = !self.arm_pump(&mut state);
                }
            }
        }
        if broken {
            self.close();
        }
    }

    /// Posts one message delivery. The listener is taken out for the call
    /// and restored afterwards so no lock is held while it runs.
    fn post_delivery(&self, msg: Bytes) {
        let inner = Arc::clone(&self.inner);
        self.inner.executor.post(Box::new(move || {
            let listener = inner.state.lock().listener.take();
            if let Some(mut listener) = listener {
                listener.on_message(msg);
                let mut state = inner.state.lock();
                if state.listener.is_none() && !state.close_notified {
                    state.listener = Some(listener);
                }
            }
        }));
    }
}

impl fmt::Display for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.channel)
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageQueue[{}]", self.inner.channel)
    }
}

/// Chains partial writes until the frame is fully on the wire, then moves to
/// the next queued frame.
impl MessageQueue {
    fn submit_write(&self, frame: Bytes) {
        let queue = self.clone();
        let result = self
            .inner
            .channel
            .write(frame, move |data: Bytes, written: usize| {
                queue.on_written(&data, written);
            });
        if result.is_err() {
            self.close();
        }
    }

    fn on_written(&self, data: &Bytes, written: usize) {
        if written < data.len() {
            self.submit_write(data.slice(written..));
            return;
        }
        let next = {
            let mut state = self.inner.state.lock();
            state.send_queue.pop_front();
            match state.send_queue.front() {
                Some(frame) => Some(frame.clone()),
                None => {
                    state.sending = false;
                    None
                }
            }
        };
        if let Some(frame) = next {
            self.submit_write(frame);
        }
    }
}
