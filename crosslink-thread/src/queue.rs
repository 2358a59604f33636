//! Length-prefixed message queue over a blocking channel.
//!
//! `send` frames a message and pushes the frame through however many short
//! writes the channel imposes; `receive` feeds short reads into a frame
//! decoder until one complete message falls out. One sender and one receiver
//! may run concurrently; each direction is serialized by its own lock.

use std::fmt;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use crosslink_core::frame::{self, FrameDecoder};
use crosslink_core::{Error, Result};

use super::channel::Channel;

// Stack chunk used to feed the decoder.
const READ_CHUNK: usize = 256;

/// Framed messaging endpoint over one [`Channel`].
pub struct MessageQueue {
    channel: Channel,
    sender: Mutex<()>,
    receiver: Mutex<FrameDecoder>,
}

impl MessageQueue {
    /// Wraps a connected channel.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sender: Mutex::new(()),
            receiver: Mutex::new(FrameDecoder::new()),
        }
    }

    /// Sends one message, blocking until the whole frame is written.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MessageTooLarge`] for unframable payloads and
    /// with [`Error::Closed`] once the channel disconnects (the queue closes
    /// itself in that case).
    pub fn send(&self, msg: &[u8]) -> Result<()> {
        let frame = frame::encode(msg)?;
        let _sending = self.sender.lock();
        let mut sent = 0;
        while sent < frame.len() {
            match self.channel.write(&frame[sent..]) {
                // a zero-byte write means the peer vanished while the ring
                // was full; the frame can never complete
                Ok(0) => {
                    self.close();
                    return Err(Error::Closed);
                }
                Ok(count) => sent += count,
                Err(_) => {
                    self.close();
                    return Err(Error::Closed);
                }
            }
        }
        Ok(())
    }

    /// Receives one complete message, blocking until it has reassembled.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Closed`] once the channel disconnects or the
    /// stream is unparsable (the queue closes itself in both cases).
    pub fn receive(&self) -> Result<Bytes> {
        let mut decoder = self.receiver.lock();
        loop {
            match decoder.next_message() {
                Ok(Some(msg)) => return Ok(msg),
                Ok(None) => {}
                Err(_) => {
                    drop(decoder);
                    self.close();
                    return Err(Error::Closed);
                }
            }
            let mut chunk = [0u8; READ_CHUNK];
            match self.channel.read(&mut chunk) {
                Ok(count) => decoder.extend(&chunk[..count]),
                Err(_) => {
                    drop(decoder);
                    self.close();
                    return Err(Error::Closed);
                }
            }
        }
    }

    /// Disconnects the underlying channel. Idempotent.
    pub fn close(&self) {
        if !self.channel.disconnected() {
            trace!(queue = %self, "closing");
        }
        self.channel.disconnect();
    }

    /// Mirrors the channel's disconnected state.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.channel.disconnected()
    }

    /// Name of the broker owning the other end.
    #[must_use]
    pub fn remote_name(&self) -> &str {
        self.channel.remote_name()
    }

    /// Port the underlying channel was matched on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.channel.port()
    }
}

impl fmt::Display for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channel)
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageQueue[{}]", self.channel)
    }
}
