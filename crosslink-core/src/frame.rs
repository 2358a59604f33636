//! Length-prefixed message framing.
//!
//! Wire format: a 4-byte big-endian unsigned length followed by that many
//! payload bytes, repeated. No magic number, no version byte, no checksum.
//!
//! [`FrameDecoder`] is a stateful, sans-IO decoder: feed it whatever chunks
//! the channel happens to deliver and pull complete messages out. A message
//! split across arbitrarily many short reads reassembles exactly once.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Largest framable payload.
pub const MAX_MESSAGE_LEN: usize = i32::MAX as usize;

/// Framing protocol errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

impl From<FrameError> for crate::error::Error {
    fn from(err: FrameError) -> Self {
        let FrameError::TooLarge { size, max } = err;
        Self::MessageTooLarge { size, max }
    }
}

/// Frames `payload` for the wire.
///
/// # Errors
///
/// Fails with [`FrameError::TooLarge`] beyond [`MAX_MESSAGE_LEN`].
pub fn encode(payload: &[u8]) -> Result<Bytes, FrameError> {
    if payload.len() > MAX_MESSAGE_LEN {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_LEN,
        });
    }
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Stateful frame decoder
///
/// Feed with `extend`, drain with `next_message`:
///
/// - `Ok(Some(msg))` -> one complete message
/// - `Ok(None)` -> need more data
/// - `Err` -> protocol violation, the stream is unusable
#[derive(Debug, Default)]
pub struct FrameDecoder {
    staging: BytesMut,
    // length already parsed, payload incomplete
    expected: Option<usize>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of raw stream data.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.staging.extend_from_slice(chunk);
    }

    /// Number of raw bytes buffered but not yet returned.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.staging.len() + if self.expected.is_some() { HEADER_LEN } else { 0 }
    }

    /// Decodes the next complete message, if any.
    ///
    /// # Errors
    ///
    /// Fails with [`FrameError::TooLarge`] on an over-long length prefix.
    pub fn next_message(&mut self) -> Result<Option<Bytes>, FrameError> {
        let size = match self.expected {
            Some(size) => size,
            None => {
                if self.staging.len() < HEADER_LEN {
                    return Ok(None);
                }
                let mut header = &self.staging[..HEADER_LEN];
                let size = header.get_u32() as usize;
                if size > MAX_MESSAGE_LEN {
                    return Err(FrameError::TooLarge {
                        size,
                        max: MAX_MESSAGE_LEN,
                    });
                }
                self.staging.advance(HEADER_LEN);
                self.expected = Some(size);
                size
            }
        };

        if self.staging.len() < size {
            return Ok(None);
        }
        self.expected = None;
        Ok(Some(self.staging.split_to(size).freeze()))
    }
}
