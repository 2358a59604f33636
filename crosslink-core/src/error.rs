/// Crosslink Error Types
///
/// Shared error taxonomy for both execution models.
use thiserror::Error;

/// Main error type for crosslink operations
#[derive(Debug, Error)]
pub enum Error {
    /// The local end of the channel is disconnected
    #[error("channel disconnected")]
    Disconnected,

    /// The message queue has been closed
    #[error("message queue closed")]
    Closed,

    /// An accept is already pending on this port
    #[error("accept already pending on port {0}")]
    AcceptPending(u16),

    /// Broker name already registered
    #[error("broker name '{0}' already registered")]
    NameTaken(String),

    /// Message exceeds the framable maximum
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type alias for crosslink operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error reports a lost peer rather than a caller mistake
    #[must_use]
    pub const fn is_disconnection(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }
}
