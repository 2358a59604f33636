//! Crosslink Core
//!
//! This crate contains the model-agnostic core building blocks:
//! - Fixed-capacity byte ring with edge-triggered readiness hooks (`ring`)
//! - Process-wide broker-name registry (`registry`)
//! - Length-prefixed frame codec (`frame`)
//! - Executor boundary and reference event pump (`executor`)
//! - Error types (`error`)
//!
//! Both execution models (`crosslink-thread`, `crosslink-event`) are built
//! on top of these blocks and share their wire-level behavior.

#![cfg_attr(not(test), deny(unsafe_code))]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod executor;
pub mod frame;
pub mod registry;
pub mod ring;

pub use error::{Error, Result};

// Optional: a small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::executor::{EventPump, Executor, ExecutorHandle, Task};
    pub use crate::frame::{FrameDecoder, HEADER_LEN, MAX_MESSAGE_LEN};
    pub use crate::registry::BrokerRegistry;
    pub use crate::ring::{RingBuffer, RingError, DEFAULT_CAPACITY};
}
