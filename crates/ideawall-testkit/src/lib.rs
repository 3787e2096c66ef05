//! # Ideawall Testkit
//!
//! In-memory implementations of the `ideawall-core` effect traits, used by
//! unit and integration tests across the workspace:
//!
//! - [`ManualClock`]: a clock tests advance by hand
//! - [`MemoryGateway`]: a store with authoritative lock semantics, call
//!   recording, and failure/delay injection
//! - [`MemoryChannel`]: a manually driven change feed
//!
//! The gateway uses the same pure lock transition functions as the engine,
//! so store-side and client-side lock semantics cannot diverge in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Manually driven clock
pub mod clock;

/// In-memory change feed
pub mod channel;

/// In-memory persistence gateway
pub mod gateway;

pub use channel::MemoryChannel;
pub use clock::ManualClock;
pub use gateway::{GatewayCall, MemoryGateway};
