//! # Ideawall Core - Foundation Crate
//!
//! **Purpose**: Define the shared board domain types, the unified error
//! taxonomy, and the effect seams toward external collaborators.
//!
//! This crate holds everything the engine and the test kit agree on:
//!
//! - Identifier newtypes (`IdeaId`, `ActorId`, `ScopeId`, `LocalId`)
//! - The `Idea` record model with normalized board positions
//! - Millisecond timestamps and the injectable `Clock`
//! - Content fingerprints used for dedup and create-echo matching
//! - `BoardError` with its transient/conflict/rejection/fatal classification
//! - Async effect traits for the persistence gateway and the change channel
//!
//! ## What's NOT in this crate
//!
//! - Reconciliation or ledger logic (that's `ideawall-engine`)
//! - Any storage or transport implementation (external collaborators; the
//!   in-memory stand-ins live in `ideawall-testkit`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Identifier newtypes for board entities
pub mod identifiers;

/// The idea record model and partial-update patches
pub mod idea;

/// Normalized 2-D board positions
pub mod position;

/// Millisecond timestamps and clock injection
pub mod time;

/// Content fingerprints for dedup and echo matching
pub mod fingerprint;

/// Unified board error taxonomy
pub mod errors;

/// Effect traits for external collaborators
pub mod effects;

pub use effects::{
    ChangeChannel, ChangeEvent, Clock, EventSink, PersistenceGateway, Subscription, SystemClock,
};
pub use errors::{BoardError, BoardResult, ErrorClass};
pub use fingerprint::Fingerprint;
pub use idea::{EditLock, Idea, IdeaPatch, Priority};
pub use identifiers::{ActorId, IdeaId, LocalId, ScopeId};
pub use position::Position;
pub use time::Timestamp;
