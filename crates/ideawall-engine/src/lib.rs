//! # Ideawall Engine - Consistency and Concurrency Core
//!
//! **Purpose**: Make multi-writer editing of a shared idea board feel
//! instantaneous and safe without server-authoritative locking on every
//! step.
//!
//! Four tightly coupled responsibilities, all operating on the same visible
//! collection:
//!
//! - **Optimistic mutation ledger** ([`ledger`]): apply now, confirm or
//!   revert later, with exact rollback snapshots
//! - **Edit locks** ([`locks`]): pessimistic, TTL-bounded, swept for stale
//!   holders
//! - **Submission dedup** ([`dedup`]): content-hash + time-window guard on
//!   the creation path
//! - **Realtime reconciliation** ([`reconciler`]): merging the push-based
//!   change stream against locally optimistic state, scoped and de-duplicated
//!
//! [`session::BoardSession`] ties them together behind the caller-facing
//! API. External collaborators (storage, transport, clock) enter through
//! the traits in `ideawall-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Engine tunables
pub mod config;

/// Submission deduplication for the creation path
pub mod dedup;

/// Optimistic mutation bookkeeping
pub mod ledger;

/// TTL-bounded edit locks
pub mod locks;

/// The optimistic/authoritative merge point
pub mod reconciler;

/// Bounded retry with exponential backoff
pub mod retry;

/// The caller-facing session facade
pub mod session;

pub use config::EngineConfig;
pub use dedup::SubmissionDeduplicator;
pub use ledger::{MutationKind, OptimisticEntry, OptimisticLedger, RollbackSnapshot};
pub use locks::{evaluate_acquire, evaluate_release, EditLockService, LockDecision};
pub use reconciler::{BoardEvent, Reconciler};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use session::BoardSession;
