//! Unified board error taxonomy
//!
//! Every failure the engine can observe falls into one of four classes,
//! and the class decides who handles it:
//!
//! - [`ErrorClass::Transient`]: retried internally with backoff, the caller
//!   never sees one unless retries are exhausted
//! - [`ErrorClass::Conflict`]: surfaced synchronously, never auto-retried
//! - [`ErrorClass::Rejection`]: surfaced synchronously, never retried
//! - [`ErrorClass::Fatal`]: the session degrades to polling/read-only

use crate::identifiers::IdeaId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result alias used across the workspace.
pub type BoardResult<T> = Result<T, BoardError>;

/// Coarse failure class driving retry and surfacing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Network-shaped failure; safe to retry with backoff.
    Transient,
    /// Another actor got there first; surface, let the user retry.
    Conflict,
    /// The request itself was refused; retrying cannot help.
    Rejection,
    /// The gateway is gone; degrade rather than hang or lose edits.
    Fatal,
}

/// Errors produced by the board engine and its collaborators.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoardError {
    /// Network-level failure talking to the persistence gateway.
    #[error("network failure: {0}")]
    Network(String),

    /// A bounded network call did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The record is locked by another participant.
    #[error("record {0} is being edited by another participant")]
    LockHeld(IdeaId),

    /// An authoritative event superseded the local optimistic entry.
    #[error("optimistic entry for {0} superseded by an authoritative update")]
    Superseded(IdeaId),

    /// The gateway refused the payload.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The scope is over its record quota.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Same content from the same actor inside the dedup window.
    #[error("duplicate submission within the dedup window")]
    DuplicateSubmission,

    /// The target record does not exist.
    #[error("record {0} not found")]
    NotFound(IdeaId),

    /// All retry attempts were spent without a successful round trip.
    #[error("persistence gateway unreachable after {attempts} attempts: {last_error}")]
    GatewayUnavailable {
        /// Attempts made before giving up.
        attempts: u32,
        /// The final transient error, stringified.
        last_error: String,
    },

    /// The change channel handed us a payload that failed validation.
    #[error("malformed change event: {0}")]
    MalformedEvent(String),
}

impl BoardError {
    /// Classify this error for retry and surfacing policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            BoardError::Network(_) | BoardError::Timeout(_) => ErrorClass::Transient,
            BoardError::LockHeld(_) | BoardError::Superseded(_) => ErrorClass::Conflict,
            BoardError::Validation(_)
            | BoardError::QuotaExceeded(_)
            | BoardError::DuplicateSubmission
            | BoardError::NotFound(_)
            | BoardError::MalformedEvent(_) => ErrorClass::Rejection,
            BoardError::GatewayUnavailable { .. } => ErrorClass::Fatal,
        }
    }

    /// Whether the internal retry loop may try again.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
