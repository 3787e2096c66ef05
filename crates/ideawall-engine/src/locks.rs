//! Pessimistic, TTL-bounded edit locks
//!
//! The lock state machine per record is `Unlocked -> Locked(holder, t0)`.
//! The pure transition functions here are the single source of truth for
//! lock semantics; the store-side implementation (in-memory or production)
//! and the client-side service both call them, so the two sides cannot
//! drift apart.
//!
//! Acquisition failure is reported, never auto-retried: the caller surfaces
//! "being edited by someone else" and lets the user decide.

use ideawall_core::{
    ActorId, BoardResult, EditLock, IdeaId, PersistenceGateway, ScopeId, Timestamp,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::retry::bounded;

/// Outcome of evaluating an acquire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    /// The requester gets (or keeps) the lock.
    Granted {
        /// True when the requester already held it (heartbeat).
        reentrant: bool,
        /// True when an expired lock was taken over.
        reclaimed: bool,
    },
    /// A different holder has a live lock.
    Denied {
        /// Who holds it.
        holder: ActorId,
    },
}

/// Evaluate an acquire against the current lock field.
///
/// Grants when the record is unlocked, when the requester already holds the
/// lock (re-entrant), or when the existing lock has aged past `ttl`.
pub fn evaluate_acquire(
    current: Option<EditLock>,
    requester: ActorId,
    now: Timestamp,
    ttl: Duration,
) -> LockDecision {
    match current {
        None => LockDecision::Granted {
            reentrant: false,
            reclaimed: false,
        },
        Some(lock) if lock.holder == requester => LockDecision::Granted {
            reentrant: true,
            reclaimed: false,
        },
        Some(lock) if lock.is_expired(now, ttl) => LockDecision::Granted {
            reentrant: false,
            reclaimed: true,
        },
        Some(lock) => LockDecision::Denied {
            holder: lock.holder,
        },
    }
}

/// Evaluate a release: only the current holder may clear the lock.
///
/// A late release from a timed-out holder is a no-op, so it can never steal
/// the lock back from a new legitimate holder.
pub fn evaluate_release(current: Option<EditLock>, requester: ActorId) -> bool {
    matches!(current, Some(lock) if lock.holder == requester)
}

/// Client-side lock service: wraps the gateway lock calls with bounded
/// waits and structured logging. Callers never touch lock fields directly.
#[derive(Debug, Clone)]
pub struct EditLockService<G> {
    gateway: G,
    actor: ActorId,
    lock_ttl: Duration,
    request_timeout: Duration,
}

impl<G> EditLockService<G>
where
    G: PersistenceGateway,
{
    /// Create a service acting on behalf of `actor`.
    pub fn new(gateway: G, actor: ActorId, lock_ttl: Duration, request_timeout: Duration) -> Self {
        Self {
            gateway,
            actor,
            lock_ttl,
            request_timeout,
        }
    }

    /// Try to take the edit lock on `id`. `Ok(false)` means denied.
    pub async fn acquire(&self, id: IdeaId) -> BoardResult<bool> {
        let granted = bounded(self.request_timeout, self.gateway.acquire_lock(id, self.actor)).await?;
        if granted {
            debug!(record = %id, holder = %self.actor, "edit lock acquired");
        } else {
            info!(record = %id, requester = %self.actor, "edit lock denied");
        }
        Ok(granted)
    }

    /// Release the lock on `id` if we still hold it.
    pub async fn release(&self, id: IdeaId) -> BoardResult<bool> {
        let released =
            bounded(self.request_timeout, self.gateway.release_lock(id, self.actor)).await?;
        if !released {
            // Expired and reclaimed by someone else; nothing to clear.
            debug!(record = %id, holder = %self.actor, "release was a no-op");
        }
        Ok(released)
    }

    /// Force-clear every lock in the scope older than the TTL.
    ///
    /// Crashed or closed clients never call `release`; the periodic sweep
    /// is what keeps their locks from sticking forever.
    pub async fn sweep(&self, scope: ScopeId) -> BoardResult<u32> {
        let cleared = bounded(
            self.request_timeout,
            self.gateway.sweep_stale_locks(scope, self.lock_ttl),
        )
        .await?;
        if cleared > 0 {
            warn!(%scope, cleared, "swept stale edit locks");
        }
        Ok(cleared)
    }
}
