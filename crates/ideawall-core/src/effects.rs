//! Effect traits for external collaborators
//!
//! The engine owns no storage and no transport. Everything it needs from the
//! outside world comes through the three seams defined here:
//!
//! - [`PersistenceGateway`]: request/response CRUD plus the lock calls
//! - [`ChangeChannel`]: push delivery of row-level change events
//! - [`Clock`]: wall-clock time, injectable for tests
//!
//! Implementations live elsewhere (production adapters out of scope; the
//! in-memory ones used by tests are in `ideawall-testkit`). All traits get
//! blanket `Arc<T>` implementations so handles can be shared freely.

use crate::errors::BoardResult;
use crate::idea::{Idea, IdeaPatch};
use crate::identifiers::{ActorId, IdeaId, ScopeId};
use crate::time::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Row-level change delivered by the change channel.
///
/// This is a closed set: payloads are validated and narrowed into one of
/// these variants at the channel boundary, never at point of use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// A record appeared (another participant created it, or our own echo).
    Inserted(Idea),
    /// A record changed.
    Updated(Idea),
    /// A record was removed.
    Deleted {
        /// Which record.
        id: IdeaId,
        /// The scope it lived in, so filtering still applies to deletes.
        scope: ScopeId,
    },
}

impl ChangeEvent {
    /// The scope this event belongs to.
    pub fn scope(&self) -> ScopeId {
        match self {
            ChangeEvent::Inserted(idea) | ChangeEvent::Updated(idea) => idea.scope,
            ChangeEvent::Deleted { scope, .. } => *scope,
        }
    }

    /// The record this event is about.
    pub fn idea_id(&self) -> IdeaId {
        match self {
            ChangeEvent::Inserted(idea) | ChangeEvent::Updated(idea) => idea.id,
            ChangeEvent::Deleted { id, .. } => *id,
        }
    }
}

/// Callback receiving validated change events.
pub type EventSink = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Live subscription to a change channel; unsubscribes on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap an unsubscribe closure.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Request/response CRUD against the backing store.
///
/// The gateway is authoritative: ids and timestamps on returned records win
/// over anything the engine predicted locally.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Persist a new record. The returned record carries the authoritative
    /// id, which may differ from the temporary one the engine minted.
    async fn create(&self, idea: Idea) -> BoardResult<Idea>;

    /// Apply a partial update and return the stored record.
    async fn update(&self, id: IdeaId, patch: IdeaPatch) -> BoardResult<Idea>;

    /// Delete a record. `Ok(false)` means it was already gone.
    async fn delete(&self, id: IdeaId) -> BoardResult<bool>;

    /// Try to take the edit lock. `Ok(false)` means another participant
    /// holds a live lock.
    async fn acquire_lock(&self, id: IdeaId, holder: ActorId) -> BoardResult<bool>;

    /// Release the edit lock if `holder` still owns it.
    async fn release_lock(&self, id: IdeaId, holder: ActorId) -> BoardResult<bool>;

    /// Clear every lock in the scope older than `ttl`; returns how many.
    async fn sweep_stale_locks(&self, scope: ScopeId, ttl: Duration) -> BoardResult<u32>;

    /// Read every record in the scope (the polling fallback read path).
    async fn list_scope(&self, scope: ScopeId) -> BoardResult<Vec<Idea>>;
}

/// Push subscription to row-level change events for one scope.
#[async_trait]
pub trait ChangeChannel: Send + Sync {
    /// Subscribe `sink` to events for `scope`. Dropping the returned
    /// [`Subscription`] unsubscribes.
    async fn subscribe(&self, scope: ScopeId, sink: EventSink) -> BoardResult<Subscription>;
}

/// Wall-clock provider.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> Timestamp;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::from_millis(since_epoch.as_millis() as u64)
    }
}

#[async_trait]
impl<T: PersistenceGateway + ?Sized> PersistenceGateway for Arc<T> {
    async fn create(&self, idea: Idea) -> BoardResult<Idea> {
        (**self).create(idea).await
    }

    async fn update(&self, id: IdeaId, patch: IdeaPatch) -> BoardResult<Idea> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: IdeaId) -> BoardResult<bool> {
        (**self).delete(id).await
    }

    async fn acquire_lock(&self, id: IdeaId, holder: ActorId) -> BoardResult<bool> {
        (**self).acquire_lock(id, holder).await
    }

    async fn release_lock(&self, id: IdeaId, holder: ActorId) -> BoardResult<bool> {
        (**self).release_lock(id, holder).await
    }

    async fn sweep_stale_locks(&self, scope: ScopeId, ttl: Duration) -> BoardResult<u32> {
        (**self).sweep_stale_locks(scope, ttl).await
    }

    async fn list_scope(&self, scope: ScopeId) -> BoardResult<Vec<Idea>> {
        (**self).list_scope(scope).await
    }
}

#[async_trait]
impl<T: ChangeChannel + ?Sized> ChangeChannel for Arc<T> {
    async fn subscribe(&self, scope: ScopeId, sink: EventSink) -> BoardResult<Subscription> {
        (**self).subscribe(scope, sink).await
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn subscription_cancels_on_drop() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let sub = Subscription::new(move || flag.store(true, Ordering::SeqCst));
        assert!(!cancelled.load(Ordering::SeqCst));
        drop(sub);
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn event_accessors() {
        let scope = ScopeId::new();
        let id = IdeaId::new();
        let event = ChangeEvent::Deleted { id, scope };
        assert_eq!(event.scope(), scope);
        assert_eq!(event.idea_id(), id);
    }
}
