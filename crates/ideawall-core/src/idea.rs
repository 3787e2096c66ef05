//! The idea record model and partial-update patches

use crate::identifiers::{ActorId, IdeaId, ScopeId};
use crate::position::Position;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Priority band an idea sits in on the board.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Priority {
    /// Parked / someday.
    Low,
    /// Worth doing.
    #[default]
    Medium,
    /// Next up.
    High,
    /// Drop everything.
    Critical,
}

/// Pessimistic edit lock stored on the record itself.
///
/// A lock is only *logically* present while its age is under the configured
/// TTL; an expired lock is treated as absent even before the sweep clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLock {
    /// Who holds the lock.
    pub holder: ActorId,
    /// When the holder acquired (or last re-acquired) it.
    pub acquired_at: Timestamp,
}

impl EditLock {
    /// Whether the lock has outlived its TTL as of `now`.
    pub fn is_expired(&self, now: Timestamp, ttl: Duration) -> bool {
        now.since(self.acquired_at) >= ttl
    }
}

/// One idea record on the shared board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    /// Unique within the scope.
    pub id: IdeaId,
    /// The idea text.
    pub content: String,
    /// Optional longer description.
    pub details: Option<String>,
    /// Where the idea sits on the priority surface.
    pub position: Position,
    /// Priority band.
    pub priority: Priority,
    /// Creator, if known (anonymous session participants still get one).
    pub owner: Option<ActorId>,
    /// The project or live session this record belongs to.
    pub scope: ScopeId,
    /// Creation time, gateway-assigned for authoritative records.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Pessimistic edit lock, if anyone holds one.
    pub edit_lock: Option<EditLock>,
}

impl Idea {
    /// Build a fresh record with a random id, ready for optimistic insertion.
    pub fn new(
        content: impl Into<String>,
        position: Position,
        scope: ScopeId,
        owner: Option<ActorId>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: IdeaId::new(),
            content: content.into(),
            details: None,
            position,
            priority: Priority::default(),
            owner,
            scope,
            created_at: now,
            updated_at: now,
            edit_lock: None,
        }
    }

    /// The lock holder, ignoring locks older than `ttl`.
    pub fn live_lock_holder(&self, now: Timestamp, ttl: Duration) -> Option<ActorId> {
        self.edit_lock
            .filter(|lock| !lock.is_expired(now, ttl))
            .map(|lock| lock.holder)
    }
}

/// Partial update sent to the gateway; only set fields are written.
///
/// `details` and `edit_lock` are doubly optional so a patch can distinguish
/// "leave as is" (`None`) from "clear the field" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdeaPatch {
    /// Replace the idea text.
    pub content: Option<String>,
    /// Replace or clear the description.
    pub details: Option<Option<String>>,
    /// Move the record.
    pub position: Option<Position>,
    /// Change the priority band.
    pub priority: Option<Priority>,
    /// Set or clear the edit lock field.
    pub edit_lock: Option<Option<EditLock>>,
}

impl IdeaPatch {
    /// A patch that only moves the record.
    pub fn move_to(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    /// True when the patch writes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the set fields to a record, bumping `updated_at`.
    pub fn apply_to(&self, idea: &mut Idea, now: Timestamp) {
        if let Some(content) = &self.content {
            idea.content = content.clone();
        }
        if let Some(details) = &self.details {
            idea.details = details.clone();
        }
        if let Some(position) = self.position {
            idea.position = position;
        }
        if let Some(priority) = self.priority {
            idea.priority = priority;
        }
        if let Some(lock) = self.edit_lock {
            idea.edit_lock = lock;
        }
        idea.updated_at = now;
    }
}
