//! Realtime reconciler
//!
//! Owns the single visible collection and merges three writers into it:
//! the local actor's optimistic mutations, authoritative events from the
//! change channel, and periodic staleness GC. Nothing else writes visible
//! state.
//!
//! Merge rules, in order:
//!
//! 1. Events outside the active scope are dropped at the door.
//! 2. An authoritative insert that matches a pending optimistic create (by
//!    id, or by fingerprint + actor within the echo tolerance) replaces the
//!    temporary record instead of appearing next to it.
//! 3. An authoritative update/delete for a record with a pending entry
//!    supersedes the entry; the store wins on conflict.
//! 4. Entries unconfirmed after the entry TTL are rolled back and dropped.

use crate::ledger::{MutationKind, OptimisticEntry, OptimisticLedger, RollbackSnapshot};
use ideawall_core::{
    ActorId, BoardError, BoardResult, ChangeEvent, Fingerprint, Idea, IdeaId, IdeaPatch, LocalId,
    Position, ScopeId, Timestamp,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Notifications the engine emits toward the caller (UI layer).
///
/// Serializable so a host UI can forward them across a bridge unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoardEvent {
    /// An optimistic mutation resolved; `idea` is `None` for deletes.
    MutationConfirmed {
        /// The ledger entry that resolved.
        local_id: LocalId,
        /// The authoritative record, when one exists.
        idea: Option<Idea>,
    },
    /// An optimistic mutation was reverted; visible state restored.
    MutationRolledBack {
        /// The ledger entry that was reverted.
        local_id: LocalId,
        /// The record it targeted.
        target: IdeaId,
        /// Why it rolled back.
        error: BoardError,
    },
    /// An edit lock acquisition was refused.
    LockDenied {
        /// The contested record.
        id: IdeaId,
        /// The current holder, when known.
        holder: Option<ActorId>,
    },
}

/// The authoritative merge point between optimistic and server state.
#[derive(Debug)]
pub struct Reconciler {
    scope: ScopeId,
    visible: IndexMap<IdeaId, Idea>,
    ledger: OptimisticLedger,
    echo_tolerance: Duration,
    entry_ttl: Duration,
}

impl Reconciler {
    /// Create a reconciler for one scope.
    pub fn new(scope: ScopeId, echo_tolerance: Duration, entry_ttl: Duration) -> Self {
        Self {
            scope,
            visible: IndexMap::new(),
            ledger: OptimisticLedger::new(),
            echo_tolerance,
            entry_ttl,
        }
    }

    /// The active scope.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Snapshot of the visible collection.
    pub fn visible_ideas(&self) -> Vec<Idea> {
        self.visible.values().cloned().collect()
    }

    /// One visible record.
    pub fn get(&self, id: IdeaId) -> Option<&Idea> {
        self.visible.get(&id)
    }

    /// Number of visible records.
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// True when the board is empty.
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Outstanding optimistic entries (diagnostics and tests).
    pub fn pending_mutations(&self) -> usize {
        self.ledger.len()
    }

    // ---------------------------------------------------------------
    // Optimistic side (called by the session on local user actions)
    // ---------------------------------------------------------------

    /// Tentatively insert a freshly minted record.
    pub fn apply_create(&mut self, idea: Idea, actor: ActorId, now: Timestamp) -> LocalId {
        let fingerprint = Fingerprint::of_content(&idea.content);
        let target = idea.id;
        self.visible.insert(target, idea);
        self.ledger.record(
            MutationKind::Create,
            target,
            RollbackSnapshot::Absent,
            Some(fingerprint),
            actor,
            now,
        )
    }

    /// Tentatively apply a field edit.
    pub fn apply_update(
        &mut self,
        id: IdeaId,
        patch: &IdeaPatch,
        actor: ActorId,
        now: Timestamp,
    ) -> BoardResult<LocalId> {
        self.apply_to_existing(id, MutationKind::Update, actor, now, |idea| {
            patch.apply_to(idea, now)
        })
    }

    /// Tentatively move a record. Rapid repeats coalesce into one entry.
    pub fn apply_move(
        &mut self,
        id: IdeaId,
        position: Position,
        actor: ActorId,
        now: Timestamp,
    ) -> BoardResult<LocalId> {
        self.apply_to_existing(id, MutationKind::Move, actor, now, |idea| {
            idea.position = position;
            idea.updated_at = now;
        })
    }

    /// Tentatively remove a record.
    pub fn apply_delete(&mut self, id: IdeaId, actor: ActorId, now: Timestamp) -> BoardResult<LocalId> {
        let existing = self
            .visible
            .get(&id)
            .cloned()
            .ok_or(BoardError::NotFound(id))?;
        self.visible.shift_remove(&id);
        Ok(self.ledger.record(
            MutationKind::Delete,
            id,
            RollbackSnapshot::Present(Box::new(existing)),
            None,
            actor,
            now,
        ))
    }

    fn apply_to_existing(
        &mut self,
        id: IdeaId,
        kind: MutationKind,
        actor: ActorId,
        now: Timestamp,
        mutate: impl FnOnce(&mut Idea),
    ) -> BoardResult<LocalId> {
        let existing = self
            .visible
            .get_mut(&id)
            .ok_or(BoardError::NotFound(id))?;
        let snapshot = RollbackSnapshot::Present(Box::new(existing.clone()));
        mutate(existing);
        Ok(self.ledger.record(kind, id, snapshot, None, actor, now))
    }

    // ---------------------------------------------------------------
    // Resolution (gateway responses)
    // ---------------------------------------------------------------

    /// Resolve an entry with the gateway's authoritative result.
    ///
    /// `authoritative` is `None` for deletes. If the change channel echo
    /// already resolved the entry this is a harmless upsert, never a
    /// duplicate.
    pub fn confirm(&mut self, local_id: LocalId, authoritative: Option<Idea>) -> Option<BoardEvent> {
        let entry = self.ledger.take(local_id);
        if let Some(idea) = &authoritative {
            if idea.scope == self.scope {
                if let Some(entry) = &entry {
                    if entry.target != idea.id {
                        // Server assigned the real id; retire the temporary record.
                        self.visible.shift_remove(&entry.target);
                    }
                }
                self.visible.insert(idea.id, idea.clone());
            }
        }
        let entry = entry?;
        trace!(local_id = %local_id, target = %entry.target, "mutation confirmed");
        Some(BoardEvent::MutationConfirmed {
            local_id,
            idea: authoritative,
        })
    }

    /// Roll an entry back after an unresolved failure.
    ///
    /// Restores the pre-mutation snapshot exactly; if the entry was already
    /// resolved by an authoritative event, nothing happens.
    pub fn fail(&mut self, local_id: LocalId, error: &BoardError) -> Option<BoardEvent> {
        let entry = self.ledger.take(local_id)?;
        self.restore(&entry);
        warn!(local_id = %local_id, target = %entry.target, error = %error, "mutation rolled back");
        Some(BoardEvent::MutationRolledBack {
            local_id,
            target: entry.target,
            error: error.clone(),
        })
    }

    fn restore(&mut self, entry: &OptimisticEntry) {
        match &entry.snapshot {
            RollbackSnapshot::Absent => {
                self.visible.shift_remove(&entry.target);
            }
            RollbackSnapshot::Present(idea) => {
                self.visible.insert(entry.target, (**idea).clone());
            }
        }
    }

    // ---------------------------------------------------------------
    // Authoritative side (change channel / polling fallback)
    // ---------------------------------------------------------------

    /// Merge one authoritative change event.
    pub fn ingest(&mut self, event: ChangeEvent, now: Timestamp) -> Vec<BoardEvent> {
        if event.scope() != self.scope {
            debug!(
                event_scope = %event.scope(),
                active_scope = %self.scope,
                "dropping cross-scope event"
            );
            return Vec::new();
        }

        match event {
            ChangeEvent::Inserted(idea) => self.ingest_upsert(idea, now, true),
            ChangeEvent::Updated(idea) => self.ingest_upsert(idea, now, false),
            ChangeEvent::Deleted { id, .. } => self.ingest_delete(id),
        }
    }

    fn ingest_upsert(&mut self, idea: Idea, now: Timestamp, try_echo: bool) -> Vec<BoardEvent> {
        if try_echo {
            if let Some(local_id) = self.ledger.match_create_echo(&idea, now, self.echo_tolerance) {
                // The authoritative version wins; never show both.
                if let Some(entry) = self.ledger.take(local_id) {
                    if entry.target != idea.id {
                        self.visible.shift_remove(&entry.target);
                    }
                }
                self.visible.insert(idea.id, idea.clone());
                return vec![BoardEvent::MutationConfirmed {
                    local_id,
                    idea: Some(idea),
                }];
            }
        }

        let mut events = Vec::new();
        if let Some(entry) = self.ledger.take_by_target(idea.id) {
            // Rule 3: the store supersedes whatever we predicted.
            events.push(match entry.kind {
                MutationKind::Delete => BoardEvent::MutationRolledBack {
                    local_id: entry.local_id,
                    target: entry.target,
                    error: BoardError::Superseded(entry.target),
                },
                _ => BoardEvent::MutationConfirmed {
                    local_id: entry.local_id,
                    idea: Some(idea.clone()),
                },
            });
        }
        self.visible.insert(idea.id, idea);
        events
    }

    fn ingest_delete(&mut self, id: IdeaId) -> Vec<BoardEvent> {
        let mut events = Vec::new();
        if let Some(entry) = self.ledger.take_by_target(id) {
            events.push(match entry.kind {
                MutationKind::Delete => BoardEvent::MutationConfirmed {
                    local_id: entry.local_id,
                    idea: None,
                },
                _ => BoardEvent::MutationRolledBack {
                    local_id: entry.local_id,
                    target: id,
                    error: BoardError::Superseded(id),
                },
            });
        }
        self.visible.shift_remove(&id);
        events
    }

    /// Merge a full authoritative snapshot (the polling fallback read).
    ///
    /// Uses the same rules as event ingestion; records absent from the
    /// snapshot are treated as deleted, except temporary records of still
    /// pending optimistic creates.
    pub fn apply_snapshot(&mut self, records: Vec<Idea>, now: Timestamp) -> Vec<BoardEvent> {
        let mut events = Vec::new();
        let mut seen: HashSet<IdeaId> = HashSet::new();

        for idea in records {
            if idea.scope != self.scope {
                continue;
            }
            seen.insert(idea.id);
            events.extend(self.ingest_upsert(idea, now, true));
        }

        let missing: Vec<IdeaId> = self
            .visible
            .keys()
            .filter(|id| !seen.contains(*id))
            .copied()
            .collect();
        for id in missing {
            match self.ledger.pending_on(id).map(|entry| entry.kind) {
                // A create the store has not echoed yet; leave it until the
                // echo lands or the entry TTL collects it.
                Some(MutationKind::Create) => {}
                Some(_) => events.extend(self.ingest_delete(id)),
                None => {
                    self.visible.shift_remove(&id);
                }
            }
        }
        events
    }

    // ---------------------------------------------------------------
    // Staleness GC
    // ---------------------------------------------------------------

    /// Roll back and drop entries unconfirmed for longer than the entry TTL.
    pub fn collect_stale(&mut self, now: Timestamp) -> Vec<BoardEvent> {
        let stale = self.ledger.collect_stale(now, self.entry_ttl);
        stale
            .into_iter()
            .map(|entry| {
                self.restore(&entry);
                warn!(
                    local_id = %entry.local_id,
                    target = %entry.target,
                    age_ms = now.since(entry.applied_at).as_millis() as u64,
                    "collecting stale optimistic entry"
                );
                BoardEvent::MutationRolledBack {
                    local_id: entry.local_id,
                    target: entry.target,
                    error: BoardError::Timeout(self.entry_ttl),
                }
            })
            .collect()
    }

    /// Note a gateway retry on an entry (keeps the ledger's count honest).
    pub fn note_retry(&mut self, local_id: LocalId) {
        self.ledger.note_retry(local_id);
    }

    /// Drop all pending entries and visible records (session teardown).
    pub fn clear(&mut self) {
        self.ledger.clear();
        self.visible.clear();
    }
}
