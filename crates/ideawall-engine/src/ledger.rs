//! Optimistic mutation ledger
//!
//! Bookkeeping for in-flight local mutations: one entry per record, holding
//! the rollback snapshot captured before the first tentative change. The
//! ledger never touches visible state itself; the reconciler owns that and
//! consults the ledger while merging.
//!
//! A second mutation on a record with a pending entry **coalesces** into the
//! existing entry, keeping the earliest rollback snapshot. Rolling back then
//! restores the state from before the whole burst, not an intermediate
//! optimistic value that the store never confirmed.

use ideawall_core::{ActorId, Fingerprint, Idea, IdeaId, LocalId, Timestamp};
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

/// What kind of mutation an entry predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// A new record with a temporary client-minted id.
    Create,
    /// A field edit on an existing record.
    Update,
    /// Removal of an existing record.
    Delete,
    /// A drag to a new position.
    Move,
}

/// The visible state of the record before the mutation was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackSnapshot {
    /// The record did not exist (creates).
    Absent,
    /// The record looked exactly like this.
    Present(Box<Idea>),
}

/// One in-flight optimistic mutation. Memory-only, never persisted.
#[derive(Debug, Clone)]
pub struct OptimisticEntry {
    /// Ledger-local id handed back to the caller.
    pub local_id: LocalId,
    /// Mutation kind after coalescing.
    pub kind: MutationKind,
    /// The affected record id (temporary for creates until the echo lands).
    pub target: IdeaId,
    /// Pre-mutation state for rollback.
    pub snapshot: RollbackSnapshot,
    /// When the first mutation of the burst was applied.
    pub applied_at: Timestamp,
    /// Gateway attempts made so far.
    pub retry_count: u32,
    /// Content fingerprint, set for creates, used for echo matching.
    pub fingerprint: Option<Fingerprint>,
    /// Who made the mutation.
    pub actor: ActorId,
}

/// In-memory ledger of outstanding optimistic entries.
#[derive(Debug, Default)]
pub struct OptimisticLedger {
    entries: HashMap<LocalId, OptimisticEntry>,
    by_target: HashMap<IdeaId, LocalId>,
}

impl OptimisticLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation, coalescing with any pending entry on the same
    /// target. Returns the (possibly pre-existing) entry id.
    pub fn record(
        &mut self,
        kind: MutationKind,
        target: IdeaId,
        snapshot: RollbackSnapshot,
        fingerprint: Option<Fingerprint>,
        actor: ActorId,
        now: Timestamp,
    ) -> LocalId {
        if let Some(&local_id) = self.by_target.get(&target) {
            if let Some(entry) = self.entries.get_mut(&local_id) {
                // Coalesce: earliest snapshot and timestamp stay, the kind
                // upgrades. A pending create stays a create whatever edits
                // follow it; a delete wins over update/move.
                entry.kind = match (entry.kind, kind) {
                    (MutationKind::Create, _) => MutationKind::Create,
                    (_, MutationKind::Delete) | (MutationKind::Delete, _) => MutationKind::Delete,
                    (_, incoming) => incoming,
                };
                trace!(target = %target, local_id = %local_id, "coalesced into pending entry");
                return local_id;
            }
        }

        let local_id = LocalId::new();
        self.entries.insert(
            local_id,
            OptimisticEntry {
                local_id,
                kind,
                target,
                snapshot,
                applied_at: now,
                retry_count: 0,
                fingerprint,
                actor,
            },
        );
        self.by_target.insert(target, local_id);
        local_id
    }

    /// Bump the retry counter for an entry still in flight.
    pub fn note_retry(&mut self, local_id: LocalId) {
        if let Some(entry) = self.entries.get_mut(&local_id) {
            entry.retry_count += 1;
        }
    }

    /// The pending entry for a record, if any.
    pub fn pending_on(&self, target: IdeaId) -> Option<&OptimisticEntry> {
        self.by_target
            .get(&target)
            .and_then(|local_id| self.entries.get(local_id))
    }

    /// Remove and return an entry by its ledger id.
    pub fn take(&mut self, local_id: LocalId) -> Option<OptimisticEntry> {
        let entry = self.entries.remove(&local_id)?;
        self.by_target.remove(&entry.target);
        Some(entry)
    }

    /// Remove and return the entry pending on a record.
    pub fn take_by_target(&mut self, target: IdeaId) -> Option<OptimisticEntry> {
        let local_id = self.by_target.remove(&target)?;
        self.entries.remove(&local_id)
    }

    /// Find the pending create that an authoritative insert confirms.
    ///
    /// Matches by identical id, or by fingerprint + actor when the insert
    /// arrived within `tolerance` of the optimistic apply (the id was not
    /// known at apply time). The heuristic can misfire on rapid legitimate
    /// duplicates; the tolerance is tunable for exactly that reason.
    pub fn match_create_echo(
        &self,
        idea: &Idea,
        now: Timestamp,
        tolerance: Duration,
    ) -> Option<LocalId> {
        self.entries.values().find_map(|entry| {
            if entry.kind != MutationKind::Create {
                return None;
            }
            let by_id = entry.target == idea.id;
            let by_content = entry.fingerprint == Some(Fingerprint::of_content(&idea.content))
                && idea.owner == Some(entry.actor)
                && now.since(entry.applied_at) <= tolerance;
            (by_id || by_content).then_some(entry.local_id)
        })
    }

    /// Remove and return every entry older than `ttl`.
    ///
    /// Entries this old belong to lost connections or dropped responses;
    /// collecting them keeps the ledger bounded. The caller rolls their
    /// visible effects back.
    pub fn collect_stale(&mut self, now: Timestamp, ttl: Duration) -> Vec<OptimisticEntry> {
        let stale: Vec<LocalId> = self
            .entries
            .values()
            .filter(|entry| now.since(entry.applied_at) >= ttl)
            .map(|entry| entry.local_id)
            .collect();
        stale.into_iter().filter_map(|id| self.take(id)).collect()
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry without rollback (session teardown).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_target.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ideawall_core::{Position, ScopeId};

    fn idea(content: &str, owner: ActorId, scope: ScopeId) -> Idea {
        Idea::new(
            content,
            Position::CENTER,
            scope,
            Some(owner),
            Timestamp::from_millis(1_000),
        )
    }

    #[test]
    fn coalesce_keeps_earliest_snapshot() {
        let mut ledger = OptimisticLedger::new();
        let actor = ActorId::new();
        let scope = ScopeId::new();
        let original = idea("original", actor, scope);
        let target = original.id;
        let first_snapshot = RollbackSnapshot::Present(Box::new(original.clone()));

        let first = ledger.record(
            MutationKind::Update,
            target,
            first_snapshot.clone(),
            None,
            actor,
            Timestamp::from_millis(2_000),
        );
        let mut intermediate = original;
        intermediate.content = "optimistic".into();
        let second = ledger.record(
            MutationKind::Move,
            target,
            RollbackSnapshot::Present(Box::new(intermediate)),
            None,
            actor,
            Timestamp::from_millis(2_500),
        );

        assert_eq!(first, second);
        assert_eq!(ledger.len(), 1);
        let entry = ledger.pending_on(target).expect("entry pending");
        assert_eq!(entry.snapshot, first_snapshot);
        assert_eq!(entry.applied_at, Timestamp::from_millis(2_000));
        assert_eq!(entry.kind, MutationKind::Move);
    }

    #[test]
    fn delete_wins_the_kind_upgrade() {
        let mut ledger = OptimisticLedger::new();
        let actor = ActorId::new();
        let target = IdeaId::new();
        ledger.record(
            MutationKind::Update,
            target,
            RollbackSnapshot::Absent,
            None,
            actor,
            Timestamp::EPOCH,
        );
        ledger.record(
            MutationKind::Delete,
            target,
            RollbackSnapshot::Absent,
            None,
            actor,
            Timestamp::EPOCH,
        );
        ledger.record(
            MutationKind::Move,
            target,
            RollbackSnapshot::Absent,
            None,
            actor,
            Timestamp::EPOCH,
        );
        assert_eq!(
            ledger.pending_on(target).map(|e| e.kind),
            Some(MutationKind::Delete)
        );
    }

    #[test]
    fn echo_matches_by_content_actor_and_time() {
        let mut ledger = OptimisticLedger::new();
        let actor = ActorId::new();
        let scope = ScopeId::new();
        let temp = idea("improve onboarding", actor, scope);
        ledger.record(
            MutationKind::Create,
            temp.id,
            RollbackSnapshot::Absent,
            Some(Fingerprint::of_content(&temp.content)),
            actor,
            Timestamp::from_millis(1_000),
        );

        // Authoritative echo: different id, same content and owner.
        let echo = idea("improve onboarding", actor, scope);
        let tolerance = Duration::from_millis(5_000);
        assert!(ledger
            .match_create_echo(&echo, Timestamp::from_millis(3_000), tolerance)
            .is_some());

        // Too late: outside the tolerance.
        assert!(ledger
            .match_create_echo(&echo, Timestamp::from_millis(7_000), tolerance)
            .is_none());

        // Someone else's identical idea is not our echo.
        let other = idea("improve onboarding", ActorId::new(), scope);
        assert!(ledger
            .match_create_echo(&other, Timestamp::from_millis(3_000), tolerance)
            .is_none());
    }

    #[test]
    fn echo_matches_by_id_regardless_of_content() {
        let mut ledger = OptimisticLedger::new();
        let actor = ActorId::new();
        let scope = ScopeId::new();
        let temp = idea("draft", actor, scope);
        ledger.record(
            MutationKind::Create,
            temp.id,
            RollbackSnapshot::Absent,
            Some(Fingerprint::of_content(&temp.content)),
            actor,
            Timestamp::from_millis(1_000),
        );

        let mut same_id = idea("rewritten server side", actor, scope);
        same_id.id = temp.id;
        assert!(ledger
            .match_create_echo(&same_id, Timestamp::from_millis(60_000), Duration::ZERO)
            .is_some());
    }

    #[test]
    fn stale_entries_are_collected() {
        let mut ledger = OptimisticLedger::new();
        let actor = ActorId::new();
        let ttl = Duration::from_secs(30);
        ledger.record(
            MutationKind::Update,
            IdeaId::new(),
            RollbackSnapshot::Absent,
            None,
            actor,
            Timestamp::from_millis(0),
        );
        let fresh_target = IdeaId::new();
        ledger.record(
            MutationKind::Update,
            fresh_target,
            RollbackSnapshot::Absent,
            None,
            actor,
            Timestamp::from_millis(25_000),
        );

        let stale = ledger.collect_stale(Timestamp::from_millis(40_000), ttl);
        assert_eq!(stale.len(), 1);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.pending_on(fresh_target).is_some());
    }

    #[test]
    fn take_by_target_clears_both_indexes() {
        let mut ledger = OptimisticLedger::new();
        let target = IdeaId::new();
        ledger.record(
            MutationKind::Update,
            target,
            RollbackSnapshot::Absent,
            None,
            ActorId::new(),
            Timestamp::EPOCH,
        );
        assert!(ledger.take_by_target(target).is_some());
        assert!(ledger.is_empty());
        assert!(ledger.take_by_target(target).is_none());
    }
}
