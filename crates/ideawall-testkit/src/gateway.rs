//! In-memory persistence gateway
//!
//! Behaves like the real backing store: it assigns authoritative ids,
//! stamps timestamps, enforces lock semantics, and (when wired to a
//! [`MemoryChannel`]) emits the redundant change events a push backend
//! produces for the caller's own writes. Tests can inject failures and
//! delays ahead of any call and inspect the full call log afterwards.

use crate::channel::MemoryChannel;
use async_trait::async_trait;
use ideawall_core::{
    ActorId, BoardError, BoardResult, ChangeEvent, Clock, EditLock, Idea, IdeaId, IdeaPatch,
    PersistenceGateway, ScopeId,
};
use ideawall_engine::locks::{evaluate_acquire, evaluate_release, LockDecision};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// One recorded gateway invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// `create` with the temporary client id.
    Create(IdeaId),
    /// `update` on a record.
    Update(IdeaId),
    /// `delete` on a record.
    Delete(IdeaId),
    /// `acquire_lock`.
    AcquireLock(IdeaId, ActorId),
    /// `release_lock`.
    ReleaseLock(IdeaId, ActorId),
    /// `sweep_stale_locks`.
    Sweep(ScopeId),
    /// `list_scope`.
    List(ScopeId),
}

/// An in-memory [`PersistenceGateway`] with failure injection.
pub struct MemoryGateway {
    clock: Arc<dyn Clock>,
    lock_ttl: Duration,
    records: Mutex<HashMap<IdeaId, Idea>>,
    calls: Mutex<Vec<GatewayCall>>,
    injected_failures: Mutex<VecDeque<BoardError>>,
    injected_delay: Mutex<Option<Duration>>,
    channel: Option<Arc<MemoryChannel>>,
}

impl MemoryGateway {
    /// Create an empty store.
    pub fn new(clock: Arc<dyn Clock>, lock_ttl: Duration) -> Self {
        Self {
            clock,
            lock_ttl,
            records: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            injected_failures: Mutex::new(VecDeque::new()),
            injected_delay: Mutex::new(None),
            channel: None,
        }
    }

    /// Wire the gateway to a channel so successful writes publish events.
    pub fn with_channel(mut self, channel: Arc<MemoryChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Insert a record directly, without a call log entry or an event.
    pub fn seed(&self, idea: Idea) {
        self.records.lock().insert(idea.id, idea);
    }

    /// Queue an error for the next gateway call.
    pub fn inject_failure(&self, error: BoardError) {
        self.injected_failures.lock().push_back(error);
    }

    /// Queue the same error for the next `count` calls.
    pub fn inject_failures(&self, error: BoardError, count: u32) {
        let mut queue = self.injected_failures.lock();
        for _ in 0..count {
            queue.push_back(error.clone());
        }
    }

    /// Make the next call stall for `delay` before answering.
    pub fn inject_delay(&self, delay: Duration) {
        *self.injected_delay.lock() = Some(delay);
    }

    /// The full call log.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    /// How many `update` calls hit a record.
    pub fn update_count(&self, id: IdeaId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, GatewayCall::Update(target) if *target == id))
            .count()
    }

    /// Direct read of a stored record.
    pub fn stored(&self, id: IdeaId) -> Option<Idea> {
        self.records.lock().get(&id).cloned()
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    async fn gate(&self, call: GatewayCall) -> BoardResult<()> {
        self.calls.lock().push(call);
        let delay = self.injected_delay.lock().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.injected_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(())
    }

    fn publish(&self, event: ChangeEvent) {
        if let Some(channel) = &self.channel {
            channel.publish(event);
        }
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create(&self, idea: Idea) -> BoardResult<Idea> {
        self.gate(GatewayCall::Create(idea.id)).await?;
        let now = self.clock.now();
        let stored = Idea {
            id: IdeaId::new(),
            created_at: now,
            updated_at: now,
            edit_lock: None,
            ..idea
        };
        self.records.lock().insert(stored.id, stored.clone());
        self.publish(ChangeEvent::Inserted(stored.clone()));
        Ok(stored)
    }

    async fn update(&self, id: IdeaId, patch: IdeaPatch) -> BoardResult<Idea> {
        self.gate(GatewayCall::Update(id)).await?;
        let now = self.clock.now();
        let stored = {
            let mut records = self.records.lock();
            let record = records.get_mut(&id).ok_or(BoardError::NotFound(id))?;
            patch.apply_to(record, now);
            record.clone()
        };
        self.publish(ChangeEvent::Updated(stored.clone()));
        Ok(stored)
    }

    async fn delete(&self, id: IdeaId) -> BoardResult<bool> {
        self.gate(GatewayCall::Delete(id)).await?;
        let removed = self.records.lock().remove(&id);
        match removed {
            Some(idea) => {
                self.publish(ChangeEvent::Deleted {
                    id,
                    scope: idea.scope,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn acquire_lock(&self, id: IdeaId, holder: ActorId) -> BoardResult<bool> {
        self.gate(GatewayCall::AcquireLock(id, holder)).await?;
        let now = self.clock.now();
        let stored = {
            let mut records = self.records.lock();
            let record = records.get_mut(&id).ok_or(BoardError::NotFound(id))?;
            match evaluate_acquire(record.edit_lock, holder, now, self.lock_ttl) {
                LockDecision::Granted { .. } => {
                    record.edit_lock = Some(EditLock {
                        holder,
                        acquired_at: now,
                    });
                    record.updated_at = now;
                    Some(record.clone())
                }
                LockDecision::Denied { .. } => None,
            }
        };
        match stored {
            Some(record) => {
                self.publish(ChangeEvent::Updated(record));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_lock(&self, id: IdeaId, holder: ActorId) -> BoardResult<bool> {
        self.gate(GatewayCall::ReleaseLock(id, holder)).await?;
        let now = self.clock.now();
        let stored = {
            let mut records = self.records.lock();
            let Some(record) = records.get_mut(&id) else {
                return Ok(false);
            };
            if !evaluate_release(record.edit_lock, holder) {
                return Ok(false);
            }
            record.edit_lock = None;
            record.updated_at = now;
            record.clone()
        };
        self.publish(ChangeEvent::Updated(stored));
        Ok(true)
    }

    async fn sweep_stale_locks(&self, scope: ScopeId, ttl: Duration) -> BoardResult<u32> {
        self.gate(GatewayCall::Sweep(scope)).await?;
        let now = self.clock.now();
        let swept: Vec<Idea> = {
            let mut records = self.records.lock();
            let mut swept = Vec::new();
            for record in records.values_mut() {
                if record.scope != scope {
                    continue;
                }
                let expired = record
                    .edit_lock
                    .is_some_and(|lock| lock.is_expired(now, ttl));
                if expired {
                    record.edit_lock = None;
                    record.updated_at = now;
                    swept.push(record.clone());
                }
            }
            swept
        };
        let count = swept.len() as u32;
        for record in swept {
            self.publish(ChangeEvent::Updated(record));
        }
        Ok(count)
    }

    async fn list_scope(&self, scope: ScopeId) -> BoardResult<Vec<Idea>> {
        self.gate(GatewayCall::List(scope)).await?;
        Ok(self
            .records
            .lock()
            .values()
            .filter(|idea| idea.scope == scope)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use ideawall_core::{Position, Timestamp};

    const TTL: Duration = Duration::from_secs(300);

    fn setup() -> (Arc<ManualClock>, MemoryGateway, ScopeId) {
        let clock = Arc::new(ManualClock::starting_at(Timestamp::from_millis(1_000)));
        let gateway = MemoryGateway::new(clock.clone(), TTL);
        (clock, gateway, ScopeId::new())
    }

    #[tokio::test]
    async fn create_assigns_an_authoritative_id() {
        let (_, gateway, scope) = setup();
        let temp = Idea::new("x", Position::CENTER, scope, None, Timestamp::EPOCH);
        let temp_id = temp.id;
        let stored = gateway.create(temp).await.expect("create succeeds");
        assert_ne!(stored.id, temp_id);
        assert_eq!(gateway.record_count(), 1);
    }

    #[tokio::test]
    async fn lock_mutual_exclusion_and_ttl_reclaim() {
        let (clock, gateway, scope) = setup();
        let idea = Idea::new("x", Position::CENTER, scope, None, Timestamp::EPOCH);
        let id = idea.id;
        gateway.seed(idea);

        let a = ActorId::new();
        let b = ActorId::new();

        assert!(gateway.acquire_lock(id, a).await.expect("call ok"));
        // B inside the TTL: denied. A again: re-entrant.
        clock.advance(Duration::from_secs(60));
        assert!(!gateway.acquire_lock(id, b).await.expect("call ok"));
        assert!(gateway.acquire_lock(id, a).await.expect("call ok"));

        // Six minutes without release: B reclaims.
        clock.advance(Duration::from_secs(360));
        assert!(gateway.acquire_lock(id, b).await.expect("call ok"));

        // A's late release is a no-op; B still holds the lock.
        assert!(!gateway.release_lock(id, a).await.expect("call ok"));
        let lock = gateway.stored(id).and_then(|idea| idea.edit_lock);
        assert_eq!(lock.map(|l| l.holder), Some(b));
    }

    #[tokio::test]
    async fn sweep_clears_only_expired_locks_in_scope() {
        let (clock, gateway, scope) = setup();
        let stale = Idea::new("stale", Position::CENTER, scope, None, Timestamp::EPOCH);
        let fresh = Idea::new("fresh", Position::CENTER, scope, None, Timestamp::EPOCH);
        let foreign = Idea::new("foreign", Position::CENTER, ScopeId::new(), None, Timestamp::EPOCH);
        let (stale_id, fresh_id, foreign_id) = (stale.id, fresh.id, foreign.id);
        gateway.seed(stale);
        gateway.seed(fresh);
        gateway.seed(foreign);

        let holder = ActorId::new();
        gateway.acquire_lock(stale_id, holder).await.expect("call ok");
        gateway.acquire_lock(foreign_id, holder).await.expect("call ok");
        clock.advance(Duration::from_secs(360));
        gateway.acquire_lock(fresh_id, holder).await.expect("call ok");

        let swept = gateway.sweep_stale_locks(scope, TTL).await.expect("call ok");
        assert_eq!(swept, 1);
        assert!(gateway.stored(stale_id).and_then(|i| i.edit_lock).is_none());
        assert!(gateway.stored(fresh_id).and_then(|i| i.edit_lock).is_some());
        // Out of scope, untouched even though expired.
        assert!(gateway.stored(foreign_id).and_then(|i| i.edit_lock).is_some());
    }

    #[tokio::test]
    async fn injected_failures_surface_in_order() {
        let (_, gateway, scope) = setup();
        gateway.inject_failures(BoardError::Network("reset".into()), 2);
        assert!(gateway.list_scope(scope).await.is_err());
        assert!(gateway.list_scope(scope).await.is_err());
        assert!(gateway.list_scope(scope).await.is_ok());
    }
}
