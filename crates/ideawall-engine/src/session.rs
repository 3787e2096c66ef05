//! Board session facade
//!
//! `BoardSession` is what the surrounding application talks to. It wires
//! the reconciler, ledger, deduplicator, and lock service together, owns
//! the change-channel subscription, and runs the background work: the
//! stale-lock sweep, ledger GC, move debouncing, and the polling fallback
//! when the channel cannot be subscribed.
//!
//! Every local mutation follows the same shape: mutate visible state
//! synchronously through the reconciler, then resolve the gateway call
//! asynchronously into a confirm or an exact rollback.

use crate::config::EngineConfig;
use crate::dedup::SubmissionDeduplicator;
use crate::locks::EditLockService;
use crate::reconciler::{BoardEvent, Reconciler};
use crate::retry::{bounded, retry_with_backoff, RetryPolicy};
use ideawall_core::{
    ActorId, BoardError, BoardResult, ChangeChannel, Clock, EventSink, Idea, IdeaId, IdeaPatch,
    LocalId, PersistenceGateway, Position, ScopeId, Subscription, Timestamp,
};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A move waiting out its settle window before persisting.
#[derive(Debug, Clone, Copy)]
struct PendingMove {
    local_id: LocalId,
    position: Position,
}

/// Shared engine state reachable from background tasks.
struct SessionInner<G> {
    actor: ActorId,
    scope: ScopeId,
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    reconciler: Mutex<Reconciler>,
    dedup: Mutex<SubmissionDeduplicator>,
    pending_moves: Mutex<HashMap<IdeaId, PendingMove>>,
    locks: EditLockService<Arc<G>>,
    events: broadcast::Sender<BoardEvent>,
    /// When the change channel last delivered (or a refresh last ran).
    last_event: Mutex<Timestamp>,
}

impl<G> SessionInner<G>
where
    G: PersistenceGateway + 'static,
{
    fn emit(&self, events: impl IntoIterator<Item = BoardEvent>) {
        for event in events {
            // A lagging or absent receiver never blocks the engine.
            let _ = self.events.send(event);
        }
    }

    /// Resolve a gateway round trip into confirm or rollback.
    fn resolve(&self, local_id: LocalId, result: BoardResult<Option<Idea>>) {
        let events: Vec<BoardEvent> = {
            let mut reconciler = self.reconciler.lock();
            match result {
                Ok(idea) => reconciler.confirm(local_id, idea).into_iter().collect(),
                Err(error) => reconciler.fail(local_id, &error).into_iter().collect(),
            }
        };
        self.emit(events);
    }

    async fn flush_move(&self, id: IdeaId) {
        let pending = { self.pending_moves.lock().remove(&id) };
        let Some(pending) = pending else {
            return;
        };
        debug!(record = %id, position = %pending.position, "persisting settled position");
        let result = bounded(
            self.config.request_timeout,
            self.gateway.update(id, IdeaPatch::move_to(pending.position)),
        )
        .await;
        self.resolve(pending.local_id, result.map(Some));
    }

    /// Read the whole scope and merge it like a batch of events.
    async fn refresh_from_gateway(&self) {
        let result = bounded(
            self.config.request_timeout,
            self.gateway.list_scope(self.scope),
        )
        .await;
        match result {
            Ok(records) => {
                let now = self.clock.now();
                let events = { self.reconciler.lock().apply_snapshot(records, now) };
                self.emit(events);
                *self.last_event.lock() = now;
            }
            Err(error) => {
                warn!(scope = %self.scope, error = %error, "gateway refresh failed");
            }
        }
    }
}

/// One client's live connection to a shared board.
pub struct BoardSession<G, Ch> {
    inner: Arc<SessionInner<G>>,
    channel: Arc<Ch>,
    subscription: Mutex<Option<Subscription>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<G, Ch> BoardSession<G, Ch>
where
    G: PersistenceGateway + 'static,
    Ch: ChangeChannel + 'static,
{
    /// Build a session for `actor` on `scope`.
    pub fn new(
        gateway: Arc<G>,
        channel: Arc<Ch>,
        clock: Arc<dyn Clock>,
        actor: ActorId,
        scope: ScopeId,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let locks =
            EditLockService::new(gateway.clone(), actor, config.lock_ttl, config.request_timeout);
        let started_at = clock.now();
        let inner = Arc::new(SessionInner {
            actor,
            scope,
            gateway,
            clock,
            reconciler: Mutex::new(Reconciler::new(
                scope,
                config.echo_tolerance,
                config.entry_ttl,
            )),
            dedup: Mutex::new(SubmissionDeduplicator::new(config.dedup_window)),
            pending_moves: Mutex::new(HashMap::new()),
            locks,
            events,
            last_event: Mutex::new(started_at),
            config,
        });
        Self {
            inner,
            channel,
            subscription: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Hydrate the board, subscribe to the change feed, and start the
    /// background sweep. Falls back to polling when subscription keeps
    /// failing.
    pub async fn start(&self) -> BoardResult<()> {
        // Initial hydration through the ordinary read path.
        let records = bounded(
            self.inner.config.request_timeout,
            self.inner.gateway.list_scope(self.inner.scope),
        )
        .await?;
        {
            let now = self.inner.clock.now();
            let mut reconciler = self.inner.reconciler.lock();
            let events = reconciler.apply_snapshot(records, now);
            drop(reconciler);
            self.inner.emit(events);
        }

        let sink = self.ingest_sink();
        let backoff = RetryPolicy {
            base: self.inner.config.retry_base,
            cap: self.inner.config.retry_cap,
            max_attempts: self.inner.config.max_reconnect_attempts,
        };
        let mut attempts = 0u32;
        loop {
            match self.channel.subscribe(self.inner.scope, sink.clone()).await {
                Ok(subscription) => {
                    *self.subscription.lock() = Some(subscription);
                    info!(scope = %self.inner.scope, "subscribed to change feed");
                    break;
                }
                Err(error) => {
                    attempts += 1;
                    warn!(
                        scope = %self.inner.scope,
                        attempts,
                        error = %error,
                        "change feed subscription failed"
                    );
                    if attempts >= self.inner.config.max_reconnect_attempts {
                        warn!(
                            scope = %self.inner.scope,
                            "degrading to polling fallback"
                        );
                        self.spawn_polling();
                        break;
                    }
                    tokio::time::sleep(backoff.delay_after(attempts - 1)).await;
                }
            }
        }

        self.spawn_sweep();
        Ok(())
    }

    /// Remember a spawned task, dropping handles of tasks that already
    /// finished so the vector stays bounded over a long session.
    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn ingest_sink(&self) -> EventSink {
        let inner = self.inner.clone();
        Arc::new(move |event| {
            let now = inner.clock.now();
            *inner.last_event.lock() = now;
            let events = { inner.reconciler.lock().ingest(event, now) };
            inner.emit(events);
        })
    }

    fn spawn_polling(&self) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.config.poll_interval).await;
                inner.refresh_from_gateway().await;
            }
        });
        self.track(handle);
    }

    fn spawn_sweep(&self) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.config.sweep_interval).await;
                if let Err(error) = inner.locks.sweep(inner.scope).await {
                    warn!(scope = %inner.scope, error = %error, "lock sweep failed");
                }
                let now = inner.clock.now();
                let events = { inner.reconciler.lock().collect_stale(now) };
                inner.emit(events);
                inner.dedup.lock().prune(now);

                // A subscribed channel that has gone quiet looks the same
                // as a dead one; past the stall bound, read through.
                let quiet = now.since(*inner.last_event.lock());
                if quiet >= inner.config.channel_stall_timeout {
                    debug!(
                        scope = %inner.scope,
                        quiet_ms = quiet.as_millis() as u64,
                        "change feed quiet, refreshing from gateway"
                    );
                    inner.refresh_from_gateway().await;
                }
            }
        });
        self.track(handle);
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Optimistically create an idea; duplicate submissions inside the
    /// dedup window are rejected synchronously.
    pub fn apply_create(
        &self,
        content: impl Into<String>,
        position: Position,
    ) -> BoardResult<LocalId> {
        let content = content.into();
        let now = self.inner.clock.now();
        {
            let mut dedup = self.inner.dedup.lock();
            if !dedup.should_accept(&content, self.inner.actor, now) {
                info!(actor = %self.inner.actor, "duplicate submission rejected");
                return Err(BoardError::DuplicateSubmission);
            }
            dedup.record_submission(&content, self.inner.actor, now);
        }

        let idea = Idea::new(
            content,
            position,
            self.inner.scope,
            Some(self.inner.actor),
            now,
        );
        let local_id = {
            self.inner
                .reconciler
                .lock()
                .apply_create(idea.clone(), self.inner.actor, now)
        };

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let policy = RetryPolicy {
                base: inner.config.retry_base,
                cap: inner.config.retry_cap,
                max_attempts: inner.config.max_retry_attempts,
            };
            let result = retry_with_backoff(policy, "create", |attempt| {
                if attempt > 0 {
                    inner.reconciler.lock().note_retry(local_id);
                }
                let gateway = inner.gateway.clone();
                let idea = idea.clone();
                let timeout = inner.config.request_timeout;
                async move { bounded(timeout, gateway.create(idea)).await }
            })
            .await;
            inner.resolve(local_id, result.map(Some));
        });
        self.track(handle);
        Ok(local_id)
    }

    /// Optimistically apply a field edit.
    pub fn apply_update(&self, id: IdeaId, patch: IdeaPatch) -> BoardResult<LocalId> {
        if patch.is_empty() {
            return Err(BoardError::Validation("patch writes no fields".into()));
        }
        let now = self.inner.clock.now();
        let local_id = {
            self.inner
                .reconciler
                .lock()
                .apply_update(id, &patch, self.inner.actor, now)?
        };

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let result = bounded(inner.config.request_timeout, inner.gateway.update(id, patch)).await;
            inner.resolve(local_id, result.map(Some));
        });
        self.track(handle);
        Ok(local_id)
    }

    /// Optimistically delete a record.
    pub fn apply_delete(&self, id: IdeaId) -> BoardResult<LocalId> {
        let now = self.inner.clock.now();
        let local_id = {
            self.inner
                .reconciler
                .lock()
                .apply_delete(id, self.inner.actor, now)?
        };

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let result = bounded(inner.config.request_timeout, inner.gateway.delete(id)).await;
            inner.resolve(local_id, result.map(|_| None));
        });
        self.track(handle);
        Ok(local_id)
    }

    /// Optimistically move a record.
    ///
    /// Every call is visible immediately; the network write is debounced,
    /// so a drag emitting dozens of intermediate positions persists once,
    /// with the final settled position.
    pub fn apply_move(&self, id: IdeaId, position: Position) -> BoardResult<LocalId> {
        let now = self.inner.clock.now();
        let local_id = {
            self.inner
                .reconciler
                .lock()
                .apply_move(id, position, self.inner.actor, now)?
        };

        let mut moves = self.inner.pending_moves.lock();
        match moves.entry(id) {
            Entry::Occupied(mut slot) => {
                // Already debouncing; just remember the newest position.
                slot.insert(PendingMove { local_id, position });
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingMove { local_id, position });
                let inner = self.inner.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(inner.config.move_settle).await;
                    inner.flush_move(id).await;
                });
                self.track(handle);
            }
        }
        Ok(local_id)
    }

    /// Persist any debounced moves immediately (teardown and tests).
    pub async fn flush_moves(&self) {
        let ids: Vec<IdeaId> = { self.inner.pending_moves.lock().keys().copied().collect() };
        for id in ids {
            self.inner.flush_move(id).await;
        }
    }

    // ---------------------------------------------------------------
    // Locks
    // ---------------------------------------------------------------

    /// Take the edit lock on a record. `Ok(false)` means someone else
    /// holds it; a `LockDenied` event is emitted alongside.
    pub async fn acquire_edit_lock(&self, id: IdeaId) -> BoardResult<bool> {
        let granted = self.inner.locks.acquire(id).await?;
        if !granted {
            let now = self.inner.clock.now();
            let holder = {
                self.inner
                    .reconciler
                    .lock()
                    .get(id)
                    .and_then(|idea| idea.live_lock_holder(now, self.inner.config.lock_ttl))
            };
            self.inner.emit([BoardEvent::LockDenied { id, holder }]);
        }
        Ok(granted)
    }

    /// Release the edit lock on a record.
    pub async fn release_edit_lock(&self, id: IdeaId) -> BoardResult<bool> {
        self.inner.locks.release(id).await
    }

    // ---------------------------------------------------------------
    // Views and events
    // ---------------------------------------------------------------

    /// The reconciled visible collection.
    pub fn visible_ideas(&self) -> Vec<Idea> {
        self.inner.reconciler.lock().visible_ideas()
    }

    /// One visible record.
    pub fn get(&self, id: IdeaId) -> Option<Idea> {
        self.inner.reconciler.lock().get(id).cloned()
    }

    /// Outstanding optimistic mutations (diagnostics and tests).
    pub fn pending_mutations(&self) -> usize {
        self.inner.reconciler.lock().pending_mutations()
    }

    /// Tracked background task handles, finished ones included until the
    /// next spawn reaps them (diagnostics and tests).
    pub fn background_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Subscribe to engine notifications.
    pub fn subscribe_events(&self) -> broadcast::Receiver<BoardEvent> {
        self.inner.events.subscribe()
    }

    /// The actor this session acts as.
    pub fn actor(&self) -> ActorId {
        self.inner.actor
    }

    /// The scope this session is bound to.
    pub fn scope(&self) -> ScopeId {
        self.inner.scope
    }

    /// Stop background work and unsubscribe. Visible state stays intact so
    /// a degraded caller keeps its last known good view.
    pub fn stop(&self) {
        *self.subscription.lock() = None;
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

impl<G, Ch> Drop for BoardSession<G, Ch> {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}
