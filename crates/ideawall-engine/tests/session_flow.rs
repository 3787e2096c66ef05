//! End-to-end session flows against the in-memory testkit.
//!
//! These tests run the whole engine: optimistic mutations through the
//! ledger, echo matching against the change feed, lock contention between
//! two live sessions, move debouncing, and the polling fallback.

use assert_matches::assert_matches;
use ideawall_core::{
    ActorId, BoardError, Clock, Idea, IdeaId, IdeaPatch, PersistenceGateway, Position, ScopeId,
    Timestamp,
};
use ideawall_engine::{BoardEvent, BoardSession, EngineConfig};
use ideawall_testkit::{GatewayCall, ManualClock, MemoryChannel, MemoryGateway};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

struct Harness {
    clock: Arc<ManualClock>,
    gateway: Arc<MemoryGateway>,
    channel: Arc<MemoryChannel>,
    config: EngineConfig,
    scope: ScopeId,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::starting_at(Timestamp::from_millis(10_000)));
    let channel = Arc::new(MemoryChannel::new());
    let config = EngineConfig::for_tests();
    let gateway = Arc::new(
        MemoryGateway::new(clock.clone(), config.lock_ttl).with_channel(channel.clone()),
    );
    Harness {
        clock,
        gateway,
        channel,
        config,
        scope: ScopeId::new(),
    }
}

impl Harness {
    fn session(&self, actor: ActorId) -> BoardSession<MemoryGateway, MemoryChannel> {
        BoardSession::new(
            self.gateway.clone(),
            self.channel.clone(),
            self.clock.clone(),
            actor,
            self.scope,
            self.config.clone(),
        )
    }

    fn seed(&self, content: &str) -> IdeaId {
        let idea = Idea::new(content, Position::CENTER, self.scope, None, self.clock.now());
        let id = idea.id;
        self.gateway.seed(idea);
        id
    }
}

async fn next_event(rx: &mut broadcast::Receiver<BoardEvent>) -> BoardEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("engine event within deadline")
        .expect("event channel open")
}

#[tokio::test(start_paused = true)]
async fn create_resolves_into_exactly_one_record() {
    let h = harness();
    let session = h.session(ActorId::new());
    session.start().await.expect("start");

    let mut events = session.subscribe_events();
    session
        .apply_create("Improve onboarding", Position::new(0.2, 0.8))
        .expect("accepted");
    // Visible immediately, before the gateway answers.
    assert_eq!(session.visible_ideas().len(), 1);

    let event = next_event(&mut events).await;
    assert_matches!(event, BoardEvent::MutationConfirmed { idea: Some(_), .. });

    let visible = session.visible_ideas();
    assert_eq!(visible.len(), 1, "echo never duplicates the record");
    assert_eq!(visible[0].content, "Improve onboarding");
    assert_eq!(session.pending_mutations(), 0);
    // The visible record carries the authoritative id, not the client one.
    assert!(h.gateway.stored(visible[0].id).is_some());
}

#[tokio::test(start_paused = true)]
async fn duplicate_submission_is_rejected_inside_the_window() {
    let h = harness();
    let session = h.session(ActorId::new());
    session.start().await.expect("start");

    session
        .apply_create("same thought", Position::CENTER)
        .expect("first accepted");
    let second = session.apply_create("  SAME   thought ", Position::CENTER);
    assert_matches!(second, Err(BoardError::DuplicateSubmission));

    // Outside the window the same content is a fresh submission.
    h.clock.advance(h.config.dedup_window + Duration::from_millis(1));
    session
        .apply_create("same thought", Position::CENTER)
        .expect("accepted after the window");
}

#[tokio::test(start_paused = true)]
async fn edit_locks_exclude_other_actors_until_the_ttl_lapses() {
    let h = harness();
    let id = h.seed("contended");
    let alice = ActorId::new();
    let bob = ActorId::new();

    let session_a = h.session(alice);
    let session_b = h.session(bob);
    session_a.start().await.expect("start a");
    session_b.start().await.expect("start b");

    assert!(session_a.acquire_edit_lock(id).await.expect("call ok"));

    // B is refused while the lock is live and learns who holds it.
    let mut b_events = session_b.subscribe_events();
    assert!(!session_b.acquire_edit_lock(id).await.expect("call ok"));
    let event = next_event(&mut b_events).await;
    assert_matches!(
        event,
        BoardEvent::LockDenied { holder: Some(holder), .. } if holder == alice
    );

    // A walks away without releasing; past the TTL, B reclaims.
    h.clock.advance(h.config.lock_ttl + Duration::from_millis(1));
    assert!(session_b.acquire_edit_lock(id).await.expect("call ok"));
    assert!(session_b.release_edit_lock(id).await.expect("call ok"));
}

#[tokio::test(start_paused = true)]
async fn rapid_moves_persist_once_with_the_settled_position() {
    let h = harness();
    let id = h.seed("dragged");
    let session = h.session(ActorId::new());
    session.start().await.expect("start");

    for step in 1..=10u32 {
        let frac = f64::from(step) / 10.0;
        session
            .apply_move(id, Position::new(frac, 1.0 - frac))
            .expect("record exists");
    }
    let settled = Position::new(1.0, 0.0);
    // Every intermediate position was visible immediately.
    assert_eq!(session.get(id).map(|i| i.position), Some(settled));

    session.flush_moves().await;
    assert_eq!(h.gateway.update_count(id), 1, "one write for the whole drag");
    assert_eq!(h.gateway.stored(id).map(|i| i.position), Some(settled));
    assert_eq!(session.pending_mutations(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_update_rolls_back_to_the_exact_prior_state() {
    let h = harness();
    let id = h.seed("original text");
    let session = h.session(ActorId::new());
    session.start().await.expect("start");
    let before = session.get(id).expect("hydrated");

    h.gateway
        .inject_failure(BoardError::Network("connection reset".into()));
    let mut events = session.subscribe_events();
    let patch = IdeaPatch {
        content: Some("optimistic edit".into()),
        ..IdeaPatch::default()
    };
    session.apply_update(id, patch).expect("record exists");
    assert_eq!(
        session.get(id).map(|i| i.content),
        Some("optimistic edit".into())
    );

    let event = next_event(&mut events).await;
    assert_matches!(
        event,
        BoardEvent::MutationRolledBack { target, .. } if target == id
    );
    assert_eq!(session.get(id), Some(before));
}

#[tokio::test(start_paused = true)]
async fn sessions_on_different_scopes_never_bleed() {
    let h = harness();
    let session_a = h.session(ActorId::new());
    session_a.start().await.expect("start a");

    // Second session on its own scope, same store and channel.
    let other = Harness {
        clock: h.clock.clone(),
        gateway: h.gateway.clone(),
        channel: h.channel.clone(),
        config: h.config.clone(),
        scope: ScopeId::new(),
    };
    let session_b = other.session(ActorId::new());
    session_b.start().await.expect("start b");

    let mut a_events = session_a.subscribe_events();
    session_a
        .apply_create("only for board a", Position::CENTER)
        .expect("accepted");
    next_event(&mut a_events).await;

    assert_eq!(session_a.visible_ideas().len(), 1);
    assert!(
        session_b.visible_ideas().is_empty(),
        "events from another scope were dropped"
    );
}

#[tokio::test(start_paused = true)]
async fn polling_fallback_keeps_the_board_fresh_without_a_feed() {
    let h = harness();
    h.channel
        .fail_next_subscribes(h.config.max_reconnect_attempts);
    let session = h.session(ActorId::new());
    session.start().await.expect("start degrades, not fails");
    assert_eq!(h.channel.subscriber_count(), 0, "running without a feed");

    // Another participant writes while we are degraded.
    let theirs = Idea::new(
        "written elsewhere",
        Position::CENTER,
        h.scope,
        Some(ActorId::new()),
        h.clock.now(),
    );
    let stored = h.gateway.create(theirs).await.expect("direct create");

    sleep(h.config.poll_interval * 3).await;
    assert_eq!(
        session.get(stored.id).map(|i| i.content),
        Some("written elsewhere".into())
    );
    // The record arrived through list reads, not the change feed.
    assert!(h
        .gateway
        .calls()
        .iter()
        .filter(|call| matches!(call, GatewayCall::List(scope) if *scope == h.scope))
        .count()
        >= 2);
}

#[tokio::test(start_paused = true)]
async fn finished_mutation_tasks_are_reaped() {
    let h = harness();
    let session = h.session(ActorId::new());
    session.start().await.expect("start");

    let mut events = session.subscribe_events();
    for n in 0..25 {
        session
            .apply_create(format!("idea {n}"), Position::CENTER)
            .expect("accepted");
        next_event(&mut events).await;
    }
    // The long-lived sweep task plus at most the newest mutation task;
    // everything resolved earlier has been dropped.
    assert!(
        session.background_tasks() <= 2,
        "stale handles kept: {}",
        session.background_tasks()
    );
}

#[tokio::test(start_paused = true)]
async fn subscribe_retries_back_off_before_degrading() {
    let h = harness();
    h.channel
        .fail_next_subscribes(h.config.max_reconnect_attempts);
    let session = h.session(ActorId::new());

    let before = tokio::time::Instant::now();
    session.start().await.expect("start degrades, not fails");
    let waited = before.elapsed();

    assert!(
        waited >= h.config.retry_base,
        "no pause between subscribe attempts: {waited:?}"
    );
    assert_eq!(h.channel.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn a_quiet_change_feed_still_converges_through_refresh() {
    // Gateway deliberately not wired to the channel: the subscription
    // succeeds but no event ever arrives, like a silently dead feed.
    let clock = Arc::new(ManualClock::starting_at(Timestamp::from_millis(10_000)));
    let channel = Arc::new(MemoryChannel::new());
    let config = EngineConfig::for_tests();
    let gateway = Arc::new(MemoryGateway::new(clock.clone(), config.lock_ttl));
    let scope = ScopeId::new();
    let session = BoardSession::new(
        gateway.clone(),
        channel.clone(),
        clock.clone(),
        ActorId::new(),
        scope,
        config.clone(),
    );
    session.start().await.expect("start");
    assert_eq!(channel.subscriber_count(), 1);

    let theirs = Idea::new(
        "written elsewhere",
        Position::CENTER,
        scope,
        Some(ActorId::new()),
        clock.now(),
    );
    let stored = gateway.create(theirs).await.expect("direct create");
    assert!(session.get(stored.id).is_none(), "no event was delivered");

    clock.advance(config.channel_stall_timeout + Duration::from_millis(1));
    sleep(config.sweep_interval * 3).await;
    assert_eq!(
        session.get(stored.id).map(|i| i.content),
        Some("written elsewhere".into())
    );
}

#[tokio::test(start_paused = true)]
async fn authoritative_delete_supersedes_a_local_edit() {
    let h = harness();
    let id = h.seed("contested");
    let session = h.session(ActorId::new());
    session.start().await.expect("start");

    // Stall the local update long enough for the other delete to land.
    h.gateway.inject_delay(h.config.request_timeout * 2);
    let mut events = session.subscribe_events();
    let patch = IdeaPatch {
        content: Some("my edit".into()),
        ..IdeaPatch::default()
    };
    session.apply_update(id, patch).expect("record exists");
    // Let the spawned update hit the gateway (and the delay) first.
    tokio::task::yield_now().await;

    h.gateway.delete(id).await.expect("direct delete");

    let event = next_event(&mut events).await;
    assert_matches!(
        event,
        BoardEvent::MutationRolledBack {
            error: BoardError::Superseded(_),
            ..
        }
    );
    assert!(session.get(id).is_none(), "store-side delete wins");
}
