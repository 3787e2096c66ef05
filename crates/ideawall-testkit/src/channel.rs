//! In-memory change feed
//!
//! Tests publish events by hand. Delivery is deliberately *unscoped*: every
//! subscriber sees every event, which forces the reconciler's own scope
//! filter to do the isolation work, exactly what the engine tests want to
//! prove.

use async_trait::async_trait;
use ideawall_core::{BoardError, BoardResult, ChangeChannel, ChangeEvent, EventSink, ScopeId, Subscription};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// A manually driven [`ChangeChannel`].
#[derive(Default)]
pub struct MemoryChannel {
    subscribers: Arc<Mutex<HashMap<u64, EventSink>>>,
    next_id: AtomicU64,
    failing_subscribes: AtomicU32,
}

impl MemoryChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` subscribe calls fail with a network error,
    /// simulating an unavailable realtime backend.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.failing_subscribes.store(count, Ordering::SeqCst);
    }

    /// Deliver an event to every live subscriber.
    pub fn publish(&self, event: ChangeEvent) {
        let sinks: Vec<EventSink> = self.subscribers.lock().values().cloned().collect();
        for sink in sinks {
            sink(event.clone());
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[async_trait]
impl ChangeChannel for MemoryChannel {
    async fn subscribe(&self, _scope: ScopeId, sink: EventSink) -> BoardResult<Subscription> {
        let remaining = self.failing_subscribes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_subscribes.store(remaining - 1, Ordering::SeqCst);
            return Err(BoardError::Network("change feed unavailable".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().insert(id, sink);

        let subscribers = self.subscribers.clone();
        Ok(Subscription::new(move || {
            subscribers.lock().remove(&id);
        }))
    }
}
