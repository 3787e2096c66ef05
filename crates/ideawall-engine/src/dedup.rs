//! Submission deduplication for the creation path
//!
//! Live brainstorm sessions see double-taps and client retries constantly.
//! This guard remembers, per actor, the fingerprint of each recent
//! submission and rejects a repeat inside the sliding window. State is
//! memory-only and owned by the session; it dies with it and can be
//! `clear()`ed explicitly.

use ideawall_core::{ActorId, Fingerprint, Timestamp};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Sliding-window duplicate detector keyed by `(actor, fingerprint)`.
#[derive(Debug)]
pub struct SubmissionDeduplicator {
    window: Duration,
    last_seen: HashMap<(ActorId, Fingerprint), Timestamp>,
}

impl SubmissionDeduplicator {
    /// Create a deduplicator with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    /// Whether `content` from `actor` should be accepted as of `now`.
    ///
    /// False positives are possible: a participant legitimately submitting
    /// the same text twice inside the window is indistinguishable from a
    /// client retry. The window is deliberately short and tunable.
    pub fn should_accept(&self, content: &str, actor: ActorId, now: Timestamp) -> bool {
        let fingerprint = Fingerprint::of_content(content);
        match self.last_seen.get(&(actor, fingerprint)) {
            Some(&at) => now.since(at) >= self.window,
            None => true,
        }
    }

    /// Remember a submission that was sent to the gateway.
    pub fn record_submission(&mut self, content: &str, actor: ActorId, now: Timestamp) {
        let fingerprint = Fingerprint::of_content(content);
        debug!(%actor, %fingerprint, "recording submission");
        self.last_seen.insert((actor, fingerprint), now);
    }

    /// Drop entries older than the window so the map stays bounded.
    pub fn prune(&mut self, now: Timestamp) {
        let window = self.window;
        self.last_seen.retain(|_, &mut at| now.since(at) < window);
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.last_seen.clear();
    }

    /// Number of remembered submissions.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// True when nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
