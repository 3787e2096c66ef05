//! Engine configuration
//!
//! All timing behavior in the engine is data, not constants scattered
//! through the code: lock TTLs, the dedup window, retry backoff, echo
//! matching tolerance, and the polling fallback cadence all live here so
//! tests can shrink them to milliseconds.

use std::time::Duration;

/// Tunables for the board engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an edit lock is valid without renewal.
    pub lock_ttl: Duration,
    /// Cadence of the background stale-lock sweep and ledger GC.
    pub sweep_interval: Duration,
    /// Window within which identical content from one actor is a duplicate.
    pub dedup_window: Duration,
    /// Base delay for exponential retry backoff on create calls.
    pub retry_base: Duration,
    /// Upper bound on a single backoff delay.
    pub retry_cap: Duration,
    /// Maximum create attempts before the failure is fatal.
    pub max_retry_attempts: u32,
    /// How close in time an authoritative insert must be to an optimistic
    /// create to count as its echo when ids do not match.
    pub echo_tolerance: Duration,
    /// Age after which an unconfirmed optimistic entry is rolled back.
    pub entry_ttl: Duration,
    /// Cadence of the polling fallback when the change channel is down.
    pub poll_interval: Duration,
    /// Bound on any single gateway round trip.
    pub request_timeout: Duration,
    /// Subscribe attempts before degrading to polling.
    pub max_reconnect_attempts: u32,
    /// Quiet time on a subscribed channel before the sweep task reads the
    /// scope from the gateway as a liveness check.
    pub channel_stall_timeout: Duration,
    /// Quiet period after the last move call before the position persists.
    pub move_settle: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(30),
            dedup_window: Duration::from_millis(5_000),
            retry_base: Duration::from_millis(2_000),
            retry_cap: Duration::from_secs(30),
            max_retry_attempts: 3,
            echo_tolerance: Duration::from_millis(5_000),
            entry_ttl: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            max_reconnect_attempts: 5,
            channel_stall_timeout: Duration::from_secs(30),
            move_settle: Duration::from_millis(250),
        }
    }
}

impl EngineConfig {
    /// A preset with millisecond-scale durations for tests.
    pub fn for_tests() -> Self {
        Self {
            lock_ttl: Duration::from_millis(200),
            sweep_interval: Duration::from_millis(50),
            dedup_window: Duration::from_millis(100),
            retry_base: Duration::from_millis(10),
            retry_cap: Duration::from_millis(80),
            max_retry_attempts: 3,
            echo_tolerance: Duration::from_millis(100),
            entry_ttl: Duration::from_millis(500),
            poll_interval: Duration::from_millis(50),
            request_timeout: Duration::from_millis(250),
            max_reconnect_attempts: 2,
            channel_stall_timeout: Duration::from_millis(100),
            move_settle: Duration::from_millis(20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_observed_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.lock_ttl, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.dedup_window, Duration::from_millis(5_000));
        assert_eq!(config.retry_base, Duration::from_millis(2_000));
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.channel_stall_timeout, Duration::from_secs(30));
    }
}
