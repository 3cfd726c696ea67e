//! Operator control state for a running episode.
//!
//! Shared state used by the episode runner and whoever drives it (the
//! engine's signal handler, tests). The operator can request a clean stop
//! without tearing the process down. A stop also cancels every in-flight
//! exchange, so the episode ends promptly and still produces its report.
//!
//! The stop flag is an [`AtomicBool`] so the tick loop reads it without
//! locks; wake-ups go through [`Notify`].

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Shared operator control state.
///
/// Wrapped in an `Arc` and shared between the runner and its controllers.
#[derive(Debug)]
pub struct OperatorState {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes everything waiting on [`stopped`](Self::stopped).
    stop_notify: Notify,

    /// Pause between ticks in milliseconds.
    tick_interval_ms: u64,

    /// Maximum number of ticks (0 = unlimited).
    max_ticks: u64,
}

impl OperatorState {
    /// Create operator state with the given pacing and tick cap.
    pub fn new(tick_interval_ms: u64, max_ticks: u64) -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            tick_interval_ms,
            max_ticks,
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop. In-flight exchanges are cancelled.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            // Register before checking the flag so a concurrent
            // `request_stop` cannot slip between the two.
            let notified = self.stop_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    // -----------------------------------------------------------------------
    // Boundaries
    // -----------------------------------------------------------------------

    /// Pause between ticks in milliseconds.
    pub const fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    /// Returns `true` if `max_ticks > 0` and `current_tick >= max_ticks`.
    pub const fn tick_limit_reached(&self, current_tick: u64) -> bool {
        self.max_ticks > 0 && current_tick >= self.max_ticks
    }

    /// Get the configured max ticks.
    pub const fn max_ticks(&self) -> u64 {
        self.max_ticks
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn initial_state_is_running() {
        let state = OperatorState::new(100, 0);
        assert!(!state.is_stop_requested());
        assert_eq!(state.tick_interval_ms(), 100);
    }

    #[test]
    fn tick_limit_zero_means_unlimited() {
        let state = OperatorState::new(100, 0);
        assert!(!state.tick_limit_reached(999_999));

        let bounded = OperatorState::new(100, 5);
        assert!(!bounded.tick_limit_reached(4));
        assert!(bounded.tick_limit_reached(5));
    }

    #[tokio::test]
    async fn stopped_resolves_after_request() {
        let state = Arc::new(OperatorState::new(100, 0));
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.stopped().await })
        };
        tokio::task::yield_now().await;
        state.request_stop();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn stopped_resolves_immediately_once_requested() {
        let state = OperatorState::new(100, 0);
        state.request_stop();
        let waited = tokio::time::timeout(Duration::from_secs(1), state.stopped()).await;
        assert!(waited.is_ok());
    }
}
