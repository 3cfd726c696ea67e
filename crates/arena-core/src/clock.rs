//! Episode tick clock.
//!
//! The tick number is the single source of truth for episode time. It is
//! stamped on every observation, matched against every decision, and
//! compared with the objective's time limit. It advances by exactly one
//! per completed tick regardless of how many agents answered.

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,
}

/// Monotonic tick counter for one episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickClock {
    /// Number of ticks completed so far.
    tick: u64,
}

impl TickClock {
    /// A clock at tick 0.
    pub const fn new() -> Self {
        Self { tick: 0 }
    }

    /// A clock at an explicit tick (useful for testing).
    pub const fn at(tick: u64) -> Self {
        Self { tick }
    }

    /// Current tick.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Ticks elapsed since the episode started.
    pub const fn elapsed(&self) -> u64 {
        self.tick
    }

    /// Advance by one tick and return the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the counter is at `u64::MAX`.
    pub const fn advance(&mut self) -> Result<u64, ClockError> {
        match self.tick.checked_add(1) {
            Some(next) => {
                self.tick = next;
                Ok(next)
            }
            None => Err(ClockError::TickOverflow),
        }
    }

    /// Whether the objective time limit has been reached
    /// (`time_limit == 0` means unlimited).
    pub const fn time_limit_reached(&self, time_limit: u64) -> bool {
        time_limit > 0 && self.tick >= time_limit
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn advances_by_exactly_one() {
        let mut clock = TickClock::new();
        assert_eq!(clock.advance().unwrap(), 1);
        assert_eq!(clock.advance().unwrap(), 2);
        assert_eq!(clock.tick(), 2);
    }

    #[test]
    fn overflow_is_an_error() {
        let mut clock = TickClock::at(u64::MAX);
        assert!(matches!(clock.advance(), Err(ClockError::TickOverflow)));
        assert_eq!(clock.tick(), u64::MAX);
    }

    #[test]
    fn zero_time_limit_is_unlimited() {
        let clock = TickClock::at(1_000_000);
        assert!(!clock.time_limit_reached(0));
        assert!(TickClock::at(10).time_limit_reached(10));
        assert!(!TickClock::at(9).time_limit_reached(10));
    }
}
