//! Per-channel trigger cooldown
//!
//! Times are monotonic offsets (for example milliseconds since the stick
//! booted), never wall-clock time.

use std::time::Duration;

/// Default cooldown between two events on one channel
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(80);

/// True iff strictly more than `cooldown` has passed since `last_emit`
pub fn should_emit(now: Duration, last_emit: Duration, cooldown: Duration) -> bool {
    now.saturating_sub(last_emit) > cooldown
}

/// Cooldown state for one channel
#[derive(Debug, Clone)]
pub struct Debouncer {
    cooldown: Duration,
    last_emit: Option<Duration>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl Debouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_emit: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_emit(&self) -> Option<Duration> {
        self.last_emit
    }

    /// Check the cooldown and, when it has elapsed, record `now` as the
    /// latest emission in the same step. The first call always passes.
    pub fn should_emit(&mut self, now: Duration) -> bool {
        let allowed = match self.last_emit {
            Some(last) => should_emit(now, last, self.cooldown),
            None => true,
        };
        if allowed {
            self.last_emit = Some(now);
        }
        allowed
    }

    pub fn reset(&mut self) {
        self.last_emit = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_cooldown_boundaries() {
        let last = ms(1_000);
        assert!(!should_emit(ms(1_079), last, ms(80)));
        assert!(!should_emit(ms(1_080), last, ms(80)));
        assert!(should_emit(ms(1_081), last, ms(80)));
    }

    #[test]
    fn test_clock_going_backwards_blocks() {
        assert!(!should_emit(ms(10), ms(500), ms(80)));
    }

    #[test]
    fn test_debouncer_records_emission() {
        let mut debouncer = Debouncer::default();
        assert!(debouncer.should_emit(ms(5)));
        assert_eq!(debouncer.last_emit(), Some(ms(5)));

        assert!(!debouncer.should_emit(ms(84)));
        // A rejected call must not move the reference point
        assert_eq!(debouncer.last_emit(), Some(ms(5)));

        assert!(debouncer.should_emit(ms(86)));
        assert_eq!(debouncer.last_emit(), Some(ms(86)));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut left = Debouncer::default();
        let mut right = Debouncer::default();
        assert!(left.should_emit(ms(100)));
        assert!(right.should_emit(ms(120)));
        assert!(!left.should_emit(ms(150)));
        assert!(left.should_emit(ms(181)));
        assert!(!right.should_emit(ms(181)));
    }
}
