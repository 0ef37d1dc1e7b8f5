//! Rates and limits.

use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// "`value` units per `interval`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rate {
    /// Number of units
    pub value: u32,
    /// Period the units are counted over
    pub interval: Duration,
}

impl Rate {
    /// Create a new rate.
    pub const fn new(value: u32, interval: Duration) -> Self {
        Self { value, interval }
    }

    /// `value` units per second.
    pub const fn per_second(value: u32) -> Self {
        Self::new(value, Duration::from_secs(1))
    }

    /// `value` units per minute.
    pub const fn per_minute(value: u32) -> Self {
        Self::new(value, Duration::from_secs(60))
    }

    /// Reject rates that cannot drive a timer.
    pub(crate) fn validate(&self, context: &str) -> Result<()> {
        if self.interval.is_zero() {
            return Err(TurnstileError::InvalidRate {
                context: context.to_string(),
            });
        }
        Ok(())
    }
}

/// Token bucket limit for a single route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limit {
    /// Maximum outstanding quota; `capacity.value` is the ceiling.
    pub capacity: Rate,
    /// Amount restored every `refill.interval`.
    pub refill: Rate,
}

impl Limit {
    /// Create a new limit.
    pub const fn new(capacity: Rate, refill: Rate) -> Self {
        Self { capacity, refill }
    }

    /// Quota after one refill tick, saturating at capacity.
    pub fn replenish(&self, current: u32) -> u32 {
        current
            .saturating_add(self.refill.value)
            .min(self.capacity.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_constructors() {
        assert_eq!(Rate::per_second(5), Rate::new(5, Duration::from_secs(1)));
        assert_eq!(Rate::per_minute(2), Rate::new(2, Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_interval_is_invalid() {
        let rate = Rate::new(1, Duration::ZERO);
        let err = rate.validate("/bar").unwrap_err();
        assert!(matches!(err, TurnstileError::InvalidRate { ref context } if context == "/bar"));

        assert!(Rate::per_second(0).validate("/bar").is_ok());
    }

    #[test]
    fn test_replenish_saturates() {
        let limit = Limit::new(Rate::per_second(10), Rate::per_second(3));

        assert_eq!(limit.replenish(0), 3);
        assert_eq!(limit.replenish(5), 8);
        assert_eq!(limit.replenish(8), 10);
        assert_eq!(limit.replenish(10), 10);
    }

    #[test]
    fn test_replenish_never_overflows() {
        let limit = Limit::new(Rate::per_second(u32::MAX), Rate::per_second(u32::MAX));
        assert_eq!(limit.replenish(u32::MAX - 1), u32::MAX);
    }
}
