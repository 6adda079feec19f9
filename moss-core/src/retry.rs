//! Backoff schedule for the retry orchestrator
//!
//! Deterministic capped exponential growth; the orchestrator owns when to
//! sleep, this module only computes for how long.

use crate::config::RetryParams;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetrySchedule {
    params: RetryParams,
}

impl RetrySchedule {
    pub fn new(params: RetryParams) -> Self {
        Self { params }
    }

    /// Sleep to apply before the given attempt (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 && self.params.first_attempt_immediate {
            return Duration::ZERO;
        }
        let step = if self.params.first_attempt_immediate {
            attempt.saturating_sub(1)
        } else {
            attempt
        };
        // growth_base^step can overflow to infinity for large steps;
        // min() against the cap keeps the result finite
        let raw = self.params.min_sleep_ms as f64 * self.params.growth_base.powi(step as i32);
        let capped = raw.min(self.params.max_sleep_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Total retry budget per job
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.params.max_total_secs)
    }

    /// Attempts to allow before an empty response under normal load is fatal
    pub fn min_retries(&self) -> u32 {
        self.params.min_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(min_ms: u64, max_ms: u64, base: f64, immediate: bool) -> RetryParams {
        RetryParams {
            min_sleep_ms: min_ms,
            max_sleep_ms: max_ms,
            growth_base: base,
            first_attempt_immediate: immediate,
            ..RetryParams::default()
        }
    }

    #[test]
    fn test_first_attempt_immediate() {
        let schedule = RetrySchedule::new(params(1000, 60_000, 2.0, true));
        assert_eq!(schedule.delay_for(0), Duration::ZERO);
        assert_eq!(schedule.delay_for(1), Duration::from_millis(1000));
        assert_eq!(schedule.delay_for(2), Duration::from_millis(2000));
        assert_eq!(schedule.delay_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_first_attempt_delayed() {
        let schedule = RetrySchedule::new(params(1000, 60_000, 2.0, false));
        assert_eq!(schedule.delay_for(0), Duration::from_millis(1000));
        assert_eq!(schedule.delay_for(1), Duration::from_millis(2000));
    }

    #[test]
    fn test_growth_caps_at_max_sleep() {
        let schedule = RetrySchedule::new(params(1000, 8000, 2.0, true));
        assert_eq!(schedule.delay_for(4), Duration::from_millis(8000));
        assert_eq!(schedule.delay_for(10), Duration::from_millis(8000));
        // far past any representable power
        assert_eq!(schedule.delay_for(4000), Duration::from_millis(8000));
    }

    #[test]
    fn test_budget_from_params() {
        let schedule = RetrySchedule::new(RetryParams {
            max_total_secs: 90,
            ..RetryParams::default()
        });
        assert_eq!(schedule.budget(), Duration::from_secs(90));
    }
}
