//! Ramp scheduling
//!
//! Calls are introduced at most one per tick until the configured total has
//! been created. The run is finished once the total is reached and no calls
//! are left alive.

use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};

/// Tracks how many calls have been created against the target
#[derive(Debug, Clone)]
pub struct RampScheduler {
    total: u64,
    created: u64,
    period: Duration,
}

impl RampScheduler {
    /// Create a scheduler for `total` calls, one per `period`
    pub fn new(total: u64, period: Duration) -> Self {
        Self {
            total,
            created: 0,
            period,
        }
    }

    /// Timer driving the ramp
    ///
    /// The first tick fires immediately. Late ticks are skipped rather than
    /// burst, so creation never exceeds one call per period.
    pub fn ticker(&self) -> Interval {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Whether another call should be created on this tick
    pub fn should_create(&self) -> bool {
        self.created < self.total
    }

    /// Record that a call was created
    pub fn record_created(&mut self) {
        debug_assert!(self.created < self.total, "ramp overshoot");
        self.created += 1;
    }

    /// Whether every call has been created
    pub fn target_reached(&self) -> bool {
        self.created >= self.total
    }

    /// Whether the run is over given the number of live calls
    pub fn is_finished(&self, live_calls: usize) -> bool {
        self.target_reached() && live_calls == 0
    }

    /// Calls created so far
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Target number of calls
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Effective ramp rate in calls per second
    pub fn calls_per_second(&self) -> f64 {
        1.0 / self.period.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_creates_until_target() {
        let mut ramp = RampScheduler::new(2, Duration::from_millis(200));

        assert!(ramp.should_create());
        ramp.record_created();
        assert!(ramp.should_create());
        ramp.record_created();
        assert!(!ramp.should_create());
        assert!(ramp.target_reached());
        assert_eq!(ramp.created(), 2);
    }

    #[test]
    fn test_finished_needs_target_and_no_live_calls() {
        let mut ramp = RampScheduler::new(1, Duration::from_millis(200));
        assert!(!ramp.is_finished(0));

        ramp.record_created();
        assert!(!ramp.is_finished(1));
        assert!(ramp.is_finished(0));
    }

    #[test]
    fn test_zero_total_is_immediately_finished() {
        let ramp = RampScheduler::new(0, Duration::from_millis(200));
        assert!(!ramp.should_create());
        assert!(ramp.is_finished(0));
    }

    #[test]
    fn test_calls_per_second() {
        let ramp = RampScheduler::new(10, Duration::from_millis(200));
        assert!((ramp.calls_per_second() - 5.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_first_tick_is_immediate() {
        let ramp = RampScheduler::new(1, Duration::from_millis(200));
        let mut ticker = ramp.ticker();

        let start = tokio::time::Instant::now();
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    proptest! {
        #[test]
        fn created_never_exceeds_total(total in 0u64..50, ticks in 0usize..100) {
            let mut ramp = RampScheduler::new(total, Duration::from_millis(200));
            for _ in 0..ticks {
                if ramp.should_create() {
                    ramp.record_created();
                }
            }
            prop_assert!(ramp.created() <= total);
            prop_assert_eq!(ramp.created(), total.min(ticks as u64));
        }
    }
}
