//! Exponential poll delay schedule

use std::time::Duration;

use rand::Rng;

use crate::options::PollingPolicy;

/// Delay generator for one polling workflow
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: PollingPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: PollingPolicy) -> Self {
        let current = policy.initial_interval.min(policy.max_interval);
        Self { policy, current }
    }

    /// Returns the delay before the next poll and advances the schedule.
    ///
    /// The nominal delay starts at the initial interval, grows by the
    /// multiplier and saturates at the max interval. With jitter enabled the
    /// returned value is drawn uniformly from `[nominal / 2, nominal]`.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.current;
        let grown = Duration::try_from_secs_f64(nominal.as_secs_f64() * self.policy.multiplier)
            .unwrap_or(self.policy.max_interval);
        self.current = grown.min(self.policy.max_interval);

        if self.policy.jitter {
            jitter(nominal)
        } else {
            nominal
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    rand::thread_rng().gen_range(delay / 2..=delay)
}
