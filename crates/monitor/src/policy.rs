//! Polling cadence and backoff policy for the progress monitor.
//!
//! Healthy rounds are spaced by a batch-size dependent interval so that
//! larger batches issue fewer requests per second. Rounds that hit a
//! transient status-query error back off linearly with the number of
//! consecutive failed rounds, up to a cap. Backoff applies to the whole
//! loop, not to the individual failing job.

use std::time::Duration;

/// Tunable parameters for the polling cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Interval for an empty batch.
    pub base_interval: Duration,
    /// Added to the interval for every job in the batch.
    pub per_job_interval: Duration,
    /// Upper bound on the healthy interval.
    pub max_interval: Duration,
    /// Backoff added per consecutive failed round.
    pub backoff_step: Duration,
    /// Upper bound on the backoff delay.
    pub max_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(2000),
            per_job_interval: Duration::from_millis(500),
            max_interval: Duration::from_millis(8000),
            backoff_step: Duration::from_millis(5000),
            max_backoff: Duration::from_millis(20000),
        }
    }
}

impl PollPolicy {
    /// Delay after a fully successful round over a batch of `job_count`
    /// jobs.
    pub fn interval(&self, job_count: usize) -> Duration {
        let jobs = u32::try_from(job_count).unwrap_or(u32::MAX);
        self.base_interval
            .saturating_add(self.per_job_interval.saturating_mul(jobs))
            .min(self.max_interval)
    }

    /// Delay after a round with a transient error, given the number of
    /// consecutive failed rounds including this one.
    pub fn backoff(&self, consecutive_errors: u32) -> Duration {
        self.backoff_step
            .saturating_mul(consecutive_errors.max(1))
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_grows_with_batch_size() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval(1), Duration::from_millis(2500));
        assert_eq!(policy.interval(3), Duration::from_millis(3500));
        assert_eq!(policy.interval(10), Duration::from_millis(7000));
    }

    #[test]
    fn interval_clamps_at_max() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval(12), Duration::from_millis(8000));
        assert_eq!(policy.interval(500), Duration::from_millis(8000));
        assert_eq!(policy.interval(usize::MAX), Duration::from_millis(8000));
    }

    #[test]
    fn full_backoff_sequence() {
        let policy = PollPolicy::default();
        let expected = [5000, 10000, 15000, 20000, 20000, 20000];

        for (i, &expected_ms) in expected.iter().enumerate() {
            let errors = i as u32 + 1;
            assert_eq!(policy.backoff(errors), Duration::from_millis(expected_ms));
        }
    }

    #[test]
    fn zero_errors_backs_off_one_step() {
        let policy = PollPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(5000));
    }

    #[test]
    fn custom_policy() {
        let policy = PollPolicy {
            backoff_step: Duration::from_millis(100),
            max_backoff: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(250));
    }
}
