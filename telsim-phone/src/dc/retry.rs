//! Bearer setup retry policy
//!
//! Tracks how many setup attempts have failed and how long to wait before
//! the next one. The schedule is a table of intervals indexed by the retry
//! count; once the count runs past the table the last interval repeats.
//!
//! Configuration strings are comma-separated. `key=value` options are
//! `max_retries=<n|infinite>`, `default_randomization=<ms>` and
//! `exponential=<base_ms>[:<cap_ms>]`; every other entry is an interval
//! `<interval_ms>[:<randomization_ms>]`. Without `max_retries` the number of
//! retries equals the number of intervals.
//!
//! ```
//! use telsim_phone::dc::retry::RetryPolicy;
//!
//! let mut policy = RetryPolicy::new();
//! policy.configure_str("max_retries=3,1000,2000:500").unwrap();
//! assert!(policy.should_retry());
//! policy.increment();
//! assert_eq!(policy.retry_count(), 1);
//! ```

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// Number of entries an `exponential=` option expands to at most.
const MAX_EXPONENTIAL_STEPS: usize = 16;

/// Error returned for a malformed retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryConfigError {
    #[error("empty retry configuration")]
    Empty,
    #[error("invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },
    #[error("unknown retry option '{0}'")]
    UnknownOption(String),
    #[error("retries configured without any interval")]
    NoIntervals,
}

/// One row of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryInterval {
    delay_ms: u64,
    randomization_ms: u64,
}

/// Retry count and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    intervals: Vec<RetryInterval>,
    max_retry_count: u32,
    retry_forever: bool,
    retry_count: u32,
    config: String,
}

impl RetryPolicy {
    /// Creates a policy that never retries until configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed-interval schedule.
    pub fn configure(&mut self, max_retry_count: u32, interval_ms: u64, randomization_ms: u64) {
        self.intervals = vec![RetryInterval {
            delay_ms: interval_ms,
            randomization_ms,
        }];
        self.max_retry_count = max_retry_count;
        self.retry_forever = false;
        self.retry_count = 0;
        self.config = format!("max_retries={max_retry_count},{interval_ms}:{randomization_ms}");
    }

    /// Parses a configuration string.
    ///
    /// On error the current configuration is left untouched.
    pub fn configure_str(&mut self, config: &str) -> Result<(), RetryConfigError> {
        let config = config.trim().trim_matches('"');
        if config.is_empty() {
            return Err(RetryConfigError::Empty);
        }

        let mut intervals = Vec::new();
        let mut default_randomization = 0u64;
        let mut max_retries: Option<u32> = None;
        let mut retry_forever = false;

        for entry in config.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if let Some((key, value)) = entry.split_once('=') {
                let (key, value) = (key.trim(), value.trim());
                match key {
                    "default_randomization" => {
                        default_randomization = parse_ms(key, value)?;
                    }
                    "max_retries" => {
                        if value.eq_ignore_ascii_case("infinite") {
                            retry_forever = true;
                        } else {
                            max_retries = Some(value.parse().map_err(|_| invalid(key, value))?);
                        }
                    }
                    "exponential" => {
                        let (base, cap) = match value.split_once(':') {
                            Some((b, c)) => (parse_ms(key, b)?, Some(parse_ms(key, c)?)),
                            None => (parse_ms(key, value)?, None),
                        };
                        if base == 0 {
                            return Err(invalid(key, value));
                        }
                        let mut delay = base;
                        for _ in 0..MAX_EXPONENTIAL_STEPS {
                            let capped = cap.map_or(delay, |c| delay.min(c));
                            intervals.push(RetryInterval {
                                delay_ms: capped,
                                randomization_ms: default_randomization,
                            });
                            if cap.is_some_and(|c| capped >= c) {
                                break;
                            }
                            delay = delay.saturating_mul(2);
                        }
                    }
                    _ => return Err(RetryConfigError::UnknownOption(key.to_string())),
                }
            } else {
                let interval = match entry.split_once(':') {
                    Some((d, r)) => RetryInterval {
                        delay_ms: parse_ms("interval", d)?,
                        randomization_ms: parse_ms("randomization", r)?,
                    },
                    None => RetryInterval {
                        delay_ms: parse_ms("interval", entry)?,
                        randomization_ms: default_randomization,
                    },
                };
                intervals.push(interval);
            }
        }

        let max_retry_count = max_retries.unwrap_or(intervals.len() as u32);
        if intervals.is_empty() && (retry_forever || max_retry_count > 0) {
            return Err(RetryConfigError::NoIntervals);
        }

        self.intervals = intervals;
        self.max_retry_count = max_retry_count;
        self.retry_forever = retry_forever;
        self.retry_count = 0;
        self.config = config.to_string();
        Ok(())
    }

    /// True while another attempt is allowed.
    pub fn should_retry(&self) -> bool {
        self.retry_forever || self.retry_count < self.max_retry_count
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    /// Records a failed attempt.
    pub fn increment(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.retry_count = 0;
    }

    /// Keeps retrying past the end of the table with the last interval.
    pub fn retry_forever_using_last_interval(&mut self) {
        self.retry_forever = true;
    }

    pub fn is_retry_forever(&self) -> bool {
        self.retry_forever
    }

    /// True when the failure just recorded is still within the retry budget.
    pub fn allows_retry_after_failure(&self) -> bool {
        self.retry_forever || self.retry_count <= self.max_retry_count
    }

    /// Delay before the next attempt, jitter included.
    pub fn next_retry_delay(&self) -> Duration {
        self.delay_at(self.retry_count as usize)
    }

    /// Delay to wait after the failure just recorded.
    pub fn delay_after_failure(&self) -> Duration {
        self.delay_at(self.retry_count.saturating_sub(1) as usize)
    }

    fn delay_at(&self, index: usize) -> Duration {
        let Some(last) = self.intervals.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let interval = self.intervals[index.min(last)];
        let jitter = if interval.randomization_ms > 0 {
            rand::thread_rng().gen_range(0..=interval.randomization_ms)
        } else {
            0
        };
        Duration::from_millis(interval.delay_ms.saturating_add(jitter))
    }

    /// The configuration string currently in effect.
    pub fn config(&self) -> &str {
        &self.config
    }
}

fn invalid(key: &str, value: &str) -> RetryConfigError {
    RetryConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_ms(key: &str, value: &str) -> Result<u64, RetryConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_never_retries() {
        let policy = RetryPolicy::new();
        assert!(!policy.should_retry());
        assert_eq!(policy.next_retry_delay(), Duration::ZERO);
    }

    #[test]
    fn test_configure_triple() {
        let mut policy = RetryPolicy::new();
        policy.configure(2, 1000, 0);
        assert!(policy.should_retry());
        policy.increment();
        policy.increment();
        assert!(!policy.should_retry());
        policy.increment();
        assert_eq!(policy.retry_count(), 3);
        assert_eq!(policy.next_retry_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_budget_after_failure() {
        let mut policy = RetryPolicy::new();
        policy.configure_str("max_retries=2,1000,2000").unwrap();
        policy.increment();
        assert!(policy.allows_retry_after_failure());
        assert_eq!(policy.delay_after_failure(), Duration::from_millis(1000));
        policy.increment();
        assert!(policy.allows_retry_after_failure());
        assert_eq!(policy.delay_after_failure(), Duration::from_millis(2000));
        policy.increment();
        assert!(!policy.allows_retry_after_failure());
    }

    #[test]
    fn test_interval_table() {
        let mut policy = RetryPolicy::new();
        policy.configure_str("1000,2000,4000").unwrap();
        assert_eq!(policy.max_retry_count(), 3);
        assert_eq!(policy.next_retry_delay(), Duration::from_millis(1000));
        policy.increment();
        assert_eq!(policy.next_retry_delay(), Duration::from_millis(2000));
        policy.increment();
        policy.increment();
        assert!(!policy.should_retry());
        assert_eq!(policy.next_retry_delay(), Duration::from_millis(4000));
    }

    #[test]
    fn test_randomization_bounds() {
        let mut policy = RetryPolicy::new();
        policy.configure_str("default_randomization=500,1000,2000:100").unwrap();
        for _ in 0..50 {
            let d = policy.next_retry_delay().as_millis();
            assert!((1000..=1500).contains(&d));
        }
        policy.increment();
        for _ in 0..50 {
            let d = policy.next_retry_delay().as_millis();
            assert!((2000..=2100).contains(&d));
        }
    }

    #[test]
    fn test_huge_interval_saturates() {
        let mut policy = RetryPolicy::new();
        policy.configure(1, u64::MAX, 1000);
        for _ in 0..10 {
            assert_eq!(policy.next_retry_delay(), Duration::from_millis(u64::MAX));
        }
    }

    #[test]
    fn test_infinite_retries() {
        let mut policy = RetryPolicy::new();
        policy.configure_str("max_retries=infinite,5000").unwrap();
        assert!(policy.is_retry_forever());
        for _ in 0..100 {
            policy.increment();
        }
        assert!(policy.should_retry());
        assert_eq!(policy.retry_count(), 100);
        assert_eq!(policy.next_retry_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn test_retry_forever_override() {
        let mut policy = RetryPolicy::new();
        policy.configure(1, 3000, 0);
        policy.increment();
        assert!(!policy.should_retry());
        policy.retry_forever_using_last_interval();
        assert!(policy.should_retry());
        policy.increment();
        assert_eq!(policy.next_retry_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn test_exponential() {
        let mut policy = RetryPolicy::new();
        policy.configure_str("max_retries=10,exponential=1000:5000").unwrap();
        let delays: Vec<u64> = (0..5)
            .map(|_| {
                let d = policy.next_retry_delay().as_millis() as u64;
                policy.increment();
                d
            })
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000]);
        assert_eq!(policy.max_retry_count(), 10);
    }

    #[test]
    fn test_invalid_keeps_previous() {
        let mut policy = RetryPolicy::new();
        policy.configure_str("max_retries=2,1000").unwrap();
        policy.increment();

        assert!(matches!(
            policy.configure_str("max_retries=abc,1000"),
            Err(RetryConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            policy.configure_str("bogus=1,1000"),
            Err(RetryConfigError::UnknownOption(_))
        ));
        assert_eq!(policy.configure_str("1000:x"), Err(invalid("randomization", "x")));
        assert_eq!(policy.configure_str(""), Err(RetryConfigError::Empty));
        assert_eq!(
            policy.configure_str("max_retries=3"),
            Err(RetryConfigError::NoIntervals)
        );

        assert_eq!(policy.config(), "max_retries=2,1000");
        assert_eq!(policy.retry_count(), 1);
        assert_eq!(policy.max_retry_count(), 2);
    }

    #[test]
    fn test_reset() {
        let mut policy = RetryPolicy::new();
        policy.configure_str("\"1000,2000\"").unwrap();
        policy.increment();
        policy.reset();
        assert_eq!(policy.retry_count(), 0);
        assert_eq!(policy.next_retry_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_default_phone_schedule_parses() {
        let mut policy = RetryPolicy::new();
        policy
            .configure_str(telsim_common::config::DEFAULT_DATA_RETRY_CONFIG)
            .unwrap();
        assert_eq!(policy.max_retry_count(), 10);
    }
}
