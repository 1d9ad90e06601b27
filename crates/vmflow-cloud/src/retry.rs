//! Backoff configuration for retried requests and operation polling

use rand::Rng;
use std::time::Duration;

/// Retry configuration for transient transport failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Apply full jitter to the computed delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Upper bound of the delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff(
            self.initial_delay,
            self.max_delay,
            self.backoff_multiplier,
            attempt,
        )
    }

    /// Delay to actually sleep: jittered unless disabled, never above `max_delay`.
    ///
    /// A server-supplied `Retry-After` wins over the computed delay.
    pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        let ceiling = self.delay_for_attempt(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let millis = ceiling.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}

/// Polling configuration for long-running operations
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Overall deadline for one wait
    pub timeout: Duration,

    /// Delay before the first poll and base of the backoff
    pub interval: Duration,

    /// Ceiling for the backoff
    pub max_interval: Duration,

    /// Backoff multiplier between polls
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            multiplier: 1.5,
        }
    }
}

impl PollConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Delay before poll number `poll` (0-based) when the server gave no hint
    pub fn delay_for_poll(&self, poll: u32) -> Duration {
        backoff(self.interval, self.max_interval, self.multiplier, poll)
    }
}

fn backoff(initial: Duration, ceiling: Duration, multiplier: f64, step: u32) -> Duration {
    let factor = multiplier.max(1.0).powi(step.min(32) as i32);
    let millis = (initial.as_millis() as f64 * factor).min(ceiling.as_millis() as f64);
    Duration::from_millis(millis as u64)
}
