//! Retry policy: attempt bound, exponential backoff and retention window.

use std::time::Duration;
use vd_core::config::QueueConfig;
use vd_core::QueueEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before an entry is marked failed
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub backoff_base: Duration,
    pub backoff_multiplier: u32,
    /// How long an entry may sit without progress before it is skipped
    pub max_retention: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_millis(1_000),
            backoff_multiplier: 2,
            max_retention: Duration::from_secs(1_440 * 60),
        }
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(cfg: &QueueConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
            backoff_multiplier: cfg.backoff_multiplier.max(1),
            max_retention: Duration::from_secs(cfg.max_retention_minutes.saturating_mul(60)),
        }
    }
}

impl RetryPolicy {
    /// Wait required after `attempts` failed attempts: `base * multiplier^(attempts-1)`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let factor = self
            .backoff_multiplier
            .checked_pow(attempts - 1)
            .unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }

    /// Earliest time (Unix ms) the entry may be attempted again.
    pub fn next_attempt_at_ms(&self, entry: &QueueEntry) -> u64 {
        match entry.last_attempt_at_ms {
            Some(last) if entry.attempt_count > 0 => {
                last.saturating_add(self.backoff(entry.attempt_count).as_millis() as u64)
            }
            _ => 0,
        }
    }

    pub fn is_due(&self, entry: &QueueEntry, now_ms: u64) -> bool {
        now_ms >= self.next_attempt_at_ms(entry)
    }

    /// A retried entry with no progress for longer than the retention window.
    /// Never-attempted entries do not expire.
    pub fn retention_expired(&self, entry: &QueueEntry, now_ms: u64) -> bool {
        entry.attempt_count > 0
            && now_ms.saturating_sub(entry.last_activity_ms()) > self.max_retention.as_millis() as u64
    }

    pub fn attempts_exhausted(&self, attempt_count: u32) -> bool {
        attempt_count >= self.max_attempts
    }
}
