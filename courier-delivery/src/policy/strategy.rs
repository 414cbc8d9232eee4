//! Retry strategy per bounce type.
//!
//! Each bounce type maps to a fixed cap and interval schedule. The interval
//! list is indexed by the pre-increment retry count, so the wait before the
//! next attempt grows as failures accumulate.

use std::time::Duration;

use crate::bounce::BounceType;

const TEMPORARY_INTERVALS_MINS: &[u64] = &[5, 15, 45, 120, 360];
const UNKNOWN_INTERVALS_MINS: &[u64] = &[10, 30, 120];

/// Retry policy for a single bounce type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStrategy {
    /// Whether this bounce type is retried at all
    pub should_retry: bool,
    /// Failed attempts allowed before the entry is given up on
    pub max_retries: u32,
    /// Wait before the next attempt, indexed by retry count
    pub intervals_mins: &'static [u64],
}

impl RetryStrategy {
    /// Resolve the strategy for a bounce type.
    ///
    /// An unclassified bounce resolves like `Unknown`; callers classify
    /// before resolving, so this only guards against a missed step.
    #[must_use]
    pub const fn resolve(bounce_type: BounceType) -> Self {
        match bounce_type {
            BounceType::Permanent => Self {
                should_retry: false,
                max_retries: 0,
                intervals_mins: &[],
            },
            BounceType::Temporary => Self {
                should_retry: true,
                max_retries: 5,
                intervals_mins: TEMPORARY_INTERVALS_MINS,
            },
            BounceType::Unknown | BounceType::None => Self {
                should_retry: true,
                max_retries: 3,
                intervals_mins: UNKNOWN_INTERVALS_MINS,
            },
        }
    }

    /// Check whether another attempt is allowed after `retry_count` failures.
    #[must_use]
    pub const fn allows_retry(&self, retry_count: u32) -> bool {
        self.should_retry && retry_count < self.max_retries
    }

    /// Wait before the next attempt, given the pre-increment retry count.
    ///
    /// Past the end of the schedule the last interval is reused. Returns
    /// `None` for strategies that never retry.
    #[must_use]
    pub fn interval(&self, retry_count: u32) -> Option<Duration> {
        let index = usize::try_from(retry_count).unwrap_or(usize::MAX);
        self.intervals_mins
            .get(index)
            .or_else(|| self.intervals_mins.last())
            .map(|mins| Duration::from_secs(mins.saturating_mul(60)))
    }

    /// Get the number of remaining attempts.
    #[must_use]
    pub const fn remaining_attempts(&self, retry_count: u32) -> u32 {
        self.max_retries.saturating_sub(retry_count)
    }

    /// Check if the next failure will exhaust the strategy.
    #[must_use]
    pub const fn is_final_attempt(&self, retry_count: u32) -> bool {
        retry_count.saturating_add(1) >= self.max_retries
    }
}
