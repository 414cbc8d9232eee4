//! Scheduler configuration

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

const fn default_tick_interval() -> u64 {
    60
}

const fn default_send_timeout() -> u64 {
    30
}

const fn default_max_concurrent_retries() -> usize {
    4
}

const fn default_off_peak_start_hour() -> u32 {
    2
}

const fn default_off_peak_end_hour() -> u32 {
    4
}

const fn default_off_peak_delay() -> u64 {
    5
}

/// Configuration for the [`RetryScheduler`](crate::RetryScheduler)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySchedulerConfig {
    /// How often the scheduler looks for due entries (in seconds)
    ///
    /// Default: 60 seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Upper bound on a single resend (in seconds)
    ///
    /// An attempt that runs past this is recorded as a timeout, which
    /// classifies as a temporary bounce.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Resends in flight at once within a tick
    ///
    /// Default: 4
    #[serde(default = "default_max_concurrent_retries")]
    pub max_concurrent_retries: usize,

    /// IANA zone the off-peak window is read in, e.g. `"Europe/London"`
    ///
    /// Default: the host's local zone
    #[serde(default)]
    pub off_peak_timezone: Option<Tz>,

    /// First hour of the off-peak window
    ///
    /// Default: 2 (02:00)
    #[serde(default = "default_off_peak_start_hour")]
    pub off_peak_start_hour: u32,

    /// First hour after the off-peak window
    ///
    /// Default: 4 (04:00)
    #[serde(default = "default_off_peak_end_hour")]
    pub off_peak_end_hour: u32,

    /// Wait before retrying a temporary bounce that failed inside the window
    /// (in minutes)
    ///
    /// Default: 5 minutes
    #[serde(default = "default_off_peak_delay")]
    pub off_peak_delay_mins: u64,

    /// Jitter factor applied to unknown-bounce intervals (0.0 to 1.0)
    ///
    /// Default: 0.0 (exact intervals)
    #[serde(default)]
    pub retry_jitter_factor: f64,
}

impl Default for RetrySchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            send_timeout_secs: default_send_timeout(),
            max_concurrent_retries: default_max_concurrent_retries(),
            off_peak_timezone: None,
            off_peak_start_hour: default_off_peak_start_hour(),
            off_peak_end_hour: default_off_peak_end_hour(),
            off_peak_delay_mins: default_off_peak_delay(),
            retry_jitter_factor: 0.0,
        }
    }
}

impl RetrySchedulerConfig {
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Check the configuration for values the scheduler cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Configuration`] naming the first bad field.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.tick_interval_secs == 0 {
            return Err(SchedulerError::Configuration(
                "tick_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.send_timeout_secs == 0 {
            return Err(SchedulerError::Configuration(
                "send_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.max_concurrent_retries == 0 {
            return Err(SchedulerError::Configuration(
                "max_concurrent_retries must be at least 1".to_string(),
            ));
        }

        if self.off_peak_start_hour >= self.off_peak_end_hour || self.off_peak_end_hour > 24 {
            return Err(SchedulerError::Configuration(format!(
                "off-peak window [{}, {}) is not a valid range of hours",
                self.off_peak_start_hour, self.off_peak_end_hour
            )));
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            return Err(SchedulerError::Configuration(format!(
                "retry_jitter_factor {} must be between 0.0 and 1.0",
                self.retry_jitter_factor
            )));
        }

        Ok(())
    }
}
