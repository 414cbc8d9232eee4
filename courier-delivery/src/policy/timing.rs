//! Retry timing biased toward low-traffic hours.
//!
//! Temporary bounces are pushed into an off-peak window (local `[02:00, 04:00)`
//! by default) so retries stop colliding with whatever congestion caused the
//! failure and outbound load is smoothed. Unknown bounces fall back to plain
//! backoff: `now + interval`, optionally jittered.

use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use rand::Rng;

use crate::{bounce::BounceType, config::RetrySchedulerConfig};

/// The local-time window preferred for temporary-bounce retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffPeakWindow {
    /// First hour inside the window
    pub start_hour: u32,
    /// First hour past the window
    pub end_hour: u32,
    /// Wait used when a failure happens inside the window
    pub in_window_delay: Duration,
}

impl Default for OffPeakWindow {
    fn default() -> Self {
        Self {
            start_hour: 2,
            end_hour: 4,
            in_window_delay: Duration::from_secs(5 * 60),
        }
    }
}

impl OffPeakWindow {
    #[must_use]
    pub const fn contains(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

/// Computes the next attempt time for a failed delivery
#[derive(Debug, Clone)]
pub struct RetryTimeCalculator {
    window: OffPeakWindow,
    /// Zone the window is read in; the host's local zone when `None`
    timezone: Option<Tz>,
    jitter_factor: f64,
}

impl Default for RetryTimeCalculator {
    fn default() -> Self {
        Self {
            window: OffPeakWindow::default(),
            timezone: None,
            jitter_factor: 0.0,
        }
    }
}

impl RetryTimeCalculator {
    #[must_use]
    pub const fn new(window: OffPeakWindow, timezone: Option<Tz>, jitter_factor: f64) -> Self {
        Self {
            window,
            timezone,
            jitter_factor,
        }
    }

    #[must_use]
    pub fn from_config(config: &RetrySchedulerConfig) -> Self {
        Self::new(
            OffPeakWindow {
                start_hour: config.off_peak_start_hour,
                end_hour: config.off_peak_end_hour,
                in_window_delay: Duration::from_secs(config.off_peak_delay_mins.saturating_mul(60)),
            },
            config.off_peak_timezone,
            config.retry_jitter_factor,
        )
    }

    #[must_use]
    pub const fn window(&self) -> &OffPeakWindow {
        &self.window
    }

    /// Next attempt time in UTC, reading the window in the configured zone.
    #[must_use]
    pub fn next_retry_at(
        &self,
        now: DateTime<Utc>,
        bounce_type: BounceType,
        interval: Duration,
    ) -> DateTime<Utc> {
        match self.timezone {
            Some(tz) => self
                .compute_next_retry_time(&now.with_timezone(&tz), bounce_type, interval)
                .with_timezone(&Utc),
            None => self
                .compute_next_retry_time(&now.with_timezone(&chrono::Local), bounce_type, interval)
                .with_timezone(&Utc),
        }
    }

    /// Next attempt time in the zone `now` is expressed in.
    ///
    /// # Rules
    /// - `Temporary`, inside the window: `now + in_window_delay`
    /// - `Temporary`, outside: the next window start strictly after `now`
    ///   (tomorrow for a morning failure, tonight for one after midnight)
    /// - anything else: `now + interval`, jittered by `jitter_factor`
    #[must_use]
    pub fn compute_next_retry_time<Z: TimeZone>(
        &self,
        now: &DateTime<Z>,
        bounce_type: BounceType,
        interval: Duration,
    ) -> DateTime<Z> {
        match bounce_type {
            BounceType::Temporary => {
                if self.window.contains(now.hour()) {
                    add(now, self.window.in_window_delay)
                } else {
                    self.next_window_start(now)
                        .unwrap_or_else(|| add(now, interval))
                }
            }
            BounceType::Unknown | BounceType::Permanent | BounceType::None => {
                add(now, self.jittered(interval))
            }
        }
    }

    fn next_window_start<Z: TimeZone>(&self, now: &DateTime<Z>) -> Option<DateTime<Z>> {
        let today = now.date_naive();
        let start = NaiveTime::from_hms_opt(self.window.start_hour, 0, 0)?;

        let candidate = local_at(&now.timezone(), today, start)?;
        if candidate > *now {
            return Some(candidate);
        }

        let tomorrow = today.checked_add_days(Days::new(1))?;
        local_at(&now.timezone(), tomorrow, start)
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn jittered(&self, interval: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let range = secs * self.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-range..=range);
        Duration::from_secs((secs + jitter).max(0.0) as u64)
    }
}

fn add<Z: TimeZone>(now: &DateTime<Z>, by: Duration) -> DateTime<Z> {
    let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
    now.clone()
        .checked_add_signed(delta)
        .unwrap_or_else(|| now.clone())
}

/// Resolve a wall-clock time in `tz`.
///
/// A time skipped by a DST jump resolves to the same time an hour later.
fn local_at<Z: TimeZone>(
    tz: &Z,
    date: chrono::NaiveDate,
    time: NaiveTime,
) -> Option<DateTime<Z>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
}
