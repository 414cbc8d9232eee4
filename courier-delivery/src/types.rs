//! Type definitions for delivery log entries and their updates

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bounce::BounceType;

/// Identifier for a delivery log entry
///
/// A ULID, so identifiers sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryLogId(ulid::Ulid);

impl DeliveryLogId {
    /// Generate a new unique identifier
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl fmt::Display for DeliveryLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeliveryLogId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self)
    }
}

/// Where an entry sits in its send/retry lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created, first send not yet recorded
    Pending,
    /// Delivered; terminal
    Sent,
    /// Last attempt failed, may still be retried
    Failed,
    /// Given up on; terminal
    PermanentlyFailed,
}

impl DeliveryStatus {
    /// `Sent` and `PermanentlyFailed` accept no further mutation.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::PermanentlyFailed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::PermanentlyFailed => "permanently_failed",
        })
    }
}

/// One record per report send and its retry chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub id: DeliveryLogId,
    pub schedule_id: String,
    pub user_id: String,
    pub recipient_email: String,
    pub status: DeliveryStatus,
    /// `None` until the first failure has been classified
    pub bounce_type: BounceType,
    /// Failed attempts so far, the first send included, capped at
    /// `max_retries`
    pub retry_count: u32,
    /// Fixed once `bounce_type` is known
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DeliveryLogEntry {
    /// Create a new `Pending` entry for a report send.
    #[must_use]
    pub fn new(
        schedule_id: impl Into<String>,
        user_id: impl Into<String>,
        recipient_email: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryLogId::generate(),
            schedule_id: schedule_id.into(),
            user_id: user_id.into(),
            recipient_email: recipient_email.into(),
            status: DeliveryStatus::Pending,
            bounce_type: BounceType::None,
            retry_count: 0,
            max_retries: 0,
            next_retry_at: None,
            last_error: None,
            sent_at: None,
            created_at,
        }
    }

    /// Whether a tick running at `now` should pick this entry up.
    ///
    /// Failed entries that were never classified are always due, since their
    /// retry cap is not known yet. Classified entries are due once
    /// `next_retry_at` has passed and retries remain.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.status != DeliveryStatus::Failed {
            return false;
        }

        if self.bounce_type.is_unclassified() {
            return self.next_retry_at.is_none_or(|at| at <= now);
        }

        self.retry_count < self.max_retries && self.next_retry_at.is_some_and(|at| at <= now)
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &DeliveryLogPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(bounce_type) = patch.bounce_type {
            self.bounce_type = bounce_type;
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(max_retries) = patch.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(next_retry_at) = patch.next_retry_at {
            self.next_retry_at = next_retry_at;
        }
        if let Some(last_error) = &patch.last_error {
            self.last_error.clone_from(last_error);
        }
        if let Some(sent_at) = patch.sent_at {
            self.sent_at = sent_at;
        }
    }

    /// Build the request handed to the executor for this entry.
    #[must_use]
    pub fn request(&self) -> DeliveryRequest {
        DeliveryRequest {
            entry_id: self.id,
            schedule_id: self.schedule_id.clone(),
            user_id: self.user_id.clone(),
            recipient_email: self.recipient_email.clone(),
        }
    }
}

/// Sparse update to a [`DeliveryLogEntry`].
///
/// Outer `None` leaves a field untouched. For the clearable fields,
/// `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryLogPatch {
    pub status: Option<DeliveryStatus>,
    pub bounce_type: Option<BounceType>,
    pub retry_count: Option<u32>,
    pub max_retries: Option<u32>,
    pub next_retry_at: Option<Option<DateTime<Utc>>>,
    pub last_error: Option<Option<String>>,
    pub sent_at: Option<Option<DateTime<Utc>>>,
}

impl DeliveryLogPatch {
    /// Successful delivery at `at`.
    #[must_use]
    pub fn sent(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(DeliveryStatus::Sent),
            next_retry_at: Some(None),
            last_error: Some(None),
            sent_at: Some(Some(at)),
            ..Self::default()
        }
    }

    /// Retries are exhausted or were never allowed.
    #[must_use]
    pub fn permanently_failed() -> Self {
        Self {
            status: Some(DeliveryStatus::PermanentlyFailed),
            next_retry_at: Some(None),
            ..Self::default()
        }
    }

    /// Another attempt is scheduled for `at`.
    #[must_use]
    pub fn retry_at(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(DeliveryStatus::Failed),
            next_retry_at: Some(Some(at)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    #[must_use]
    pub fn with_last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(Some(error.into()));
        self
    }

    #[must_use]
    pub fn with_classification(mut self, bounce_type: BounceType, max_retries: u32) -> Self {
        self.bounce_type = Some(bounce_type);
        self.max_retries = Some(max_retries);
        self
    }
}

/// What the executor needs to resend a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    pub entry_id: DeliveryLogId,
    pub schedule_id: String,
    pub user_id: String,
    pub recipient_email: String,
}
