//! Typed error handling for the retry subsystem.
//!
//! - Store errors: the delivery log could not be read or written
//! - Executor errors: an infrastructure fault during a resend (ordinary
//!   delivery failures are a [`SendOutcome`](crate::SendOutcome), not an error)
//! - Scheduler errors: what the public scheduler operations surface

use thiserror::Error;

use crate::{bounce::BounceType, types::DeliveryLogId, types::DeliveryStatus};

/// Errors from a [`DeliveryLogStore`](crate::DeliveryLogStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached at all.
    #[error("Delivery log store unavailable: {0}")]
    Unavailable(String),

    /// No entry with this id.
    #[error("Delivery log entry not found: {0}")]
    NotFound(DeliveryLogId),

    /// Any other failure inside the store.
    #[error("Delivery log store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns `true` if the store as a whole is unreachable, as opposed to
    /// a failure scoped to one entry.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Infrastructure faults raised by a [`DeliveryAttemptExecutor`](crate::DeliveryAttemptExecutor).
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The transport to the email provider failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The attempt did not finish in time.
    #[error("Delivery attempt timeout after {0}s")]
    Timeout(u64),

    /// Any other executor failure.
    #[error("Executor error: {0}")]
    Internal(String),
}

impl ExecutorError {
    /// Bounce type implied by this fault when no provider error text exists.
    ///
    /// Timeouts are transient; other faults say nothing about the address.
    #[must_use]
    pub const fn bounce_hint(&self) -> BounceType {
        match self {
            Self::Timeout(_) => BounceType::Temporary,
            Self::Transport(_) | Self::Internal(_) => BounceType::Unknown,
        }
    }
}

/// Errors surfaced by [`RetryScheduler`](crate::RetryScheduler) operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The delivery log store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The entry does not exist.
    #[error("Delivery log entry not found: {0}")]
    NotFound(DeliveryLogId),

    /// The entry is not in a state this operation accepts.
    #[error("Entry {id} is {status}, expected {expected}")]
    InvalidState {
        id: DeliveryLogId,
        status: DeliveryStatus,
        expected: DeliveryStatus,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No async runtime to run the scheduler loop on.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl SchedulerError {
    /// Returns `true` if the store could not be reached.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_connectivity())
    }
}
