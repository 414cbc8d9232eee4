//! Seam to the component that actually sends a report email

use async_trait::async_trait;

use crate::{error::ExecutorError, types::DeliveryRequest};

/// Result of an ordinary send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The provider accepted the message.
    Delivered,
    /// The provider refused or failed the message.
    ///
    /// `error` is the provider's text, when it gave one; it is what gets
    /// classified.
    Failed { error: Option<String> },
}

impl SendOutcome {
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: Some(error.into()),
        }
    }
}

/// Performs the actual send of a report
///
/// Ordinary delivery failures are returned as [`SendOutcome::Failed`].
/// `Err` is reserved for infrastructure faults; see
/// [`ExecutorError::bounce_hint`] for how they are classified. Rendering the
/// report content is the executor's job.
#[async_trait]
pub trait DeliveryAttemptExecutor: Send + Sync + std::fmt::Debug {
    /// Send the report for `request`.
    ///
    /// # Errors
    /// Only for infrastructure faults, never for a refused delivery
    async fn send(&self, request: &DeliveryRequest) -> Result<SendOutcome, ExecutorError>;
}
