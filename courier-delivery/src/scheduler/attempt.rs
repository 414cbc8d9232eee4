//! Per-entry send attempts and outcome recording
//!
//! Each attempt follows the same steps: classify, resolve the strategy,
//! send, then persist. The entry is claimed for the whole sequence so two
//! sends of the same entry never overlap.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    bounce::{BounceType, classify},
    error::{ExecutorError, SchedulerError},
    executor::SendOutcome,
    policy::RetryStrategy,
    scheduler::Shared,
    types::{DeliveryLogEntry, DeliveryLogId, DeliveryLogPatch, DeliveryStatus},
};

/// Recorded when the provider fails a send without saying why
const NO_ERROR_DETAIL: &str = "Delivery failed without error detail";

/// What happened to one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Delivered; the entry is now `Sent`.
    Sent,
    /// Failed again; another attempt is scheduled.
    Rescheduled { next_retry_at: DateTime<Utc> },
    /// Failed with no retries left, or a permanent bounce.
    PermanentlyFailed,
    /// Another send held the entry, or it stopped being due.
    Skipped,
}

/// A failed send, reduced to what the retry logic needs
struct Failure {
    error: String,
    /// Classification implied by the failure itself
    bounce_type: BounceType,
}

impl Failure {
    fn from_result(result: Result<SendOutcome, ExecutorError>) -> Option<Self> {
        match result {
            Ok(SendOutcome::Delivered) => None,
            Ok(SendOutcome::Failed { error }) => {
                let bounce_type = classify(error.as_deref());
                Some(Self {
                    error: error.unwrap_or_else(|| NO_ERROR_DETAIL.to_string()),
                    bounce_type,
                })
            }
            // A fault says nothing about the address, so it is never permanent.
            Err(e) => {
                let error = e.to_string();
                let bounce_type = match classify(Some(&error)) {
                    BounceType::Temporary => BounceType::Temporary,
                    _ => e.bounce_hint(),
                };
                Some(Self { error, bounce_type })
            }
        }
    }
}

/// Send through the executor, bounded by the configured timeout.
async fn send(shared: &Shared, entry: &DeliveryLogEntry) -> Result<SendOutcome, ExecutorError> {
    let timeout = shared.config.send_timeout();
    let request = entry.request();

    tokio::time::timeout(timeout, shared.executor.send(&request))
        .await
        .unwrap_or_else(|_| Err(ExecutorError::Timeout(timeout.as_secs())))
}

/// Build the patch for a failed attempt.
///
/// `retry_count` is the count before this failure. The count never passes
/// the strategy's cap, and hitting the cap is terminal.
fn failure_patch(
    shared: &Shared,
    entry: &DeliveryLogEntry,
    bounce_type: BounceType,
    retry_count: u32,
    error: String,
    now: DateTime<Utc>,
) -> (DeliveryLogPatch, EntryOutcome) {
    let strategy = RetryStrategy::resolve(bounce_type);
    let next_count = retry_count.saturating_add(1).min(strategy.max_retries);

    let scheduled = strategy
        .allows_retry(next_count)
        .then(|| strategy.interval(retry_count))
        .flatten()
        .map(|interval| shared.calculator.next_retry_at(now, bounce_type, interval));

    if let Some(next_retry_at) = scheduled {
        info!(
            entry_id = %entry.id,
            %bounce_type,
            retry_count = next_count,
            remaining = strategy.remaining_attempts(next_count),
            %next_retry_at,
            error = %error,
            "Delivery failed, retry scheduled"
        );
        (
            DeliveryLogPatch::retry_at(next_retry_at)
                .with_retry_count(next_count)
                .with_last_error(error),
            EntryOutcome::Rescheduled { next_retry_at },
        )
    } else {
        warn!(
            entry_id = %entry.id,
            %bounce_type,
            retry_count = next_count,
            max_retries = strategy.max_retries,
            error = %error,
            "Delivery failed permanently"
        );
        (
            DeliveryLogPatch::permanently_failed()
                .with_retry_count(next_count)
                .with_last_error(error),
            EntryOutcome::PermanentlyFailed,
        )
    }
}

/// First send of a `Pending` entry.
///
/// # Errors
/// If the entry is missing, not pending, or the store fails
pub(crate) async fn deliver_pending(
    shared: &Shared,
    id: DeliveryLogId,
) -> Result<EntryOutcome, SchedulerError> {
    let Some(_claim) = shared.claim(id) else {
        debug!(entry_id = %id, "Send already in flight, skipping");
        return Ok(EntryOutcome::Skipped);
    };

    let entry = shared
        .store
        .find_by_id(&id)
        .await?
        .ok_or(SchedulerError::NotFound(id))?;

    if entry.status != DeliveryStatus::Pending {
        return Err(SchedulerError::InvalidState {
            id,
            status: entry.status,
            expected: DeliveryStatus::Pending,
        });
    }

    let result = send(shared, &entry).await;
    let now = shared.clock.now();

    let Some(failure) = Failure::from_result(result) else {
        shared.store.update(&id, &DeliveryLogPatch::sent(now)).await?;
        info!(entry_id = %id, recipient = %entry.recipient_email, "Report delivered");
        return Ok(EntryOutcome::Sent);
    };

    let bounce_type = failure.bounce_type;
    let strategy = RetryStrategy::resolve(bounce_type);
    let (patch, outcome) = failure_patch(shared, &entry, bounce_type, 0, failure.error, now);

    shared
        .store
        .update(&id, &patch.with_classification(bounce_type, strategy.max_retries))
        .await?;

    Ok(outcome)
}

/// Retry a due `Failed` entry.
///
/// The entry is re-read after claiming it, so a stale snapshot from the
/// tick's query can never resurrect a terminal entry.
///
/// # Errors
/// If the store fails
pub(crate) async fn retry_due(
    shared: &Shared,
    snapshot: &DeliveryLogEntry,
) -> Result<EntryOutcome, SchedulerError> {
    let Some(_claim) = shared.claim(snapshot.id) else {
        debug!(entry_id = %snapshot.id, "Send already in flight, skipping");
        return Ok(EntryOutcome::Skipped);
    };

    let id = snapshot.id;
    let started = shared.clock.now();

    let Some(entry) = shared.store.find_by_id(&id).await? else {
        return Err(SchedulerError::NotFound(id));
    };

    if !entry.is_due(started) {
        debug!(entry_id = %id, status = %entry.status, "Entry no longer due, skipping");
        return Ok(EntryOutcome::Skipped);
    }

    let unclassified = entry.bounce_type.is_unclassified();
    let bounce_type = if unclassified {
        classify(entry.last_error.as_deref())
    } else {
        entry.bounce_type
    };
    let strategy = RetryStrategy::resolve(bounce_type);

    let classified = |patch: DeliveryLogPatch| {
        if unclassified {
            debug!(entry_id = %id, %bounce_type, "Classified failed delivery");
            patch.with_classification(bounce_type, strategy.max_retries)
        } else {
            patch
        }
    };

    if !strategy.allows_retry(entry.retry_count) {
        warn!(
            entry_id = %id,
            %bounce_type,
            retry_count = entry.retry_count,
            "Bounce type is not retryable, giving up"
        );
        let patch = DeliveryLogPatch::permanently_failed()
            .with_retry_count(entry.retry_count.min(strategy.max_retries));
        shared.store.update(&id, &classified(patch)).await?;
        return Ok(EntryOutcome::PermanentlyFailed);
    }

    debug!(
        entry_id = %id,
        %bounce_type,
        attempt = entry.retry_count + 1,
        final_attempt = strategy.is_final_attempt(entry.retry_count),
        "Retrying delivery"
    );

    let result = send(shared, &entry).await;
    let now = shared.clock.now();

    let Some(failure) = Failure::from_result(result) else {
        shared
            .store
            .update(&id, &classified(DeliveryLogPatch::sent(now)))
            .await?;
        info!(
            entry_id = %id,
            recipient = %entry.recipient_email,
            retry_count = entry.retry_count,
            "Report delivered on retry"
        );
        return Ok(EntryOutcome::Sent);
    };

    // The classification is fixed by now; the new failure only updates
    // `last_error`.
    let (patch, outcome) =
        failure_patch(shared, &entry, bounce_type, entry.retry_count, failure.error, now);
    shared.store.update(&id, &classified(patch)).await?;

    Ok(outcome)
}
