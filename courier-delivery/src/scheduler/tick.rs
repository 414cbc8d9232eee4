//! A single pass over due entries

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{
    error::SchedulerError,
    scheduler::{Shared, attempt::{self, EntryOutcome}},
    types::DeliveryLogEntry,
};

/// Counts from a completed tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Entries the store reported as due
    pub due: usize,
    pub sent: usize,
    pub rescheduled: usize,
    pub permanently_failed: usize,
    /// Entries another send already held, or that stopped being due
    pub skipped: usize,
    /// Entries whose processing failed; they stay as they were
    pub errors: usize,
}

impl TickReport {
    fn record(&mut self, outcome: &Result<EntryOutcome, SchedulerError>) {
        match outcome {
            Ok(EntryOutcome::Sent) => self.sent += 1,
            Ok(EntryOutcome::Rescheduled { .. }) => self.rescheduled += 1,
            Ok(EntryOutcome::PermanentlyFailed) => self.permanently_failed += 1,
            Ok(EntryOutcome::Skipped) => self.skipped += 1,
            Err(_) => self.errors += 1,
        }
    }
}

/// Result of asking for a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran to completion.
    Completed(TickReport),
    /// Another tick was already in progress, so this one did nothing.
    Skipped,
}

impl TickOutcome {
    /// The report, if the tick ran.
    #[must_use]
    pub const fn report(&self) -> Option<&TickReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped => None,
        }
    }
}

async fn process(shared: Arc<Shared>, entry: DeliveryLogEntry) -> Result<EntryOutcome, SchedulerError> {
    let outcome = attempt::retry_due(&shared, &entry).await;

    if let Err(e) = &outcome {
        error!(
            entry_id = %entry.id,
            error = %e,
            "Failed to process due retry, leaving entry for the next tick"
        );
    }

    outcome
}

/// Process every due entry, at most `max_concurrent_retries` at a time.
///
/// # Errors
/// Returns an error if the store cannot be reached, either for the due query
/// or partway through the tick. In the latter case no further entries are
/// started; those already in flight are drained first. Other per-entry
/// failures are logged and counted in the report.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) async fn run(shared: &Arc<Shared>) -> Result<TickOutcome, SchedulerError> {
    let Some(_guard) = shared.begin_tick() else {
        warn!("Retry tick already in progress, skipping");
        return Ok(TickOutcome::Skipped);
    };

    let now = shared.clock.now();
    let mut due = shared.store.find_due_failed(now).await?;

    due.sort_by_key(|entry| entry.id);
    due.dedup_by_key(|entry| entry.id);

    let mut report = TickReport {
        due: due.len(),
        ..TickReport::default()
    };

    if due.is_empty() {
        return Ok(TickOutcome::Completed(report));
    }

    debug!(
        due = due.len(),
        max_concurrent = shared.config.max_concurrent_retries,
        "Processing due retries"
    );

    let mut join_set = JoinSet::new();
    let mut pending = due.into_iter();

    for entry in pending.by_ref().take(shared.config.max_concurrent_retries) {
        join_set.spawn(process(Arc::clone(shared), entry));
    }

    let mut outage = None;

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Err(e)) if e.is_connectivity() => {
                if outage.is_none() {
                    warn!(
                        remaining = pending.len(),
                        "Delivery log store unreachable, abandoning the rest of this tick"
                    );
                    outage = Some(e);
                }
            }
            Ok(outcome) => report.record(&outcome),
            Err(e) => {
                error!(error = %e, "Retry task panicked");
                report.errors += 1;
            }
        }

        if outage.is_none()
            && let Some(entry) = pending.next()
        {
            join_set.spawn(process(Arc::clone(shared), entry));
        }
    }

    if let Some(e) = outage {
        return Err(e);
    }

    info!(
        due = report.due,
        sent = report.sent,
        rescheduled = report.rescheduled,
        permanently_failed = report.permanently_failed,
        skipped = report.skipped,
        errors = report.errors,
        "Retry tick complete"
    );

    Ok(TickOutcome::Completed(report))
}
