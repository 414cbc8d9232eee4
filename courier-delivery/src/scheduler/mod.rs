//! Retry scheduler orchestration
//!
//! A single timer-driven loop. Each tick finds due failed entries and resends
//! them, then records the outcome. Ticks never overlap: a firing that lands
//! while the previous tick is still running is skipped.

pub mod attempt;
pub mod stats;
pub mod tick;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use courier_common::{Signal, internal};
use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

pub use attempt::EntryOutcome;
pub use stats::RetryStats;
pub use tick::{TickOutcome, TickReport};

use crate::{
    clock::{Clock, SystemClock},
    config::RetrySchedulerConfig,
    error::SchedulerError,
    executor::DeliveryAttemptExecutor,
    policy::RetryTimeCalculator,
    store::DeliveryLogStore,
    types::DeliveryLogId,
};

/// How long `stop()` waits for an in-flight tick before detaching from it
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// State shared between the scheduler handle and its background loop
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn DeliveryLogStore>,
    pub(crate) executor: Arc<dyn DeliveryAttemptExecutor>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) calculator: RetryTimeCalculator,
    pub(crate) config: RetrySchedulerConfig,
    /// Set for the duration of a tick
    tick_in_progress: AtomicBool,
    /// Entries with a send currently in flight
    in_flight: DashSet<DeliveryLogId>,
}

impl Shared {
    /// Mark the start of a tick, or `None` if one is already running.
    pub(crate) fn begin_tick(&self) -> Option<TickGuard<'_>> {
        self.tick_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard(&self.tick_in_progress))
    }

    /// Claim an entry for a send, or `None` if another send holds it.
    pub(crate) fn claim(&self, id: DeliveryLogId) -> Option<EntryClaim<'_>> {
        self.in_flight
            .insert(id)
            .then(|| EntryClaim { set: &self.in_flight, id })
    }
}

pub(crate) struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) struct EntryClaim<'a> {
    set: &'a DashSet<DeliveryLogId>,
    id: DeliveryLogId,
}

impl Drop for EntryClaim<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

#[derive(Debug)]
struct Running {
    shutdown: broadcast::Sender<Signal>,
    handle: JoinHandle<()>,
}

/// Periodic retry scheduler for failed report deliveries
///
/// Owns its collaborators explicitly: the delivery log store, the send
/// executor and a clock. The host controls the timer with [`start`] and
/// [`stop`]; [`run_now`] runs the same logic once, synchronously.
///
/// [`start`]: RetryScheduler::start
/// [`stop`]: RetryScheduler::stop
/// [`run_now`]: RetryScheduler::run_now
#[derive(Debug)]
pub struct RetryScheduler {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl RetryScheduler {
    /// Create a scheduler using the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn new(
        config: RetrySchedulerConfig,
        store: Arc<dyn DeliveryLogStore>,
        executor: Arc<dyn DeliveryAttemptExecutor>,
    ) -> Result<Self, SchedulerError> {
        Self::with_clock(config, store, executor, Arc::new(SystemClock))
    }

    /// Create a scheduler with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn with_clock(
        config: RetrySchedulerConfig,
        store: Arc<dyn DeliveryLogStore>,
        executor: Arc<dyn DeliveryAttemptExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                store,
                executor,
                clock,
                calculator: RetryTimeCalculator::from_config(&config),
                config,
                tick_in_progress: AtomicBool::new(false),
                in_flight: DashSet::new(),
            }),
            running: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RetrySchedulerConfig {
        &self.shared.config
    }

    /// Returns `true` while the periodic loop is scheduled.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Start the periodic loop on the current tokio runtime.
    ///
    /// Calling this while already running does nothing and returns
    /// `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a tokio runtime
    pub fn start(&self) -> Result<bool, SchedulerError> {
        let mut running = self.running.lock();

        if running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            warn!("Retry scheduler already running, ignoring start request");
            return Ok(false);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SchedulerError::Runtime(e.to_string()))?;

        let (shutdown, receiver) = broadcast::channel(1);
        let handle = runtime.spawn(serve(Arc::clone(&self.shared), receiver));

        *running = Some(Running { shutdown, handle });

        info!(
            tick_interval_secs = self.shared.config.tick_interval_secs,
            "Retry scheduler started"
        );

        Ok(true)
    }

    /// Stop scheduling ticks.
    ///
    /// An in-flight tick is not interrupted: this waits for it to finish
    /// (up to 30 seconds) and no further tick starts. Does nothing if the
    /// scheduler is not running.
    pub async fn stop(&self) {
        let Some(Running { shutdown, handle }) = self.running.lock().take() else {
            debug!("Retry scheduler not running, nothing to stop");
            return;
        };

        // The loop may already have exited on its own, in which case there
        // is no receiver left.
        let _ = shutdown.send(Signal::Shutdown);

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
            Ok(Ok(())) => internal!(level = INFO, "Retry scheduler stopped"),
            Ok(Err(e)) => error!(error = %e, "Retry scheduler task failed"),
            Err(_) => warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Shutdown timeout exceeded, in-flight tick left to finish in the background"
            ),
        }
    }

    /// Run one tick now, outside the timer.
    ///
    /// Skipped if a tick is already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the delivery log store cannot be queried
    pub async fn run_now(&self) -> Result<TickOutcome, SchedulerError> {
        self.tick().await
    }

    /// One pass over the due entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the delivery log store cannot be reached. When the
    /// due query fails no entry was touched; when the store drops partway
    /// through, no further entries are started.
    pub async fn tick(&self) -> Result<TickOutcome, SchedulerError> {
        tick::run(&self.shared).await
    }

    /// First send of a `Pending` entry, recording the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry does not exist, is not pending, or the
    /// store fails
    pub async fn deliver_pending(&self, id: &DeliveryLogId) -> Result<EntryOutcome, SchedulerError> {
        attempt::deliver_pending(&self.shared, *id).await
    }

    /// Aggregate view of entries currently awaiting retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the delivery log store cannot be queried
    pub async fn get_retry_stats(&self) -> Result<RetryStats, SchedulerError> {
        stats::collect(self.shared.store.as_ref()).await
    }
}

/// Background loop driving ticks until a shutdown signal arrives
#[tracing::instrument(level = "trace", skip_all)]
async fn serve(shared: Arc<Shared>, mut shutdown: broadcast::Receiver<Signal>) {
    internal!("Retry scheduler loop starting");

    let mut timer = tokio::time::interval(shared.config.tick_interval());
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick to avoid immediate execution
    timer.tick().await;

    loop {
        tokio::select! {
            biased;

            sig = shutdown.recv() => {
                match sig {
                    Ok(sig) if sig.is_terminal() => {
                        internal!("Retry scheduler received {sig:?}");
                        break;
                    }
                    Ok(sig) => debug!("Ignoring {sig:?}"),
                    Err(e) => {
                        error!(error = %e, "Retry scheduler shutdown channel error");
                        break;
                    }
                }
            }
            _ = timer.tick() => {
                match tick::run(&shared).await {
                    Ok(TickOutcome::Completed(report)) if report.due == 0 => debug!("No retries due"),
                    Ok(TickOutcome::Completed(_)) => {}
                    Ok(TickOutcome::Skipped) => debug!("Previous tick still running, skipped"),
                    Err(e) => error!(error = %e, "Retry tick aborted, will try again next period"),
                }
            }
        }
    }

    internal!("Retry scheduler loop stopped");
}
