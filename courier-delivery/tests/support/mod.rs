//! Test doubles for the scheduler's seams
//!
//! - `ScriptedExecutor`: per-recipient queue of send results, delivering once
//!   the script runs out
//! - `GatedExecutor`: blocks each send until the test releases it
//! - `SlowExecutor`: delivers after a fixed delay
//! - `HangingExecutor`: never finishes a send
//! - `OutageExecutor`: takes a `FlakyStore` down during its first send
//! - `FlakyStore`: wraps the in-memory store and injects failures
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use courier_delivery::{
    BounceType, DeliveryAttemptExecutor, DeliveryLogEntry, DeliveryLogId, DeliveryLogPatch,
    DeliveryLogStore, DeliveryRequest, DeliveryStatus, ExecutorError, MemoryDeliveryLogStore,
    RetrySchedulerConfig, SendOutcome, StoreError,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// 2024-06-10 at `hour:minute` UTC
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, hour, minute, 0).unwrap()
}

/// 2024-06-11 at `hour:minute` UTC
pub fn next_day(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 11, hour, minute, 0).unwrap()
}

/// Defaults, with the off-peak window read in UTC
pub fn config() -> RetrySchedulerConfig {
    RetrySchedulerConfig {
        off_peak_timezone: Some(Tz::UTC),
        ..RetrySchedulerConfig::default()
    }
}

pub fn pending(recipient: &str) -> DeliveryLogEntry {
    DeliveryLogEntry::new("weekly-usage", "user-42", recipient, at(9, 0))
}

/// A classified failed entry due at `next_retry_at`
pub fn failed(
    recipient: &str,
    bounce_type: BounceType,
    retry_count: u32,
    max_retries: u32,
    next_retry_at: DateTime<Utc>,
) -> DeliveryLogEntry {
    let mut entry = pending(recipient);
    entry.status = DeliveryStatus::Failed;
    entry.bounce_type = bounce_type;
    entry.retry_count = retry_count;
    entry.max_retries = max_retries;
    entry.next_retry_at = Some(next_retry_at);
    entry.last_error = Some("Connection timeout".to_string());
    entry
}

#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Result<SendOutcome, ExecutorError>>>>,
    requests: Mutex<Vec<DeliveryRequest>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next result for sends to `recipient`.
    pub fn script(&self, recipient: &str, result: Result<SendOutcome, ExecutorError>) -> &Self {
        self.scripts
            .lock()
            .entry(recipient.to_string())
            .or_default()
            .push_back(result);
        self
    }

    pub fn fail_with(&self, recipient: &str, error: &str) -> &Self {
        self.script(recipient, Ok(SendOutcome::failed(error)))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DeliveryAttemptExecutor for ScriptedExecutor {
    async fn send(&self, request: &DeliveryRequest) -> Result<SendOutcome, ExecutorError> {
        self.requests.lock().push(request.clone());
        self.scripts
            .lock()
            .get_mut(&request.recipient_email)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(SendOutcome::Delivered))
    }
}

/// Delivers, but only once released; tracks how many sends overlap.
#[derive(Debug, Default)]
pub struct GatedExecutor {
    pub entered: Notify,
    pub release: Notify,
    current: AtomicUsize,
    max_seen: AtomicUsize,
    calls: AtomicUsize,
}

impl GatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryAttemptExecutor for GatedExecutor {
    async fn send(&self, _request: &DeliveryRequest) -> Result<SendOutcome, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);

        self.entered.notify_one();
        self.release.notified().await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(SendOutcome::Delivered)
    }
}

/// Delivers after a fixed delay; tracks how many sends overlap.
#[derive(Debug)]
pub struct SlowExecutor {
    delay: Duration,
    current: AtomicUsize,
    max_seen: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryAttemptExecutor for SlowExecutor {
    async fn send(&self, _request: &DeliveryRequest) -> Result<SendOutcome, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(SendOutcome::Delivered)
    }
}

/// Never completes a send
#[derive(Debug, Default)]
pub struct HangingExecutor;

#[async_trait]
impl DeliveryAttemptExecutor for HangingExecutor {
    async fn send(&self, _request: &DeliveryRequest) -> Result<SendOutcome, ExecutorError> {
        std::future::pending().await
    }
}

/// Delivers, but the first send makes the store unreachable
#[derive(Debug)]
pub struct OutageExecutor {
    store: Arc<FlakyStore>,
    tripped: AtomicBool,
    calls: AtomicUsize,
}

impl OutageExecutor {
    pub fn new(store: Arc<FlakyStore>) -> Self {
        Self {
            store,
            tripped: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryAttemptExecutor for OutageExecutor {
    async fn send(&self, _request: &DeliveryRequest) -> Result<SendOutcome, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.tripped.swap(true, Ordering::SeqCst) {
            self.store.set_unavailable(true);
        }
        Ok(SendOutcome::Delivered)
    }
}

/// In-memory store with switchable faults
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryDeliveryLogStore,
    unavailable: AtomicBool,
    duplicate_due: AtomicBool,
    failing_updates: Mutex<HashSet<DeliveryLogId>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryDeliveryLogStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Fail every call as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Return each due entry twice from `find_due_failed`.
    pub fn set_duplicate_due(&self, duplicate: bool) {
        self.duplicate_due.store(duplicate, Ordering::SeqCst);
    }

    pub fn fail_updates_for(&self, id: DeliveryLogId) {
        self.failing_updates.lock().insert(id);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeliveryLogStore for FlakyStore {
    async fn find_due_failed(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        self.check()?;
        let mut due = self.inner.find_due_failed(now).await?;
        if self.duplicate_due.load(Ordering::SeqCst) {
            due.extend(due.clone());
        }
        Ok(due)
    }

    async fn find_by_id(&self, id: &DeliveryLogId) -> Result<Option<DeliveryLogEntry>, StoreError> {
        self.check()?;
        self.inner.find_by_id(id).await
    }

    async fn find_by_status(
        &self,
        status: DeliveryStatus,
    ) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        self.check()?;
        self.inner.find_by_status(status).await
    }

    async fn update(&self, id: &DeliveryLogId, patch: &DeliveryLogPatch) -> Result<(), StoreError> {
        self.check()?;
        if self.failing_updates.lock().contains(id) {
            return Err(StoreError::Internal(format!("write conflict on {id}")));
        }
        self.inner.update(id, patch).await
    }
}
