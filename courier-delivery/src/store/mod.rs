//! Persistence seam for delivery log entries

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryDeliveryLogStore;

use crate::{
    error::StoreError,
    types::{DeliveryLogEntry, DeliveryLogId, DeliveryLogPatch, DeliveryStatus},
};

/// Queryable persistence for delivery attempts
///
/// All mutation is per entry and keyed by id, so updates to distinct
/// entries never conflict.
#[async_trait]
pub trait DeliveryLogStore: Send + Sync + std::fmt::Debug {
    /// Failed entries due for another attempt at `now`.
    ///
    /// See [`DeliveryLogEntry::is_due`] for the predicate.
    ///
    /// # Errors
    /// If the store cannot be queried
    async fn find_due_failed(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryLogEntry>, StoreError>;

    /// Look up a single entry.
    ///
    /// # Errors
    /// If the store cannot be queried
    async fn find_by_id(&self, id: &DeliveryLogId) -> Result<Option<DeliveryLogEntry>, StoreError>;

    /// Every entry currently in `status`.
    ///
    /// # Errors
    /// If the store cannot be queried
    async fn find_by_status(
        &self,
        status: DeliveryStatus,
    ) -> Result<Vec<DeliveryLogEntry>, StoreError>;

    /// Apply a sparse update to one entry.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the entry does not exist, or any store failure
    async fn update(&self, id: &DeliveryLogId, patch: &DeliveryLogPatch) -> Result<(), StoreError>;
}
