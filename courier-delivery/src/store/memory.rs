use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::{
    error::StoreError,
    store::DeliveryLogStore,
    types::{DeliveryLogEntry, DeliveryLogId, DeliveryLogPatch, DeliveryStatus},
};

/// In-memory delivery log
///
/// Backed by a `DashMap`, so per-entry updates from concurrent resends only
/// contend on their own shard. Intended for tests and for hosts that keep
/// delivery state elsewhere and only need a working set.
#[derive(Debug, Clone, Default)]
pub struct MemoryDeliveryLogStore {
    entries: Arc<DashMap<DeliveryLogId, DeliveryLogEntry>>,
}

impl MemoryDeliveryLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry, returning its id.
    pub fn insert(&self, entry: DeliveryLogEntry) -> DeliveryLogId {
        let id = entry.id;
        self.entries.insert(id, entry);
        id
    }

    /// Snapshot of a single entry.
    #[must_use]
    pub fn get(&self, id: &DeliveryLogId) -> Option<DeliveryLogEntry> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every entry, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<DeliveryLogEntry> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn collect(&self, keep: impl Fn(&DeliveryLogEntry) -> bool) -> Vec<DeliveryLogEntry> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }
}

#[async_trait]
impl DeliveryLogStore for MemoryDeliveryLogStore {
    async fn find_due_failed(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        Ok(self.collect(|entry| entry.is_due(now)))
    }

    async fn find_by_id(&self, id: &DeliveryLogId) -> Result<Option<DeliveryLogEntry>, StoreError> {
        Ok(self.get(id))
    }

    async fn find_by_status(
        &self,
        status: DeliveryStatus,
    ) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        Ok(self.collect(|entry| entry.status == status))
    }

    async fn update(&self, id: &DeliveryLogId, patch: &DeliveryLogPatch) -> Result<(), StoreError> {
        let mut entry = self.entries.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        entry.value_mut().apply(patch);
        Ok(())
    }
}
