use std::collections::HashMap;

use serde::Serialize;

use crate::{
    bounce::BounceType,
    error::SchedulerError,
    store::DeliveryLogStore,
    types::{DeliveryLogEntry, DeliveryStatus},
};

/// Aggregate view of the `Failed` entries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetryStats {
    /// Failed entries that will still be retried
    pub pending_retries: usize,
    pub total_failed: usize,
    /// Mean `retry_count` over the failed entries, `0.0` when there are none
    pub avg_retry_count: f64,
    pub by_bounce_type: HashMap<BounceType, usize>,
}

impl RetryStats {
    #[allow(clippy::cast_precision_loss)]
    fn from_failed(failed: &[DeliveryLogEntry]) -> Self {
        let mut by_bounce_type = HashMap::new();
        for entry in failed {
            *by_bounce_type.entry(entry.bounce_type).or_insert(0) += 1;
        }

        let pending_retries = failed
            .iter()
            .filter(|entry| {
                entry.bounce_type.is_unclassified() || entry.retry_count < entry.max_retries
            })
            .count();

        let avg_retry_count = if failed.is_empty() {
            0.0
        } else {
            let total: u64 = failed.iter().map(|entry| u64::from(entry.retry_count)).sum();
            total as f64 / failed.len() as f64
        };

        Self {
            pending_retries,
            total_failed: failed.len(),
            avg_retry_count,
            by_bounce_type,
        }
    }
}

pub(crate) async fn collect(store: &dyn DeliveryLogStore) -> Result<RetryStats, SchedulerError> {
    let failed = store.find_by_status(DeliveryStatus::Failed).await?;
    Ok(RetryStats::from_failed(&failed))
}
