//! Retry engine for scheduled report deliveries
//!
//! This crate provides functionality to:
//! - Classify failed sends as permanent, temporary or unknown bounces
//! - Resolve a retry strategy per bounce type
//! - Schedule temporary bounces into the off-peak window
//! - Periodically resend due failures and record the outcome

mod bounce;
mod clock;
mod config;
mod error;
mod executor;
pub mod policy;
mod scheduler;
pub mod store;
mod types;

pub use bounce::{BounceType, classify};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RetrySchedulerConfig;
pub use error::{ExecutorError, SchedulerError, StoreError};
pub use executor::{DeliveryAttemptExecutor, SendOutcome};
pub use policy::{OffPeakWindow, RetryStrategy, RetryTimeCalculator};
pub use scheduler::{EntryOutcome, RetryScheduler, RetryStats, TickOutcome, TickReport};
pub use store::{DeliveryLogStore, MemoryDeliveryLogStore};
pub use types::{DeliveryLogEntry, DeliveryLogId, DeliveryLogPatch, DeliveryRequest, DeliveryStatus};
