//! Retry policy for failed report deliveries.
//!
//! - [`RetryStrategy`]: bounce type → retry cap and interval schedule
//! - [`RetryTimeCalculator`]: strategy + current time → next attempt time

pub mod strategy;
pub mod timing;

pub use strategy::RetryStrategy;
pub use timing::{OffPeakWindow, RetryTimeCalculator};
