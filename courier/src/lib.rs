//! Host wiring for the report delivery retry engine
//!
//! Loads `courier.config.ron` and runs the retry scheduler until the process
//! is told to stop. The delivery log store and the send executor are supplied
//! by the embedding application.

pub mod config;
pub mod controller;

pub use config::{find_config_file, load};
pub use controller::{Courier, SHUTDOWN_BROADCAST};
