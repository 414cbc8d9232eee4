//! End-to-end run of the host controller
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use courier::Courier;
use courier_common::Signal;
use courier_delivery::{
    DeliveryAttemptExecutor, DeliveryRequest, ExecutorError, MemoryDeliveryLogStore, SendOutcome,
};
use tokio::sync::broadcast;

#[derive(Debug)]
struct AlwaysDelivers;

#[async_trait]
impl DeliveryAttemptExecutor for AlwaysDelivers {
    async fn send(&self, _request: &DeliveryRequest) -> Result<SendOutcome, ExecutorError> {
        Ok(SendOutcome::Delivered)
    }
}

#[tokio::test]
async fn test_run_until_shutdown_signal() {
    let courier: Courier = ron::from_str("(retry: (tick_interval_secs: 1))").unwrap();
    let (sender, receiver) = broadcast::channel(4);

    let running = tokio::spawn(courier.run_until(
        Arc::new(MemoryDeliveryLogStore::new()),
        Arc::new(AlwaysDelivers),
        receiver,
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!running.is_finished());

    sender.send(Signal::Shutdown).unwrap();

    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("controller stops after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_invalid_config_fails_to_start() {
    let courier: Courier = ron::from_str("(retry: (tick_interval_secs: 0))").unwrap();
    let (_sender, receiver) = broadcast::channel(4);

    let err = courier
        .run_until(
            Arc::new(MemoryDeliveryLogStore::new()),
            Arc::new(AlwaysDelivers),
            receiver,
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("tick_interval_secs"));
}
