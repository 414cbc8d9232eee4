//! Timer-driven lifecycle of the retry scheduler
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::{sync::Arc, time::Duration};

use courier_delivery::{
    BounceType, DeliveryStatus, ManualClock, MemoryDeliveryLogStore, RetryScheduler,
    RetrySchedulerConfig, SchedulerError,
};
use support::{GatedExecutor, ScriptedExecutor, at, config, failed};

fn build(
    store: &MemoryDeliveryLogStore,
    executor: Arc<dyn courier_delivery::DeliveryAttemptExecutor>,
) -> RetryScheduler {
    RetryScheduler::with_clock(
        config(),
        Arc::new(store.clone()),
        executor,
        Arc::new(ManualClock::new(at(10, 0))),
    )
    .expect("valid config")
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent_and_stop_halts() {
    let store = MemoryDeliveryLogStore::new();
    let scheduler = build(&store, Arc::new(ScriptedExecutor::new()));

    assert!(!scheduler.is_running());
    assert!(scheduler.start().unwrap());
    assert!(scheduler.is_running());
    assert!(!scheduler.start().unwrap());

    scheduler.stop().await;
    assert!(!scheduler.is_running());

    // Stopping twice is harmless, and the scheduler can be restarted
    scheduler.stop().await;
    assert!(scheduler.start().unwrap());
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_timer_drives_ticks() {
    let store = MemoryDeliveryLogStore::new();
    let executor = Arc::new(ScriptedExecutor::new());
    let scheduler = build(&store, executor.clone());

    let id = store.insert(failed("a@example.com", BounceType::Temporary, 1, 5, at(9, 0)));

    scheduler.start().unwrap();

    // No tick fires immediately on start
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(executor.calls(), 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(executor.calls(), 1);
    assert_eq!(store.get(&id).unwrap().status, DeliveryStatus::Sent);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_in_flight_tick() {
    let store = MemoryDeliveryLogStore::new();
    let executor = Arc::new(GatedExecutor::new());
    let scheduler = Arc::new(build(&store, executor.clone()));

    let id = store.insert(failed("a@example.com", BounceType::Temporary, 1, 5, at(9, 0)));

    scheduler.start().unwrap();
    executor.entered.notified().await;

    let stopping = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.stop().await })
    };

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!stopping.is_finished());
    assert_eq!(store.get(&id).unwrap().status, DeliveryStatus::Failed);

    executor.release.notify_one();
    stopping.await.unwrap();

    assert_eq!(store.get(&id).unwrap().status, DeliveryStatus::Sent);
    assert!(!scheduler.is_running());
    assert_eq!(executor.calls(), 1);
}

#[test]
fn test_start_outside_runtime_fails() {
    let store = MemoryDeliveryLogStore::new();
    let scheduler = build(&store, Arc::new(ScriptedExecutor::new()));

    let err = scheduler.start().unwrap_err();
    assert!(matches!(err, SchedulerError::Runtime(_)));
    assert!(!scheduler.is_running());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = RetrySchedulerConfig {
        max_concurrent_retries: 0,
        ..config()
    };

    let err = RetryScheduler::new(
        config,
        Arc::new(MemoryDeliveryLogStore::new()),
        Arc::new(ScriptedExecutor::new()),
    )
    .unwrap_err();

    assert!(matches!(err, SchedulerError::Configuration(_)));
}
