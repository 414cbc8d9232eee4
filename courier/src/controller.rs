use std::sync::{Arc, LazyLock};

use courier_common::{Signal, internal, logging};
use courier_delivery::{
    DeliveryAttemptExecutor, DeliveryLogStore, RetryScheduler, RetrySchedulerConfig,
};
use serde::Deserialize;
use tokio::sync::broadcast;

/// Host-wide shutdown channel
///
/// Anything holding a sender can stop a running [`Courier`] by sending
/// [`Signal::Shutdown`].
pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Top-level host configuration, read from `courier.config.ron`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Courier {
    #[serde(alias = "retry_scheduler")]
    pub retry: RetrySchedulerConfig,
}

/// Wait for CTRL+C, SIGTERM or a terminal signal on `receiver`.
#[tracing::instrument(level = "trace", skip_all, err)]
async fn shutdown(mut receiver: broadcast::Receiver<Signal>) -> anyhow::Result<()> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    let terminated = terminate.recv();
    #[cfg(not(unix))]
    let terminated = std::future::pending::<Option<()>>();

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r?;
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminated => {
            internal!("Terminate Signal received, shutting down");
        }
        sig = wait_for_terminal(&mut receiver) => {
            internal!("Received {sig:?}, shutting down");
        }
    }

    Ok(())
}

async fn wait_for_terminal(receiver: &mut broadcast::Receiver<Signal>) -> Option<Signal> {
    loop {
        match receiver.recv().await {
            Ok(sig) if sig.is_terminal() => return Some(sig),
            Ok(sig) => tracing::debug!("Ignoring {sig:?}"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Shutdown channel lagged by {skipped}");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

impl Courier {
    /// Run the retry scheduler until the process is asked to stop.
    ///
    /// Stops on CTRL+C, SIGTERM, or a [`Signal::Shutdown`] sent through
    /// [`SHUTDOWN_BROADCAST`].
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or signal handlers cannot be
    /// installed
    pub async fn run(
        self,
        store: Arc<dyn DeliveryLogStore>,
        executor: Arc<dyn DeliveryAttemptExecutor>,
    ) -> anyhow::Result<()> {
        self.run_until(store, executor, SHUTDOWN_BROADCAST.subscribe())
            .await
    }

    /// Like [`run`](Self::run), listening on `receiver` instead of the
    /// global channel.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or signal handlers cannot be
    /// installed
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run_until(
        self,
        store: Arc<dyn DeliveryLogStore>,
        executor: Arc<dyn DeliveryAttemptExecutor>,
        receiver: broadcast::Receiver<Signal>,
    ) -> anyhow::Result<()> {
        logging::init();

        let scheduler = RetryScheduler::new(self.retry, store, executor)?;
        scheduler.start()?;

        internal!(level = INFO, "Courier running");

        let ret = shutdown(receiver).await;

        internal!(level = INFO, "Shutting down...");
        scheduler.stop().await;

        ret
    }
}
