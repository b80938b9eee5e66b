//! Periodic delivery loop.
//!
//! The scheduler ticks at a fixed interval and runs one collect-and-deliver
//! cycle per tick, never two at once. Each cycle gets a time budget; a cycle
//! that overruns is abandoned and its reading is lost, while anything it had
//! already committed to the outbox stays there.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::coordinator::{DeliveryCoordinator, DeliveryReport};
use super::source::ReadingSource;

/// Spawns the delivery loop.
pub struct DeliveryScheduler;

impl DeliveryScheduler {
    /// Start ticking on the current tokio runtime.
    ///
    /// The first tick fires immediately.
    pub fn spawn(
        coordinator: Arc<DeliveryCoordinator>,
        source: Arc<dyn ReadingSource>,
        interval: Duration,
        cycle_budget: Duration,
    ) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        coordinator.set_running(true);

        let task = tokio::spawn(run_loop(
            coordinator.clone(),
            source,
            interval,
            cycle_budget,
            shutdown_rx,
        ));

        SchedulerHandle {
            shutdown_tx,
            task,
            coordinator,
        }
    }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    coordinator: Arc<DeliveryCoordinator>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for it to exit.
    ///
    /// A cycle in progress is allowed to finish within its budget.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Delivery scheduler task failed");
        }
        self.coordinator.set_running(false);
        info!("Delivery scheduler stopped");
    }
}

async fn run_loop(
    coordinator: Arc<DeliveryCoordinator>,
    source: Arc<dyn ReadingSource>,
    interval: Duration,
    cycle_budget: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(?interval, ?cycle_budget, "Starting delivery loop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = shutdown.changed() => break,
        }

        let Some(reading) = source.current_reading().await else {
            debug!("No reading available this tick");
            continue;
        };

        match tokio::time::timeout(cycle_budget, coordinator.collect_and_deliver(reading)).await {
            Ok(DeliveryReport::Delivered { flushed, remaining }) => {
                debug!(flushed, remaining, "Cycle complete");
            },
            Ok(report) => debug!(?report, "Cycle complete"),
            Err(_) => warn!(?cycle_budget, "Delivery cycle exceeded its time budget"),
        }

        if *shutdown.borrow() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::outbox::Outbox;
    use crate::client::transmitter::Transmitter;
    use crate::error::TransmitError;
    use crate::reading::Reading;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingTransmitter {
        sends: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Transmitter for CountingTransmitter {
        async fn send(&self, _blob: &[u8]) -> Result<(), TransmitError> {
            tokio::time::sleep(self.delay).await;
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FixedSource;

    #[async_trait]
    impl ReadingSource for FixedSource {
        async fn current_reading(&self) -> Option<Reading> {
            Some(Reading::now().with_motion("stationary", "high"))
        }
    }

    fn coordinator(tx: Arc<CountingTransmitter>) -> (Arc<DeliveryCoordinator>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let outbox = Outbox::open(tmp.path().join("outbox.redb")).unwrap();
        (Arc::new(DeliveryCoordinator::new(&[1u8; 32], outbox, tx)), tmp)
    }

    #[tokio::test]
    async fn test_scheduler_runs_cycles_and_stops() {
        let tx = Arc::new(CountingTransmitter::default());
        let (coordinator, _tmp) = coordinator(tx.clone());

        let handle = DeliveryScheduler::spawn(
            coordinator.clone(),
            Arc::new(FixedSource),
            Duration::from_millis(20),
            Duration::from_secs(1),
        );
        assert!(coordinator.status().running);

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.shutdown().await;

        assert!(tx.sends.load(Ordering::SeqCst) >= 2);
        assert!(!coordinator.status().running);
        assert!(coordinator.status().last_success.is_some());
    }

    #[tokio::test]
    async fn test_cycle_budget_abandons_slow_cycle() {
        let tx = Arc::new(CountingTransmitter {
            sends: AtomicUsize::new(0),
            delay: Duration::from_millis(500),
        });
        let (coordinator, _tmp) = coordinator(tx.clone());

        let handle = DeliveryScheduler::spawn(
            coordinator.clone(),
            Arc::new(FixedSource),
            Duration::from_secs(60),
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown().await;

        assert_eq!(tx.sends.load(Ordering::SeqCst), 0);
        assert!(coordinator.status().last_success.is_none());
    }
}
