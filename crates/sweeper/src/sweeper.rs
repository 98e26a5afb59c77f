//! The expiration sweeper task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use domain::OrderService;
use order_store::{Catalog, OrderStore};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SweepError};

/// Counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Overdue pending orders found by the query.
    pub matched: usize,
    /// Orders cancelled with their stock restored.
    pub cancelled: usize,
    /// Orders that were no longer overdue when locked, e.g. paid meanwhile.
    pub skipped: usize,
    /// Orders whose cancellation failed; they stay pending for the next sweep.
    pub failed: usize,
}

/// Periodically cancels pending orders whose payment window lapsed.
pub struct ExpirationSweeper<S, C> {
    service: Arc<OrderService<S, C>>,
    interval: Duration,
}

impl<S, C> Clone for ExpirationSweeper<S, C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            interval: self.interval,
        }
    }
}

impl<S, C> ExpirationSweeper<S, C>
where
    S: OrderStore + 'static,
    C: Catalog + 'static,
{
    /// Default time between sweeps.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15 * 60);

    /// Creates a sweeper with the default interval.
    pub fn new(service: Arc<OrderService<S, C>>) -> Self {
        Self {
            service,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    /// Sets the time between sweeps.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs one sweep for the current time.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Runs one sweep as of `now`.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let started = Instant::now();

        let expired = self
            .service
            .expired_pending_orders(now)
            .await
            .map_err(SweepError::Query)?;

        let mut report = SweepReport {
            matched: expired.len(),
            ..Default::default()
        };

        for order in &expired {
            let order_id = order.id();
            match self.service.cancel_expired_order(order_id, now).await {
                Ok(true) => {
                    report.cancelled += 1;
                    metrics::counter!("orders_expired_total").increment(1);
                    tracing::info!(%order_id, user_id = %order.user_id(), "expired order cancelled");
                }
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    metrics::counter!("order_sweep_failures_total").increment(1);
                    tracing::warn!(%order_id, error = %err, "failed to cancel expired order");
                }
            }
        }

        metrics::histogram!("order_sweep_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        if report.matched > 0 {
            tracing::info!(
                matched = report.matched,
                cancelled = report.cancelled,
                skipped = report.skipped,
                failed = report.failed,
                "sweep complete"
            );
        }

        Ok(report)
    }

    /// Sweeps on every tick until `shutdown` is cancelled.
    ///
    /// The first sweep runs immediately, which picks up orders that expired
    /// while the process was down.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "expiration sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        tracing::error!(error = %err, "sweep failed");
                    }
                }
            }
        }

        tracing::info!("expiration sweeper stopped");
    }

    /// Starts the sweep loop on the tokio runtime.
    ///
    /// The loop stops when `shutdown` or the returned handle is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> SweeperHandle {
        let token = shutdown.child_token();
        let task = tokio::spawn(self.run(token.clone()));
        SweeperHandle { token, task }
    }
}

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the loop and waits for the in-flight sweep to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.task.await {
            tracing::error!(error = %err, "sweeper task panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
