use oxtel_collector::SampleSource;
use oxtel_common::types::{DeliveryOutcome, MetricRecord};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::pipeline::{batched, fan_in, generate};
use crate::pool::WorkerPool;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub batch_size: usize,
}

/// Totals for one report cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub batches: usize,
    pub delivered: usize,
    pub failed: usize,
    pub records: usize,
}

impl FlushSummary {
    pub fn from_outcomes(outcomes: &[DeliveryOutcome]) -> Self {
        let mut summary = Self {
            batches: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            summary.records += outcome.batch_len;
            if outcome.is_success() {
                summary.delivered += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }
}

/// Drives collection and delivery from two independent timers.
///
/// Every poll tick turns a fresh snapshot into an open generator. Every
/// report tick hands all open generators to a background flush (fan-in,
/// batcher, worker pool), so a slow delivery never delays the next poll.
/// The sample source, and with it the poll counter, is only ever touched
/// from the scheduler's own task.
pub struct Scheduler<T> {
    source: SampleSource,
    pool: WorkerPool<T>,
    settings: SchedulerSettings,
    pending: Vec<mpsc::Receiver<MetricRecord>>,
}

impl<T: Transport + 'static> Scheduler<T> {
    pub fn new(source: SampleSource, pool: WorkerPool<T>, settings: SchedulerSettings) -> Self {
        Self {
            source,
            pool,
            settings,
            pending: Vec::new(),
        }
    }

    /// Number of snapshots waiting for the next report tick.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Collects one snapshot and queues it as an open generator.
    pub fn poll(&mut self, cancel: &CancellationToken) {
        let snapshot = self.source.snapshot();
        tracing::debug!(count = snapshot.len(), pending = self.pending.len() + 1, "Collected metrics");
        self.pending.push(generate(snapshot, cancel.clone()));
    }

    /// Takes every open generator and returns the flush that delivers them.
    /// The returned future owns everything it needs and can be spawned.
    pub fn start_flush(
        &mut self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = FlushSummary> + Send + 'static {
        let generators = std::mem::take(&mut self.pending);
        let pool = self.pool.clone();
        let batch_size = self.settings.batch_size;
        let cancel = cancel.clone();
        async move { flush(generators, batch_size, &pool, &cancel).await }
    }

    /// Runs until `cancel` fires, then waits for in-flight flushes to unwind.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            poll_interval = ?self.settings.poll_interval,
            report_interval = ?self.settings.report_interval,
            batch_size = self.settings.batch_size,
            workers = self.pool.workers(),
            "Scheduler started"
        );

        let start = Instant::now();
        let mut poll_tick = interval_at(start + self.settings.poll_interval, self.settings.poll_interval);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut report_tick =
            interval_at(start + self.settings.report_interval, self.settings.report_interval);
        report_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut flushes = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = poll_tick.tick() => self.poll(&cancel),
                _ = report_tick.tick() => {
                    if self.pending.is_empty() {
                        tracing::debug!("Nothing collected since last report");
                        continue;
                    }
                    tracing::info!(snapshots = self.pending.len(), "Reporting metrics");
                    flushes.spawn(self.start_flush(&cancel));
                }
                Some(joined) = flushes.join_next(), if !flushes.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Report cycle panicked");
                    }
                }
            }
        }

        tracing::info!(in_flight = flushes.len(), "Shutting down scheduler");
        while let Some(joined) = flushes.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Report cycle panicked");
            }
        }
        tracing::info!(discarded = self.pending.len(), "Scheduler stopped");
    }
}

/// One report cycle: merge `generators`, batch, and deliver through `pool`.
/// Returns after every worker has exited.
pub async fn flush<T: Transport + 'static>(
    generators: Vec<mpsc::Receiver<MetricRecord>>,
    batch_size: usize,
    pool: &WorkerPool<T>,
    cancel: &CancellationToken,
) -> FlushSummary {
    let merged = fan_in(generators, cancel.clone());
    let batches = batched(merged, batch_size, cancel.clone());
    let outcomes = pool.drain(batches, cancel).await;

    let summary = FlushSummary::from_outcomes(&outcomes);
    if summary.failed > 0 {
        tracing::warn!(
            batches = summary.batches,
            delivered = summary.delivered,
            failed = summary.failed,
            records = summary.records,
            "Report cycle finished with failures"
        );
    } else {
        tracing::info!(
            batches = summary.batches,
            records = summary.records,
            "Report cycle finished"
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_outcomes() {
        let outcomes = vec![
            DeliveryOutcome {
                worker_id: 0,
                batch_len: 5,
                attempts: 1,
                error: None,
            },
            DeliveryOutcome {
                worker_id: 1,
                batch_len: 2,
                attempts: 4,
                error: Some("max attempts reached".to_string()),
            },
        ];

        let summary = FlushSummary::from_outcomes(&outcomes);
        assert_eq!(
            summary,
            FlushSummary {
                batches: 2,
                delivered: 1,
                failed: 1,
                records: 7,
            }
        );
    }

    #[test]
    fn empty_cycle_summary_is_zero() {
        assert_eq!(FlushSummary::from_outcomes(&[]), FlushSummary::default());
    }
}
