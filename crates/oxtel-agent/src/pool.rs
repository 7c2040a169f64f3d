use oxtel_common::types::{Batch, DeliveryOutcome};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::delivery::Delivery;
use crate::transport::Transport;

/// Fixed set of delivery workers sharing one batch channel.
///
/// Clones share one set of delivery permits, so overlapping drains (report
/// cycles whose deliveries outlive the report interval) together never have
/// more than `workers` batches in flight.
pub struct WorkerPool<T> {
    workers: usize,
    delivery: Arc<Delivery<T>>,
    permits: Arc<Semaphore>,
}

impl<T> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        Self {
            workers: self.workers,
            delivery: Arc::clone(&self.delivery),
            permits: Arc::clone(&self.permits),
        }
    }
}

impl<T: Transport + 'static> WorkerPool<T> {
    /// `workers` of 0 is treated as 1.
    pub fn new(workers: usize, delivery: Arc<Delivery<T>>) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            delivery,
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Delivers every batch from `batches` and returns once all workers have
    /// exited. A batch that fails is logged and dropped.
    pub async fn drain(
        &self,
        batches: mpsc::Receiver<Batch>,
        cancel: &CancellationToken,
    ) -> Vec<DeliveryOutcome> {
        let batches = Arc::new(Mutex::new(batches));
        let mut workers = JoinSet::new();

        for worker_id in 0..self.workers {
            let batches = Arc::clone(&batches);
            let delivery = Arc::clone(&self.delivery);
            let permits = Arc::clone(&self.permits);
            let cancel = cancel.clone();
            workers.spawn(async move {
                run_worker(worker_id, batches, delivery, permits, cancel).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_outcomes) => outcomes.extend(worker_outcomes),
                Err(e) => tracing::error!(error = %e, "Delivery worker panicked"),
            }
        }
        outcomes
    }
}

async fn run_worker<T: Transport>(
    worker_id: usize,
    batches: Arc<Mutex<mpsc::Receiver<Batch>>>,
    delivery: Arc<Delivery<T>>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
) -> Vec<DeliveryOutcome> {
    let mut outcomes = Vec::new();
    loop {
        // Hold the lock only while waiting for the next batch.
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = async { batches.lock().await.recv().await } => next,
        };
        let Some(batch) = next else {
            break;
        };

        // Held for the whole delivery, retries included.
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let outcome = match delivery.deliver(&batch, &cancel).await {
            Ok(attempts) => {
                tracing::debug!(worker = worker_id, size = batch.len(), attempts, "Batch delivered");
                DeliveryOutcome {
                    worker_id,
                    batch_len: batch.len(),
                    attempts,
                    error: None,
                }
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(worker = worker_id, size = batch.len(), "Delivery cancelled, dropping batch");
                break;
            }
            Err(e) => {
                tracing::error!(
                    worker = worker_id,
                    size = batch.len(),
                    attempts = e.attempts(),
                    error = %e,
                    "Batch delivery failed, dropping batch"
                );
                DeliveryOutcome {
                    worker_id,
                    batch_len: batch.len(),
                    attempts: e.attempts(),
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Envelope, EnvelopeBuilder};
    use crate::error::SendError;
    use async_trait::async_trait;
    use oxtel_common::types::MetricRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        posts: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Gauge {
        async fn post(&self, _envelope: &Envelope) -> Result<(), SendError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.posts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysDown;

    #[async_trait]
    impl Transport for AlwaysDown {
        async fn post(&self, _envelope: &Envelope) -> Result<(), SendError> {
            Err(SendError::Status {
                status: 500,
                body: "down".to_string(),
            })
        }
    }

    fn pool<T: Transport + 'static>(workers: usize, transport: T) -> WorkerPool<T> {
        let delivery = Delivery::new(
            transport,
            EnvelopeBuilder::new(None),
            Delivery::<T>::network_backoff(0),
        );
        WorkerPool::new(workers, Arc::new(delivery))
    }

    async fn feed(batches: Vec<Batch>) -> mpsc::Receiver<Batch> {
        let (tx, rx) = mpsc::channel(batches.len().max(1));
        for batch in batches {
            tx.send(batch).await.unwrap();
        }
        rx
    }

    fn batch(n: usize) -> Batch {
        (0..n).map(|i| MetricRecord::gauge(format!("g{i}"), i as f64)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_never_exceeds_worker_count() {
        let pool = pool(3, Gauge::default());
        let rx = feed((0..12).map(|_| batch(2)).collect()).await;

        let outcomes = pool.drain(rx, &CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 12);
        assert!(outcomes.iter().all(DeliveryOutcome::is_success));
        let transport = pool.delivery.transport();
        assert_eq!(transport.posts.load(Ordering::SeqCst), 12);
        assert!(transport.peak.load(Ordering::SeqCst) <= 3);
        assert!(transport.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_drains_share_the_worker_limit() {
        let pool = pool(2, Gauge::default());
        let first = feed((0..6).map(|_| batch(1)).collect()).await;
        let second = feed((0..6).map(|_| batch(1)).collect()).await;
        let cancel = CancellationToken::new();
        let other = pool.clone();

        let (a, b) = tokio::join!(pool.drain(first, &cancel), other.drain(second, &cancel));

        assert_eq!(a.len() + b.len(), 12);
        let transport = pool.delivery.transport();
        assert_eq!(transport.posts.load(Ordering::SeqCst), 12);
        assert!(transport.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn zero_workers_normalized_to_one() {
        let pool = pool(0, Gauge::default());
        assert_eq!(pool.workers(), 1);
        let rx = feed(vec![batch(1), batch(1)]).await;

        let outcomes = pool.drain(rx, &CancellationToken::new()).await;
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn failed_batches_are_reported_and_dropped() {
        let pool = pool(2, AlwaysDown);
        let rx = feed(vec![batch(3), batch(1)]).await;

        let outcomes = pool.drain(rx, &CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.is_success()));
        assert!(outcomes.iter().all(|o| o.attempts == 1));
        let mut sizes: Vec<_> = outcomes.iter().map(|o| o.batch_len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 3]);
    }

    #[tokio::test]
    async fn drain_returns_after_cancel() {
        let pool = pool(2, Gauge::default());
        let (_tx, rx) = mpsc::channel::<Batch>(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = tokio::time::timeout(Duration::from_secs(1), pool.drain(rx, &cancel))
            .await
            .expect("workers did not exit on cancel");
        assert!(outcomes.is_empty());
    }
}
