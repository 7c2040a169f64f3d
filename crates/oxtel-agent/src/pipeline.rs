//! Channel stages between a poll tick and the delivery workers.
//!
//! Each stage runs in its own task, owns the sending half of its output
//! channel, and exits when its input is exhausted or the cancellation token
//! fires. Dropping the sender is what closes the stream for the next stage.

use oxtel_common::types::{Batch, MetricRecord, Snapshot};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of every inter-stage channel.
pub const STAGE_BUFFER: usize = 16;

/// Streams a snapshot's records in order. The stream ends early, without
/// error, if `cancel` fires.
pub fn generate(records: Snapshot, cancel: CancellationToken) -> mpsc::Receiver<MetricRecord> {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        for record in records {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = tx.send(record) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    });
    rx
}

/// Merges `inputs` into one stream. Every record is forwarded exactly once;
/// order across inputs is not preserved. The output closes once every input
/// has closed (or on cancellation), since each forwarder holds a clone of
/// the single sender.
pub fn fan_in(
    inputs: Vec<mpsc::Receiver<MetricRecord>>,
    cancel: CancellationToken,
) -> mpsc::Receiver<MetricRecord> {
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    for mut input in inputs {
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let record = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    next = input.recv() => match next {
                        Some(record) => record,
                        None => return,
                    },
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    sent = tx.send(record) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }
    rx
}

/// Groups the stream into batches of `size` (0 is treated as 1). A non-empty
/// remainder is emitted once the input closes; nothing is emitted after
/// cancellation.
pub fn batched(
    mut input: mpsc::Receiver<MetricRecord>,
    size: usize,
    cancel: CancellationToken,
) -> mpsc::Receiver<Batch> {
    let size = size.max(1);
    let (tx, rx) = mpsc::channel(STAGE_BUFFER);
    tokio::spawn(async move {
        let mut batch = Vec::with_capacity(size);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = input.recv() => next,
            };

            let ready = match next {
                Some(record) => {
                    batch.push(record);
                    if batch.len() < size {
                        continue;
                    }
                    std::mem::replace(&mut batch, Vec::with_capacity(size))
                }
                None if batch.is_empty() => return,
                None => std::mem::take(&mut batch),
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = tx.send(ready) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    });
    rx
}
