//! Metric sources for the oxtel agent.
//!
//! Each [`Collector`] reads one category of metrics (the poll counter, the
//! agent's own process, host memory, host CPU) and returns them as
//! [`MetricRecord`]s. [`SampleSource`] groups collectors by kind and is what
//! the scheduler calls on every poll tick.

pub mod cpu;
pub mod memory;
pub mod poll;
pub mod process;

use anyhow::Result;
use oxtel_common::types::{MetricRecord, MetricValue, Snapshot};

use crate::cpu::CpuCollector;
use crate::memory::MemoryCollector;
use crate::poll::PollCounter;
use crate::process::ProcessCollector;

/// A metric reader that runs on the agent host.
///
/// Implementations are called synchronously from the scheduler's poll tick
/// and must not block. The trait requires `Send` so the owning scheduler can
/// live on any runtime worker.
pub trait Collector: Send {
    /// Returns the collector name (e.g., `"cpu"`, `"memory"`), used for logging.
    fn name(&self) -> &str;

    /// Reads current metric values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying statistics are unavailable.
    fn collect(&mut self) -> Result<Vec<MetricRecord>>;
}

/// The agent's view of every metric producer, split into counter and gauge
/// collectors.
///
/// A failing collector is logged and left out of the snapshot; it never
/// aborts the tick.
pub struct SampleSource {
    counters: Vec<Box<dyn Collector>>,
    gauges: Vec<Box<dyn Collector>>,
}

impl SampleSource {
    pub fn new(counters: Vec<Box<dyn Collector>>, gauges: Vec<Box<dyn Collector>>) -> Self {
        Self { counters, gauges }
    }

    /// Poll counter, process gauges, host memory and host CPU.
    pub fn with_default_collectors() -> Self {
        Self::new(
            vec![Box::new(PollCounter::new())],
            vec![
                Box::new(ProcessCollector::new()),
                Box::new(MemoryCollector::new()),
                Box::new(CpuCollector::new()),
            ],
        )
    }

    pub fn collect_counters(&mut self) -> Vec<MetricRecord> {
        collect_all(&mut self.counters)
    }

    pub fn collect_gauges(&mut self) -> Vec<MetricRecord> {
        collect_all(&mut self.gauges)
    }

    /// Counters followed by gauges, as read by one poll tick.
    pub fn snapshot(&mut self) -> Snapshot {
        let mut records = self.collect_counters();
        records.extend(self.collect_gauges());
        records
    }
}

fn collect_all(collectors: &mut [Box<dyn Collector>]) -> Vec<MetricRecord> {
    let mut records = Vec::new();
    for collector in collectors.iter_mut() {
        match collector.collect() {
            Ok(points) => {
                // JSON has no NaN or infinity; one such gauge would get the
                // whole batch rejected.
                records.extend(points.into_iter().filter(|record| match record.value {
                    MetricValue::Gauge(v) if !v.is_finite() => {
                        tracing::warn!(
                            collector = collector.name(),
                            metric = %record.name,
                            value = v,
                            "Non-finite gauge, omitting"
                        );
                        false
                    }
                    _ => true,
                }));
            }
            Err(e) => {
                tracing::warn!(collector = collector.name(), error = %e, "Collection failed, omitting")
            }
        }
    }
    records
}
