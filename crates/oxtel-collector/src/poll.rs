use crate::Collector;
use anyhow::Result;
use oxtel_common::types::MetricRecord;

pub const POLL_COUNT: &str = "PollCount";

/// Counts polls since the agent started. The value is cumulative and never
/// resets between report cycles.
pub struct PollCounter {
    count: i64,
}

impl PollCounter {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    pub fn count(&self) -> i64 {
        self.count
    }
}

impl Default for PollCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for PollCounter {
    fn name(&self) -> &str {
        "poll"
    }

    fn collect(&mut self) -> Result<Vec<MetricRecord>> {
        self.count += 1;
        Ok(vec![MetricRecord::counter(POLL_COUNT, self.count)])
    }
}
