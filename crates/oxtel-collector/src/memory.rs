use crate::Collector;
use anyhow::{bail, Result};
use oxtel_common::types::MetricRecord;
use sysinfo::System;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self) -> Result<Vec<MetricRecord>> {
        self.system.refresh_memory();

        let total = self.system.total_memory();
        if total == 0 {
            bail!("host memory statistics unavailable");
        }

        Ok(vec![
            MetricRecord::gauge("TotalMemory", total as f64),
            MetricRecord::gauge("FreeMemory", self.system.free_memory() as f64),
        ])
    }
}
