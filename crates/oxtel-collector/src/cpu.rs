use crate::Collector;
use anyhow::{bail, Result};
use oxtel_common::types::MetricRecord;
use sysinfo::System;

/// Per-core utilization, reported as `CPUutilization1..N`.
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // Usage is computed between two refreshes, so prime the first one.
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<MetricRecord>> {
        self.system.refresh_cpu_all();

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            bail!("no cpu information available");
        }

        Ok(cpus
            .iter()
            .enumerate()
            .map(|(i, cpu)| {
                MetricRecord::gauge(format!("CPUutilization{}", i + 1), cpu.cpu_usage() as f64)
            })
            .collect())
    }
}
