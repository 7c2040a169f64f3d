use crate::Collector;
use anyhow::{anyhow, Result};
use oxtel_common::types::MetricRecord;
use rand::Rng;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Gauges describing the agent's own process, plus `RandomValue`.
pub struct ProcessCollector {
    system: System,
    pid: Option<Pid>,
}

impl ProcessCollector {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = e, "Cannot resolve agent pid, process gauges disabled");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn collect(&mut self) -> Result<Vec<MetricRecord>> {
        let pid = self.pid.ok_or_else(|| anyhow!("agent pid unknown"))?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow!("process {pid} not found"))?;

        Ok(vec![
            MetricRecord::gauge("ProcessResidentMemory", process.memory() as f64),
            MetricRecord::gauge("ProcessVirtualMemory", process.virtual_memory() as f64),
            MetricRecord::gauge("ProcessCPUUsage", process.cpu_usage() as f64),
            MetricRecord::gauge("RandomValue", rand::thread_rng().gen::<f64>()),
        ])
    }
}
