use std::time::Duration;

use crate::Collector;
use anyhow::Result;
use sysinfo::System;
use trackmon_common::{Metric, MetricKind};

/// Gauge tracking global CPU utilization, sampled over roughly one second.
pub struct CpuUtilization1 {
    system: System,
    value: f64,
}

impl CpuUtilization1 {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system, value: 0.0 }
    }
}

impl Collector for CpuUtilization1 {
    fn name(&self) -> &'static str {
        "CPUutilization1"
    }

    fn desc(&self) -> &'static str {
        "CPU utilization percent averaged over one second"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    fn value_string(&self) -> String {
        format!("{:.6}", self.value)
    }

    fn scrape(&mut self) -> Result<()> {
        // usage is a delta between two refreshes at least the minimum
        // interval apart
        self.system.refresh_cpu_all();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(Duration::from_secs(1)));
        self.system.refresh_cpu_all();
        self.value = self.system.global_cpu_usage() as f64;
        Ok(())
    }

    fn metric(&self) -> Metric {
        Metric::gauge(self.name(), self.value)
    }
}
