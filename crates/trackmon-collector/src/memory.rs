use crate::Collector;
use anyhow::Result;
use sysinfo::System;
use trackmon_common::{Metric, MetricKind};

/// Gauge tracking the total amount of RAM on the host.
pub struct TotalMemory {
    system: System,
    value: f64,
}

impl TotalMemory {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            value: 0.0,
        }
    }
}

impl Collector for TotalMemory {
    fn name(&self) -> &'static str {
        "TotalMemory"
    }

    fn desc(&self) -> &'static str {
        "total amount of RAM on this system"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    fn value_string(&self) -> String {
        format!("{:.6}", self.value)
    }

    fn scrape(&mut self) -> Result<()> {
        self.system.refresh_memory();
        self.value = self.system.total_memory() as f64;
        Ok(())
    }

    fn metric(&self) -> Metric {
        Metric::gauge(self.name(), self.value)
    }
}

/// Gauge tracking the amount of free RAM on the host.
pub struct FreeMemory {
    system: System,
    value: f64,
}

impl FreeMemory {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            value: 0.0,
        }
    }
}

impl Collector for FreeMemory {
    fn name(&self) -> &'static str {
        "FreeMemory"
    }

    fn desc(&self) -> &'static str {
        "amount of free RAM on this system"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    fn value_string(&self) -> String {
        format!("{:.6}", self.value)
    }

    fn scrape(&mut self) -> Result<()> {
        self.system.refresh_memory();
        self.value = self.system.free_memory() as f64;
        Ok(())
    }

    fn metric(&self) -> Metric {
        Metric::gauge(self.name(), self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_memory_scrapes_nonzero() {
        let mut c = TotalMemory::new();
        c.scrape().unwrap();
        assert!(c.metric().value.unwrap() > 0.0);
    }
}
