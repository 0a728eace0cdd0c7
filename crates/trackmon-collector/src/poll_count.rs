use crate::Collector;
use anyhow::Result;
use trackmon_common::{Metric, MetricKind};

/// Counter incremented by one on every scrape pass.
#[derive(Default)]
pub struct PollCount {
    count: i64,
}

impl PollCount {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Collector for PollCount {
    fn name(&self) -> &'static str {
        "PollCount"
    }

    fn desc(&self) -> &'static str {
        "counter incremented on every runtime metrics update"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Counter
    }

    fn value_string(&self) -> String {
        format!("{}", self.count)
    }

    fn scrape(&mut self) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn metric(&self) -> Metric {
        Metric::counter(self.name(), self.count)
    }
}
