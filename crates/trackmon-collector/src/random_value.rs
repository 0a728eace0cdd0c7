use crate::Collector;
use anyhow::Result;
use rand::Rng;
use trackmon_common::{Metric, MetricKind};

/// Gauge replaced with a fresh pseudo-random double on every scrape.
#[derive(Default)]
pub struct RandomValue {
    value: f64,
}

impl RandomValue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Collector for RandomValue {
    fn name(&self) -> &'static str {
        "RandomValue"
    }

    fn desc(&self) -> &'static str {
        "freshly generated random value"
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    fn value_string(&self) -> String {
        format!("{:.6}", self.value)
    }

    fn scrape(&mut self) -> Result<()> {
        self.value = rand::thread_rng().gen();
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
    fn scrape_replaces_value() {
        let mut c = RandomValue::new();
        c.scrape().unwrap();
        let v = c.metric().value.unwrap();
        assert!((0.0..1.0).contains(&v));
    }
}
