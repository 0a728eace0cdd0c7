pub mod cpu;
pub mod memory;
pub mod poll_count;
pub mod random_value;
pub mod runtime;

use anyhow::Result;
use trackmon_common::{Metric, MetricKind};

/// A polymorphic metric source registered with the agent store.
///
/// `scrape` may block (OS calls) and may fail; the store invokes it from a
/// dedicated thread per collector. `metric` must be a cheap, side-effect
/// free snapshot of the last scraped value.
pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;
    fn desc(&self) -> &'static str;
    fn kind(&self) -> MetricKind;
    /// Bare value rendering used by the URL-style report form.
    fn value_string(&self) -> String;
    fn scrape(&mut self) -> Result<()>;
    fn metric(&self) -> Metric;
}
