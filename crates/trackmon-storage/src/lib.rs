//! Storage layer for ingested metrics.
//!
//! Two [`Repository`] implementations share one contract: an in-memory map
//! with periodic JSON snapshots to disk ([`memory::MemStorage`]) and a
//! relational store with bootstrapped schema migration
//! ([`database::DbStorage`]). Records are keyed by the reporting target
//! (the peer address observed by the server); within a target the
//! `(kind, id)` pair is unique, counters accumulate and gauges replace.

pub mod database;
mod entities;
pub mod error;
pub mod memory;

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use async_trait::async_trait;
use trackmon_common::{Metric, MetricKind};

pub use database::DbStorage;
pub use error::{Result, StorageError};
pub use memory::MemStorage;

/// Uniform persistence contract shared by the HTTP and gRPC ingestion
/// surfaces.
///
/// Implementations must be safe to share across tasks (`Send + Sync`)
/// because both transports hit the repository concurrently.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Reads one metric of `target`. The in-memory store reports absence
    /// as `Ok(None)`; the relational store reports it as
    /// [`StorageError::NoRows`].
    async fn get_metric(
        &self,
        target: &str,
        kind: MetricKind,
        id: &str,
    ) -> Result<Option<Metric>>;

    /// Validates and applies a batch of updates for `target`: counters
    /// accumulate onto an existing entry, gauges replace it, unseen
    /// `(kind, id)` pairs are appended.
    async fn update_metric(&self, target: &str, metrics: Vec<Metric>) -> Result<()>;

    /// Returns the stored records grouped by target; an empty `target`
    /// selects every target.
    async fn metrics(&self, target: &str) -> Result<HashMap<String, Vec<Metric>>>;

    /// Returns the listing view: per target, the sorted `string_full`
    /// renderings of its metrics.
    async fn list(&self) -> Result<HashMap<String, Vec<String>>>;

    /// Liveness check, bounded by a three second deadline.
    async fn ping(&self) -> Result<()>;
}

/// Shared update validation: non-empty target and id, the numeric field
/// matching the kind populated.
pub(crate) fn validate_update(target: &str, m: &Metric) -> Result<()> {
    if target.is_empty() {
        return Err(StorageError::WrongTarget);
    }
    if m.id.is_empty() {
        return Err(StorageError::WrongMetricId);
    }
    let has_value = match m.kind {
        MetricKind::Counter => m.delta.is_some(),
        MetricKind::Gauge => m.value.is_some(),
    };
    if !has_value {
        return Err(StorageError::WrongMetricValue);
    }
    Ok(())
}
