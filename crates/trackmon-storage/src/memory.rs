use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use trackmon_common::{Metric, MetricKind};

use crate::{validate_update, Repository, Result};

/// In-memory repository with an optional file snapshot.
///
/// The whole `target → metrics` map lives behind one reader-writer lock.
/// When a store file is configured the map is dumped to it as indented
/// JSON — on an interval ticker, and once more by the server on shutdown.
pub struct MemStorage {
    metrics: RwLock<HashMap<String, Vec<Metric>>>,
    store_file: Option<PathBuf>,
}

impl MemStorage {
    /// Opens the store. With `restore` set and an existing snapshot file
    /// the full map is loaded back; a corrupt snapshot is fatal. A
    /// positive `store_interval` starts a flush ticker on the current
    /// runtime.
    pub fn open(
        restore: bool,
        store_interval: Option<Duration>,
        store_file: Option<PathBuf>,
    ) -> Result<Arc<Self>> {
        let mut metrics = HashMap::new();
        if restore {
            if let Some(path) = store_file.as_ref() {
                if path.exists() {
                    let data = std::fs::read(path)?;
                    metrics = serde_json::from_slice(&data)?;
                }
            }
        }
        let storage = Arc::new(Self {
            metrics: RwLock::new(metrics),
            store_file,
        });
        if let Some(interval) = store_interval.filter(|d| !d.is_zero()) {
            let weak: Weak<MemStorage> = Arc::downgrade(&storage);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval);
                tick.tick().await; // first tick fires immediately
                loop {
                    tick.tick().await;
                    let Some(storage) = weak.upgrade() else {
                        return;
                    };
                    if let Err(err) = storage.save() {
                        tracing::error!(error = %err, "periodic snapshot failed");
                        return;
                    }
                }
            });
        }
        Ok(storage)
    }

    /// Dumps the whole map as indented JSON, atomically replacing the
    /// snapshot file. Without a store file the payload is only logged.
    pub fn save(&self) -> Result<()> {
        let snapshot = self.metrics.read().unwrap().clone();
        let data = serde_json::to_vec_pretty(&snapshot)?;
        match &self.store_file {
            None => {
                tracing::info!(
                    payload = %String::from_utf8_lossy(&data),
                    "snapshot emulation, no store file configured"
                );
            }
            Some(path) => {
                let tmp = path.with_extension("json.tmp");
                std::fs::write(&tmp, &data)?;
                std::fs::rename(&tmp, path)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemStorage {
    async fn get_metric(
        &self,
        target: &str,
        kind: MetricKind,
        id: &str,
    ) -> Result<Option<Metric>> {
        let guard = self.metrics.read().unwrap();
        Ok(guard
            .get(target)
            .and_then(|mm| mm.iter().find(|m| m.kind == kind && m.id == id))
            .cloned())
    }

    async fn update_metric(&self, target: &str, metrics: Vec<Metric>) -> Result<()> {
        let mut guard = self.metrics.write().unwrap();
        for m in metrics {
            validate_update(target, &m)?;
            let entry = guard.entry(target.to_string()).or_default();
            match entry
                .iter_mut()
                .find(|e| e.kind == m.kind && e.id == m.id)
            {
                Some(existing) => {
                    match m.kind {
                        MetricKind::Counter => {
                            let sum = existing.delta.unwrap_or(0) + m.delta.unwrap_or(0);
                            existing.delta = Some(sum);
                        }
                        MetricKind::Gauge => existing.value = m.value,
                    }
                    existing.hash = m.hash;
                }
                None => entry.push(m),
            }
        }
        Ok(())
    }

    async fn metrics(&self, target: &str) -> Result<HashMap<String, Vec<Metric>>> {
        let guard = self.metrics.read().unwrap();
        if target.is_empty() {
            return Ok(guard.clone());
        }
        Ok(guard
            .get(target)
            .map(|mm| HashMap::from([(target.to_string(), mm.clone())]))
            .unwrap_or_default())
    }

    async fn list(&self) -> Result<HashMap<String, Vec<String>>> {
        let guard = self.metrics.read().unwrap();
        let mut res = HashMap::with_capacity(guard.len());
        for (target, mm) in guard.iter() {
            let mut lines: Vec<String> = mm.iter().map(Metric::string_full).collect();
            lines.sort_unstable();
            res.insert(target.clone(), lines);
        }
        Ok(res)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

