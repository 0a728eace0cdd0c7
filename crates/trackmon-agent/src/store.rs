use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use tokio::task::JoinSet;
use trackmon_collector::runtime::{RuntimeSampler, RuntimeStats, RUNTIME_GAUGES};
use trackmon_collector::Collector;
use trackmon_common::Metric;

use crate::client::{Client, Transport};

/// Agent-side registry of metric sources.
///
/// Holds the custom collectors plus the latest runtime snapshot behind one
/// reader-writer lock: `scrape` and `all_metrics` take the writer (the
/// latter refreshes signatures), the read-only views take the reader.
pub struct MetricStore {
    inner: RwLock<Inner>,
    key: Vec<u8>,
}

struct Inner {
    custom: HashMap<String, Box<dyn Collector>>,
    sampler: RuntimeSampler,
    runtime: RuntimeStats,
}

impl MetricStore {
    /// An empty `key` disables signing.
    pub fn new(key: &[u8]) -> Self {
        Self {
            inner: RwLock::new(Inner {
                custom: HashMap::new(),
                sampler: RuntimeSampler::new(),
                runtime: RuntimeStats::default(),
            }),
            key: key.to_vec(),
        }
    }

    /// Registers custom collectors by name; a duplicate name replaces the
    /// previous registration.
    pub fn add_custom(&self, collectors: Vec<Box<dyn Collector>>) {
        let mut inner = self.inner.write().unwrap();
        for c in collectors {
            tracing::info!(metric = c.name(), "collector registered");
            inner.custom.insert(c.name().to_string(), c);
        }
    }

    /// One sampling pass: refreshes the runtime snapshot, then fans out
    /// every custom collector's `scrape` on its own thread and returns the
    /// first error observed. The write lock is held across the whole pass.
    pub fn scrape(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let Inner {
            custom,
            sampler,
            runtime,
        } = &mut *inner;
        *runtime = sampler.sample();

        let results: Vec<Result<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = custom
                .values_mut()
                .map(|c| scope.spawn(move || c.scrape()))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("collector panicked")))
                })
                .collect()
        });
        for res in results {
            res?;
        }
        Ok(())
    }

    /// URL-style view used by the legacy text transport, sorted.
    pub fn all(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let mut res: Vec<String> = inner
            .custom
            .values()
            .map(|c| format!("/update/{}/{}/{}", c.kind(), c.name(), c.value_string()))
            .collect();
        for (name, sample) in RUNTIME_GAUGES {
            res.push(format!(
                "/update/gauge/{}/{}",
                name,
                sample.render(&inner.runtime)
            ));
        }
        res.sort_unstable();
        res
    }

    /// Record view, sorted by metric name: custom collectors' snapshots
    /// plus every runtime field projected into a gauge. With a signing key
    /// configured every record is signed; a signing failure fails the
    /// whole call.
    pub fn all_metrics(&self) -> Result<Vec<Metric>> {
        let inner = self.inner.write().unwrap();
        let mut names: Vec<&str> = inner
            .custom
            .keys()
            .map(String::as_str)
            .chain(RUNTIME_GAUGES.iter().map(|(name, _)| *name))
            .collect();
        names.sort_unstable();

        let mut res = Vec::with_capacity(names.len());
        for name in names {
            let mut m = match inner.custom.get(name) {
                Some(c) => c.metric(),
                None => {
                    let (_, sample) = RUNTIME_GAUGES
                        .iter()
                        .find(|(n, _)| *n == name)
                        .expect("name came from the gauge table");
                    Metric::gauge(name, sample.gauge_value(&inner.runtime))
                }
            };
            if !self.key.is_empty() {
                m.sign(&self.key)?;
            }
            res.push(m);
        }
        Ok(res)
    }

    /// One report pass. Dispatch follows the client transport:
    /// text form fans out one POST per URL, JSON either batches everything
    /// into `/updates/` or fans out per-metric POSTs to `/update/`, and
    /// gRPC issues a single unary call with the full slice.
    pub async fn save(
        &self,
        client: &Client,
        base_url: &str,
        is_json: bool,
        batch: bool,
    ) -> Result<()> {
        match client.transport() {
            Transport::Http => {
                let base = if base_url.contains("http://") {
                    base_url.to_string()
                } else {
                    format!("http://{base_url}")
                };
                if !is_json {
                    let urls = self.all();
                    let mut workers = JoinSet::new();
                    for url in urls {
                        let client = client.clone();
                        let url = format!("{base}{url}");
                        workers.spawn(async move {
                            client.post(url, Vec::new(), "text/plain").await
                        });
                    }
                    return drain_first_err(workers).await;
                }
                let metrics = self.all_metrics()?;
                if batch {
                    let body = serde_json::to_vec(&metrics)?;
                    client
                        .post(format!("{base}/updates/"), body, "application/json")
                        .await?;
                    return Ok(());
                }
                let mut workers = JoinSet::new();
                for m in metrics {
                    let client = client.clone();
                    let url = format!("{base}/update/");
                    workers.spawn(async move {
                        let body = match serde_json::to_vec(&m) {
                            Ok(body) => body,
                            Err(err) => return Err(crate::client::ClientError::SaveFailed(
                                err.to_string(),
                            )),
                        };
                        client.post(url, body, "application/json").await
                    });
                }
                drain_first_err(workers).await
            }
            Transport::Grpc => {
                let metrics = self.all_metrics()?;
                client.send_metrics(&metrics).await?;
                Ok(())
            }
        }
    }
}

async fn drain_first_err(
    mut workers: JoinSet<Result<(), crate::client::ClientError>>,
) -> Result<()> {
    let mut first_err: Option<anyhow::Error> = None;
    while let Some(joined) = workers.join_next().await {
        let res = match joined {
            Ok(res) => res.map_err(anyhow::Error::from),
            Err(join_err) => Err(anyhow::Error::from(join_err)),
        };
        if let Err(err) = res {
            if first_err.is_none() {
                first_err = Some(err);
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
