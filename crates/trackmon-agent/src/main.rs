mod client;
mod config;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant};
use tracing_subscriber::EnvFilter;
use trackmon_collector::cpu::CpuUtilization1;
use trackmon_collector::memory::{FreeMemory, TotalMemory};
use trackmon_collector::poll_count::PollCount;
use trackmon_collector::random_value::RandomValue;

use crate::client::Client;
use crate::store::MetricStore;

#[tokio::main]
async fn main() -> Result<()> {
    let args = config::AgentArgs::load()?;

    let directive = if args.verbose {
        "trackmon=debug"
    } else {
        "trackmon=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = option_env!("BUILD_COMMIT").unwrap_or("N/A"),
        server = %args.address,
        transport = %args.transport,
        poll_secs = args.poll_interval,
        report_secs = args.report_interval,
        "trackmon-agent starting"
    );

    let client = Client::new(
        &args.transport,
        &args.address,
        &args.self_address,
        args.crypto_key.as_deref(),
    )?;

    let store = Arc::new(MetricStore::new(args.key.as_bytes()));
    store.add_custom(vec![
        Box::new(PollCount::new()),
        Box::new(RandomValue::new()),
        Box::new(TotalMemory::new()),
        Box::new(FreeMemory::new()),
        Box::new(CpuUtilization1::new()),
    ]);

    let is_json = args.format == "json";
    let poll_period = Duration::from_secs(args.poll_interval.max(1));
    let report_period = Duration::from_secs(args.report_interval.max(1));
    let mut poll = interval_at(Instant::now() + poll_period, poll_period);
    let mut report = interval_at(Instant::now() + report_period, report_period);

    // every in-flight worker is tracked here and drained on shutdown
    let mut workers: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = poll.tick() => {
                let store = store.clone();
                workers.spawn_blocking(move || {
                    if let Err(err) = store.scrape() {
                        tracing::error!(error = %err, "scrape failed");
                    }
                });
            }
            _ = report.tick() => {
                let store = store.clone();
                let client = client.clone();
                let base = args.address.clone();
                let batch = args.batch;
                workers.spawn(async move {
                    if let Err(err) = store.save(&client, &base, is_json, batch).await {
                        tracing::error!(error = %err, "report failed");
                    }
                });
            }
            _ = shutdown_signal() => {
                tracing::info!("agent stopping");
                break;
            }
        }
        while workers.try_join_next().is_some() {}
    }

    // drain in-flight workers, then flush one final report
    while workers.join_next().await.is_some() {}
    if let Err(err) = store.save(&client, &args.address, is_json, args.batch).await {
        tracing::error!(error = %err, "final report failed");
    }

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let term = signal(SignalKind::terminate());
    let quit = signal(SignalKind::quit());
    match (term, quit) {
        (Ok(mut term), Ok(mut quit)) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
                _ = quit.recv() => {}
            }
        }
        _ => {
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}
