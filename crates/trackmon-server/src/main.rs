use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ipnetwork::IpNetwork;
use tonic::transport::Server as TonicServer;
use tracing_subscriber::EnvFilter;
use trackmon_common::proto::monitoring_server::MonitoringServer;
use trackmon_server::config::ServerArgs;
use trackmon_server::{build_router, crypt, grpc, AppState};
use trackmon_storage::{DbStorage, MemStorage, Repository};

const SHOW_STORE_PERIOD: Duration = Duration::from_secs(5);
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::load()?;

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
        listen = %args.address,
        transport = %args.transport,
        "trackmon-server starting"
    );

    if args.generate_crypto_keys {
        let path = args
            .crypto_key
            .clone()
            .unwrap_or_else(|| PathBuf::from("key.pem"));
        crypt::generate_crypto_keys(&path)?;
    }

    // storage selection: DSN configured → relational, otherwise in-memory
    let repo: Arc<dyn Repository>;
    let mut mem: Option<Arc<MemStorage>> = None;
    if !args.database_dsn.is_empty() {
        let db = DbStorage::open(&args.database_dsn).await?;
        repo = Arc::new(db);
    } else {
        let store_file = (!args.store_file.is_empty()).then(|| PathBuf::from(&args.store_file));
        let interval =
            (args.store_interval > 0).then(|| Duration::from_secs(args.store_interval));
        let storage = MemStorage::open(args.restore, interval, store_file)?;
        mem = Some(storage.clone());
        repo = storage;
    }

    let trusted: Option<IpNetwork> = if args.trusted_subnet.is_empty() {
        None
    } else {
        Some(args.trusted_subnet.parse()?)
    };
    let private_key = match (&args.transport[..], &args.crypto_key) {
        ("http", Some(path)) if Path::new(path).exists() => {
            Some(Arc::new(crypt::load_private_key(path)?))
        }
        _ => None,
    };

    let state = AppState {
        repo: repo.clone(),
        key: Arc::new(args.key.clone().into_bytes()),
        trusted,
        private_key,
    };

    if args.show_store {
        let repo = repo.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SHOW_STORE_PERIOD);
            loop {
                tick.tick().await;
                match repo.list().await {
                    Ok(list) => {
                        for (target, values) in list {
                            tracing::info!(target = %target, metrics = ?values, "store contents");
                        }
                    }
                    Err(err) => tracing::error!(error = %err, "store listing failed"),
                }
            }
        });
    }

    match args.transport.as_str() {
        "http" => {
            let app = build_router(state, args.verbose);
            let listener = tokio::net::TcpListener::bind(&args.address).await?;
            let serve = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal());
            // the graceful drain is bounded by the shutdown deadline
            tokio::select! {
                res = serve => res?,
                _ = async {
                    shutdown_signal().await;
                    tokio::time::sleep(SHUTDOWN_DEADLINE).await;
                } => {
                    tracing::warn!("graceful shutdown deadline exceeded, aborting");
                }
            }
        }
        "grpc" => {
            let addr: SocketAddr = args.address.parse()?;
            let service = MonitoringServer::new(grpc::MonitoringService::new(state));
            TonicServer::builder()
                .add_service(service)
                .serve_with_shutdown(addr, shutdown_signal())
                .await?;
        }
        other => anyhow::bail!("unsupported transport {other}"),
    }

    // flush the in-memory store once on the way out
    if let Some(storage) = mem {
        if let Err(err) = storage.save() {
            tracing::error!(error = %err, "final snapshot failed");
        }
    }
    tracing::info!("server stopped");
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
