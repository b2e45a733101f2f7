//! request-queue daemon
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::ingress ──▶ kernel::deliver ──▶ prefix owner's queue
//!                                            │                 │
//!                                            │ delegation      │
//!                                            ▼                 ▼
//!                                      target queue      server workers ──▶ RequestHandler
//!     Client Response                                          │
//!     ◀────────────── reply channel ◀──────────────────────────┘
//!
//!     admin API / SIGHUP ──▶ lifecycle::Supervisor::handoff
//!         (generation N delegates to N+1, drains, closes; N+1's standby prefixes take over)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use request_queue::admin::{setup_admin_router, AdminState};
use request_queue::config::{load_config, ConfigWatcher, ServiceConfig};
use request_queue::http::{build_router, serve, IngressState};
use request_queue::kernel::{InMemoryNamespace, Namespace};
use request_queue::lifecycle::{Shutdown, SignalEvent, Signals, Supervisor};
use request_queue::observability::{logging, metrics};
use request_queue::server::EchoHandler;

#[derive(Parser)]
#[command(name = "request-queue", version, about = "HTTP request-queue daemon with delegation and handoff")]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long, env = "REQUEST_QUEUE_CONFIG")]
    config: Option<PathBuf>,

    /// Reload config-managed delegations when the file changes.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), process = %config.process.name, "request-queue starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let namespace: Arc<dyn Namespace> = Arc::new(InMemoryNamespace::new());
    let supervisor = Arc::new(Supervisor::start(namespace.clone(), &config, Arc::new(EchoHandler)).await?);
    let shutdown = Shutdown::new();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let ingress = build_router(
        IngressState {
            namespace,
            scheme: config.listener.scheme.clone(),
            max_body_bytes: config.listener.max_body_bytes,
        },
        Duration::from_secs(config.timeouts.request_secs),
    );
    let ingress_task = tokio::spawn(serve(listener, ingress, shutdown.clone()));

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let router = setup_admin_router(AdminState::new(supervisor.clone(), &config.admin.api_key));
        Some(tokio::spawn(serve(listener, router, shutdown.clone())))
    } else {
        None
    };

    let _watcher = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            let supervisor = supervisor.clone();
            tokio::spawn(async move {
                while let Some(update) = updates.recv().await {
                    let failed = supervisor.apply_delegations(&update.delegations).await;
                    for (delegation, e) in &failed {
                        tracing::warn!(queue = %delegation.queue_name, uri = %delegation.uri, error = %e, "Delegation from reloaded config not applied");
                    }
                    tracing::info!(delegations = update.delegations.len(), failed = failed.len(), "Delegations reconciled");
                }
            });
            Some(handle)
        }
        _ => None,
    };

    let mut signals = Signals::install()?;
    loop {
        match signals.next().await {
            SignalEvent::Shutdown => break,
            SignalEvent::Handoff => match supervisor.handoff().await {
                Ok(report) => tracing::info!(generation = report.generation, to = %report.to, "Handoff finished"),
                Err(e) => tracing::error!(error = %e, "Handoff failed, current generation keeps serving"),
            },
        }
    }

    tracing::info!("Shutdown signal received");
    shutdown.trigger();
    if let Some(report) = supervisor.shutdown().await {
        tracing::info!(
            drained = report.drained,
            pending_at_close = report.pending_at_close,
            elapsed_ms = report.elapsed_ms,
            "Queues released"
        );
    }

    ingress_task.await??;
    if let Some(task) = admin_task {
        task.await??;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
