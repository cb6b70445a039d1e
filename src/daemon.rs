//! Long-running service: webhook listener, ingestion worker and the
//! recurring renewal/cleanup sweeps.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::app::{AppContext, Result};
use crate::config::Config;
use crate::normalizer::EntryParser;
use crate::pubsub::{spawn_ingest_worker, Scheduler};
use crate::server::{self, ServerState};

/// Daemon runner
pub struct Daemon {
    ctx: Arc<AppContext>,
    config: Config,
}

impl Daemon {
    pub fn new(ctx: Arc<AppContext>, config: Config) -> Self {
        Self { ctx, config }
    }

    /// Runs until SIGINT/SIGTERM.
    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        self.run_with(listener, shutdown_signal()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves, then
    /// stops the server, the sweeps and finally the ingestion worker.
    pub async fn run_with<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let pubsub = self.ctx.pubsub.clone();
        let (ingest, ingest_task) = spawn_ingest_worker(pubsub.clone());
        let mut scheduler = Scheduler::start(pubsub.clone(), &self.config.schedule);

        let state = Arc::new(ServerState {
            pubsub,
            ingest: ingest.clone(),
            parser: EntryParser::new(),
            secret: self.config.server.secret.clone(),
        });
        let router = server::build_router(state, &self.config.server.path);

        info!(
            "livehub daemon started (callback {}, PID {})",
            self.config.server.callback_url,
            std::process::id()
        );

        let served = server::serve(listener, router, shutdown).await;
        if let Err(e) = &served {
            error!("Server stopped with error: {}", e);
        }

        info!("Daemon shutting down...");
        scheduler.shutdown().await;

        let report = ingest.shutdown().await;
        if report.received > 0 {
            info!(
                "Final flush: {} inserted, {} updated, {} dropped",
                report.inserted, report.updated, report.dropped
            );
        }
        match ingest_task.await {
            Ok(stats) => info!(
                "Ingested {} entries in {} commits ({} inserted)",
                stats.totals.received, stats.commits, stats.totals.inserted
            ),
            Err(e) => error!("Ingest worker failed: {}", e),
        }

        served
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
            }
            _ => {
                error!("Failed to install signal handlers, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
