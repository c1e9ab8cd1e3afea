//! blockscope - read-only block explorer
//!
//! Starts the background index refresher against a base node and serves the
//! explorer's HTTP routes until interrupted.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use blockscope::cli::{Cli, StartupConfig};
use blockscope::data::IndexProvider;
use blockscope::refresh::Refresher;
use blockscope::rpc::NodeClient;
use blockscope::server::{self, AppState};

/// Logs to stderr; `RUST_LOG` overrides the default `blockscope=info`
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("blockscope=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match StartupConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    };

    init_tracing();

    let client = NodeClient::new(config.node_url.clone(), config.rpc_timeout)?;
    tracing::info!(node = %client.endpoint(), bind = %config.bind, "=== blockscope starting ===");
    let provider = IndexProvider::new(client);
    let refresher = Arc::new(Refresher::new(
        config.refresh.clone(),
        provider.clone().into_fetcher(),
    ));

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    // Serve right away; routes answer "no data yet" until the first refresh lands
    let refresh_task = tokio::spawn({
        let refresher = Arc::clone(&refresher);
        async move { refresher.start().await }
    });

    let app = server::router(AppState::new(refresher, provider));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Don't hold up exit behind a first refresh that is still retrying
    if !refresh_task.is_finished() {
        refresh_task.abort();
    }
    match refresh_task.await {
        Ok(handle) => handle.shutdown().await,
        Err(err) if err.is_cancelled() => {
            tracing::info!("Initial index refresh abandoned at shutdown")
        }
        Err(err) => tracing::warn!(error = %err, "Index refresher task failed"),
    }
    tracing::info!("blockscope stopped");

    Ok(())
}
