//! Walkgrid server entry point
//!
//! Loads configuration, starts the grid server and keeps it running until a
//! termination signal arrives or a reactor thread fails.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{anyhow, Context, Result};
use grid_server::{GridServer, StatsSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use cli::CliArgs;
use config::AppConfig;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    if let Err(e) = run(args).await {
        error!("❌ Fatal error: {:#}", e);
        eprintln!("❌ walkgrid: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<()> {
    // Load configuration first (before logging setup)
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .map_err(|e| anyhow!("failed to load {}: {e}", args.config_path.display()))?;
    config.apply_cli(&args).map_err(|e| anyhow!(e))?;
    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;

    logging::setup_logging(&config.logging)?;

    let server_config = config
        .to_server_config()
        .map_err(|e| anyhow!("invalid server configuration: {e}"))?;

    info!("🚀 Walkgrid v{}", env!("CARGO_PKG_VERSION"));
    info!("📋 Configuration Summary:");
    info!("  📂 Config file: {}", args.config_path.display());
    info!("  🌐 Bind address: {}", server_config.bind_address);
    info!(
        "  🧵 Threads: {} reactor, {} worker",
        server_config.reactor_threads, server_config.worker_threads
    );
    info!("  📦 Max frame: {} bytes", server_config.max_frame_len);

    let server = Arc::new(GridServer::bind(server_config).context("failed to bind server")?);
    server.start().context("failed to start server")?;

    let mut waiter = {
        let server = server.clone();
        tokio::task::spawn_blocking(move || server.wait())
    };

    let monitoring = (config.server.stats_interval_secs > 0).then(|| {
        let server = server.clone();
        let period = Duration::from_secs(config.server.stats_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            let mut last_walks = 0u64;
            loop {
                interval.tick().await;
                let stats = server.stats();
                info!(
                    "📊 Grid Health - {} walks this period | {} cells | {} edges | {} connections",
                    stats.walks.saturating_sub(last_walks),
                    stats.cells,
                    stats.edges,
                    server.connections()
                );
                last_walks = stats.walks;
            }
        })
    });

    info!("✅ Walkgrid is now running on {}", server.local_addr());
    info!("🛑 Press Ctrl+C to gracefully shutdown");

    let outcome = tokio::select! {
        joined = &mut waiter => joined,
        signal = signals::wait_for_shutdown() => {
            match signal {
                Ok(_) => {
                    info!("🛑 Shutdown signal received, initiating graceful shutdown...");
                    server.stop();
                }
                Err(e) => warn!("⚠️ Signal handling unavailable, running until the server stops: {}", e),
            }
            waiter.await
        }
    };

    if let Some(handle) = monitoring {
        handle.abort();
    }

    log_final_stats(&server.stats());

    outcome
        .context("server waiter task failed")?
        .context("grid server stopped with an error")
}

fn log_final_stats(stats: &StatsSnapshot) {
    info!("📊 Final Statistics:");
    info!("  - Walks: {} ({} locations)", stats.walks, stats.locations);
    info!(
        "  - Queries: {} one-to-one, {} one-to-all",
        stats.one_to_one, stats.one_to_all
    );
    info!("  - Resets: {}", stats.resets);
    info!("  - Graph: {} cells, {} edges", stats.cells, stats.edges);
    if let Some(extent) = stats.extent {
        info!(
            "  - Extent: x {}..={}, y {}..={}",
            extent.lowest_x, extent.highest_x, extent.lowest_y, extent.highest_y
        );
    }
}
