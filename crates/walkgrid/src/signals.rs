//! Signal handling for graceful server shutdown.

use tokio::signal;
use tracing::info;

/// Returns once the process is asked to terminate.
///
/// Handles SIGINT and SIGTERM on Unix and Ctrl+C elsewhere.
///
/// # Returns
///
/// The name of the signal received, or an error if the handlers could not
/// be installed.
pub async fn wait_for_shutdown() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    let name = {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    };

    #[cfg(not(unix))]
    let name = {
        signal::ctrl_c().await?;
        "Ctrl+C"
    };

    info!("📡 Received {}", name);
    Ok(name)
}
