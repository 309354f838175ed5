//! Shutdown signal handling.

use tokio::signal;
use tracing::{error, info};

async fn ctrl_c() -> &'static str {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    "ctrl+c"
}

#[cfg(unix)]
async fn unix_signal(kind: signal::unix::SignalKind, name: &'static str) -> &'static str {
    match signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!(signal = name, error = %e, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
    name
}

/// Resolve when the process is asked to stop; returns the signal name
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() -> String {
    #[cfg(unix)]
    let terminate = unix_signal(signal::unix::SignalKind::terminate(), "sigterm");
    #[cfg(unix)]
    let quit = unix_signal(signal::unix::SignalKind::quit(), "sigquit");

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();
    #[cfg(not(unix))]
    let quit = std::future::pending::<&'static str>();

    let signal_name = tokio::select! {
        name = ctrl_c() => name,
        name = terminate => name,
        name = quit => name,
    };

    info!(signal = signal_name, "Received shutdown signal");
    signal_name.to_string()
}
