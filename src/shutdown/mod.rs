use log::{error, info};
use tokio::signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT or Ctrl+C
    Interrupt,
    /// SIGTERM
    Term,
}

/// Resolves once the process is asked to stop. If no handler can be
/// installed it never resolves, the run then simply goes to completion.
#[cfg(unix)]
pub async fn wait_for_signal() -> ShutdownSignal {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut sigterm = match unix_signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Unable to install SIGTERM handler: {e}");
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        s = wait_for_ctrl_c() => s,
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
            ShutdownSignal::Term
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> ShutdownSignal {
    return wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() -> ShutdownSignal {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C");
            return ShutdownSignal::Interrupt;
        },
        Err(e) => {
            error!("Unable to listen for Ctrl+C: {e}");
            return std::future::pending().await;
        }
    }
}
