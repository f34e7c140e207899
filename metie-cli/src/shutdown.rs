//! Turns SIGINT/SIGTERM into a cancelled token.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub fn spawn_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => {
                info!(signal = name, "signal received");
                token.cancel();
            }
            Err(e) => error!(error = %e, "cannot listen for shutdown signals"),
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
