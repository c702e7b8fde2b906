// Shutdown signals -> cancellation

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cancel `token` on the first SIGINT or SIGTERM
pub fn cancel_on_shutdown(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown() => {
                warn!("Received shutdown signal, cancelling run");
                token.cancel();
            }
            _ = token.cancelled() => debug!("Run cancelled, no longer listening for signals"),
        }
    });
}

/// Resolve when `listener` sees its signal; never resolve if it cannot listen
async fn signal_or_pending<F>(listener: F, name: &str)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = listener.await {
        warn!(signal = name, error = %e, "Failed to listen for signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = async {
        let mut terminate = signal(SignalKind::terminate())?;
        match terminate.recv().await {
            Some(()) => Ok(()),
            None => Err(io::Error::other("signal stream closed")),
        }
    };

    tokio::select! {
        _ = signal_or_pending(tokio::signal::ctrl_c(), "SIGINT") => {}
        _ = signal_or_pending(terminate, "SIGTERM") => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    signal_or_pending(tokio::signal::ctrl_c(), "ctrl-c").await;
}
