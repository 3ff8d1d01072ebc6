//! Inbound interrupt handling shared by both binaries.

use tracing::error;

/// Resolve on Ctrl-C, or on `SIGTERM` where available.
///
/// A handler that cannot be registered never resolves; it is logged instead
/// of being mistaken for an interrupt.
pub async fn interrupt_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c() => {}
                    received = sigterm.recv() => {
                        if received.is_none() {
                            tracing::warn!("SIGTERM stream closed, waiting on ctrl-c only");
                            ctrl_c().await;
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "ctrl-c signal handler failed");
        std::future::pending::<()>().await;
    }
}
