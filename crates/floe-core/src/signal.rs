//! Turning process signals into cancellation.
//!
//! Every long-running loop selects on one [`CancellationToken`]. The handler
//! cancels it on the first SIGINT, SIGTERM or SIGQUIT, so assessment retries
//! and ingestion stop at their next poll.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Resolve once the process is asked to stop.
///
/// A signal that cannot be listened for is skipped with a warning.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};
    use tracing::warn;

    fn listen(name: &'static str, kind: SignalKind) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| warn!(signal = name, "Cannot listen for signal: {}", e))
            .ok()
    }

    async fn received(stream: &mut Option<Signal>) {
        match stream {
            Some(stream) => {
                stream.recv().await;
            }
            None => std::future::pending().await,
        }
    }

    let mut sigint = listen("SIGINT", SignalKind::interrupt());
    let mut sigterm = listen("SIGTERM", SignalKind::terminate());
    let mut sigquit = listen("SIGQUIT", SignalKind::quit());

    let name = tokio::select! {
        _ = received(&mut sigint) => "SIGINT",
        _ = received(&mut sigterm) => "SIGTERM",
        _ = received(&mut sigquit) => "SIGQUIT",
    };
    info!(signal = name, "Shutdown signal received");
}

/// Resolve on Ctrl-C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(signal = "CTRL_C", "Shutdown signal received");
    }
}

/// Cancel `shutdown` once `trigger` resolves.
pub fn cancel_on<F>(trigger: F, shutdown: CancellationToken) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        trigger.await;
        if !shutdown.is_cancelled() {
            info!("Stopping, waiting for running work to reach a safe point");
            shutdown.cancel();
        }
    })
}

/// Cancel `shutdown` on the first shutdown signal.
pub fn spawn_shutdown_handler(shutdown: CancellationToken) -> JoinHandle<()> {
    cancel_on(shutdown_signal(), shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_token_cancelled_only_after_trigger() {
        let shutdown = CancellationToken::new();
        let (tx, rx) = oneshot::channel::<()>();

        let handler = cancel_on(
            async move {
                let _ = rx.await;
            },
            shutdown.clone(),
        );
        tokio::task::yield_now().await;
        assert!(!shutdown.is_cancelled());

        tx.send(()).unwrap();
        handler.await.unwrap();
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_trigger_after_cancellation_is_harmless() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        cancel_on(async {}, shutdown.clone()).await.unwrap();
        assert!(shutdown.is_cancelled());
    }
}
