//! Termination signals (SIGINT/SIGTERM).
//!
//! The binary races the whole run against [`shutdown_signal`]. Whichever
//! step is in progress is dropped when a signal arrives; a running test
//! script is killed with its process group as its handle is dropped.

/// Resolves with the name of the first termination signal received.
///
/// Handlers are installed on first poll and stay installed for the life of
/// the process, so this future must be polled for the whole run.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        if let Ok(mut term) = signal(SignalKind::terminate()) {
            return tokio::select! {
                _ = ctrl_c => "SIGINT",
                _ = term.recv() => "SIGTERM",
            };
        }
    }

    ctrl_c.await;
    "SIGINT"
}
