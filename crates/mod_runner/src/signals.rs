//! Signal handling for graceful shutdown.

use tokio::signal;

/// Waits for a termination signal and returns its name.
///
/// Handles SIGINT and SIGTERM on Unix and Ctrl+C elsewhere, so the runner
/// can shut its mods down before exiting.
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        Ok(name)
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok("Ctrl+C")
    }
}
