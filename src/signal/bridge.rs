// src/signal/bridge.rs

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::{PipewrapError, Result};
use crate::signal::shutdown::{ShutdownHandle, ShutdownReason};

/// Install handlers for SIGINT, SIGTERM and SIGQUIT and spawn the task that
/// turns them into shutdown requests.
///
/// Must be called from within a Tokio runtime. The handlers stay installed
/// for the life of the process; abort the returned handle to stop listening.
pub fn spawn_signal_bridge(shutdown: ShutdownHandle) -> Result<JoinHandle<()>> {
    let install = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| {
            PipewrapError::ConsoleSetup(format!("installing {name} handler failed: {e}"))
        })
    };
    let mut interrupt = install(SignalKind::interrupt(), "SIGINT")?;
    let mut terminate = install(SignalKind::terminate(), "SIGTERM")?;
    let mut quit = install(SignalKind::quit(), "SIGQUIT")?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = interrupt.recv() => "SIGINT",
                Some(()) = terminate.recv() => "SIGTERM",
                Some(()) = quit.recv() => "SIGQUIT",
                else => break,
            };

            if shutdown.request(ShutdownReason::Signal) {
                info!(signal = name, "termination signal received; shutdown requested");
            } else {
                debug!(signal = name, "termination signal received; shutdown already requested");
            }
        }
        debug!("signal bridge stopped");
    }))
}
