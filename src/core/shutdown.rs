//! # Stop triggers for the workstation runtime.
//!
//! [`stop_requested`] completes on the first of:
//! - an OS termination signal (`SIGINT`, `SIGTERM`, `SIGQUIT` on Unix; Ctrl-C elsewhere);
//! - an explicit [`Workstation::shutdown`](crate::Workstation::shutdown).
//!
//! Signal listeners are registered per call.

use tokio_util::sync::CancellationToken;

/// Why the runtime is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopCause {
    Signal,
    Requested,
}

impl StopCause {
    pub(crate) const fn as_label(self) -> &'static str {
        match self {
            StopCause::Signal => "os_signal",
            StopCause::Requested => "requested",
        }
    }
}

/// Waits for a signal or for `token` to be cancelled.
///
/// Returns `Err` only if signal registration fails.
pub(crate) async fn stop_requested(token: &CancellationToken) -> std::io::Result<StopCause> {
    tokio::select! {
        res = os_signal() => res.map(|()| StopCause::Signal),
        _ = token.cancelled() => Ok(StopCause::Requested),
    }
}

#[cfg(unix)]
async fn os_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn os_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
