//! Shutdown signals for the gateway binary

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// What ended the wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    /// A component cancelled the service token
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "Ctrl+C"),
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Requested => write!(f, "internal request"),
        }
    }
}

/// Resolve on Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_signal() -> ShutdownReason {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("SIGTERM handler unavailable, only Ctrl+C will stop the service: {}", e);
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => ShutdownReason::Interrupt,
            _ = async {
                match term.as_mut() {
                    Some(sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => ShutdownReason::Terminate,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        ShutdownReason::Interrupt
    }
}

/// Resolve on an OS signal or when `token` is cancelled, whichever is first
pub async fn wait_for_shutdown(token: &CancellationToken) -> ShutdownReason {
    tokio::select! {
        reason = wait_for_signal() => reason,
        _ = token.cancelled() => ShutdownReason::Requested,
    }
}
