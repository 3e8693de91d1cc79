//! Interrupt handling for SIGINT and SIGTERM.
//!
//! The handler is either armed (listening) or terminated. Terminating:
//! - saves the in-progress manifest under its `.partial` name
//! - then cancels the run token, so the walker and builders stop producing
//!
//! The handle is claimed before the token fires, so a writer woken by the
//! cancellation always finds the run already interrupted.
//!
//! The caller then exits non-zero.

use crate::executor::manifest::{InterruptOutcome, ManifestHandle};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Armed,
    Terminated,
}

/// Interrupt handler for a single manifest run
pub struct InterruptHandler {
    cancel_token: CancellationToken,
    state: HandlerState,
}

impl InterruptHandler {
    /// Create an armed handler that cancels `cancel_token` on termination
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            state: HandlerState::Armed,
        }
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Wait for an interrupt signal (SIGINT or SIGTERM)
    pub async fn wait_for_signal() {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), cleaning up...");
            }
            _ = terminate => {
                info!("Received SIGTERM, cleaning up...");
            }
        }
    }

    /// Halt intake and keep partial work. A second call is a no-op.
    pub async fn terminate(&mut self, handle: &ManifestHandle) -> Option<InterruptOutcome> {
        if self.state == HandlerState::Terminated {
            return None;
        }
        self.state = HandlerState::Terminated;

        let outcome = handle.interrupt().await;
        self.cancel_token.cancel();

        match &outcome {
            InterruptOutcome::PartialSaved(path) => {
                info!("Partial manifest saved to {}", path.display());
            }
            InterruptOutcome::AlreadyFinished => {
                warn!("Interrupt arrived after the manifest was finalized");
            }
            InterruptOutcome::RenameFailed(e) => {
                error!("Failed to rename in-progress manifest: {}", e);
            }
        }

        Some(outcome)
    }
}
