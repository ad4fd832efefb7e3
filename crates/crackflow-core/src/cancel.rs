//! Cancellation: SIGTERM to the live stage process of a session.
//!
//! The controller never touches session output or status. It reads the live
//! pid, flags the request and fires the signal; the resulting termination
//! event reaches the session through the pipeline like any other exit.

use crate::error::CancelError;
use crate::exec::{CommandExecutor, TokioCommandExecutor};
use crate::runner::SIGTERM;
use crate::session::{CancelFlag, SessionHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful cancellation request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// SIGTERM was sent to `pid`.
    Signalled { pid: u32 },

    /// A request for `pid` is already in flight; nothing was sent.
    AlreadyRequested { pid: u32 },
}

/// Sends graceful termination requests through the command execution boundary.
#[derive(Clone)]
pub struct CancelController {
    executor: Arc<dyn CommandExecutor>,
}

impl CancelController {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    pub fn local() -> Self {
        Self::new(Arc::new(TokioCommandExecutor))
    }

    /// Request termination of the session's running stage.
    ///
    /// Returns immediately after the signal is delivered; the session turns
    /// `Cancelled` once the process actually exits.
    pub async fn request_cancel(&self, session: &SessionHandle) -> Result<CancelOutcome, CancelError> {
        let flag = session.lock().flag_cancel();
        let pid = match flag {
            CancelFlag::NoProcess => return Err(CancelError::NoActiveProcess),
            CancelFlag::AlreadyRequested(pid) => {
                debug!(pid, "Cancellation already requested");
                return Ok(CancelOutcome::AlreadyRequested { pid });
            }
            CancelFlag::Flagged(pid) => pid,
        };

        let args = [format!("-{SIGTERM}"), pid.to_string()];
        if let Err(source) = self.executor.execute("kill", &args).await {
            warn!(pid, "Failed to deliver SIGTERM: {}", source);
            session.lock().unflag_cancel();
            return Err(CancelError::SignalFailed { pid, source });
        }

        info!(pid, session = %session.id(), "Sent SIGTERM");
        Ok(CancelOutcome::Signalled { pid })
    }
}
