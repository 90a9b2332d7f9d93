use thiserror::Error;

use crate::gateway::GatewayError;
use crate::session::SessionKey;
use crate::status::{DebugCommand, DebugStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("there are unsaved changes, save before debugging")]
    UnsavedChanges,
    #[error("the window content is not a valid anonymous block")]
    NotAnAnonymousBlock,
}

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("{0}")]
    PreconditionFailed(Precondition),
    #[error("`{command}` rejected: a `{status}` command is still in flight")]
    CommandRejectedBusy {
        command: DebugCommand,
        status: DebugStatus,
    },
    #[error("`{command}` is not allowed while the session is `{status}`")]
    CommandNotAllowed {
        command: DebugCommand,
        status: DebugStatus,
    },
    #[error("debug engine failed during `{command}`: {source}")]
    GatewayFailure {
        command: DebugCommand,
        #[source]
        source: GatewayError,
    },
    #[error("no debug session registered for `{0}`")]
    SessionNotFound(SessionKey),
}

impl DebugError {
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::PreconditionFailed(_) | Self::GatewayFailure { .. }
        )
    }
}
