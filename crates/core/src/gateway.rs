use async_trait::async_trait;
use thiserror::Error;

use crate::status::GatewayOutcome;
use crate::target::PlSchema;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({code})")]
pub struct GatewayError {
    code: String,
    message: String,
}

impl GatewayError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Boundary issuing debug commands against one remote run.
///
/// Callers issue at most one run-advancing command at a time per session;
/// `exit` is the only call that may overlap an outstanding `resume`.
#[async_trait]
pub trait DebugCommandGateway: Send + Sync {
    async fn start(
        &self,
        target: &PlSchema,
        breakpoint_lines: &[u32],
    ) -> Result<GatewayOutcome, GatewayError>;

    async fn step_in(&self) -> Result<GatewayOutcome, GatewayError>;

    async fn step_out(&self) -> Result<GatewayOutcome, GatewayError>;

    async fn step_over(&self) -> Result<GatewayOutcome, GatewayError>;

    async fn resume(&self) -> Result<GatewayOutcome, GatewayError>;

    async fn exit(&self) -> Result<(), GatewayError>;

    async fn retry(
        &self,
        target: &PlSchema,
        breakpoint_lines: &[u32],
    ) -> Result<GatewayOutcome, GatewayError>;
}
