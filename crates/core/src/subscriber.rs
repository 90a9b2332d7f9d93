use crate::gateway::GatewayError;
use crate::session::SessionKey;
use crate::status::{DebugCommand, DebugLocation, DebugStatus};

/// Receives session changes; editor decorations, toolbars and the journal
/// hang off this. Implementations must not call back into the session.
pub trait DebugSubscriber: Send + Sync {
    fn on_transition(&self, key: &SessionKey, status: DebugStatus, location: Option<DebugLocation>);

    fn on_failure(&self, _key: &SessionKey, _command: DebugCommand, _error: &GatewayError) {}

    fn on_decorations_cleared(&self, _key: &SessionKey) {}
}
