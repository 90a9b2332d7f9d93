pub mod breakpoints;
pub mod error;
pub mod gateway;
pub mod journal;
pub mod registry;
pub mod session;
pub mod settings;
pub mod status;
pub mod subscriber;
pub mod surface;
pub mod target;
pub mod toolbar;

pub use breakpoints::{Breakpoint, BreakpointSet};
pub use error::{DebugError, Precondition};
pub use gateway::{DebugCommandGateway, GatewayError};
pub use journal::FileDebugJournal;
pub use registry::DebugSessionRegistry;
pub use session::{DebugSession, SessionBindings, SessionKey};
pub use settings::{ConnectionMode, FileSettingsStore, Settings};
pub use status::{DebugCommand, DebugLocation, DebugStatus, GatewayOutcome};
pub use subscriber::DebugSubscriber;
pub use surface::{AnonymousBlockCheck, EditingSurface, PlParser};
pub use target::{PlKind, PlSchema, PlTarget};
pub use toolbar::{ActionVisualState, ToolbarAction, ToolbarActionBinder, ToolbarContext};
