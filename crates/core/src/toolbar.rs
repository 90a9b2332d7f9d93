use thiserror::Error;

use crate::settings::ConnectionMode;
use crate::status::{DebugCommand, DebugStatus};
use crate::target::{PlKind, PlSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolbarAction {
    Save,
    Compile,
    Execute,
    Debug,
    DebugResume,
    DebugStepIn,
    DebugStepOut,
    DebugStepOver,
    DebugEnd,
    DebugRetry,
    DebugExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionVisualState {
    Running,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugCapabilities {
    pub connection_mode: ConnectionMode,
    pub pl_debug_enabled: bool,
    pub trigger_compile_enabled: bool,
}

impl Default for DebugCapabilities {
    fn default() -> Self {
        Self {
            connection_mode: ConnectionMode::Oracle,
            pl_debug_enabled: true,
            trigger_compile_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolbarContext {
    pub status: Option<DebugStatus>,
    pub kind: PlKind,
    pub named: bool,
    pub in_package: bool,
    pub capabilities: DebugCapabilities,
}

impl ToolbarContext {
    #[must_use]
    pub fn for_schema(schema: &PlSchema, capabilities: DebugCapabilities) -> Self {
        Self {
            status: None,
            kind: schema.kind,
            named: schema.name.is_some(),
            in_package: schema.package_name.is_some(),
            capabilities,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: Option<DebugStatus>) -> Self {
        self.status = status;
        self
    }

    fn debug_run_live(&self) -> bool {
        self.status
            .is_some_and(|status| status.has_live_run() || status.is_transient())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDefinition {
    pub id: ToolbarAction,
    pub title: &'static str,
    pub shortcut: &'static str,
    pub confirmation: Option<&'static str>,
}

const ACTIONS: [ActionDefinition; 11] = [
    ActionDefinition {
        id: ToolbarAction::Save,
        title: "Save",
        shortcut: "s",
        confirmation: None,
    },
    ActionDefinition {
        id: ToolbarAction::Compile,
        title: "Compile",
        shortcut: "c",
        confirmation: None,
    },
    ActionDefinition {
        id: ToolbarAction::Execute,
        title: "Run",
        shortcut: "Enter",
        confirmation: None,
    },
    ActionDefinition {
        id: ToolbarAction::Debug,
        title: "Debug",
        shortcut: "d",
        confirmation: None,
    },
    ActionDefinition {
        id: ToolbarAction::DebugResume,
        title: "Resume",
        shortcut: "r",
        confirmation: None,
    },
    ActionDefinition {
        id: ToolbarAction::DebugStepIn,
        title: "Step in",
        shortcut: "i",
        confirmation: None,
    },
    ActionDefinition {
        id: ToolbarAction::DebugStepOut,
        title: "Step out",
        shortcut: "o",
        confirmation: None,
    },
    ActionDefinition {
        id: ToolbarAction::DebugStepOver,
        title: "Step over",
        shortcut: "p",
        confirmation: None,
    },
    ActionDefinition {
        id: ToolbarAction::DebugEnd,
        title: "End debugging",
        shortcut: "e",
        confirmation: None,
    },
    ActionDefinition {
        id: ToolbarAction::DebugRetry,
        title: "Debug again",
        shortcut: "R",
        confirmation: Some("Restart the debug run from the beginning?"),
    },
    ActionDefinition {
        id: ToolbarAction::DebugExit,
        title: "Exit debug",
        shortcut: "x",
        confirmation: None,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolbarCommand {
    Session(DebugCommand),
    Save,
    Compile,
    Execute,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolbarError {
    #[error("action `{0:?}` is not available for this object")]
    ActionHidden(ToolbarAction),
    #[error("action `{0:?}` is disabled in the current debug state")]
    ActionDisabled(ToolbarAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolbarItem {
    pub action: ActionDefinition,
    pub state: ActionVisualState,
}

#[derive(Debug, Default)]
pub struct ToolbarActionBinder;

impl ToolbarActionBinder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn all(&self) -> &'static [ActionDefinition] {
        &ACTIONS
    }

    #[must_use]
    pub fn find(&self, action: ToolbarAction) -> Option<ActionDefinition> {
        ACTIONS
            .iter()
            .copied()
            .find(|definition| definition.id == action)
    }

    #[must_use]
    pub fn visual_state(
        &self,
        action: ToolbarAction,
        context: &ToolbarContext,
    ) -> ActionVisualState {
        action_visual_state(action, context)
    }

    #[must_use]
    pub fn is_visible(&self, action: ToolbarAction, context: &ToolbarContext) -> bool {
        action_visible(action, context)
    }

    #[must_use]
    pub fn toolbar(&self, context: &ToolbarContext) -> Vec<ToolbarItem> {
        ACTIONS
            .iter()
            .copied()
            .filter(|definition| action_visible(definition.id, context))
            .map(|definition| ToolbarItem {
                action: definition,
                state: action_visual_state(definition.id, context),
            })
            .collect()
    }

    pub fn invoke(
        &self,
        action: ToolbarAction,
        context: &ToolbarContext,
    ) -> Result<ToolbarCommand, ToolbarError> {
        if !action_visible(action, context) {
            return Err(ToolbarError::ActionHidden(action));
        }
        if action_visual_state(action, context) != ActionVisualState::Enabled {
            return Err(ToolbarError::ActionDisabled(action));
        }

        let command = match action {
            ToolbarAction::Save => ToolbarCommand::Save,
            ToolbarAction::Compile => ToolbarCommand::Compile,
            ToolbarAction::Execute => ToolbarCommand::Execute,
            ToolbarAction::Debug => ToolbarCommand::Session(DebugCommand::Start),
            ToolbarAction::DebugResume => ToolbarCommand::Session(DebugCommand::Resume),
            ToolbarAction::DebugStepIn => ToolbarCommand::Session(DebugCommand::StepIn),
            ToolbarAction::DebugStepOut => ToolbarCommand::Session(DebugCommand::StepOut),
            ToolbarAction::DebugStepOver => ToolbarCommand::Session(DebugCommand::StepOver),
            ToolbarAction::DebugEnd => ToolbarCommand::Session(DebugCommand::Terminate),
            ToolbarAction::DebugRetry => ToolbarCommand::Session(DebugCommand::Retry),
            ToolbarAction::DebugExit => ToolbarCommand::Session(DebugCommand::Exit),
        };
        Ok(command)
    }
}

fn action_visual_state(action: ToolbarAction, context: &ToolbarContext) -> ActionVisualState {
    use ActionVisualState::{Disabled, Enabled, Running};

    let status = context.status;
    let step = |in_flight: DebugStatus| match status {
        Some(current) if current == in_flight => Running,
        Some(DebugStatus::Paused) => Enabled,
        _ => Disabled,
    };

    match action {
        ToolbarAction::Debug => match status {
            Some(DebugStatus::Starting) => Running,
            None | Some(DebugStatus::Init) => Enabled,
            Some(_) => Disabled,
        },
        ToolbarAction::DebugResume => step(DebugStatus::Running),
        ToolbarAction::DebugStepIn => step(DebugStatus::StepIn),
        ToolbarAction::DebugStepOut => step(DebugStatus::StepOut),
        ToolbarAction::DebugStepOver => step(DebugStatus::StepOver),
        ToolbarAction::DebugEnd => match status {
            Some(DebugStatus::Exiting) => Running,
            Some(DebugStatus::Paused | DebugStatus::Running) => Enabled,
            _ => Disabled,
        },
        ToolbarAction::DebugRetry => match status {
            Some(DebugStatus::Recover) => Running,
            Some(DebugStatus::Terminated) => Enabled,
            _ => Disabled,
        },
        ToolbarAction::DebugExit => match status {
            Some(DebugStatus::Paused | DebugStatus::Running | DebugStatus::Terminated) => Enabled,
            _ => Disabled,
        },
        ToolbarAction::Save => {
            if context.capabilities.connection_mode == ConnectionMode::Mysql
                && context.kind.is_subprogram()
            {
                Disabled
            } else {
                Enabled
            }
        }
        ToolbarAction::Compile | ToolbarAction::Execute => {
            if context.debug_run_live() {
                Disabled
            } else {
                Enabled
            }
        }
    }
}

fn action_visible(action: ToolbarAction, context: &ToolbarContext) -> bool {
    let debuggable = !context.kind.is_package() && context.kind != PlKind::Trigger;
    match action {
        ToolbarAction::Save => true,
        ToolbarAction::Debug => debuggable && context.capabilities.pl_debug_enabled,
        ToolbarAction::DebugResume
        | ToolbarAction::DebugStepIn
        | ToolbarAction::DebugStepOut
        | ToolbarAction::DebugStepOver
        | ToolbarAction::DebugEnd
        | ToolbarAction::DebugRetry
        | ToolbarAction::DebugExit => debuggable,
        ToolbarAction::Compile => compile_visible(context),
        ToolbarAction::Execute => !context.kind.is_package(),
    }
}

fn compile_visible(context: &ToolbarContext) -> bool {
    if context.capabilities.connection_mode == ConnectionMode::Mysql {
        return false;
    }
    match context.kind {
        PlKind::PackageHead | PlKind::Type => false,
        PlKind::Procedure | PlKind::Function if context.in_package => false,
        PlKind::Trigger => context.capabilities.trigger_compile_enabled,
        _ => context.named,
    }
}
