use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebugStatus {
    Init,
    Starting,
    Running,
    StepIn,
    StepOut,
    StepOver,
    Paused,
    Exiting,
    Recover,
    Terminated,
}

impl DebugStatus {
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Starting
                | Self::StepIn
                | Self::StepOut
                | Self::StepOver
                | Self::Exiting
                | Self::Recover
        )
    }

    #[must_use]
    pub fn carries_location(self) -> bool {
        matches!(
            self,
            Self::Paused | Self::StepIn | Self::StepOut | Self::StepOver
        )
    }

    #[must_use]
    pub fn has_live_run(self) -> bool {
        matches!(self, Self::Paused | Self::Running)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::StepIn => "STEP_IN",
            Self::StepOut => "STEP_OUT",
            Self::StepOver => "STEP_OVER",
            Self::Paused => "PAUSED",
            Self::Exiting => "EXITING",
            Self::Recover => "RECOVER",
            Self::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for DebugStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugCommand {
    Start,
    Resume,
    StepIn,
    StepOut,
    StepOver,
    Terminate,
    Exit,
    Retry,
}

impl DebugCommand {
    #[must_use]
    pub fn in_flight_status(self) -> DebugStatus {
        match self {
            Self::Start => DebugStatus::Starting,
            Self::Resume => DebugStatus::Running,
            Self::StepIn => DebugStatus::StepIn,
            Self::StepOut => DebugStatus::StepOut,
            Self::StepOver => DebugStatus::StepOver,
            Self::Terminate | Self::Exit => DebugStatus::Exiting,
            Self::Retry => DebugStatus::Recover,
        }
    }

    #[must_use]
    pub fn allowed_from(self, status: DebugStatus) -> bool {
        match self {
            Self::Start => status == DebugStatus::Init,
            Self::Resume | Self::StepIn | Self::StepOut | Self::StepOver => {
                status == DebugStatus::Paused
            }
            Self::Terminate => status.has_live_run(),
            Self::Exit => matches!(
                status,
                DebugStatus::Paused
                    | DebugStatus::Running
                    | DebugStatus::Init
                    | DebugStatus::Terminated
            ),
            Self::Retry => status == DebugStatus::Terminated,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Resume => "resume",
            Self::StepIn => "step-in",
            Self::StepOut => "step-out",
            Self::StepOver => "step-over",
            Self::Terminate => "terminate",
            Self::Exit => "exit",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for DebugCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DebugCommand {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let command = match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "start" | "debug" => Self::Start,
            "resume" | "continue" => Self::Resume,
            "step-in" => Self::StepIn,
            "step-out" => Self::StepOut,
            "step-over" | "next" => Self::StepOver,
            "terminate" | "end" => Self::Terminate,
            "exit" => Self::Exit,
            "retry" => Self::Retry,
            other => return Err(format!("unknown debug command `{other}`")),
        };
        Ok(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebugLocation {
    pub line: u32,
    pub frame_id: u32,
}

impl DebugLocation {
    #[must_use]
    pub fn new(line: u32, frame_id: u32) -> Self {
        Self { line, frame_id }
    }

    #[must_use]
    pub fn at_line(line: u32) -> Self {
        Self::new(line, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    Paused(DebugLocation),
    Running,
    Terminated,
}
