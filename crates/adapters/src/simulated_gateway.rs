use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use pldbg_core::gateway::{DebugCommandGateway, GatewayError};
use pldbg_core::status::{DebugLocation, GatewayOutcome};
use pldbg_core::target::PlSchema;
use tracing::debug;

use crate::pl_parser::executable_lines;

pub const NO_ACTIVE_RUN: &str = "NO_ACTIVE_RUN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedGatewayConfig {
    pub latency: Duration,
    pub stop_at_entry: bool,
}

impl Default for SimulatedGatewayConfig {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            stop_at_entry: true,
        }
    }
}

#[derive(Debug)]
struct Run {
    lines: Vec<u32>,
    breakpoints: BTreeSet<u32>,
    position: usize,
}

impl Run {
    fn outcome(&self) -> GatewayOutcome {
        self.lines
            .get(self.position)
            .map_or(GatewayOutcome::Terminated, |line| {
                GatewayOutcome::Paused(DebugLocation::at_line(*line))
            })
    }

    fn step(&mut self) -> GatewayOutcome {
        self.position += 1;
        self.outcome()
    }

    fn run_to_breakpoint(&mut self, skip_current: bool) -> GatewayOutcome {
        if skip_current {
            self.position += 1;
        }
        while let Some(line) = self.lines.get(self.position) {
            if self.breakpoints.contains(line) {
                break;
            }
            self.position += 1;
        }
        self.outcome()
    }
}

#[derive(Debug, Default)]
struct EngineState {
    run: Option<Run>,
    fail_next: Option<GatewayError>,
}

/// Offline debug engine stepping through the executable lines of the
/// target's source. It knows a single frame, so step-in behaves like
/// step-over and step-out runs to the next breakpoint.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    config: SimulatedGatewayConfig,
    state: Mutex<EngineState>,
    commands: AtomicUsize,
}

impl SimulatedGateway {
    #[must_use]
    pub fn new(config: SimulatedGatewayConfig) -> Self {
        Self {
            config,
            state: Mutex::new(EngineState::default()),
            commands: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, error: GatewayError) {
        self.lock_state().fail_next = Some(error);
    }

    #[must_use]
    pub fn has_active_run(&self) -> bool {
        self.lock_state().run.is_some()
    }

    #[must_use]
    pub fn commands_issued(&self) -> usize {
        self.commands.load(Ordering::Relaxed)
    }

    async fn begin_command(&self, command: &'static str) -> Result<(), GatewayError> {
        self.commands.fetch_add(1, Ordering::Relaxed);
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        if let Some(error) = self.lock_state().fail_next.take() {
            debug!(target: "pldbg", command, code = error.code(), "simulated_failure");
            return Err(error);
        }
        Ok(())
    }

    fn launch(&self, target: &PlSchema, breakpoint_lines: &[u32]) -> GatewayOutcome {
        let mut run = Run {
            lines: executable_lines(&target.ddl),
            breakpoints: breakpoint_lines.iter().copied().collect(),
            position: 0,
        };
        let outcome = if self.config.stop_at_entry {
            run.outcome()
        } else {
            run.run_to_breakpoint(false)
        };

        let mut state = self.lock_state();
        state.run = (outcome != GatewayOutcome::Terminated).then_some(run);
        debug!(
            target: "pldbg",
            target_unit = %target.target(),
            ?outcome,
            "simulated_run_launched"
        );
        outcome
    }

    fn advance(
        &self,
        advance: impl FnOnce(&mut Run) -> GatewayOutcome,
    ) -> Result<GatewayOutcome, GatewayError> {
        let mut state = self.lock_state();
        let run = state
            .run
            .as_mut()
            .ok_or_else(|| GatewayError::new(NO_ACTIVE_RUN, "no debug run is active"))?;
        let outcome = advance(run);
        if outcome == GatewayOutcome::Terminated {
            state.run = None;
        }
        Ok(outcome)
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DebugCommandGateway for SimulatedGateway {
    async fn start(
        &self,
        target: &PlSchema,
        breakpoint_lines: &[u32],
    ) -> Result<GatewayOutcome, GatewayError> {
        self.begin_command("start").await?;
        Ok(self.launch(target, breakpoint_lines))
    }

    async fn step_in(&self) -> Result<GatewayOutcome, GatewayError> {
        self.begin_command("step-in").await?;
        self.advance(Run::step)
    }

    async fn step_out(&self) -> Result<GatewayOutcome, GatewayError> {
        self.begin_command("step-out").await?;
        self.advance(|run| run.run_to_breakpoint(true))
    }

    async fn step_over(&self) -> Result<GatewayOutcome, GatewayError> {
        self.begin_command("step-over").await?;
        self.advance(Run::step)
    }

    async fn resume(&self) -> Result<GatewayOutcome, GatewayError> {
        self.begin_command("resume").await?;
        self.advance(|run| run.run_to_breakpoint(true))
    }

    async fn exit(&self) -> Result<(), GatewayError> {
        self.begin_command("exit").await?;
        self.lock_state().run = None;
        Ok(())
    }

    async fn retry(
        &self,
        target: &PlSchema,
        breakpoint_lines: &[u32],
    ) -> Result<GatewayOutcome, GatewayError> {
        self.begin_command("retry").await?;
        Ok(self.launch(target, breakpoint_lines))
    }
}
