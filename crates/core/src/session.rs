use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::breakpoints::BreakpointSet;
use crate::error::{DebugError, Precondition};
use crate::gateway::{DebugCommandGateway, GatewayError};
use crate::status::{DebugCommand, DebugLocation, DebugStatus, GatewayOutcome};
use crate::subscriber::DebugSubscriber;
use crate::surface::{EditingSurface, PlParser};
use crate::target::{PlSchema, PlTarget};

pub(crate) type SessionMap = Mutex<HashMap<SessionKey, Arc<DebugSession>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

#[derive(Clone)]
pub struct SessionBindings {
    pub surface: Arc<dyn EditingSurface>,
    pub gateway: Arc<dyn DebugCommandGateway>,
    pub parser: Arc<dyn PlParser>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    status: DebugStatus,
    location: Option<DebugLocation>,
}

// A completion applies only while `epoch` is still the session's epoch.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    command: DebugCommand,
    epoch: u64,
    rollback_status: DebugStatus,
    rollback_location: Option<DebugLocation>,
}

#[derive(Debug)]
struct SessionState {
    status: DebugStatus,
    schema: Option<PlSchema>,
    location: Option<DebugLocation>,
    breakpoints: BreakpointSet,
    snapshot: Option<String>,
    epoch: u64,
    closed: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: DebugStatus::Init,
            schema: None,
            location: None,
            breakpoints: BreakpointSet::new(),
            snapshot: None,
            epoch: 0,
            closed: false,
        }
    }

    fn guard(&self, command: DebugCommand) -> Result<(), DebugError> {
        if self.status.is_transient() {
            return Err(DebugError::CommandRejectedBusy {
                command,
                status: self.status,
            });
        }
        if self.closed || !command.allowed_from(self.status) {
            return Err(DebugError::CommandNotAllowed {
                command,
                status: self.status,
            });
        }
        Ok(())
    }

    fn transition(&mut self, status: DebugStatus) -> Transition {
        self.status = status;
        if !status.carries_location() {
            self.location = None;
        }
        Transition {
            status,
            location: self.location,
        }
    }

    fn begin(&mut self, command: DebugCommand) -> (InFlight, Transition) {
        self.epoch = self.epoch.wrapping_add(1);
        let in_flight = InFlight {
            command,
            epoch: self.epoch,
            rollback_status: self.status,
            rollback_location: self.location,
        };
        (in_flight, self.transition(command.in_flight_status()))
    }

    fn apply(&mut self, outcome: GatewayOutcome) -> Transition {
        match outcome {
            GatewayOutcome::Paused(location) => {
                self.location = Some(location);
                self.transition(DebugStatus::Paused)
            }
            GatewayOutcome::Running => self.transition(DebugStatus::Running),
            GatewayOutcome::Terminated => self.transition(DebugStatus::Terminated),
        }
    }

    fn rollback(&mut self, in_flight: &InFlight) -> Transition {
        self.location = in_flight.rollback_location;
        self.transition(in_flight.rollback_status)
    }
}

pub struct DebugSession {
    key: SessionKey,
    bindings: SessionBindings,
    state: Mutex<SessionState>,
    subscribers: Mutex<Vec<Arc<dyn DebugSubscriber>>>,
    registry: Option<Weak<SessionMap>>,
}

impl fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugSession")
            .field("key", &self.key)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl DebugSession {
    #[must_use]
    pub fn new(key: impl Into<SessionKey>, bindings: SessionBindings) -> Self {
        Self::with_registry(key.into(), bindings, None)
    }

    pub(crate) fn with_registry(
        key: SessionKey,
        bindings: SessionBindings,
        registry: Option<Weak<SessionMap>>,
    ) -> Self {
        Self {
            key,
            bindings,
            state: Mutex::new(SessionState::new()),
            subscribers: Mutex::new(Vec::new()),
            registry,
        }
    }

    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    #[must_use]
    pub fn status(&self) -> DebugStatus {
        self.lock_state().status
    }

    #[must_use]
    pub fn current_location(&self) -> Option<DebugLocation> {
        let state = self.lock_state();
        state.location.filter(|_| state.status.carries_location())
    }

    #[must_use]
    pub fn target(&self) -> Option<PlTarget> {
        self.lock_state().schema.as_ref().map(PlSchema::target)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    #[must_use]
    pub fn breakpoints(&self) -> BreakpointSet {
        self.lock_state().breakpoints.clone()
    }

    pub fn add_breakpoint(&self, line: u32) {
        self.lock_state().breakpoints.add(line);
    }

    pub fn toggle_breakpoint(&self, line: u32) -> bool {
        self.lock_state().breakpoints.toggle(line)
    }

    pub fn toggle_breakpoint_enabled(&self, line: u32) {
        self.lock_state().breakpoints.toggle_enabled(line);
    }

    pub fn subscribe(&self, subscriber: Arc<dyn DebugSubscriber>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    pub async fn execute(&self, command: DebugCommand) -> Result<DebugStatus, DebugError> {
        match command {
            DebugCommand::Start => self.start().await,
            DebugCommand::Resume => self.resume().await,
            DebugCommand::StepIn => self.step_in().await,
            DebugCommand::StepOut => self.step_out().await,
            DebugCommand::StepOver => self.step_over().await,
            DebugCommand::Terminate => self.terminate().await,
            DebugCommand::Exit => self.exit().await,
            DebugCommand::Retry => self.retry().await,
        }
    }

    pub async fn start(&self) -> Result<DebugStatus, DebugError> {
        let command = DebugCommand::Start;
        let (in_flight, schema, lines) = {
            let mut state = self.lock_state();
            state.guard(command)?;
            let schema = self.launch_target(command)?;
            if state.snapshot.is_none() {
                state.snapshot = Some(self.bindings.surface.content());
            }
            state.schema = Some(schema.clone());
            let lines = state.breakpoints.enabled_lines();
            let (in_flight, transition) = state.begin(command);
            drop(state);
            self.publish(transition);
            (in_flight, schema, lines)
        };

        debug!(
            target: "pldbg",
            session = %self.key,
            target_unit = %schema.target(),
            breakpoints = lines.len(),
            "debug_start"
        );
        let result = self.bindings.gateway.start(&schema, &lines).await;
        self.complete(in_flight, result)
    }

    pub async fn resume(&self) -> Result<DebugStatus, DebugError> {
        let in_flight = self.begin_advance(DebugCommand::Resume, false)?;
        let result = self.bindings.gateway.resume().await;
        self.complete(in_flight, result)
    }

    pub async fn step_in(&self) -> Result<DebugStatus, DebugError> {
        let in_flight = self.begin_advance(DebugCommand::StepIn, true)?;
        let result = self.bindings.gateway.step_in().await;
        self.complete(in_flight, result)
    }

    pub async fn step_out(&self) -> Result<DebugStatus, DebugError> {
        let in_flight = self.begin_advance(DebugCommand::StepOut, true)?;
        let result = self.bindings.gateway.step_out().await;
        self.complete(in_flight, result)
    }

    pub async fn step_over(&self) -> Result<DebugStatus, DebugError> {
        let in_flight = self.begin_advance(DebugCommand::StepOver, true)?;
        let result = self.bindings.gateway.step_over().await;
        self.complete(in_flight, result)
    }

    pub async fn terminate(&self) -> Result<DebugStatus, DebugError> {
        self.shut_down(DebugCommand::Terminate).await
    }

    pub async fn exit(&self) -> Result<DebugStatus, DebugError> {
        self.shut_down(DebugCommand::Exit).await
    }

    pub async fn retry(&self) -> Result<DebugStatus, DebugError> {
        let command = DebugCommand::Retry;
        let (in_flight, schema, lines) = {
            let mut state = self.lock_state();
            state.guard(command)?;
            let schema = self.launch_target(command)?;
            state.schema = Some(schema.clone());
            let lines = state.breakpoints.enabled_lines();
            let (in_flight, recover) = state.begin(command);
            let starting = state.transition(DebugStatus::Starting);
            drop(state);
            self.publish(recover);
            self.publish(starting);
            (in_flight, schema, lines)
        };

        debug!(
            target: "pldbg",
            session = %self.key,
            target_unit = %schema.target(),
            breakpoints = lines.len(),
            "debug_retry"
        );
        let result = self.bindings.gateway.retry(&schema, &lines).await;
        self.complete(in_flight, result)
    }

    pub fn report_stop(&self, outcome: GatewayOutcome) -> bool {
        let mut state = self.lock_state();
        if state.closed || state.status != DebugStatus::Running {
            debug!(
                target: "pldbg",
                session = %self.key,
                status = %state.status,
                "stop_report_ignored"
            );
            return false;
        }

        state.epoch = state.epoch.wrapping_add(1);
        let transition = state.apply(outcome);
        drop(state);
        self.publish(transition);
        true
    }

    fn begin_advance(
        &self,
        command: DebugCommand,
        require_saved: bool,
    ) -> Result<InFlight, DebugError> {
        let mut state = self.lock_state();
        state.guard(command)?;
        if require_saved {
            self.ensure_saved(command)?;
        }
        let (in_flight, transition) = state.begin(command);
        drop(state);

        debug!(target: "pldbg", session = %self.key, %command, "debug_command");
        self.publish(transition);
        Ok(in_flight)
    }

    fn complete(
        &self,
        in_flight: InFlight,
        result: Result<GatewayOutcome, GatewayError>,
    ) -> Result<DebugStatus, DebugError> {
        let mut state = self.lock_state();
        if state.epoch != in_flight.epoch {
            debug!(
                target: "pldbg",
                session = %self.key,
                command = %in_flight.command,
                status = %state.status,
                "stale_completion_dropped"
            );
            return Ok(state.status);
        }

        match result {
            Ok(outcome) => {
                let transition = state.apply(outcome);
                drop(state);
                self.publish(transition);
                Ok(transition.status)
            }
            Err(source) => {
                let transition = state.rollback(&in_flight);
                drop(state);
                warn!(
                    target: "pldbg",
                    session = %self.key,
                    command = %in_flight.command,
                    code = source.code(),
                    error = %source,
                    "debug_command_failed"
                );
                self.publish(transition);
                self.notify_failure(in_flight.command, &source);
                Err(DebugError::GatewayFailure {
                    command: in_flight.command,
                    source,
                })
            }
        }
    }

    async fn shut_down(&self, command: DebugCommand) -> Result<DebugStatus, DebugError> {
        let live_run = {
            let mut state = self.lock_state();
            state.guard(command)?;
            if state.status.has_live_run() {
                let (_, transition) = state.begin(command);
                drop(state);
                self.publish(transition);
                true
            } else {
                false
            }
        };

        let failure = if live_run {
            self.bindings.gateway.exit().await.err()
        } else {
            None
        };

        let tear_down = command == DebugCommand::Exit;
        let (transition, snapshot) = {
            let mut state = self.lock_state();
            state.epoch = state.epoch.wrapping_add(1);
            let transition = state.transition(DebugStatus::Terminated);
            let snapshot = if tear_down {
                state.closed = true;
                state.breakpoints.clear();
                state.snapshot.take()
            } else {
                None
            };
            (transition, snapshot)
        };
        self.publish(transition);

        if let Some(error) = &failure {
            warn!(
                target: "pldbg",
                session = %self.key,
                %command,
                error = %error,
                "remote_exit_failed_forcing_termination"
            );
            self.notify_failure(command, error);
        }

        if tear_down {
            for subscriber in self.subscriber_snapshot() {
                subscriber.on_decorations_cleared(&self.key);
            }
            if let Some(content) = snapshot {
                self.bindings.surface.set_content(&content);
            }
            self.detach();
        }

        match failure {
            Some(source) => Err(DebugError::GatewayFailure { command, source }),
            None => Ok(DebugStatus::Terminated),
        }
    }

    fn launch_target(&self, command: DebugCommand) -> Result<PlSchema, DebugError> {
        self.ensure_saved(command)?;
        let schema = self.bindings.surface.formatted_target();
        if schema.name.is_none()
            && !self
                .bindings
                .parser
                .parse_as_anonymous_block(&schema.ddl)
                .is_anonymous_block
        {
            return Err(self.refuse(command, Precondition::NotAnAnonymousBlock));
        }
        Ok(schema)
    }

    fn ensure_saved(&self, command: DebugCommand) -> Result<(), DebugError> {
        if self.bindings.surface.is_saved() {
            Ok(())
        } else {
            Err(self.refuse(command, Precondition::UnsavedChanges))
        }
    }

    fn refuse(&self, command: DebugCommand, precondition: Precondition) -> DebugError {
        debug!(
            target: "pldbg",
            session = %self.key,
            %command,
            reason = %precondition,
            "debug_command_refused"
        );
        DebugError::PreconditionFailed(precondition)
    }

    fn publish(&self, transition: Transition) {
        debug!(
            target: "pldbg",
            session = %self.key,
            status = %transition.status,
            line = ?transition.location.map(|location| location.line),
            "debug_transition"
        );
        for subscriber in self.subscriber_snapshot() {
            subscriber.on_transition(&self.key, transition.status, transition.location);
        }
    }

    fn notify_failure(&self, command: DebugCommand, error: &GatewayError) {
        for subscriber in self.subscriber_snapshot() {
            subscriber.on_failure(&self.key, command, error);
        }
    }

    fn subscriber_snapshot(&self) -> Vec<Arc<dyn DebugSubscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn detach(&self) {
        let Some(sessions) = self.registry.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let mut sessions = sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let registered_here = sessions
            .get(&self.key)
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), self));
        if registered_here {
            sessions.remove(&self.key);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::sync::Notify;

    use super::{DebugSession, SessionBindings, SessionKey};
    use crate::error::{DebugError, Precondition};
    use crate::gateway::{DebugCommandGateway, GatewayError};
    use crate::status::{DebugCommand, DebugLocation, DebugStatus, GatewayOutcome};
    use crate::subscriber::DebugSubscriber;
    use crate::surface::{AnonymousBlockCheck, EditingSurface, PlParser};
    use crate::target::{PlKind, PlSchema};

    pub(crate) const BLOCK: &str = "BEGIN\n  x := 1;\n  y := 2;\n  z := 3;\nEND;";

    #[derive(Debug, Default)]
    pub(crate) struct FakeGateway {
        outcomes: Mutex<VecDeque<Result<GatewayOutcome, GatewayError>>>,
        hold: Mutex<Option<Arc<Notify>>>,
        pub(crate) start_lines: Mutex<Vec<Vec<u32>>>,
        pub(crate) start_ddl: Mutex<Vec<String>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) exit_calls: AtomicUsize,
        pub(crate) fail_exit: AtomicBool,
    }

    impl FakeGateway {
        pub(crate) fn push(&self, outcome: Result<GatewayOutcome, GatewayError>) {
            self.outcomes
                .lock()
                .expect("outcomes lock")
                .push_back(outcome);
        }

        pub(crate) fn paused_at(&self, line: u32) {
            self.push(Ok(GatewayOutcome::Paused(DebugLocation::at_line(line))));
        }

        pub(crate) fn hold_next(&self) -> Arc<Notify> {
            let notify = Arc::new(Notify::new());
            *self.hold.lock().expect("hold lock") = Some(Arc::clone(&notify));
            notify
        }

        async fn next(&self) -> Result<GatewayOutcome, GatewayError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let hold = self.hold.lock().expect("hold lock").take();
            if let Some(notify) = hold {
                notify.notified().await;
            }
            self.outcomes
                .lock()
                .expect("outcomes lock")
                .pop_front()
                .unwrap_or(Ok(GatewayOutcome::Terminated))
        }
    }

    #[async_trait::async_trait]
    impl DebugCommandGateway for FakeGateway {
        async fn start(
            &self,
            target: &PlSchema,
            breakpoint_lines: &[u32],
        ) -> Result<GatewayOutcome, GatewayError> {
            self.start_ddl
                .lock()
                .expect("ddl lock")
                .push(target.ddl.clone());
            self.start_lines
                .lock()
                .expect("lines lock")
                .push(breakpoint_lines.to_vec());
            self.next().await
        }

        async fn step_in(&self) -> Result<GatewayOutcome, GatewayError> {
            self.next().await
        }

        async fn step_out(&self) -> Result<GatewayOutcome, GatewayError> {
            self.next().await
        }

        async fn step_over(&self) -> Result<GatewayOutcome, GatewayError> {
            self.next().await
        }

        async fn resume(&self) -> Result<GatewayOutcome, GatewayError> {
            self.next().await
        }

        async fn exit(&self) -> Result<(), GatewayError> {
            self.exit_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_exit.load(Ordering::Relaxed) {
                return Err(GatewayError::new("DEBUG_SESSION_LOST", "session lost"));
            }
            Ok(())
        }

        async fn retry(
            &self,
            target: &PlSchema,
            breakpoint_lines: &[u32],
        ) -> Result<GatewayOutcome, GatewayError> {
            self.start(target, breakpoint_lines).await
        }
    }

    #[derive(Debug)]
    pub(crate) struct FakeSurface {
        pub(crate) saved: AtomicBool,
        pub(crate) content: Mutex<String>,
        schema: PlSchema,
    }

    impl FakeSurface {
        pub(crate) fn new(schema: PlSchema) -> Self {
            Self {
                saved: AtomicBool::new(true),
                content: Mutex::new(schema.ddl.clone()),
                schema,
            }
        }
    }

    impl EditingSurface for FakeSurface {
        fn is_saved(&self) -> bool {
            self.saved.load(Ordering::Relaxed)
        }

        fn content(&self) -> String {
            self.content.lock().expect("content lock").clone()
        }

        fn set_content(&self, content: &str) {
            *self.content.lock().expect("content lock") = content.to_string();
        }

        fn formatted_target(&self) -> PlSchema {
            PlSchema {
                ddl: self.content(),
                ..self.schema.clone()
            }
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct FakeParser {
        pub(crate) reject: AtomicBool,
        pub(crate) calls: AtomicUsize,
    }

    impl PlParser for FakeParser {
        fn parse_as_anonymous_block(&self, _source: &str) -> AnonymousBlockCheck {
            self.calls.fetch_add(1, Ordering::Relaxed);
            AnonymousBlockCheck {
                is_anonymous_block: !self.reject.load(Ordering::Relaxed),
            }
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingSubscriber {
        pub(crate) transitions: Mutex<Vec<(DebugStatus, Option<DebugLocation>)>>,
        pub(crate) failures: Mutex<Vec<DebugCommand>>,
        pub(crate) cleared: AtomicUsize,
    }

    impl RecordingSubscriber {
        pub(crate) fn statuses(&self) -> Vec<DebugStatus> {
            self.transitions
                .lock()
                .expect("transitions lock")
                .iter()
                .map(|(status, _)| *status)
                .collect()
        }
    }

    impl DebugSubscriber for RecordingSubscriber {
        fn on_transition(
            &self,
            _key: &SessionKey,
            status: DebugStatus,
            location: Option<DebugLocation>,
        ) {
            self.transitions
                .lock()
                .expect("transitions lock")
                .push((status, location));
        }

        fn on_failure(&self, _key: &SessionKey, command: DebugCommand, _error: &GatewayError) {
            self.failures.lock().expect("failures lock").push(command);
        }

        fn on_decorations_cleared(&self, _key: &SessionKey) {
            self.cleared.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) struct Fixture {
        pub(crate) session: Arc<DebugSession>,
        pub(crate) gateway: Arc<FakeGateway>,
        pub(crate) surface: Arc<FakeSurface>,
        pub(crate) parser: Arc<FakeParser>,
        pub(crate) events: Arc<RecordingSubscriber>,
    }

    pub(crate) fn bindings_for(
        schema: PlSchema,
    ) -> (SessionBindings, Arc<FakeGateway>, Arc<FakeSurface>, Arc<FakeParser>) {
        let gateway = Arc::new(FakeGateway::default());
        let surface = Arc::new(FakeSurface::new(schema));
        let parser = Arc::new(FakeParser::default());
        let bindings = SessionBindings {
            surface: Arc::clone(&surface) as _,
            gateway: Arc::clone(&gateway) as _,
            parser: Arc::clone(&parser) as _,
        };
        (bindings, gateway, surface, parser)
    }

    fn fixture(schema: PlSchema) -> Fixture {
        let (bindings, gateway, surface, parser) = bindings_for(schema);
        let session = Arc::new(DebugSession::new("page-1", bindings));
        let events = Arc::new(RecordingSubscriber::default());
        session.subscribe(Arc::clone(&events) as _);
        Fixture {
            session,
            gateway,
            surface,
            parser,
            events,
        }
    }

    async fn paused_fixture(line: u32) -> Fixture {
        let fx = fixture(PlSchema::anonymous(BLOCK));
        fx.gateway.paused_at(line);
        fx.session.start().await.expect("start should succeed");
        fx
    }

    #[tokio::test]
    async fn anonymous_block_scenario_from_unsaved_to_retry() {
        let fx = fixture(PlSchema::anonymous(BLOCK));
        fx.surface.saved.store(false, Ordering::Relaxed);

        let err = fx.session.start().await.expect_err("unsaved start must fail");
        assert!(matches!(
            err,
            DebugError::PreconditionFailed(Precondition::UnsavedChanges)
        ));
        assert_eq!(fx.session.status(), DebugStatus::Init);
        assert_eq!(fx.gateway.calls.load(Ordering::Relaxed), 0);

        fx.surface.saved.store(true, Ordering::Relaxed);
        fx.gateway.paused_at(3);
        let status = fx.session.start().await.expect("start should succeed");
        assert_eq!(status, DebugStatus::Paused);
        assert_eq!(
            fx.session.current_location(),
            Some(DebugLocation::at_line(3))
        );

        fx.gateway.push(Ok(GatewayOutcome::Terminated));
        let status = fx.session.step_over().await.expect("step over should succeed");
        assert_eq!(status, DebugStatus::Terminated);
        assert_eq!(fx.session.current_location(), None);

        fx.gateway.paused_at(2);
        let status = fx.session.retry().await.expect("retry should succeed");
        assert_eq!(status, DebugStatus::Paused);
        assert_eq!(
            fx.session.current_location(),
            Some(DebugLocation::at_line(2))
        );

        assert_eq!(
            fx.events.statuses(),
            vec![
                DebugStatus::Starting,
                DebugStatus::Paused,
                DebugStatus::StepOver,
                DebugStatus::Terminated,
                DebugStatus::Recover,
                DebugStatus::Starting,
                DebugStatus::Paused,
            ]
        );
    }

    #[tokio::test]
    async fn location_is_published_only_with_location_carrying_statuses() {
        let fx = paused_fixture(2).await;
        fx.gateway.paused_at(3);
        fx.session.step_in().await.expect("step in");
        fx.gateway.push(Ok(GatewayOutcome::Running));
        fx.session.resume().await.expect("resume");
        fx.session.terminate().await.expect("terminate");

        let transitions = fx.events.transitions.lock().expect("lock").clone();
        assert!(!transitions.is_empty());
        for (status, location) in transitions {
            assert_eq!(
                location.is_some(),
                status.carries_location(),
                "location mismatch for {status}"
            );
        }
    }

    #[tokio::test]
    async fn second_step_in_while_in_flight_is_rejected_busy() {
        let fx = paused_fixture(2).await;
        let release = fx.gateway.hold_next();
        fx.gateway.paused_at(3);

        let session = Arc::clone(&fx.session);
        let (first, ()) = tokio::join!(fx.session.step_in(), async move {
            tokio::task::yield_now().await;
            assert_eq!(session.status(), DebugStatus::StepIn);
            let err = session
                .step_in()
                .await
                .expect_err("overlapping step must be rejected");
            assert!(matches!(
                err,
                DebugError::CommandRejectedBusy {
                    command: DebugCommand::StepIn,
                    status: DebugStatus::StepIn,
                }
            ));
            assert_eq!(session.status(), DebugStatus::StepIn);
            release.notify_one();
        });

        assert_eq!(first.expect("first step completes"), DebugStatus::Paused);
        // start + the single accepted step
        assert_eq!(fx.gateway.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn failed_step_rolls_back_to_paused_at_same_line() {
        let fx = paused_fixture(4).await;
        fx.gateway
            .push(Err(GatewayError::new("PL_DEBUG_TIMEOUT", "no response")));

        let err = fx.session.step_out().await.expect_err("step out fails");
        assert!(matches!(
            err,
            DebugError::GatewayFailure {
                command: DebugCommand::StepOut,
                ..
            }
        ));
        assert_eq!(fx.session.status(), DebugStatus::Paused);
        assert_eq!(
            fx.session.current_location(),
            Some(DebugLocation::at_line(4))
        );
        assert_eq!(
            *fx.events.failures.lock().expect("lock"),
            vec![DebugCommand::StepOut]
        );
    }

    #[tokio::test]
    async fn failed_resume_keeps_location() {
        let fx = paused_fixture(2).await;
        fx.gateway.push(Err(GatewayError::new("E", "resume failed")));

        fx.session.resume().await.expect_err("resume fails");
        assert_eq!(fx.session.status(), DebugStatus::Paused);
        assert_eq!(
            fx.session.current_location(),
            Some(DebugLocation::at_line(2))
        );
    }

    #[tokio::test]
    async fn failed_start_returns_to_init() {
        let fx = fixture(PlSchema::anonymous(BLOCK));
        fx.gateway
            .push(Err(GatewayError::new("NO_PRIVILEGE", "debug not granted")));

        fx.session.start().await.expect_err("start fails");
        assert_eq!(fx.session.status(), DebugStatus::Init);
        assert_eq!(fx.session.current_location(), None);
    }

    #[tokio::test]
    async fn start_refuses_source_that_is_not_an_anonymous_block() {
        let fx = fixture(PlSchema::anonymous("SELECT 1 FROM dual"));
        fx.parser.reject.store(true, Ordering::Relaxed);

        let err = fx.session.start().await.expect_err("start must be refused");
        assert!(matches!(
            err,
            DebugError::PreconditionFailed(Precondition::NotAnAnonymousBlock)
        ));
        assert_eq!(fx.session.status(), DebugStatus::Init);
        assert_eq!(fx.gateway.calls.load(Ordering::Relaxed), 0);
        assert!(fx.events.statuses().is_empty());
    }

    #[tokio::test]
    async fn named_targets_skip_the_anonymous_block_parse() {
        let fx = fixture(PlSchema::named(
            PlKind::Procedure,
            "refresh_totals",
            "CREATE PROCEDURE refresh_totals IS BEGIN NULL; END;",
        ));
        fx.gateway.paused_at(1);

        fx.session.start().await.expect("start should succeed");
        assert_eq!(fx.parser.calls.load(Ordering::Relaxed), 0);
        assert_eq!(
            fx.session.target().and_then(|target| target.name),
            Some("refresh_totals".to_string())
        );
    }

    #[tokio::test]
    async fn steps_require_saved_surface() {
        let fx = paused_fixture(2).await;
        fx.surface.saved.store(false, Ordering::Relaxed);

        let err = fx.session.step_in().await.expect_err("unsaved step");
        assert!(matches!(err, DebugError::PreconditionFailed(_)));
        assert_eq!(fx.session.status(), DebugStatus::Paused);
    }

    #[tokio::test]
    async fn commands_outside_the_transition_table_are_not_allowed() {
        let fx = fixture(PlSchema::anonymous(BLOCK));
        let err = fx.session.step_over().await.expect_err("no run yet");
        assert!(matches!(
            err,
            DebugError::CommandNotAllowed {
                command: DebugCommand::StepOver,
                status: DebugStatus::Init,
            }
        ));

        let err = fx.session.retry().await.expect_err("retry from init");
        assert!(matches!(err, DebugError::CommandNotAllowed { .. }));

        fx.gateway.paused_at(2);
        fx.session.start().await.expect("start");
        let err = fx.session.retry().await.expect_err("retry from paused");
        assert!(matches!(err, DebugError::CommandNotAllowed { .. }));
        assert_eq!(fx.session.status(), DebugStatus::Paused);
    }

    #[tokio::test]
    async fn resume_runs_until_stop_is_reported() {
        let fx = paused_fixture(2).await;
        fx.gateway.push(Ok(GatewayOutcome::Running));

        let status = fx.session.resume().await.expect("resume");
        assert_eq!(status, DebugStatus::Running);
        assert_eq!(fx.session.current_location(), None);

        assert!(fx
            .session
            .report_stop(GatewayOutcome::Paused(DebugLocation::at_line(4))));
        assert_eq!(fx.session.status(), DebugStatus::Paused);
        assert_eq!(
            fx.session.current_location(),
            Some(DebugLocation::at_line(4))
        );
        assert!(!fx.session.report_stop(GatewayOutcome::Terminated));
    }

    #[tokio::test]
    async fn exit_while_running_drops_the_late_resume_outcome() {
        let fx = paused_fixture(2).await;
        let release = fx.gateway.hold_next();
        fx.gateway.paused_at(4);

        let session = Arc::clone(&fx.session);
        let (resumed, exited) = tokio::join!(fx.session.resume(), async move {
            tokio::task::yield_now().await;
            assert_eq!(session.status(), DebugStatus::Running);
            let exited = session.exit().await;
            release.notify_one();
            exited
        });

        assert_eq!(exited.expect("exit succeeds"), DebugStatus::Terminated);
        assert_eq!(resumed.expect("stale resume"), DebugStatus::Terminated);
        assert_eq!(fx.session.status(), DebugStatus::Terminated);
        assert_eq!(fx.session.current_location(), None);
    }

    #[tokio::test]
    async fn exit_restores_snapshot_and_clears_breakpoints() {
        let fx = fixture(PlSchema::anonymous(BLOCK));
        fx.session.add_breakpoint(3);
        fx.gateway.paused_at(3);
        fx.session.start().await.expect("start");
        fx.surface.set_content("-- scratch while paused");

        let status = fx.session.exit().await.expect("exit");
        assert_eq!(status, DebugStatus::Terminated);
        assert!(fx.session.breakpoints().is_empty());
        assert_eq!(fx.surface.content(), BLOCK);
        assert_eq!(fx.events.cleared.load(Ordering::Relaxed), 1);
        assert_eq!(fx.gateway.exit_calls.load(Ordering::Relaxed), 1);
        assert!(fx.session.is_closed());

        let err = fx.session.retry().await.expect_err("closed session");
        assert!(matches!(err, DebugError::CommandNotAllowed { .. }));
    }

    #[tokio::test]
    async fn failed_remote_exit_still_terminates() {
        let fx = paused_fixture(2).await;
        fx.gateway.fail_exit.store(true, Ordering::Relaxed);

        let err = fx.session.exit().await.expect_err("remote exit fails");
        assert!(matches!(
            err,
            DebugError::GatewayFailure {
                command: DebugCommand::Exit,
                ..
            }
        ));
        assert_eq!(fx.session.status(), DebugStatus::Terminated);
        assert_eq!(fx.session.current_location(), None);
        assert_eq!(fx.events.cleared.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn exit_without_live_run_skips_the_engine() {
        let fx = fixture(PlSchema::anonymous(BLOCK));
        fx.session.exit().await.expect("exit from init");
        assert_eq!(fx.gateway.exit_calls.load(Ordering::Relaxed), 0);
        assert_eq!(fx.session.status(), DebugStatus::Terminated);
    }

    #[tokio::test]
    async fn terminate_then_retry_preserves_breakpoints() {
        let fx = fixture(PlSchema::anonymous(BLOCK));
        fx.session.add_breakpoint(2);
        fx.session.add_breakpoint(4);
        fx.session.toggle_breakpoint_enabled(4);
        fx.gateway.paused_at(2);
        fx.session.start().await.expect("start");

        fx.session.terminate().await.expect("terminate");
        assert_eq!(fx.session.status(), DebugStatus::Terminated);
        assert!(!fx.session.is_closed());

        fx.gateway.paused_at(2);
        fx.session.retry().await.expect("retry");

        assert_eq!(fx.session.breakpoints().list(), vec![2, 4]);
        assert_eq!(
            *fx.gateway.start_lines.lock().expect("lock"),
            vec![vec![2], vec![2]]
        );
    }

    #[tokio::test]
    async fn retry_launches_the_content_saved_after_the_last_run() {
        let fx = fixture(PlSchema::anonymous("BEGIN\n  a := 1;\nEND;"));
        fx.gateway.push(Ok(GatewayOutcome::Terminated));
        fx.session.start().await.expect("start");
        assert_eq!(fx.session.status(), DebugStatus::Terminated);

        fx.surface.set_content(BLOCK);
        fx.surface.saved.store(false, Ordering::Relaxed);
        let err = fx.session.retry().await.expect_err("unsaved retry");
        assert!(matches!(
            err,
            DebugError::PreconditionFailed(Precondition::UnsavedChanges)
        ));
        assert_eq!(fx.session.status(), DebugStatus::Terminated);
        assert_eq!(fx.gateway.calls.load(Ordering::Relaxed), 1);

        fx.surface.saved.store(true, Ordering::Relaxed);
        fx.gateway.paused_at(2);
        fx.session.retry().await.expect("retry");
        assert_eq!(
            *fx.gateway.start_ddl.lock().expect("lock"),
            vec!["BEGIN\n  a := 1;\nEND;".to_string(), BLOCK.to_string()]
        );
        assert_eq!(fx.parser.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn retry_refuses_content_that_is_no_longer_a_block() {
        let fx = fixture(PlSchema::anonymous(BLOCK));
        fx.gateway.push(Ok(GatewayOutcome::Terminated));
        fx.session.start().await.expect("start");

        fx.parser.reject.store(true, Ordering::Relaxed);
        let err = fx.session.retry().await.expect_err("retry must be refused");
        assert!(matches!(
            err,
            DebugError::PreconditionFailed(Precondition::NotAnAnonymousBlock)
        ));
        assert_eq!(fx.session.status(), DebugStatus::Terminated);
    }

    #[tokio::test]
    async fn failed_retry_returns_to_terminated() {
        let fx = fixture(PlSchema::anonymous(BLOCK));
        fx.gateway.push(Ok(GatewayOutcome::Terminated));
        fx.session.start().await.expect("start");
        fx.gateway
            .push(Err(GatewayError::new("PL_DEBUG_TIMEOUT", "engine did not answer")));

        fx.session.retry().await.expect_err("retry fails");
        assert_eq!(fx.session.status(), DebugStatus::Terminated);
        assert_eq!(
            fx.events.statuses()[2..],
            [
                DebugStatus::Recover,
                DebugStatus::Starting,
                DebugStatus::Terminated,
            ]
        );
    }
}
