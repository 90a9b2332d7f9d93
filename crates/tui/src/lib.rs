use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use pldbg_adapters::{BufferSurface, KeywordPlParser, SimulatedGateway, SimulatedGatewayConfig};
use pldbg_core::breakpoints::Breakpoint;
use pldbg_core::gateway::GatewayError;
use pldbg_core::surface::EditingSurface;
use pldbg_core::toolbar::{ToolbarCommand, ToolbarItem};
use pldbg_core::{
    ActionVisualState, DebugCommand, DebugError, DebugLocation, DebugSession,
    DebugSessionRegistry, DebugStatus, DebugSubscriber, FileDebugJournal, SessionBindings,
    SessionKey, Settings, ToolbarAction, ToolbarActionBinder, ToolbarContext,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::{Frame, Terminal};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

const TICK_RATE: Duration = Duration::from_millis(120);
const SESSION_KEY: &str = "main";

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),
}

pub struct TuiOptions {
    pub title: String,
    pub surface: Arc<BufferSurface>,
    pub settings: Settings,
    pub journal: Option<FileDebugJournal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum UiEvent {
    Transition {
        status: DebugStatus,
        line: Option<u32>,
    },
    Failure {
        command: DebugCommand,
        message: String,
    },
    DecorationsCleared,
    Finished {
        command: DebugCommand,
        result: Result<DebugStatus, String>,
    },
}

struct ChannelSubscriber {
    events: UnboundedSender<UiEvent>,
}

impl ChannelSubscriber {
    fn forward(&self, event: UiEvent) {
        if self.events.send(event).is_err() {
            debug!(target: "pldbg", "ui_event_dropped");
        }
    }
}

impl DebugSubscriber for ChannelSubscriber {
    fn on_transition(
        &self,
        _key: &SessionKey,
        status: DebugStatus,
        location: Option<DebugLocation>,
    ) {
        self.forward(UiEvent::Transition {
            status,
            line: location.map(|location| location.line),
        });
    }

    fn on_failure(&self, _key: &SessionKey, command: DebugCommand, error: &GatewayError) {
        self.forward(UiEvent::Failure {
            command,
            message: error.to_string(),
        });
    }

    fn on_decorations_cleared(&self, _key: &SessionKey) {
        self.forward(UiEvent::DecorationsCleared);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    Navigate(DirectionKey),
    ToggleBreakpoint,
    ToggleBreakpointEnabled,
    Invoke(ToolbarAction),
    Confirm(bool),
    Tick,
}

struct TuiApp {
    title: String,
    runtime: Runtime,
    registry: DebugSessionRegistry,
    surface: Arc<BufferSurface>,
    gateway: Arc<SimulatedGateway>,
    binder: ToolbarActionBinder,
    settings: Settings,
    key: SessionKey,
    events_tx: UnboundedSender<UiEvent>,
    events_rx: UnboundedReceiver<UiEvent>,
    cursor: usize,
    pending_confirmation: Option<ToolbarAction>,
    show_help: bool,
    should_quit: bool,
    status_line: String,
}

impl TuiApp {
    fn new(options: TuiOptions) -> Result<Self, TuiError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .map_err(TuiError::Runtime)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = DebugSessionRegistry::new();
        registry.subscribe(Arc::new(ChannelSubscriber {
            events: events_tx.clone(),
        }));
        if let Some(journal) = options.journal {
            registry.subscribe(Arc::new(journal));
        }

        let gateway = Arc::new(SimulatedGateway::new(SimulatedGatewayConfig {
            latency: Duration::from_millis(options.settings.simulated_latency_ms),
            ..SimulatedGatewayConfig::default()
        }));

        Ok(Self {
            title: options.title,
            runtime,
            registry,
            surface: options.surface,
            gateway,
            binder: ToolbarActionBinder::new(),
            settings: options.settings,
            key: SessionKey::from(SESSION_KEY),
            events_tx,
            events_rx,
            cursor: 0,
            pending_confirmation: None,
            show_help: false,
            should_quit: false,
            status_line: "b: breakpoint  d: debug  ?: help".to_string(),
        })
    }

    fn handle(&mut self, msg: Msg) {
        if let Some(action) = self.pending_confirmation.take() {
            match msg {
                Msg::Confirm(true) => self.invoke(action, true),
                Msg::Tick => {
                    self.pending_confirmation = Some(action);
                    self.drain_events();
                }
                _ => self.status_line = "Cancelled".to_string(),
            }
            return;
        }

        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::Navigate(direction) => self.navigate(direction),
            Msg::ToggleBreakpoint => {
                let line = self.cursor_line();
                let present = self.session_or_create().toggle_breakpoint(line);
                self.status_line = if present {
                    format!("Breakpoint set on line {line}")
                } else {
                    format!("Breakpoint removed from line {line}")
                };
            }
            Msg::ToggleBreakpointEnabled => {
                let line = self.cursor_line();
                self.session_or_create().toggle_breakpoint_enabled(line);
            }
            Msg::Invoke(action) => self.invoke(action, false),
            Msg::Confirm(_) => {}
            Msg::Tick => self.drain_events(),
        }
    }

    fn navigate(&mut self, direction: DirectionKey) {
        let last = self.surface.lines().len().saturating_sub(1);
        self.cursor = match direction {
            DirectionKey::Up => self.cursor.saturating_sub(1),
            DirectionKey::Down => (self.cursor + 1).min(last),
        };
    }

    fn cursor_line(&self) -> u32 {
        u32::try_from(self.cursor + 1).unwrap_or(u32::MAX)
    }

    fn session(&self) -> Option<Arc<DebugSession>> {
        self.registry.get(&self.key).ok()
    }

    fn session_or_create(&self) -> Arc<DebugSession> {
        let surface = Arc::clone(&self.surface);
        let gateway = Arc::clone(&self.gateway);
        self.registry.get_or_create(self.key.clone(), move || SessionBindings {
            surface,
            gateway,
            parser: Arc::new(KeywordPlParser::new()),
        })
    }

    fn toolbar_context(&self) -> ToolbarContext {
        ToolbarContext::for_schema(&self.surface.formatted_target(), self.settings.capabilities())
            .with_status(self.session().map(|session| session.status()))
    }

    fn invoke(&mut self, action: ToolbarAction, confirmed: bool) {
        let context = self.toolbar_context();
        let command = match self.binder.invoke(action, &context) {
            Ok(command) => command,
            Err(error) => {
                self.status_line = error.to_string();
                return;
            }
        };

        if !confirmed {
            if let Some(prompt) = self
                .binder
                .find(action)
                .and_then(|definition| definition.confirmation)
            {
                self.pending_confirmation = Some(action);
                self.status_line = format!("{prompt} (y/n)");
                return;
            }
        }

        match command {
            ToolbarCommand::Session(command) => self.dispatch(command),
            ToolbarCommand::Save => self.save(),
            ToolbarCommand::Compile => {
                self.status_line = format!(
                    "Compile of {} needs a database connection",
                    self.surface.formatted_target().target()
                );
            }
            ToolbarCommand::Execute => {
                self.status_line = format!(
                    "Run of {} needs a database connection",
                    self.surface.formatted_target().target()
                );
            }
        }
    }

    fn save(&mut self) {
        self.status_line = match self.surface.save() {
            Ok(()) => "Saved".to_string(),
            Err(error) => {
                warn!(target: "pldbg", error = %error, "save_failed");
                error.to_string()
            }
        };
    }

    fn dispatch(&mut self, command: DebugCommand) {
        let session = self.session_or_create();
        let events = self.events_tx.clone();
        info!(target: "pldbg", session = %self.key, %command, "ui_command");
        self.runtime.spawn(async move {
            let result = session.execute(command).await;
            let Some(event) = finished_event(command, result) else {
                return;
            };
            if events.send(event).is_err() {
                debug!(target: "pldbg", %command, "ui_event_dropped");
            }
        });
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Transition { status, line } => {
                if let Some(line) = line {
                    self.cursor = usize::try_from(line.saturating_sub(1)).unwrap_or(0);
                }
                self.status_line = status.to_string();
            }
            UiEvent::Failure { command, message } => {
                self.status_line = format!("{command} failed: {message}");
            }
            UiEvent::DecorationsCleared => {
                self.status_line = "Left debug mode".to_string();
            }
            UiEvent::Finished { command, result } => match result {
                Ok(status) => self.status_line = format!("{command}: {status}"),
                Err(message) => self.status_line = message,
            },
        }
    }

    fn shutdown(&self) {
        let result = self.runtime.block_on(self.registry.close_surface(&self.key));
        if let Err(error) = result {
            debug!(target: "pldbg", error = %error, "shutdown_exit_failed");
        }
    }
}

fn finished_event(
    command: DebugCommand,
    result: Result<DebugStatus, DebugError>,
) -> Option<UiEvent> {
    match result {
        Ok(status) => Some(UiEvent::Finished {
            command,
            result: Ok(status),
        }),
        Err(error) if error.is_user_facing() => Some(UiEvent::Finished {
            command,
            result: Err(error.to_string()),
        }),
        Err(error) => {
            debug!(target: "pldbg", %command, error = %error, "ui_command_rejected");
            None
        }
    }
}

pub fn run(options: TuiOptions) -> Result<(), TuiError> {
    let mut app = TuiApp::new(options)?;
    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &mut app);
    let restore_result = restore_terminal(&mut terminal);
    app.shutdown();

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<B: Backend>(terminal: &mut Terminal<B>, app: &mut TuiApp) -> Result<(), TuiError> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|frame| render(frame, app))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(message) = map_key_event(key) {
                        app.handle(message);
                    }
                }
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            app.handle(Msg::Tick);
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn render(frame: &mut Frame<'_>, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(4),
        ])
        .split(frame.area());

    let session = app.session();
    let status = session
        .as_ref()
        .map_or("no session".to_string(), |session| session.status().to_string());
    let location = session.as_ref().and_then(|session| session.current_location());
    let breakpoints = session
        .as_ref()
        .map(|session| session.breakpoints())
        .unwrap_or_default();

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" {} ", app.surface.formatted_target().target()),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!("Status: {status}")),
        Span::raw(" | "),
        Span::raw(format!(
            "Line: {}",
            location.map_or("-".to_string(), |location| location.line.to_string())
        )),
        Span::raw(" | "),
        Span::raw(if app.surface.is_saved() {
            "saved"
        } else {
            "unsaved"
        }),
    ]))
    .block(Block::default().borders(Borders::ALL).title(app.title.as_str()));
    frame.render_widget(header, chunks[0]);

    let source = app.surface.lines();
    let height = usize::from(chunks[1].height.saturating_sub(2)).max(1);
    let start = visible_window(app.cursor, source.len(), height);
    let current_line = location.map(|location| location.line);
    let body_lines: Vec<Line<'_>> = source
        .iter()
        .enumerate()
        .skip(start)
        .take(height)
        .map(|(index, text)| {
            let line = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let is_current = current_line == Some(line);
            let marker = gutter_marker(breakpoints.get(line), is_current);
            let mut style = Style::default();
            if is_current {
                style = style.bg(Color::Blue).fg(Color::White);
            }
            if index == app.cursor {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Red)),
                Span::styled(format!(" {line:>4} | {text}"), style),
            ])
        })
        .collect();
    let body = Paragraph::new(body_lines)
        .block(Block::default().borders(Borders::ALL).title("Source"))
        .alignment(Alignment::Left);
    frame.render_widget(body, chunks[1]);

    let toolbar = app.binder.toolbar(&app.toolbar_context());
    let footer = Paragraph::new(vec![
        toolbar_line(&toolbar),
        Line::from(format!("Status: {}", app.status_line)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Toolbar"));
    frame.render_widget(footer, chunks[2]);

    if app.show_help {
        render_help_popup(frame);
    }
}

fn toolbar_line(items: &[ToolbarItem]) -> Line<'static> {
    let spans = items
        .iter()
        .map(|item| {
            let style = match item.state {
                ActionVisualState::Running => Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
                ActionVisualState::Enabled => Style::default().fg(Color::White),
                ActionVisualState::Disabled => Style::default().fg(Color::DarkGray),
            };
            Span::styled(
                format!("[{}] {}  ", item.action.shortcut, item.action.title),
                style,
            )
        })
        .collect::<Vec<_>>();
    Line::from(spans)
}

fn gutter_marker(breakpoint: Option<Breakpoint>, is_current: bool) -> &'static str {
    match (breakpoint.map(|breakpoint| breakpoint.enabled), is_current) {
        (Some(true), true) => "●▶",
        (Some(true), false) => "● ",
        (Some(false), true) => "○▶",
        (Some(false), false) => "○ ",
        (None, true) => " ▶",
        (None, false) => "  ",
    }
}

fn visible_window(cursor: usize, total: usize, height: usize) -> usize {
    if total <= height {
        return 0;
    }
    cursor
        .saturating_sub(height / 2)
        .min(total.saturating_sub(height))
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Keymap"),
        Line::from("q: quit (ends any debug run)"),
        Line::from("?: toggle help"),
        Line::from("Arrows or jk: move cursor"),
        Line::from("b / Space: toggle breakpoint, B: enable/disable it"),
        Line::from("d / F5: debug, r / F8: resume"),
        Line::from("i / F11: step in, o / Shift+F11: step out, p / F10: step over"),
        Line::from("e: end debugging, R: debug again, x: exit debug mode"),
        Line::from("s / Ctrl+S: save, c: compile, Enter: run"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn map_key_event(key: KeyEvent) -> Option<Msg> {
    match (key.modifiers, key.code) {
        (_, KeyCode::Char('q')) => Some(Msg::Quit),
        (_, KeyCode::Char('s')) => Some(Msg::Invoke(ToolbarAction::Save)),
        (_, KeyCode::Char('?')) => Some(Msg::ToggleHelp),
        (_, KeyCode::Up | KeyCode::Char('k')) => Some(Msg::Navigate(DirectionKey::Up)),
        (_, KeyCode::Down | KeyCode::Char('j')) => Some(Msg::Navigate(DirectionKey::Down)),
        (_, KeyCode::Char('b' | ' ')) => Some(Msg::ToggleBreakpoint),
        (_, KeyCode::Char('B')) => Some(Msg::ToggleBreakpointEnabled),
        (_, KeyCode::Char('d') | KeyCode::F(5)) => Some(Msg::Invoke(ToolbarAction::Debug)),
        (_, KeyCode::Char('r') | KeyCode::F(8)) => Some(Msg::Invoke(ToolbarAction::DebugResume)),
        (KeyModifiers::SHIFT, KeyCode::F(11)) | (_, KeyCode::Char('o')) => {
            Some(Msg::Invoke(ToolbarAction::DebugStepOut))
        }
        (_, KeyCode::Char('i') | KeyCode::F(11)) => Some(Msg::Invoke(ToolbarAction::DebugStepIn)),
        (_, KeyCode::Char('p') | KeyCode::F(10)) => {
            Some(Msg::Invoke(ToolbarAction::DebugStepOver))
        }
        (_, KeyCode::Char('e')) => Some(Msg::Invoke(ToolbarAction::DebugEnd)),
        (_, KeyCode::Char('R')) => Some(Msg::Invoke(ToolbarAction::DebugRetry)),
        (_, KeyCode::Char('x')) => Some(Msg::Invoke(ToolbarAction::DebugExit)),
        (_, KeyCode::Char('c')) => Some(Msg::Invoke(ToolbarAction::Compile)),
        (_, KeyCode::Enter) => Some(Msg::Invoke(ToolbarAction::Execute)),
        (_, KeyCode::Char('y')) => Some(Msg::Confirm(true)),
        (_, KeyCode::Char('n') | KeyCode::Esc) => Some(Msg::Confirm(false)),
        _ => None,
    }
}
