use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pldbg_adapters::{BufferSurface, KeywordPlParser, SimulatedGateway, SimulatedGatewayConfig};
use pldbg_core::gateway::GatewayError;
use pldbg_core::{
    DebugCommand, DebugLocation, DebugSessionRegistry, DebugStatus, DebugSubscriber,
    SessionBindings, SessionKey,
};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "pldbg-replay")]
#[command(about = "Replay a debug command script against the simulated engine")]
struct Args {
    /// PL source file to debug
    #[arg(long)]
    file: PathBuf,

    /// Breakpoint line, repeatable
    #[arg(long = "break", value_name = "LINE")]
    breakpoints: Vec<u32>,

    /// Comma separated commands, e.g. start,step-over,resume
    #[arg(long, value_delimiter = ',', required = true)]
    commands: Vec<DebugCommand>,

    /// Fail unless the session ends in this status
    #[arg(long, value_name = "STATUS")]
    expect_status: Option<String>,

    /// Pause on the first executable line instead of the first breakpoint
    #[arg(long)]
    stop_at_entry: bool,

    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Print one JSON object per event
    #[arg(long)]
    json: bool,
}

struct ReplayPrinter {
    json: bool,
}

impl DebugSubscriber for ReplayPrinter {
    fn on_transition(
        &self,
        _key: &SessionKey,
        status: DebugStatus,
        location: Option<DebugLocation>,
    ) {
        println!("{}", render_transition(status, location, self.json));
    }

    fn on_failure(&self, _key: &SessionKey, command: DebugCommand, error: &GatewayError) {
        if self.json {
            println!(
                "{}",
                json!({
                    "event": "failure",
                    "command": command,
                    "code": error.code(),
                    "message": error.message(),
                })
            );
        } else {
            println!("failure command={command} code={} message={}", error.code(), error.message());
        }
    }

    fn on_decorations_cleared(&self, _key: &SessionKey) {
        if self.json {
            println!("{}", json!({ "event": "decorations_cleared" }));
        } else {
            println!("decorations cleared");
        }
    }
}

fn render_transition(
    status: DebugStatus,
    location: Option<DebugLocation>,
    as_json: bool,
) -> String {
    let line = location.map(|location| location.line);
    if as_json {
        return json!({ "event": "transition", "status": status, "line": line }).to_string();
    }
    match line {
        Some(line) => format!("transition status={status} line={line}"),
        None => format!("transition status={status}"),
    }
}

fn status_matches(status: DebugStatus, expected: &str) -> bool {
    status
        .as_str()
        .eq_ignore_ascii_case(&expected.trim().replace('-', "_"))
}

fn enforce_expectation(args: &Args, status: DebugStatus) -> io::Result<()> {
    match &args.expect_status {
        Some(expected) if !status_matches(status, expected) => Err(io::Error::other(format!(
            "expected final status {expected}, got {status}"
        ))),
        _ => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PLDBG_LOG").unwrap_or_else(|_| EnvFilter::new("pldbg=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let surface = Arc::new(BufferSurface::from_file(&args.file)?);
    let gateway = Arc::new(SimulatedGateway::new(SimulatedGatewayConfig {
        latency: Duration::from_millis(args.latency_ms),
        stop_at_entry: args.stop_at_entry,
    }));

    let registry = DebugSessionRegistry::new();
    registry.subscribe(Arc::new(ReplayPrinter { json: args.json }));
    let session = registry.get_or_create("replay", || SessionBindings {
        surface,
        gateway,
        parser: Arc::new(KeywordPlParser::new()),
    });
    for line in &args.breakpoints {
        session.add_breakpoint(*line);
    }

    for command in &args.commands {
        if let Err(error) = session.execute(*command).await {
            if args.json {
                println!(
                    "{}",
                    json!({ "event": "error", "command": command, "message": error.to_string() })
                );
            } else {
                println!("error command={command} message={error}");
            }
        }
    }

    let status = session.status();
    println!("final.status={status}");
    enforce_expectation(&args, status)?;
    Ok(())
}
