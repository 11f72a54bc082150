//! FocusFlow - focus session analytics.
//!
//! This binary runs focus sessions interactively against a live foreground
//! window probe, or replays a recorded sequence of observations.
//!
//! # Commands
//!
//! - `focusflow run`: Interactive session control on stdin
//! - `focusflow replay FILE --goal GOAL`: Score a recorded session
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use focusflow_monitor::backend::build_backend;
use focusflow_monitor::config::Config;
use focusflow_monitor::engine::{replay, run_poller, Engine, EngineHandle};
use focusflow_monitor::session::{SessionMachine, SessionStatus, StatsSnapshot};
use focusflow_monitor::sink::{JsonlSink, MemorySink, SessionSink};
use focusflow_monitor::source::CommandSource;
use focusflow_monitor::stats::format_duration;
use focusflow_monitor::types::{EngineEvent, TimedObservation};
use focusflow_monitor::RelevanceClassifier;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Titles longer than this are shortened on screen.
const TITLE_DISPLAY_CHARS: usize = 60;

/// FocusFlow - focus session analytics.
///
/// Classifies foreground windows against a study goal and reports how much
/// of a session was actually spent on it.
#[derive(Parser, Debug)]
#[command(name = "focusflow")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    FOCUSFLOW_BACKEND          none, remote or local (default: remote if an API key is set)
    FOCUSFLOW_API_KEY          Bearer token for the remote backend
    FOCUSFLOW_OLLAMA_URL       Local inference server (default: http://localhost:11434)
    FOCUSFLOW_DATA_DIR         Where sessions.jsonl is written (default: ~/.focusflow)
    RUST_LOG                   Log filter (default: info)

EXAMPLES:
    # Interactive sessions, probing the foreground window with a script
    focusflow run --source-cmd ./active-window.sh

    # Score a recorded session
    focusflow replay session.jsonl --goal \"Deep Learning\" --description \"studying CNNs\"
")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run focus sessions interactively.
    ///
    /// Reads commands (start, stop, status, stats, help, quit) from stdin.
    Run {
        /// Probe command printing the foreground window, followed by its
        /// arguments. Output is JSON or `process|title`.
        #[arg(long = "source-cmd", num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
        source_cmd: Vec<String>,
    },

    /// Replay a recorded session from a JSON-lines file.
    ///
    /// Each line is `{"at": RFC3339, "title": .., "process": .., "pid": ..}`;
    /// a line with only `at` is an empty poll.
    Replay {
        /// Recording to replay.
        file: PathBuf,

        /// Session goal.
        #[arg(short, long)]
        goal: String,

        /// Session description.
        #[arg(short, long, default_value = "")]
        description: String,

        /// Do not append the session to sessions.jsonl.
        #[arg(long)]
        no_persist: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let result = match cli.command {
        Command::Run { source_cmd } => runtime.block_on(run_interactive(source_cmd)),
        Command::Replay {
            file,
            goal,
            description,
            no_persist,
        } => runtime.block_on(run_replay(file, goal, description, no_persist)),
    };

    // Stdin reads park a blocking thread; don't wait on it forever.
    runtime.shutdown_timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS));
    result
}

/// Runs the interactive control loop until quit, EOF or a signal.
async fn run_interactive(source_cmd: Vec<String>) -> Result<()> {
    info!("Starting FocusFlow");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        backend = ?config.backend.kind,
        data_dir = %config.data_dir.display(),
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Configuration loaded"
    );

    let classifier = build_classifier(&config)?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let sink = Box::new(JsonlSink::new(config.sessions_path()));
    let machine = SessionMachine::from_config(&config, classifier, sink).with_events(events_tx);

    let (engine, engine_task) = Engine::spawn(machine);
    let printer = tokio::spawn(print_events(events_rx));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = match CommandSource::from_argv(&source_cmd) {
        Some(source) => Some(tokio::spawn(run_poller(
            source,
            engine.clone(),
            config.poll_interval,
            shutdown_rx,
        ))),
        None => {
            warn!("No --source-cmd given, foreground windows will not be observed");
            None
        }
    };

    print_help();

    tokio::select! {
        result = control_loop(&engine) => result?,
        _ = wait_for_shutdown() => info!("Received shutdown signal"),
    }

    let _ = shutdown_tx.send(true);
    if let Some(poller) = poller {
        if let Err(e) = poller.await {
            error!(error = %e, "Poller task failed");
        }
    }

    // Ending the session flushes the open activity before the engine exits.
    if let Err(e) = engine.shutdown().await {
        warn!(error = %e, "Engine already stopped");
    }
    drop(engine);
    if let Err(e) = engine_task.await {
        error!(error = %e, "Engine task failed");
    }

    let timeout = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
    if tokio::time::timeout(timeout, printer).await.is_err() {
        warn!("Timed out waiting for event output");
    }

    info!("FocusFlow stopped");
    Ok(())
}

/// Replays a recording and prints its summary.
async fn run_replay(file: PathBuf, goal: String, description: String, no_persist: bool) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let polls = parse_recording(&content)?;
    if polls.is_empty() {
        bail!("{} contains no observations", file.display());
    }

    let sink: Box<dyn SessionSink> = if no_persist {
        Box::new(MemorySink::new())
    } else {
        Box::new(JsonlSink::new(config.sessions_path()))
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events_rx));

    let mut machine =
        SessionMachine::from_config(&config, build_classifier(&config)?, sink).with_events(events_tx);
    replay(&mut machine, &goal, &description, &polls).await;
    drop(machine);

    printer.await.context("Event printer failed")?;
    Ok(())
}

/// Parses a JSON-lines recording, skipping blank lines.
fn parse_recording(content: &str) -> Result<Vec<TimedObservation>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid recording line {}", i + 1))
        })
        .collect()
}

/// Builds the classifier with whichever backend the configuration selects.
fn build_classifier(config: &Config) -> Result<Arc<RelevanceClassifier>> {
    let backend = build_backend(&config.backend).context("Failed to create classification backend")?;
    match &backend {
        Some(backend) => info!(backend = backend.name(), model = %config.backend.model, "AI classification enabled"),
        None => info!("Using rule-based classification"),
    }
    Ok(Arc::new(RelevanceClassifier::new(
        &config.classifier,
        backend,
        config.backend.timeout,
    )))
}

/// Reads and executes control commands from stdin until quit or EOF.
async fn control_loop(engine: &EngineHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match line.trim().to_lowercase().as_str() {
            "" => {}
            "start" => {
                println!("Goal:");
                let goal = lines.next_line().await?.unwrap_or_default();
                println!("Description (finish with an empty line):");
                let description = read_block(&mut lines).await?;
                engine.start(&goal, &description).await?;
            }
            "stop" => {
                if engine.stop().await?.is_none() {
                    println!("No active session.");
                }
            }
            "status" => match engine.status().await? {
                Some(status) => print_status(&status),
                None => println!("No active session."),
            },
            "stats" => match engine.stats().await? {
                Some(stats) => print_stats(&stats),
                None => println!("No active session."),
            },
            "help" => print_help(),
            "quit" | "exit" => return Ok(()),
            other => println!("Unknown command '{other}'. Type 'help' for commands."),
        }
    }

    Ok(())
}

/// Reads lines until an empty one or EOF.
async fn read_block(lines: &mut Lines<BufReader<Stdin>>) -> Result<String> {
    let mut block = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            break;
        }
        block.push(line);
    }
    Ok(block.join("\n"))
}

/// Prints engine events as they arrive, until the machine is dropped.
async fn print_events(mut events: mpsc::UnboundedReceiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::SessionStarted {
                goal,
                description,
                start_time,
                ..
            } => {
                println!("\nSession started at {}", clock(start_time));
                println!("Goal: {goal}");
                println!("Description: {description}");
            }
            EngineEvent::ActivityStarted {
                activity,
                focus_share,
                context_switches,
            } => {
                println!(
                    "\n[{}] {} ({:.2})",
                    clock(activity.timestamp),
                    activity.classification,
                    activity.relevance_score
                );
                println!("  {}: \"{}\"", activity.process, shorten(&activity.title));
                if let Some(share) = focus_share {
                    println!("  Session focus: {share:.1}% | Switches: {context_switches}");
                }
            }
            EngineEvent::Alert(alert) => println!("  ! {alert}"),
            EngineEvent::SessionEnded(summary) => println!("\n{summary}\n"),
        }
    }
}

fn print_status(status: &SessionStatus) {
    println!("Goal: {}", status.goal);
    println!("Description: {}", status.description);
    println!("Started: {}", clock(status.start_time));
    println!("Elapsed: {}", format_duration(status.elapsed));
    println!("Context switches: {}", status.context_switches);
    match &status.current_activity {
        Some(activity) => println!(
            "Current: {} ({:.2}) {}",
            activity.classification,
            activity.relevance_score,
            shorten(&activity.title)
        ),
        None => println!("Current: nothing observed yet"),
    }
}

fn print_stats(snapshot: &StatsSnapshot) {
    println!("Elapsed: {}", format_duration(snapshot.elapsed));
    for (classification, spent) in snapshot.stats.iter() {
        println!("  {:<12} {:>8}", classification.as_str(), format_duration(spent));
    }
    println!("Focus score so far: {:.1}/10", snapshot.focus_score);
    println!("Context switches: {}", snapshot.context_switches);
}

fn print_help() {
    println!("Commands: start, stop, status, stats, help, quit");
}

fn clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn shorten(title: &str) -> String {
    if title.chars().count() > TITLE_DISPLAY_CHARS {
        let head: String = title.chars().take(TITLE_DISPLAY_CHARS).collect();
        format!("{head}...")
    } else {
        title.to_string()
    }
}

/// Initializes the tracing subscriber on stderr, keeping stdout for output.
fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
