//! Foreground-window acquisition.
//!
//! Platform window inspection lives outside this crate. A source only has to
//! answer "what is in the foreground right now?", and "nothing" is always an
//! acceptable answer.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::trace;

use crate::types::WindowObservation;

/// Upper bound for one run of an external probe command.
const COMMAND_TIMEOUT_SECS: u64 = 2;

/// Errors that can occur while acquiring an observation.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The probe could not be spawned or its output read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The probe exited unsuccessfully.
    #[error("probe command failed: {0}")]
    CommandFailed(String),

    /// The probe did not finish in time.
    #[error("probe command timed out after {0} seconds")]
    Timeout(u64),

    /// The probe printed something that is not an observation.
    #[error("unrecognised probe output: {0}")]
    Malformed(String),
}

/// Something that can report the current foreground window.
#[async_trait]
pub trait ObservationSource: Send {
    /// Returns the current foreground window, or `None` if nothing is
    /// identifiable.
    async fn observe(&mut self) -> Result<Option<WindowObservation>, SourceError>;
}

/// Runs an external command per poll and parses what it prints.
///
/// Accepted output, after trimming:
/// - empty: nothing observed
/// - a JSON object `{"title": .., "process": .., "pid": ..}`
/// - `process|title` on one line
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSource {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(COMMAND_TIMEOUT_SECS),
        }
    }

    /// Builds a source from a program followed by its arguments.
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ObservationSource for CommandSource {
    async fn observe(&mut self) -> Result<Option<WindowObservation>, SourceError> {
        let run = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| SourceError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            return Err(SourceError::CommandFailed(output.status.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(program = %self.program, output = %stdout.trim(), "Probe output");
        parse_probe_output(&stdout)
    }
}

/// Parses one probe output. See [`CommandSource`] for the accepted forms.
///
/// # Errors
///
/// Returns `SourceError::Malformed` for output in neither form.
///
/// # Examples
///
/// ```
/// use focusflow_monitor::source::parse_probe_output;
///
/// let obs = parse_probe_output("firefox|Rust Book - Mozilla Firefox\n").unwrap().unwrap();
/// assert_eq!(obs.process, "firefox");
/// assert_eq!(obs.title, "Rust Book - Mozilla Firefox");
///
/// assert!(parse_probe_output("   ").unwrap().is_none());
/// ```
pub fn parse_probe_output(output: &str) -> Result<Option<WindowObservation>, SourceError> {
    let line = output.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if line.starts_with('{') {
        return serde_json::from_str(line)
            .map(Some)
            .map_err(|e| SourceError::Malformed(e.to_string()));
    }

    match line.split_once('|') {
        Some((process, title)) => Ok(Some(WindowObservation::new(title.trim(), process.trim()))),
        None => Err(SourceError::Malformed(line.to_string())),
    }
}

/// Replays a fixed sequence of poll results, then reports nothing.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    script: VecDeque<Option<WindowObservation>>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = Option<WindowObservation>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Polls not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl ObservationSource for ScriptedSource {
    async fn observe(&mut self) -> Result<Option<WindowObservation>, SourceError> {
        Ok(self.script.pop_front().flatten())
    }
}
