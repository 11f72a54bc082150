//! Persistence of finished sessions.
//!
//! The session machine hands every ended session to a [`SessionSink`] as a
//! flat [`SessionRecord`]. Storage is up to the sink:
//!
//! - [`JsonlSink`] appends one JSON object per line to a file
//! - [`MemorySink`] keeps records in memory, shared between clones
//!
//! Sink failures never abort a session; the caller logs and moves on.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::stats::secs_f64;
use crate::types::{Activity, Classification, FocusSession};

/// Errors that can occur while persisting a session.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Writing to storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Only closed sessions can be persisted.
    #[error("session {0} is still active")]
    SessionActive(Uuid),
}

/// One finalized activity as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub process: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub domain: String,
    pub classification: Classification,
    pub relevance_score: f64,
    pub duration_secs: f64,
    pub tags: Vec<String>,
}

impl ActivityRecord {
    fn from_activity(session_id: Uuid, activity: &Activity) -> Self {
        Self {
            session_id,
            timestamp: activity.timestamp,
            title: activity.title.clone(),
            process: activity.process.clone(),
            pid: activity.pid,
            domain: activity.domain.clone(),
            classification: activity.classification,
            relevance_score: activity.relevance_score,
            duration_secs: activity.duration().map(secs_f64).unwrap_or_default(),
            tags: activity.tags.clone(),
        }
    }
}

/// One finished session as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub goal: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_duration_secs: f64,
    pub focus_score: f64,
    pub context_switches: u32,
    pub activities: Vec<ActivityRecord>,
}

impl SessionRecord {
    /// Flattens an ended session.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::SessionActive` if the session has no end time.
    pub fn from_session(
        session: &FocusSession,
        focus_score: f64,
        context_switches: u32,
    ) -> Result<Self, SinkError> {
        let end_time = session.end_time().ok_or(SinkError::SessionActive(session.id))?;

        Ok(Self {
            id: session.id,
            goal: session.goal.clone(),
            description: session.description.clone(),
            start_time: session.start_time,
            end_time,
            total_duration_secs: secs_f64(session.elapsed(end_time)),
            focus_score,
            context_switches,
            activities: session
                .activities()
                .iter()
                .map(|a| ActivityRecord::from_activity(session.id, a))
                .collect(),
        })
    }
}

/// Storage for finished sessions.
pub trait SessionSink: Send {
    /// Stores one session record.
    ///
    /// # Errors
    ///
    /// Returns a `SinkError` if the record could not be stored.
    fn persist(&mut self, record: &SessionRecord) -> Result<(), SinkError>;
}

/// Appends sessions as JSON lines to a file.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Creates a sink writing to `path`. Nothing touches the disk until the
    /// first record is persisted.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record back, skipping blank lines.
    ///
    /// # Errors
    ///
    /// Returns a `SinkError` if the file cannot be read or a line is not a
    /// valid record.
    pub fn read_all(&self) -> Result<Vec<SessionRecord>, SinkError> {
        let content = fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SinkError::from))
            .collect()
    }
}

impl SessionSink for JsonlSink {
    fn persist(&mut self, record: &SessionRecord) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Keeps records in memory. Clones share storage, so a test can hold one
/// clone while the machine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<SessionRecord>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything persisted so far.
    #[must_use]
    pub fn records(&self) -> Vec<SessionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl SessionSink for MemorySink {
    fn persist(&mut self, record: &SessionRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}
