//! FocusFlow Monitor - focus session analytics engine.
//!
//! This crate tracks what a user does during a declared study session and
//! scores it against the session goal.
//!
//! # Overview
//!
//! A session starts with a goal and an optional description. While it is
//! active, foreground-window observations (title, process, optional pid) are
//! fed in; each distinct observation becomes an activity that is mapped to a
//! domain, scored for relevance, and classified as DIRECT, PERIPHERAL,
//! INDIRECT or DISTRACTION. Time is accumulated per classification, alerts
//! fire on distraction streaks, topic drift and frequent switching, and a
//! summary with a 0-10 focus score is produced when the session ends.
//!
//! Relevance comes from an optional AI backend (remote chat-completions or a
//! local inference server) with rule-based scoring as the always-available
//! fallback.
//!
//! # Modules
//!
//! - [`types`]: Observations, activities, sessions and engine events
//! - [`domain`]: Domain extraction from window titles
//! - [`backend`]: AI-assisted classification backends
//! - [`classifier`]: Keyword derivation, rule scoring and backend selection
//! - [`stats`]: Per-classification time and focus scoring
//! - [`alerts`]: Rolling-window alert evaluation
//! - [`summary`]: End-of-session report
//! - [`session`]: The session state machine
//! - [`engine`]: Single-owner engine task and foreground poller
//! - [`source`]: Foreground-window acquisition
//! - [`sink`]: Persistence of finished sessions
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations

pub mod alerts;
pub mod backend;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod session;
pub mod sink;
pub mod source;
pub mod stats;
pub mod summary;
pub mod types;

pub use alerts::{Alert, AlertEngine, RecentWindow};
pub use backend::{BackendError, ClassificationBackend, ChatCompletionsBackend, OllamaBackend};
pub use classifier::{RelevanceClassifier, Verdict, VerdictSource};
pub use config::{Config, ConfigError, SwitchTrigger};
pub use domain::{extract_domain, DomainExtractor};
pub use engine::{replay, run_poller, Engine, EngineHandle};
pub use error::{FocusError, Result};
pub use session::{SessionMachine, SessionStatus, StatsSnapshot};
pub use sink::{JsonlSink, MemorySink, SessionRecord, SessionSink, SinkError};
pub use source::{CommandSource, ObservationSource, SourceError};
pub use stats::{focus_score, format_duration, FocusRating, SessionStats};
pub use summary::SessionSummary;
pub use types::{
    Activity, Classification, EngineEvent, FocusSession, TimedObservation, WindowObservation,
};
