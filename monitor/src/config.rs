//! Configuration module for FocusFlow Monitor.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `FOCUSFLOW_BACKEND` | No | `remote` if an API key is set, else `none` | `none`, `remote` or `local` |
//! | `FOCUSFLOW_API_URL` | No | `https://api.x.ai/v1` | Chat-completions base URL |
//! | `FOCUSFLOW_API_KEY` | For `remote` | - | Bearer token for the remote backend |
//! | `FOCUSFLOW_MODEL` | No | `grok-beta` / `mistral` | Model name for the selected backend |
//! | `FOCUSFLOW_OLLAMA_URL` | No | `http://localhost:11434` | Local inference server |
//! | `FOCUSFLOW_AI_TIMEOUT_SECS` | No | 10 | Upper bound for one backend call (1-120) |
//! | `FOCUSFLOW_AI_DOMAINS` | No | (all) | Comma-separated domains that go to the backend |
//! | `FOCUSFLOW_PROJECT_MARKERS` | No | `focusflow` | Comma-separated project terms |
//! | `FOCUSFLOW_KEYWORD_WEIGHT` | No | 0.15 | Score added per keyword hit (0.1-0.2) |
//! | `FOCUSFLOW_CACHE_CAPACITY` | No | 1024 | Entries per classifier cache |
//! | `FOCUSFLOW_SWITCH_TRIGGER` | No | `any` | `any` or `distraction` |
//! | `FOCUSFLOW_DISTRACTION_WINDOW` | No | 5 | Entries inspected for a distraction streak |
//! | `FOCUSFLOW_DISTRACTION_THRESHOLD` | No | 3 | Distractions needed within that window |
//! | `FOCUSFLOW_DRIFT_WINDOW` | No | 7 | Entries averaged for drift detection |
//! | `FOCUSFLOW_DRIFT_THRESHOLD` | No | 0.5 | Mean relevance below which drift fires |
//! | `FOCUSFLOW_SWITCH_STRIDE` | No | 15 | High-switching alert every N switches |
//! | `FOCUSFLOW_POLL_INTERVAL_MS` | No | 2000 | Foreground polling interval |
//! | `FOCUSFLOW_DATA_DIR` | No | `~/.focusflow` | Directory for `sessions.jsonl` |
//!
//! # Example
//!
//! ```no_run
//! use focusflow_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Backend: {:?}", config.backend.kind);
//! ```

use std::env;
use std::fmt::Display;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

/// Default chat-completions endpoint.
pub const DEFAULT_API_URL: &str = "https://api.x.ai/v1";

/// Default model for the remote backend.
pub const DEFAULT_REMOTE_MODEL: &str = "grok-beta";

/// Default local inference server.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default model for the local backend.
pub const DEFAULT_LOCAL_MODEL: &str = "mistral";

/// Default upper bound for a single backend call.
const DEFAULT_AI_TIMEOUT_SECS: u64 = 10;

/// Allowed range for the backend timeout.
const MIN_AI_TIMEOUT_SECS: u64 = 1;
const MAX_AI_TIMEOUT_SECS: u64 = 120;

/// Default score increment per keyword found in a title.
const DEFAULT_KEYWORD_WEIGHT: f64 = 0.15;

/// Allowed range for the keyword increment.
const MIN_KEYWORD_WEIGHT: f64 = 0.1;
const MAX_KEYWORD_WEIGHT: f64 = 0.2;

/// Default capacity of each classifier cache.
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Default polling interval in milliseconds.
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Default data directory name relative to home.
const DEFAULT_DATA_DIR: &str = ".focusflow";

/// Default project marker recognised in titles.
const DEFAULT_PROJECT_MARKER: &str = "focusflow";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Which AI-assisted classification backend to use, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Rule-based classification only.
    None,
    /// Remote OpenAI-compatible chat-completions service.
    Remote,
    /// Locally hosted Ollama-style inference service.
    Local,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "rules" => Ok(Self::None),
            "remote" | "api" => Ok(Self::Remote),
            "local" | "ollama" => Ok(Self::Local),
            other => Err(format!("expected none, remote or local, got '{other}'")),
        }
    }
}

/// When the context-switch counter is incremented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchTrigger {
    /// Any classification change between consecutive activities.
    #[default]
    OnAnyChange,
    /// Only changes that land on a distraction.
    OnDistractionEntry,
}

impl FromStr for SwitchTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "on_any_change" => Ok(Self::OnAnyChange),
            "distraction" | "on_distraction_entry" => Ok(Self::OnDistractionEntry),
            other => Err(format!("expected any or distraction, got '{other}'")),
        }
    }
}

/// Settings for the AI-assisted backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Base URL of the remote chat-completions API.
    pub api_url: String,

    /// Bearer token for the remote API.
    pub api_key: Option<String>,

    /// Model name passed to whichever backend is selected.
    pub model: String,

    /// Base URL of the local inference server.
    pub ollama_url: String,

    /// Upper bound for a single backend call.
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::None,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_REMOTE_MODEL.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_AI_TIMEOUT_SECS),
        }
    }
}

/// Settings for relevance classification.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Lower-cased terms that identify the user's own project.
    pub project_markers: Vec<String>,

    /// Score added per derived keyword found in a title.
    pub keyword_weight: f64,

    /// Domains that need backend judgment. `None` sends every domain.
    pub ambiguous_domains: Option<Vec<String>>,

    /// Capacity of the keyword and classification caches.
    pub cache_capacity: NonZeroUsize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            project_markers: vec![DEFAULT_PROJECT_MARKER.to_string()],
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            ambiguous_domains: None,
            cache_capacity: NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Thresholds for the rolling-window alerts.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    /// Number of most recent entries inspected for a distraction streak.
    pub distraction_window: usize,

    /// Distractions within that window needed to fire.
    pub distraction_threshold: usize,

    /// Number of most recent entries averaged for drift.
    pub drift_window: usize,

    /// Mean relevance below which drift fires.
    pub drift_threshold: f64,

    /// High-switching fires every time the switch count is a multiple of this.
    pub switch_stride: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            distraction_window: 5,
            distraction_threshold: 3,
            drift_window: 7,
            drift_threshold: 0.5,
            switch_stride: 15,
        }
    }
}

/// Configuration for the FocusFlow Monitor.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub classifier: ClassifierConfig,
    pub alerts: AlertConfig,
    pub switch_trigger: SwitchTrigger,

    /// Interval between foreground-window polls.
    pub poll_interval: Duration,

    /// Directory holding `sessions.jsonl`.
    pub data_dir: PathBuf,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - A numeric variable cannot be parsed or is out of range
    /// - `FOCUSFLOW_BACKEND=remote` is set without `FOCUSFLOW_API_KEY`
    /// - The home directory cannot be determined and `FOCUSFLOW_DATA_DIR` is unset
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("FOCUSFLOW_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let kind = match env::var("FOCUSFLOW_BACKEND") {
            Ok(val) => val.parse::<BackendKind>().map_err(|message| ConfigError::InvalidValue {
                key: "FOCUSFLOW_BACKEND".to_string(),
                message,
            })?,
            Err(_) if api_key.is_some() => BackendKind::Remote,
            Err(_) => BackendKind::None,
        };

        if kind == BackendKind::Remote && api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("FOCUSFLOW_API_KEY".to_string()));
        }

        let default_model = match kind {
            BackendKind::Local => DEFAULT_LOCAL_MODEL,
            _ => DEFAULT_REMOTE_MODEL,
        };

        let timeout_secs = parse_var("FOCUSFLOW_AI_TIMEOUT_SECS", DEFAULT_AI_TIMEOUT_SECS)?;
        if !(MIN_AI_TIMEOUT_SECS..=MAX_AI_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(ConfigError::InvalidValue {
                key: "FOCUSFLOW_AI_TIMEOUT_SECS".to_string(),
                message: format!(
                    "timeout must be between {MIN_AI_TIMEOUT_SECS} and {MAX_AI_TIMEOUT_SECS}, got {timeout_secs}"
                ),
            });
        }

        let backend = BackendConfig {
            kind,
            api_url: env::var("FOCUSFLOW_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            api_key,
            model: env::var("FOCUSFLOW_MODEL").unwrap_or_else(|_| default_model.to_string()),
            ollama_url: env::var("FOCUSFLOW_OLLAMA_URL")
                .unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        };

        let keyword_weight = parse_var("FOCUSFLOW_KEYWORD_WEIGHT", DEFAULT_KEYWORD_WEIGHT)?;
        if !(MIN_KEYWORD_WEIGHT..=MAX_KEYWORD_WEIGHT).contains(&keyword_weight) {
            return Err(ConfigError::InvalidValue {
                key: "FOCUSFLOW_KEYWORD_WEIGHT".to_string(),
                message: format!(
                    "keyword weight must be between {MIN_KEYWORD_WEIGHT} and {MAX_KEYWORD_WEIGHT}, got {keyword_weight}"
                ),
            });
        }

        let cache_capacity = parse_var("FOCUSFLOW_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?;
        let cache_capacity = NonZeroUsize::new(cache_capacity).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "FOCUSFLOW_CACHE_CAPACITY".to_string(),
                message: "cache capacity must be greater than 0".to_string(),
            }
        })?;

        let project_markers = parse_list("FOCUSFLOW_PROJECT_MARKERS")
            .unwrap_or_else(|| vec![DEFAULT_PROJECT_MARKER.to_string()]);

        let classifier = ClassifierConfig {
            project_markers,
            keyword_weight,
            ambiguous_domains: parse_list("FOCUSFLOW_AI_DOMAINS"),
            cache_capacity,
        };

        let defaults = AlertConfig::default();
        let alerts = AlertConfig {
            distraction_window: parse_positive("FOCUSFLOW_DISTRACTION_WINDOW", defaults.distraction_window)?,
            distraction_threshold: parse_positive(
                "FOCUSFLOW_DISTRACTION_THRESHOLD",
                defaults.distraction_threshold,
            )?,
            drift_window: parse_positive("FOCUSFLOW_DRIFT_WINDOW", defaults.drift_window)?,
            drift_threshold: parse_var("FOCUSFLOW_DRIFT_THRESHOLD", defaults.drift_threshold)?,
            switch_stride: parse_positive("FOCUSFLOW_SWITCH_STRIDE", defaults.switch_stride)?,
        };

        if alerts.distraction_threshold > alerts.distraction_window {
            return Err(ConfigError::InvalidValue {
                key: "FOCUSFLOW_DISTRACTION_THRESHOLD".to_string(),
                message: format!(
                    "threshold {} exceeds window {}",
                    alerts.distraction_threshold, alerts.distraction_window
                ),
            });
        }

        if !(0.0..=1.0).contains(&alerts.drift_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "FOCUSFLOW_DRIFT_THRESHOLD".to_string(),
                message: format!("expected a value in [0, 1], got {}", alerts.drift_threshold),
            });
        }

        let switch_trigger = match env::var("FOCUSFLOW_SWITCH_TRIGGER") {
            Ok(val) => val.parse::<SwitchTrigger>().map_err(|message| ConfigError::InvalidValue {
                key: "FOCUSFLOW_SWITCH_TRIGGER".to_string(),
                message,
            })?,
            Err(_) => SwitchTrigger::default(),
        };

        let poll_interval_ms = parse_positive("FOCUSFLOW_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;

        let data_dir = match env::var("FOCUSFLOW_DATA_DIR") {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
                base_dirs.home_dir().join(DEFAULT_DATA_DIR)
            }
        };

        Ok(Self {
            backend,
            classifier,
            alerts,
            switch_trigger,
            poll_interval: Duration::from_millis(poll_interval_ms),
            data_dir,
        })
    }

    /// Path of the JSON-lines session log inside the data directory.
    #[must_use]
    pub fn sessions_path(&self) -> PathBuf {
        self.data_dir.join("sessions.jsonl")
    }
}

/// Parses an optional environment variable, falling back to `default`.
fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(val) => val.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse '{val}': {e}"),
        }),
        Err(_) => Ok(default),
    }
}

/// Like [`parse_var`], but rejects zero.
fn parse_positive<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: Display,
{
    let value = parse_var(key, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value must be greater than 0".to_string(),
        });
    }
    Ok(value)
}

/// Parses a comma-separated, lower-cased list. Empty lists count as unset.
fn parse_list(key: &str) -> Option<Vec<String>> {
    env::var(key)
        .ok()
        .map(|val| {
            val.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|list| !list.is_empty())
}
