//! Core domain types for FocusFlow focus sessions.
//!
//! This module defines the observation input, the classification taxonomy,
//! and the session/activity records built by the session state machine.
//! Record invariants (an activity is open exactly while it has no duration,
//! a session's end is never before its start) are enforced by the
//! constructors and mutators here rather than by callers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::alerts::Alert;
use crate::summary::SessionSummary;

/// Goal used when a session is started with a blank goal.
pub const DEFAULT_GOAL: &str = "General Study";

/// Description used when a session is started with a blank description.
pub const DEFAULT_DESCRIPTION: &str = "No detailed description provided.";

/// Relevance classification of an activity with respect to the session goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// On-topic.
    Direct,
    /// Loosely related.
    Peripheral,
    /// Tangential.
    Indirect,
    /// Off-topic.
    Distraction,
    /// Label that could not be interpreted. Never produced by the classifier.
    #[serde(other)]
    Unknown,
}

/// Error returned when a string is not a known classification label.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown classification label: '{0}'")]
pub struct UnknownClassification(pub String);

impl Classification {
    /// The four classifications the classifier can produce, in report order.
    pub const SCORED: [Classification; 4] = [
        Classification::Direct,
        Classification::Peripheral,
        Classification::Indirect,
        Classification::Distraction,
    ];

    /// Maps a relevance score onto its classification band.
    ///
    /// Bands: `>= 0.8` direct, `>= 0.6` peripheral, `>= 0.3` indirect,
    /// anything lower (including NaN) is a distraction.
    ///
    /// # Examples
    ///
    /// ```
    /// use focusflow_monitor::types::Classification;
    ///
    /// assert_eq!(Classification::from_score(0.85), Classification::Direct);
    /// assert_eq!(Classification::from_score(0.6), Classification::Peripheral);
    /// assert_eq!(Classification::from_score(0.3), Classification::Indirect);
    /// assert_eq!(Classification::from_score(0.29), Classification::Distraction);
    /// ```
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Direct
        } else if score >= 0.6 {
            Self::Peripheral
        } else if score >= 0.3 {
            Self::Indirect
        } else {
            Self::Distraction
        }
    }

    /// Representative score for a label-only verdict.
    #[must_use]
    pub fn nominal_score(self) -> Option<f64> {
        match self {
            Self::Direct => Some(0.9),
            Self::Peripheral => Some(0.7),
            Self::Indirect => Some(0.4),
            Self::Distraction => Some(0.1),
            Self::Unknown => None,
        }
    }

    /// Upper-case wire label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "DIRECT",
            Self::Peripheral => "PERIPHERAL",
            Self::Indirect => "INDIRECT",
            Self::Distraction => "DISTRACTION",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = UnknownClassification;

    /// Parses one of the four scored labels, ignoring case and surrounding
    /// whitespace. `UNKNOWN` is deliberately rejected: it is not a verdict.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DIRECT" => Ok(Self::Direct),
            "PERIPHERAL" => Ok(Self::Peripheral),
            "INDIRECT" => Ok(Self::Indirect),
            "DISTRACTION" => Ok(Self::Distraction),
            _ => Err(UnknownClassification(s.trim().to_string())),
        }
    }
}

/// A single foreground-window observation from the acquisition layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowObservation {
    /// Window title.
    pub title: String,
    /// Owning process or application name.
    pub process: String,
    /// Owning process ID, when the platform reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl WindowObservation {
    /// Creates an observation without a process ID.
    #[must_use]
    pub fn new(title: impl Into<String>, process: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            process: process.into(),
            pid: None,
        }
    }

    /// Sets the process ID.
    #[must_use]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }
}

/// One line of a replay file: a poll instant and what (if anything) was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedObservation {
    /// When the poll happened.
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub process: Option<String>,
    #[serde(default)]
    pub pid: Option<u32>,
}

impl TimedObservation {
    /// The observation, if both title and process were recorded.
    #[must_use]
    pub fn observation(&self) -> Option<WindowObservation> {
        match (&self.title, &self.process) {
            (Some(title), Some(process)) => Some(WindowObservation {
                title: title.clone(),
                process: process.clone(),
                pid: self.pid,
            }),
            _ => None,
        }
    }
}

/// A classified stretch of time spent in one foreground window.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    /// When this became the foreground activity.
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub process: String,
    pub pid: Option<u32>,
    /// Coarse source label (website or application).
    pub domain: String,
    pub classification: Classification,
    /// Relevance to the goal, in `[0, 1]`.
    pub relevance_score: f64,
    /// Derived labels; always contains the domain.
    pub tags: Vec<String>,
    duration: Option<TimeDelta>,
}

impl Activity {
    /// Opens a new activity at `timestamp`. The score is clamped to `[0, 1]`.
    #[must_use]
    pub fn open(
        timestamp: DateTime<Utc>,
        observation: &WindowObservation,
        domain: String,
        classification: Classification,
        relevance_score: f64,
    ) -> Self {
        let relevance_score = if relevance_score.is_finite() {
            relevance_score.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            timestamp,
            title: observation.title.clone(),
            process: observation.process.clone(),
            pid: observation.pid,
            tags: vec![domain.clone()],
            domain,
            classification,
            relevance_score,
            duration: None,
        }
    }

    /// Closes the activity at `end` and returns its duration.
    ///
    /// An `end` before the activity start yields a zero duration. Closing an
    /// already-closed activity leaves it untouched and returns the stored
    /// duration.
    pub fn close(&mut self, end: DateTime<Utc>) -> TimeDelta {
        if let Some(duration) = self.duration {
            return duration;
        }
        let duration = (end - self.timestamp).max(TimeDelta::zero());
        self.duration = Some(duration);
        duration
    }

    /// Duration, or `None` while the activity is still open.
    #[must_use]
    pub fn duration(&self) -> Option<TimeDelta> {
        self.duration
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.duration.is_none()
    }

    /// Time elapsed since the activity started, for open or closed activities.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> TimeDelta {
        self.duration
            .unwrap_or_else(|| (now - self.timestamp).max(TimeDelta::zero()))
    }
}

/// A focus session: a goal plus the ordered timeline of finalized activities.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusSession {
    pub id: Uuid,
    pub goal: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    activities: Vec<Activity>,
}

impl FocusSession {
    /// Creates a session, substituting placeholders for blank goal/description.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use focusflow_monitor::types::{FocusSession, DEFAULT_GOAL};
    ///
    /// let session = FocusSession::new("   ", "", Utc::now());
    /// assert_eq!(session.goal, DEFAULT_GOAL);
    /// assert!(session.is_active());
    /// ```
    #[must_use]
    pub fn new(goal: &str, description: &str, start_time: DateTime<Utc>) -> Self {
        let goal = match goal.trim() {
            "" => DEFAULT_GOAL.to_string(),
            g => g.to_string(),
        };
        let description = match description.trim() {
            "" => DEFAULT_DESCRIPTION.to_string(),
            d => d.to_string(),
        };

        Self {
            id: Uuid::new_v4(),
            goal,
            description,
            start_time,
            end_time: None,
            activities: Vec::new(),
        }
    }

    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Finalized activities in arrival order.
    #[must_use]
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    /// Session length up to `now`, or up to the end time once closed.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> TimeDelta {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).max(TimeDelta::zero())
    }

    /// Appends a closed activity. Open activities are ignored.
    pub(crate) fn push_activity(&mut self, activity: Activity) -> bool {
        if activity.is_open() {
            return false;
        }
        self.activities.push(activity);
        true
    }

    /// Marks the session ended, never earlier than its start.
    pub(crate) fn close(&mut self, end: DateTime<Utc>) {
        if self.end_time.is_none() {
            self.end_time = Some(end.max(self.start_time));
        }
    }
}

/// Notifications emitted by the session state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A new session began.
    SessionStarted {
        session_id: Uuid,
        goal: String,
        description: String,
        start_time: DateTime<Utc>,
    },
    /// A new foreground activity was classified and opened.
    ActivityStarted {
        activity: Activity,
        /// Share of recent-window time spent on direct activities, in percent.
        focus_share: Option<f64>,
        context_switches: u32,
    },
    /// An alert condition held after an activity was finalized.
    Alert(Alert),
    /// A session ended; carries the rendered summary data.
    SessionEnded(Box<SessionSummary>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn classification_bands_are_inclusive_lower_bounds() {
        assert_eq!(Classification::from_score(1.0), Classification::Direct);
        assert_eq!(Classification::from_score(0.8), Classification::Direct);
        assert_eq!(Classification::from_score(0.79), Classification::Peripheral);
        assert_eq!(Classification::from_score(0.59), Classification::Indirect);
        assert_eq!(Classification::from_score(0.0), Classification::Distraction);
        assert_eq!(Classification::from_score(f64::NAN), Classification::Distraction);
    }

    #[test]
    fn nominal_scores_land_in_their_own_band() {
        for class in Classification::SCORED {
            let score = class.nominal_score().unwrap();
            assert_eq!(Classification::from_score(score), class);
        }
        assert_eq!(Classification::Unknown.nominal_score(), None);
    }

    #[test]
    fn classification_parses_case_insensitively() {
        assert_eq!(" direct\n".parse::<Classification>(), Ok(Classification::Direct));
        assert_eq!("Distraction".parse::<Classification>(), Ok(Classification::Distraction));
        assert!("UNKNOWN".parse::<Classification>().is_err());
        assert!("focused".parse::<Classification>().is_err());
    }

    #[test]
    fn classification_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&Classification::Peripheral).unwrap(),
            "\"PERIPHERAL\""
        );
    }

    #[test]
    fn unreadable_stored_label_is_unknown() {
        let class: Classification = serde_json::from_str("\"SOMEWHAT\"").unwrap();
        assert_eq!(class, Classification::Unknown);
    }

    #[test]
    fn observation_pid_is_optional_on_the_wire() {
        let obs: WindowObservation =
            serde_json::from_str(r#"{"title":"Docs","process":"firefox"}"#).unwrap();
        assert_eq!(obs, WindowObservation::new("Docs", "firefox"));

        let json = serde_json::to_string(&obs.clone().with_pid(42)).unwrap();
        assert!(json.contains("\"pid\":42"));
    }

    #[test]
    fn timed_observation_without_window_is_empty_poll() {
        let line: TimedObservation =
            serde_json::from_str(r#"{"at":"2024-01-01T10:00:00Z"}"#).unwrap();
        assert!(line.observation().is_none());

        let line: TimedObservation = serde_json::from_str(
            r#"{"at":"2024-01-01T10:00:00Z","title":"a","process":"b","pid":7}"#,
        )
        .unwrap();
        assert_eq!(line.observation(), Some(WindowObservation::new("a", "b").with_pid(7)));
    }

    #[test]
    fn activity_is_open_until_closed() {
        let obs = WindowObservation::new("Title", "proc");
        let mut activity = Activity::open(at(0), &obs, "proc".into(), Classification::Direct, 0.9);
        assert!(activity.is_open());
        assert_eq!(activity.tags, vec!["proc".to_string()]);
        assert_eq!(activity.elapsed(at(5)), TimeDelta::seconds(5));

        let duration = activity.close(at(30));
        assert_eq!(duration, TimeDelta::seconds(30));
        assert!(!activity.is_open());

        // A second close does not move the end.
        assert_eq!(activity.close(at(90)), TimeDelta::seconds(30));
    }

    #[test]
    fn activity_close_before_start_is_zero() {
        let obs = WindowObservation::new("Title", "proc");
        let mut activity = Activity::open(at(10), &obs, "proc".into(), Classification::Direct, 0.9);
        assert_eq!(activity.close(at(0)), TimeDelta::zero());
    }

    #[test]
    fn activity_score_is_clamped() {
        let obs = WindowObservation::new("Title", "proc");
        let high = Activity::open(at(0), &obs, "p".into(), Classification::Direct, 1.7);
        let nan = Activity::open(at(0), &obs, "p".into(), Classification::Direct, f64::NAN);
        assert_eq!(high.relevance_score, 1.0);
        assert_eq!(nan.relevance_score, 0.0);
    }

    #[test]
    fn session_substitutes_placeholders() {
        let session = FocusSession::new("", "  ", at(0));
        assert_eq!(session.goal, DEFAULT_GOAL);
        assert_eq!(session.description, DEFAULT_DESCRIPTION);
    }

    #[test]
    fn session_rejects_open_activities_and_clamps_end() {
        let mut session = FocusSession::new("Rust", "ownership", at(100));
        let obs = WindowObservation::new("Title", "proc");
        let open = Activity::open(at(100), &obs, "p".into(), Classification::Direct, 0.9);
        assert!(!session.push_activity(open.clone()));

        let mut closed = open;
        closed.close(at(110));
        assert!(session.push_activity(closed));
        assert_eq!(session.activities().len(), 1);

        session.close(at(50));
        assert_eq!(session.end_time(), Some(at(100)));
        assert!(!session.is_active());
        assert_eq!(session.elapsed(at(1_000)), TimeDelta::zero());
    }
}
