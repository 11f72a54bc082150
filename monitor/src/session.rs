//! The focus-session state machine.
//!
//! [`SessionMachine`] turns a stream of foreground-window observations into a
//! timeline of classified activities. It is either idle or has exactly one
//! active session:
//!
//! ```text
//!   idle --start--> active --observe--> active --end--> idle
//!                     \--start (ends the current one first)--/
//! ```
//!
//! Every transition has an `_at` form taking an explicit timestamp; the plain
//! forms use the wall clock. Side effects leave the machine as
//! [`EngineEvent`]s on an optional channel and as records handed to the
//! configured [`SessionSink`].

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::{AlertEngine, RecentWindow};
use crate::classifier::RelevanceClassifier;
use crate::config::{AlertConfig, Config, SwitchTrigger};
use crate::domain::DomainExtractor;
use crate::sink::{SessionRecord, SessionSink};
use crate::stats::SessionStats;
use crate::summary::SessionSummary;
use crate::types::{Activity, Classification, EngineEvent, FocusSession, WindowObservation};

/// Point-in-time view of the active session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub goal: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub elapsed: TimeDelta,
    pub context_switches: u32,
    pub current_activity: Option<Activity>,
}

/// Point-in-time aggregate statistics of the active session.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub stats: SessionStats,
    pub elapsed: TimeDelta,
    pub focus_score: f64,
    pub context_switches: u32,
}

/// Everything that exists only while a session is active.
struct ActiveSession {
    session: FocusSession,
    current: Option<Activity>,
    last_observation: Option<WindowObservation>,
    stats: SessionStats,
    window: RecentWindow,
    context_switches: u32,
}

impl ActiveSession {
    fn new(session: FocusSession) -> Self {
        Self {
            session,
            current: None,
            last_observation: None,
            stats: SessionStats::new(),
            window: RecentWindow::new(),
            context_switches: 0,
        }
    }

    /// Closes the open activity at `now` and files it everywhere.
    fn finalize_current(&mut self, now: DateTime<Utc>) -> bool {
        let Some(mut activity) = self.current.take() else {
            return false;
        };
        let duration = activity.close(now);
        self.stats.add(activity.classification, duration);
        self.window.push(activity.clone());
        self.session.push_activity(activity)
    }

    /// Latest of `now`, the session start and the open activity's start.
    fn monotonic(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = self
            .current
            .as_ref()
            .map_or(self.session.start_time, |a| a.timestamp.max(self.session.start_time));
        now.max(floor)
    }

    fn counts_as_switch(&self, trigger: SwitchTrigger, next: Classification) -> bool {
        let Some(previous) = self.current.as_ref().map(|a| a.classification) else {
            return false;
        };
        match trigger {
            SwitchTrigger::OnAnyChange => previous != next,
            SwitchTrigger::OnDistractionEntry => {
                previous != next && next == Classification::Distraction
            }
        }
    }
}

/// Owns the active session and drives it from observations.
pub struct SessionMachine {
    classifier: Arc<RelevanceClassifier>,
    domains: DomainExtractor,
    alerts: AlertEngine,
    switch_trigger: SwitchTrigger,
    sink: Box<dyn SessionSink>,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
    active: Option<ActiveSession>,
}

impl SessionMachine {
    /// Creates an idle machine with default alert thresholds and switch trigger.
    #[must_use]
    pub fn new(
        classifier: Arc<RelevanceClassifier>,
        domains: DomainExtractor,
        sink: Box<dyn SessionSink>,
    ) -> Self {
        Self {
            classifier,
            domains,
            alerts: AlertEngine::default(),
            switch_trigger: SwitchTrigger::default(),
            sink,
            events: None,
            active: None,
        }
    }

    /// Creates an idle machine configured from `config`.
    #[must_use]
    pub fn from_config(
        config: &Config,
        classifier: Arc<RelevanceClassifier>,
        sink: Box<dyn SessionSink>,
    ) -> Self {
        Self::new(
            classifier,
            DomainExtractor::new(&config.classifier.project_markers),
            sink,
        )
        .with_alerts(config.alerts.clone())
        .with_switch_trigger(config.switch_trigger)
    }

    #[must_use]
    pub fn with_alerts(mut self, config: AlertConfig) -> Self {
        self.alerts = AlertEngine::new(config);
        self
    }

    #[must_use]
    pub fn with_switch_trigger(mut self, trigger: SwitchTrigger) -> Self {
        self.switch_trigger = trigger;
        self
    }

    /// Sends events to `events`. Without a channel, events are dropped.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Starts a session now. See [`start_session_at`](Self::start_session_at).
    pub fn start_session(&mut self, goal: &str, description: &str) -> Uuid {
        self.start_session_at(goal, description, Utc::now())
    }

    /// Starts a session at `now`, ending any active one first.
    ///
    /// Blank goal or description are replaced with placeholders. Returns the
    /// new session's ID.
    pub fn start_session_at(&mut self, goal: &str, description: &str, now: DateTime<Utc>) -> Uuid {
        if self.active.is_some() {
            info!("Session already active, ending it before starting a new one");
            self.end_session_at(now);
        }

        let session = FocusSession::new(goal, description, now);
        let session_id = session.id;

        info!(
            session_id = %session_id,
            goal = %session.goal,
            "Focus session started"
        );
        self.emit(EngineEvent::SessionStarted {
            session_id,
            goal: session.goal.clone(),
            description: session.description.clone(),
            start_time: session.start_time,
        });

        self.active = Some(ActiveSession::new(session));
        session_id
    }

    /// Processes an observation now.
    /// See [`process_observation_at`](Self::process_observation_at).
    pub async fn process_observation(&mut self, observation: Option<WindowObservation>) -> bool {
        self.process_observation_at(observation, Utc::now()).await
    }

    /// Feeds one poll result into the active session.
    ///
    /// Without a session, for `None`, or for a repeat of the last observation
    /// this does nothing. Otherwise the open activity is closed at `now`, the
    /// new window is classified and opened, and alerts are evaluated. The
    /// first activity of a session starts at the session start, so every
    /// moment of the session belongs to some activity.
    ///
    /// Returns whether a new activity was opened.
    pub async fn process_observation_at(
        &mut self,
        observation: Option<WindowObservation>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(observation) = observation else {
            return false;
        };
        let Some(active) = self.active.as_ref() else {
            return false;
        };
        if active.last_observation.as_ref() == Some(&observation) {
            return false;
        }

        let goal = active.session.goal.clone();
        let description = active.session.description.clone();
        let domain = self.domains.extract(&observation.title, &observation.process);
        let verdict = self
            .classifier
            .classify(&observation.title, &goal, &description, &domain)
            .await;

        debug!(
            title = %observation.title,
            domain = %domain,
            score = verdict.relevance_score,
            classification = %verdict.classification,
            source = ?verdict.source,
            "Classified foreground window"
        );

        let trigger = self.switch_trigger;
        let Some(active) = self.active.as_mut() else {
            return false;
        };

        let switched = active.counts_as_switch(trigger, verdict.classification);
        let first = active.current.is_none() && active.session.activities().is_empty();
        let now = active.monotonic(now);

        let appended = active.finalize_current(now);
        if switched {
            active.context_switches += 1;
        }

        let opened_at = if first { active.session.start_time } else { now };
        let activity = Activity::open(
            opened_at,
            &observation,
            domain,
            verdict.classification,
            verdict.relevance_score,
        );

        active.current = Some(activity.clone());
        active.last_observation = Some(observation);

        let focus_share = active.window.focus_share();
        let context_switches = active.context_switches;
        let alerts = if appended {
            self.alerts.evaluate(&active.window, context_switches, &goal)
        } else {
            Vec::new()
        };

        self.emit(EngineEvent::ActivityStarted {
            activity,
            focus_share,
            context_switches,
        });
        for alert in alerts {
            info!(alert = %alert, "Focus alert");
            self.emit(EngineEvent::Alert(alert));
        }

        true
    }

    /// Ends the session now. See [`end_session_at`](Self::end_session_at).
    pub fn end_session(&mut self) -> Option<SessionSummary> {
        self.end_session_at(Utc::now())
    }

    /// Ends the active session at `now`.
    ///
    /// The open activity is finalized, the session is handed to the sink, and
    /// the summary is emitted and returned. Returns `None` when idle.
    pub fn end_session_at(&mut self, now: DateTime<Utc>) -> Option<SessionSummary> {
        let mut active = self.active.take()?;
        let now = active.monotonic(now);

        active.finalize_current(now);
        active.session.close(now);

        let summary = SessionSummary::build(&active.session, &active.stats, active.context_switches, now);

        match SessionRecord::from_session(&active.session, summary.focus_score, active.context_switches)
        {
            Ok(record) => {
                if let Err(e) = self.sink.persist(&record) {
                    warn!(session_id = %record.id, error = %e, "Failed to persist session");
                }
            }
            Err(e) => warn!(error = %e, "Failed to build session record"),
        }

        info!(
            session_id = %summary.session_id,
            activities = summary.activity_count,
            focus_score = summary.focus_score,
            "Focus session ended"
        );
        self.emit(EngineEvent::SessionEnded(Box::new(summary.clone())));

        Some(summary)
    }

    /// Status of the active session now.
    #[must_use]
    pub fn status(&self) -> Option<SessionStatus> {
        self.status_at(Utc::now())
    }

    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> Option<SessionStatus> {
        let active = self.active.as_ref()?;
        Some(SessionStatus {
            session_id: active.session.id,
            goal: active.session.goal.clone(),
            description: active.session.description.clone(),
            start_time: active.session.start_time,
            elapsed: active.session.elapsed(now),
            context_switches: active.context_switches,
            current_activity: active.current.clone(),
        })
    }

    /// Statistics of the active session now.
    #[must_use]
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.stats_at(Utc::now())
    }

    /// Statistics over finalized activities; the open one is not counted yet.
    #[must_use]
    pub fn stats_at(&self, now: DateTime<Utc>) -> Option<StatsSnapshot> {
        let active = self.active.as_ref()?;
        let elapsed = active.session.elapsed(now);
        Some(StatsSnapshot {
            stats: active.stats.clone(),
            elapsed,
            focus_score: active.stats.focus_score(elapsed),
            context_switches: active.context_switches,
        })
    }

    /// Finalized activities of the active session.
    #[must_use]
    pub fn activities(&self) -> &[Activity] {
        match &self.active {
            Some(active) => active.session.activities(),
            None => &[],
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is listening any more.
            let _ = events.send(event);
        }
    }
}
