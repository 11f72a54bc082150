//! Rolling-window focus alerts.

use std::collections::VecDeque;
use std::fmt;

use chrono::TimeDelta;

use crate::config::AlertConfig;
use crate::stats::secs_f64;
use crate::types::{Activity, Classification};

/// Finalized activities kept for alerting.
pub const RECENT_CAPACITY: usize = 50;

/// The most recent finalized activities of the active session, oldest first.
#[derive(Debug, Clone, Default)]
pub struct RecentWindow {
    entries: VecDeque<Activity>,
}

impl RecentWindow {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(RECENT_CAPACITY),
        }
    }

    /// Appends an activity, evicting the oldest beyond capacity.
    pub fn push(&mut self, activity: Activity) {
        if self.entries.len() == RECENT_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(activity);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last `n` entries (fewer if the window is shorter), oldest first.
    pub fn last(&self, n: usize) -> impl Iterator<Item = &Activity> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    /// Percentage of windowed time spent on direct activities.
    ///
    /// `None` until the window holds some time.
    #[must_use]
    pub fn focus_share(&self) -> Option<f64> {
        let mut total = TimeDelta::zero();
        let mut direct = TimeDelta::zero();
        for activity in &self.entries {
            let duration = activity.duration().unwrap_or_else(TimeDelta::zero);
            total = total + duration;
            if activity.classification == Classification::Direct {
                direct = direct + duration;
            }
        }

        let total = secs_f64(total);
        (total > 0.0).then(|| secs_f64(direct) / total * 100.0)
    }
}

/// A condition worth telling the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// Too many distractions among the most recent activities.
    DistractionStreak { distractions: usize, window: usize },

    /// Recent activities are, on average, not relevant to the goal.
    Drift {
        goal: String,
        mean_relevance: f64,
        window: usize,
    },

    /// The context-switch counter reached another multiple of the stride.
    HighSwitching { switches: u32 },
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DistractionStreak {
                distractions,
                window,
            } => write!(
                f,
                "FOCUS ALERT: {distractions} of the last {window} activities were distractions"
            ),
            Self::Drift {
                goal,
                mean_relevance,
                window,
            } => write!(
                f,
                "DRIFT DETECTED: low relevance to goal \"{goal}\" ({mean_relevance:.2} over the last {window})"
            ),
            Self::HighSwitching { switches } => {
                write!(f, "HIGH SWITCHING: {switches} context switches")
            }
        }
    }
}

/// Evaluates alert conditions. Evaluation is pure: it mutates nothing and
/// the same state always yields the same alerts.
#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    config: AlertConfig,
}

impl AlertEngine {
    #[must_use]
    pub fn new(config: AlertConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Alerts that hold for the current window and switch count.
    #[must_use]
    pub fn evaluate(&self, window: &RecentWindow, context_switches: u32, goal: &str) -> Vec<Alert> {
        let mut alerts = Vec::new();

        let distractions = window
            .last(self.config.distraction_window)
            .filter(|a| a.classification == Classification::Distraction)
            .count();
        if distractions >= self.config.distraction_threshold {
            alerts.push(Alert::DistractionStreak {
                distractions,
                window: self.config.distraction_window,
            });
        }

        let drift_window = self.config.drift_window;
        if drift_window > 0 && window.len() >= drift_window {
            let sum: f64 = window.last(drift_window).map(|a| a.relevance_score).sum();
            let mean_relevance = sum / drift_window as f64;
            if mean_relevance < self.config.drift_threshold {
                alerts.push(Alert::Drift {
                    goal: goal.to_string(),
                    mean_relevance,
                    window: drift_window,
                });
            }
        }

        let stride = self.config.switch_stride;
        if context_switches > 0 && stride > 0 && context_switches % stride == 0 {
            alerts.push(Alert::HighSwitching {
                switches: context_switches,
            });
        }

        alerts
    }
}
