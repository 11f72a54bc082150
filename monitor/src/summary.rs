//! End-of-session summary report.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::stats::{format_duration, secs_f64, FocusRating, SessionStats};
use crate::types::{Classification, FocusSession};

const RULE_WIDTH: usize = 60;

/// Time spent under one classification.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownRow {
    pub classification: Classification,
    pub duration: TimeDelta,
    /// Share of the session duration, in percent.
    pub percent: f64,
}

/// Everything reported when a session ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub goal: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: TimeDelta,
    pub context_switches: u32,
    pub activity_count: usize,
    /// One row per scored classification, in report order.
    pub breakdown: Vec<BreakdownRow>,
    /// In `[0, 10]`.
    pub focus_score: f64,
    pub rating: FocusRating,
}

impl SessionSummary {
    /// Builds the summary of an ended session.
    ///
    /// A session that is still active is summarized up to `end`.
    #[must_use]
    pub fn build(
        session: &FocusSession,
        stats: &SessionStats,
        context_switches: u32,
        end: DateTime<Utc>,
    ) -> Self {
        let end_time = session.end_time().unwrap_or(end);
        let duration = session.elapsed(end_time);
        let total = secs_f64(duration);

        let breakdown = Classification::SCORED
            .into_iter()
            .map(|classification| {
                let spent = stats.get(classification);
                let percent = if total > 0.0 {
                    secs_f64(spent) / total * 100.0
                } else {
                    0.0
                };
                BreakdownRow {
                    classification,
                    duration: spent,
                    percent,
                }
            })
            .collect();

        let focus_score = stats.focus_score(duration);

        Self {
            session_id: session.id,
            goal: session.goal.clone(),
            description: session.description.clone(),
            start_time: session.start_time,
            end_time,
            duration,
            context_switches,
            activity_count: session.activities().len(),
            breakdown,
            focus_score,
            rating: FocusRating::from_score(focus_score),
        }
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(f, "FOCUS SESSION SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Goal:              {}", self.goal)?;
        writeln!(f, "Description:       {}", self.description)?;
        writeln!(f, "Duration:          {}", format_duration(self.duration))?;
        writeln!(f, "Context switches:  {}", self.context_switches)?;
        writeln!(f, "Activities:        {}", self.activity_count)?;
        writeln!(f)?;
        writeln!(f, "RELEVANCE BREAKDOWN")?;
        for row in &self.breakdown {
            writeln!(
                f,
                "  {:<12} {:>8} | {:>5.1}%",
                row.classification.as_str(),
                format_duration(row.duration),
                row.percent
            )?;
        }
        writeln!(f)?;
        writeln!(f, "FOCUS SCORE: {:.1}/10", self.focus_score)?;
        write!(f, "{}", self.rating.message())
    }
}
