//! Per-session time aggregation and focus scoring.

use std::collections::BTreeMap;
use std::fmt;

use chrono::TimeDelta;

use crate::types::Classification;

/// Weight of peripheral time in the focus score.
const PERIPHERAL_WEIGHT: f64 = 0.7;

/// Upper bound of the focus score.
pub const MAX_FOCUS_SCORE: f64 = 10.0;

/// Cumulative time per classification within one session.
///
/// Always holds the four scored classifications, starting at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    durations: BTreeMap<Classification, TimeDelta>,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            durations: Classification::SCORED
                .into_iter()
                .map(|c| (c, TimeDelta::zero()))
                .collect(),
        }
    }

    /// Adds time under a classification. Negative durations are ignored.
    pub fn add(&mut self, classification: Classification, duration: TimeDelta) {
        if duration <= TimeDelta::zero() {
            return;
        }
        let entry = self.durations.entry(classification).or_insert_with(TimeDelta::zero);
        *entry = *entry + duration;
    }

    #[must_use]
    pub fn get(&self, classification: Classification) -> TimeDelta {
        self.durations
            .get(&classification)
            .copied()
            .unwrap_or_else(TimeDelta::zero)
    }

    /// Sum over all classifications.
    #[must_use]
    pub fn total(&self) -> TimeDelta {
        self.durations
            .values()
            .fold(TimeDelta::zero(), |acc, d| acc + *d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Classification, TimeDelta)> + '_ {
        self.durations.iter().map(|(c, d)| (*c, *d))
    }

    /// Focus score over a session of length `elapsed`. See [`focus_score`].
    #[must_use]
    pub fn focus_score(&self, elapsed: TimeDelta) -> f64 {
        focus_score(
            self.get(Classification::Direct),
            self.get(Classification::Peripheral),
            elapsed,
        )
    }
}

/// `min(10, (direct + 0.7 * peripheral) / elapsed * 10)`, or 0 for an empty
/// session.
///
/// # Examples
///
/// ```
/// use chrono::TimeDelta;
/// use focusflow_monitor::stats::focus_score;
///
/// let score = focus_score(TimeDelta::minutes(30), TimeDelta::minutes(20), TimeDelta::hours(1));
/// assert!((score - 7.333).abs() < 0.001);
/// assert_eq!(focus_score(TimeDelta::zero(), TimeDelta::zero(), TimeDelta::zero()), 0.0);
/// ```
#[must_use]
pub fn focus_score(direct: TimeDelta, peripheral: TimeDelta, elapsed: TimeDelta) -> f64 {
    let total = secs_f64(elapsed);
    if total <= 0.0 {
        return 0.0;
    }
    let weighted = secs_f64(direct) + secs_f64(peripheral) * PERIPHERAL_WEIGHT;
    (weighted / total * MAX_FOCUS_SCORE).clamp(0.0, MAX_FOCUS_SCORE)
}

/// Qualitative band of a focus score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRating {
    Excellent,
    Good,
    Fair,
    Low,
}

impl FocusRating {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            Self::Excellent
        } else if score >= 6.0 {
            Self::Good
        } else if score >= 4.0 {
            Self::Fair
        } else {
            Self::Low
        }
    }

    /// One-line verdict shown under the score.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent focus! Keep up the great work!",
            Self::Good => "Good focus. Room for improvement.",
            Self::Fair => "Fair focus. Consider reducing distractions.",
            Self::Low => "Low focus. Try to minimize distractions next time.",
        }
    }
}

impl fmt::Display for FocusRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Low => "Low",
        };
        f.write_str(name)
    }
}

/// Seconds as a float, with millisecond precision.
#[must_use]
pub fn secs_f64(duration: TimeDelta) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

/// `Hh MMm` for an hour or more, `Mm SSs` below.
///
/// # Examples
///
/// ```
/// use chrono::TimeDelta;
/// use focusflow_monitor::stats::format_duration;
///
/// assert_eq!(format_duration(TimeDelta::seconds(3_725)), "1h 02m");
/// assert_eq!(format_duration(TimeDelta::seconds(125)), "2m 05s");
/// assert_eq!(format_duration(TimeDelta::zero()), "0m 00s");
/// ```
#[must_use]
pub fn format_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m {seconds:02}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stats_have_four_zeroed_keys() {
        let stats = SessionStats::new();
        assert_eq!(stats.iter().count(), 4);
        assert!(stats.iter().all(|(_, d)| d == TimeDelta::zero()));
        assert_eq!(stats.get(Classification::Unknown), TimeDelta::zero());
    }

    #[test]
    fn add_accumulates_and_ignores_negative() {
        let mut stats = SessionStats::new();
        stats.add(Classification::Direct, TimeDelta::seconds(30));
        stats.add(Classification::Direct, TimeDelta::seconds(15));
        stats.add(Classification::Distraction, TimeDelta::seconds(-10));
        assert_eq!(stats.get(Classification::Direct), TimeDelta::seconds(45));
        assert_eq!(stats.get(Classification::Distraction), TimeDelta::zero());
        assert_eq!(stats.total(), TimeDelta::seconds(45));
    }

    #[test]
    fn focus_score_is_bounded() {
        let capped = focus_score(TimeDelta::hours(2), TimeDelta::hours(1), TimeDelta::hours(1));
        assert_eq!(capped, MAX_FOCUS_SCORE);

        let none = focus_score(TimeDelta::zero(), TimeDelta::zero(), TimeDelta::hours(1));
        assert_eq!(none, 0.0);

        let negative = focus_score(TimeDelta::hours(1), TimeDelta::zero(), TimeDelta::seconds(-5));
        assert_eq!(negative, 0.0);
    }

    #[test]
    fn stats_focus_score_uses_direct_and_peripheral_only() {
        let mut stats = SessionStats::new();
        stats.add(Classification::Direct, TimeDelta::seconds(60));
        stats.add(Classification::Indirect, TimeDelta::seconds(60));
        assert!((stats.focus_score(TimeDelta::seconds(120)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn rating_bands() {
        assert_eq!(FocusRating::from_score(10.0), FocusRating::Excellent);
        assert_eq!(FocusRating::from_score(8.0), FocusRating::Excellent);
        assert_eq!(FocusRating::from_score(7.9), FocusRating::Good);
        assert_eq!(FocusRating::from_score(4.0), FocusRating::Fair);
        assert_eq!(FocusRating::from_score(0.0), FocusRating::Low);
    }

    #[test]
    fn format_duration_clamps_negative() {
        assert_eq!(format_duration(TimeDelta::seconds(-30)), "0m 00s");
        assert_eq!(format_duration(TimeDelta::hours(10)), "10h 00m");
    }
}
