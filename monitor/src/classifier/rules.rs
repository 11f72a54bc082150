//! Deterministic rule-based relevance scoring.
//!
//! The score starts from a per-domain base (curated educational and
//! distraction tables, neutral otherwise) and collects bonuses for keyword
//! hits, description overlap, project markers and learning content on video
//! or course platforms. The result is clamped to `[0, 1]`.

use std::collections::HashMap;

use crate::types::DEFAULT_DESCRIPTION;

/// Base score for domains in neither table.
pub const NEUTRAL_BASE: f64 = 0.5;

/// Bonus when a description word appears in the title.
pub const DESCRIPTION_BONUS: f64 = 0.10;

/// Bonus when the title or domain names one of the user's projects.
pub const PROJECT_BONUS: f64 = 0.30;

/// Bonus for learning content on a video or course platform.
pub const LEARNING_BONUS: f64 = 0.15;

/// Base score for project-marker domains.
const PROJECT_BASE: f64 = 0.90;

/// Description words shorter than this are too common to count.
const MIN_DESCRIPTION_WORD_LEN: usize = 4;

const EDUCATIONAL_DOMAINS: &[(&str, f64)] = &[
    ("youtube.com", 0.70),
    ("coursera.org", 0.95),
    ("edx.org", 0.95),
    ("khanacademy.org", 0.95),
    ("arxiv.org", 0.90),
    ("wikipedia.org", 0.80),
    ("stackoverflow.com", 0.85),
    ("github.com", 0.80),
    ("medium.com", 0.60),
    ("towardsdatascience.com", 0.85),
    ("paperswithcode.com", 0.90),
    ("scholar.google.com", 0.90),
    ("researchgate.net", 0.85),
    ("code", 0.85),
];

const DISTRACTION_DOMAINS: &[(&str, f64)] = &[
    ("facebook.com", 0.05),
    ("twitter.com", 0.10),
    ("x.com", 0.10),
    ("instagram.com", 0.05),
    ("tiktok.com", 0.05),
    ("reddit.com", 0.20),
    ("netflix.com", 0.05),
    ("twitch.tv", 0.10),
    ("gaming", 0.15),
];

const LEARNING_PLATFORMS: &[&str] = &["youtube.com", "coursera.org", "edx.org", "khanacademy.org"];

const LEARNING_TERMS: &[&str] = &[
    "lecture",
    "tutorial",
    "course",
    "crash course",
    "educational",
    "introduction",
    "explained",
    "lesson",
];

/// Rule-based scorer with curated domain tables.
#[derive(Debug, Clone)]
pub struct RuleScorer {
    educational: HashMap<String, f64>,
    distraction: HashMap<String, f64>,
    project_markers: Vec<String>,
    keyword_weight: f64,
}

impl RuleScorer {
    /// Creates a scorer. Project markers are added to the educational table.
    #[must_use]
    pub fn new(project_markers: &[String], keyword_weight: f64) -> Self {
        let project_markers: Vec<String> = project_markers
            .iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();

        let mut educational: HashMap<String, f64> = EDUCATIONAL_DOMAINS
            .iter()
            .map(|(d, w)| ((*d).to_string(), *w))
            .collect();
        for marker in &project_markers {
            educational.insert(marker.clone(), PROJECT_BASE);
        }

        let distraction = DISTRACTION_DOMAINS
            .iter()
            .map(|(d, w)| ((*d).to_string(), *w))
            .collect();

        Self {
            educational,
            distraction,
            project_markers,
            keyword_weight,
        }
    }

    /// Base score for a domain before any title evidence.
    #[must_use]
    pub fn base_score(&self, domain: &str) -> f64 {
        self.educational
            .get(domain)
            .or_else(|| self.distraction.get(domain))
            .copied()
            .unwrap_or(NEUTRAL_BASE)
    }

    /// Scores a title against a description and keyword set.
    #[must_use]
    pub fn score(&self, title: &str, description: &str, domain: &str, keywords: &[String]) -> f64 {
        let title_lower = title.to_lowercase();
        let mut score = self.base_score(domain);

        let hits = keywords
            .iter()
            .filter(|k| !k.is_empty() && title_lower.contains(k.to_lowercase().as_str()))
            .count();
        score += hits as f64 * self.keyword_weight;

        if description != DEFAULT_DESCRIPTION && description_overlaps(&title_lower, description) {
            score += DESCRIPTION_BONUS;
        }

        let mentions_project = self
            .project_markers
            .iter()
            .any(|m| title_lower.contains(m.as_str()) || domain == m);
        if mentions_project {
            score += PROJECT_BONUS;
        }

        if LEARNING_PLATFORMS.contains(&domain)
            && LEARNING_TERMS.iter().any(|t| title_lower.contains(t))
        {
            score += LEARNING_BONUS;
        }

        score.clamp(0.0, 1.0)
    }
}

/// Whether any sufficiently long description word occurs in the title.
fn description_overlaps(title_lower: &str, description: &str) -> bool {
    description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_DESCRIPTION_WORD_LEN)
        .any(|w| title_lower.contains(w))
}
