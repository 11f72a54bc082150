//! Domain extraction from window titles and process names.
//!
//! A "domain" is a coarse source label: a website (`youtube.com`), an
//! application (`code`, `slack`), or one of the user's own projects. Extraction
//! is a pure function of `(title, process)` and never fails.
//!
//! # Priority
//!
//! 1. Code editors map to `code`, or to a project marker found in the title.
//! 2. A dotted domain-like token in the title (`- site.com`, `arxiv.org`).
//! 3. Well-known platform names mentioned in the title.
//! 4. The lower-cased process name.
//!
//! # Example
//!
//! ```
//! use focusflow_monitor::domain::extract_domain;
//!
//! assert_eq!(extract_domain("ResNet Tutorial - YouTube", "chrome"), "youtube.com");
//! assert_eq!(extract_domain("main.rs - focusflow - Visual Studio Code", "Code"), "focusflow");
//! assert_eq!(extract_domain("Inbox", "Thunderbird"), "thunderbird");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

/// Label for code editors without a recognised project.
pub const CODE_DOMAIN: &str = "code";

/// Label used when neither title nor process yields anything.
pub const UNKNOWN_DOMAIN: &str = "unknown";

/// `Title - site.com` style suffixes.
static RE_DASH_COM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"- ([^-]+\.com)").expect("valid dash-com pattern"));

/// Any dotted token with a short alphabetic TLD.
static RE_DOTTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^|\s]+\.[a-z]{2,4})").expect("valid dotted-token pattern"));

/// Platform name fragments and the domain they stand for.
const PLATFORMS: &[(&str, &str)] = &[
    ("youtube", "youtube.com"),
    ("wikipedia", "wikipedia.org"),
    ("stack overflow", "stackoverflow.com"),
    ("github", "github.com"),
    ("reddit", "reddit.com"),
    ("netflix", "netflix.com"),
    ("twitch", "twitch.tv"),
    ("facebook", "facebook.com"),
    ("instagram", "instagram.com"),
    ("tiktok", "tiktok.com"),
];

/// Derives domain labels, aware of the user's project markers.
#[derive(Debug, Clone)]
pub struct DomainExtractor {
    project_markers: Vec<String>,
}

impl Default for DomainExtractor {
    fn default() -> Self {
        Self::new(["focusflow"])
    }
}

impl DomainExtractor {
    /// Creates an extractor recognising the given project markers.
    ///
    /// Markers are lower-cased; blank markers are dropped.
    #[must_use]
    pub fn new<I, S>(project_markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let project_markers = project_markers
            .into_iter()
            .map(|m| m.as_ref().trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        Self { project_markers }
    }

    /// Lower-cased project markers.
    #[must_use]
    pub fn project_markers(&self) -> &[String] {
        &self.project_markers
    }

    /// Returns the first project marker contained in `text`, if any.
    #[must_use]
    pub fn find_project_marker(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.project_markers
            .iter()
            .find(|m| lower.contains(m.as_str()))
            .map(String::as_str)
    }

    /// Extracts the domain label for a title/process pair.
    #[must_use]
    pub fn extract(&self, title: &str, process: &str) -> String {
        let title_lower = title.to_lowercase();
        let process_lower = process.trim().to_lowercase();

        if process_lower.contains("code") || title_lower.contains("visual studio code") {
            return match self.find_project_marker(&title_lower) {
                Some(marker) => marker.to_string(),
                None => CODE_DOMAIN.to_string(),
            };
        }

        if let Some(domain) = pattern_domain(&title_lower) {
            return domain;
        }

        if let Some((_, domain)) = PLATFORMS.iter().find(|(name, _)| title_lower.contains(name)) {
            return (*domain).to_string();
        }

        if process_lower.is_empty() {
            UNKNOWN_DOMAIN.to_string()
        } else {
            process_lower
        }
    }
}

/// Extracts a domain with the default project markers.
#[must_use]
pub fn extract_domain(title: &str, process: &str) -> String {
    DomainExtractor::default().extract(title, process)
}

/// Pattern-based extraction on an already lower-cased title.
fn pattern_domain(title_lower: &str) -> Option<String> {
    let captured = RE_DASH_COM
        .captures(title_lower)
        .or_else(|| RE_DOTTED.captures(title_lower))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())?;

    let trimmed = captured
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '.' && c != '-')
        .trim_start_matches("www.");

    // A bare file name such as "main.rs" still looks like a domain; keep it,
    // the classifier treats unknown domains neutrally.
    if trimmed.is_empty() || !trimmed.contains('.') {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_process_maps_to_code() {
        assert_eq!(extract_domain("lib.rs - crate", "code"), "code");
        assert_eq!(extract_domain("lib.rs - crate", "Code - Insiders"), "code");
        assert_eq!(extract_domain("notes - Visual Studio Code", "electron"), "code");
    }

    #[test]
    fn editor_with_project_marker_maps_to_project() {
        let extractor = DomainExtractor::new(["focusflow", "daip"]);
        assert_eq!(extractor.extract("session.rs - DAIP - Visual Studio Code", "Code"), "daip");
        assert_eq!(extractor.extract("session.rs - focusflow", "code"), "focusflow");
    }

    #[test]
    fn dash_com_suffix_wins() {
        assert_eq!(
            extract_domain("How to sort a Vec - stackoverflow.com - Firefox", "firefox"),
            "stackoverflow.com"
        );
    }

    #[test]
    fn dotted_token_is_extracted() {
        assert_eq!(
            extract_domain("[2401.00001] Attention Is All You Need | arxiv.org", "chrome"),
            "arxiv.org"
        );
        assert_eq!(extract_domain("(3) Home | www.facebook.com", "chrome"), "facebook.com");
    }

    #[test]
    fn platform_table_is_used_without_dotted_token() {
        assert_eq!(extract_domain("ResNet Tutorial - YouTube", "chrome"), "youtube.com");
        assert_eq!(extract_domain("Convolution - Wikipedia", "firefox"), "wikipedia.org");
        assert_eq!(extract_domain("rust - Stack Overflow", "firefox"), "stackoverflow.com");
        assert_eq!(extract_domain("rust-lang/rust: GitHub", "safari"), "github.com");
    }

    #[test]
    fn falls_back_to_process_name() {
        assert_eq!(extract_domain("Inbox", "Thunderbird"), "thunderbird");
        assert_eq!(extract_domain("", "  "), UNKNOWN_DOMAIN);
    }

    #[test]
    fn extraction_is_deterministic() {
        let inputs = [
            ("ResNet Tutorial - YouTube", "chrome"),
            ("Home | facebook.com", "firefox"),
            ("Terminal", "alacritty"),
        ];
        for (title, process) in inputs {
            assert_eq!(extract_domain(title, process), extract_domain(title, process));
        }
    }

    #[test]
    fn blank_markers_are_ignored() {
        let extractor = DomainExtractor::new(["", "  ", "Proj"]);
        assert_eq!(extractor.project_markers(), ["proj".to_string()]);
    }
}
