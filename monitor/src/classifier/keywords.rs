//! Goal keyword derivation.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::cache::{stable_key, MemoCache};
use super::{backend_available, bounded};
use crate::backend::{ClassificationBackend, MAX_KEYWORDS, MIN_KEYWORDS};

/// Derives the keyword set that rule-based scoring matches titles against.
///
/// Backend-derived sets are cached per (goal, description). Token fallbacks
/// are not, so a backend that comes back is used on the next derivation.
pub struct KeywordDeriver {
    backend: Option<Arc<dyn ClassificationBackend>>,
    cache: MemoCache<Arc<[String]>>,
    timeout: Duration,
}

impl KeywordDeriver {
    #[must_use]
    pub fn new(
        backend: Option<Arc<dyn ClassificationBackend>>,
        cache_capacity: NonZeroUsize,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            cache: MemoCache::new(cache_capacity),
            timeout,
        }
    }

    /// Returns the keywords for a goal and description. Never fails.
    pub async fn derive(&self, goal: &str, description: &str) -> Arc<[String]> {
        if let Some(hit) = self.cache.get(&stable_key(&[goal, description])) {
            return hit;
        }
        let available = match &self.backend {
            Some(backend) => backend_available(backend.as_ref(), self.timeout).await,
            None => false,
        };
        self.derive_with(goal, description, available).await
    }

    /// Like [`derive`](Self::derive) with availability already probed.
    pub(super) async fn derive_with(
        &self,
        goal: &str,
        description: &str,
        backend_available: bool,
    ) -> Arc<[String]> {
        let key = stable_key(&[goal, description]);
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        let backend = match &self.backend {
            Some(backend) if backend_available => backend,
            _ => return fallback_keywords(goal, description).into(),
        };

        match bounded(self.timeout, backend.generate_keywords(goal, description)).await {
            Ok(raw) => {
                let keywords: Arc<[String]> = merge_keywords(raw, goal, description).into();
                debug!(backend = backend.name(), count = keywords.len(), "Derived goal keywords");
                self.cache.insert(key, Arc::clone(&keywords));
                keywords
            }
            Err(e) => {
                warn!(
                    backend = backend.name(),
                    error = %e,
                    "Keyword generation failed, falling back to goal tokens"
                );
                fallback_keywords(goal, description).into()
            }
        }
    }

    /// Number of cached keyword sets.
    #[must_use]
    pub fn cached_sets(&self) -> usize {
        self.cache.len()
    }
}

/// Lower-cased alphanumeric runs of goal and description, deduplicated in
/// order of first appearance and capped at [`MAX_KEYWORDS`].
///
/// # Examples
///
/// ```
/// use focusflow_monitor::classifier::fallback_keywords;
///
/// let keywords = fallback_keywords("Deep Learning", "studying CNNs, deep nets");
/// assert_eq!(keywords, ["deep", "learning", "studying", "cnns", "nets"]);
/// ```
#[must_use]
pub fn fallback_keywords(goal: &str, description: &str) -> Vec<String> {
    let text = format!("{goal} {description}").to_lowercase();
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .filter(|token| seen.insert(*token))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

/// Normalizes a backend keyword list, topping it up from the goal and
/// description when it is short.
fn merge_keywords(raw: Vec<String>, goal: &str, description: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords: Vec<String> = raw
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect();

    if keywords.len() < MIN_KEYWORDS {
        let extra = format!("{goal} {description}").to_lowercase();
        for word in extra.split_whitespace() {
            if seen.insert(word.to_string()) {
                keywords.push(word.to_string());
            }
        }
    }

    keywords.truncate(MAX_KEYWORDS);
    keywords
}
