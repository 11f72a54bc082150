//! Relevance classification of window titles against a session goal.
//!
//! A [`RelevanceClassifier`] prefers an AI-assisted backend and always has
//! rule-based scoring to fall back on:
//!
//! 1. A cached backend verdict for the same (title, goal, description, domain)
//!    is returned as-is.
//! 2. If a backend is configured, answers its liveness probe, and the domain
//!    is eligible (no ambiguous-domain list, or the domain is on it), the
//!    backend is asked. Successful verdicts are cached.
//! 3. Otherwise, or when the backend call fails in any way, the title is
//!    scored by [`RuleScorer`] against the derived goal keywords.
//!
//! Whatever the source, the final classification is the band of the score.

mod cache;
mod keywords;
mod rules;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{BackendError, ClassificationBackend, ClassifyRequest};
use crate::config::ClassifierConfig;
use crate::types::Classification;

pub use cache::{stable_key, MemoCache};
pub use keywords::{fallback_keywords, KeywordDeriver};
pub use rules::RuleScorer;

/// Where a verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    Backend,
    Cached,
    Rules,
}

/// The outcome of classifying one title.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    /// Relevance in `[0, 1]`.
    pub relevance_score: f64,
    /// Always `Classification::from_score(relevance_score)`.
    pub classification: Classification,
    pub source: VerdictSource,
}

impl Verdict {
    fn from_score(relevance_score: f64, source: VerdictSource) -> Self {
        let relevance_score = if relevance_score.is_finite() {
            relevance_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            relevance_score,
            classification: Classification::from_score(relevance_score),
            source,
        }
    }
}

/// Scores window titles for relevance to a goal.
pub struct RelevanceClassifier {
    backend: Option<Arc<dyn ClassificationBackend>>,
    keywords: KeywordDeriver,
    rules: RuleScorer,
    verdicts: MemoCache<Verdict>,
    ambiguous_domains: Option<HashSet<String>>,
    timeout: Duration,
}

impl RelevanceClassifier {
    /// Creates a classifier. `timeout` bounds every backend call.
    #[must_use]
    pub fn new(
        config: &ClassifierConfig,
        backend: Option<Arc<dyn ClassificationBackend>>,
        timeout: Duration,
    ) -> Self {
        let ambiguous_domains = config.ambiguous_domains.as_ref().map(|domains| {
            domains
                .iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect()
        });

        Self {
            keywords: KeywordDeriver::new(backend.clone(), config.cache_capacity, timeout),
            rules: RuleScorer::new(&config.project_markers, config.keyword_weight),
            verdicts: MemoCache::new(config.cache_capacity),
            backend,
            ambiguous_domains,
            timeout,
        }
    }

    /// A classifier that never calls out.
    #[must_use]
    pub fn rules_only(config: &ClassifierConfig) -> Self {
        Self::new(config, None, Duration::from_secs(1))
    }

    #[must_use]
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    #[must_use]
    pub fn keyword_deriver(&self) -> &KeywordDeriver {
        &self.keywords
    }

    /// Derives goal keywords. See [`KeywordDeriver::derive`].
    pub async fn derive_keywords(&self, goal: &str, description: &str) -> Arc<[String]> {
        self.keywords.derive(goal, description).await
    }

    /// Classifies a title. Never fails; every backend problem becomes a
    /// rule-based verdict.
    pub async fn classify(&self, title: &str, goal: &str, description: &str, domain: &str) -> Verdict {
        let key = stable_key(&[title, goal, description, domain]);
        if let Some(cached) = self.verdicts.get(&key) {
            debug!(domain = %domain, score = cached.relevance_score, "Using cached verdict");
            return Verdict {
                source: VerdictSource::Cached,
                ..cached
            };
        }

        let available = match &self.backend {
            Some(backend) => backend_available(backend.as_ref(), self.timeout).await,
            None => false,
        };
        let keywords = self.keywords.derive_with(goal, description, available).await;

        if let Some(backend) = self.backend.as_ref().filter(|_| available && self.is_eligible(domain)) {
            let request = ClassifyRequest {
                title,
                goal,
                description,
                domain,
                keywords: &keywords,
            };

            match bounded(self.timeout, backend.classify(&request)).await {
                Ok(answer) => {
                    let verdict = Verdict::from_score(answer.relevance_score, VerdictSource::Backend);
                    if verdict.classification != answer.classification {
                        debug!(
                            label = %answer.classification,
                            band = %verdict.classification,
                            score = verdict.relevance_score,
                            "Backend label disagrees with its score, using the score band"
                        );
                    }
                    self.verdicts.insert(key, verdict);
                    return verdict;
                }
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        domain = %domain,
                        error = %e,
                        "Backend classification failed, falling back to rules"
                    );
                }
            }
        }

        let score = self.rules.score(title, description, domain, &keywords);
        Verdict::from_score(score, VerdictSource::Rules)
    }

    fn is_eligible(&self, domain: &str) -> bool {
        self.ambiguous_domains
            .as_ref()
            .map_or(true, |domains| domains.contains(domain))
    }
}

/// Liveness probe bounded by the call timeout.
async fn backend_available(backend: &dyn ClassificationBackend, limit: Duration) -> bool {
    tokio::time::timeout(limit, backend.is_available())
        .await
        .unwrap_or(false)
}

/// Runs a backend call, turning an elapsed bound into `BackendError::Timeout`.
async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(BackendError::Timeout {
            secs: limit.as_secs(),
        }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::backend::BackendVerdict;

    /// Scripted backend counting its calls.
    struct FakeBackend {
        available: bool,
        verdict: Mutex<Option<Result<BackendVerdict, BackendError>>>,
        classify_calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeBackend {
        fn answering(score: f64, label: Classification) -> Self {
            Self {
                available: true,
                verdict: Mutex::new(Some(Ok(BackendVerdict {
                    relevance_score: score,
                    classification: label,
                    reason: None,
                }))),
                classify_calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn failing() -> Self {
            Self {
                verdict: Mutex::new(Some(Err(BackendError::Malformed("nonsense".to_string())))),
                ..Self::answering(0.0, Classification::Distraction)
            }
        }
    }

    #[async_trait]
    impl ClassificationBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn generate_keywords(&self, _: &str, _: &str) -> Result<Vec<String>, BackendError> {
            Err(BackendError::Malformed("no keywords".to_string()))
        }

        async fn classify(&self, _: &ClassifyRequest<'_>) -> Result<BackendVerdict, BackendError> {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match self.verdict.lock().unwrap().as_ref() {
                Some(Ok(v)) => Ok(v.clone()),
                _ => Err(BackendError::Malformed("nonsense".to_string())),
            }
        }
    }

    fn classifier_with(backend: Arc<FakeBackend>, config: &ClassifierConfig) -> RelevanceClassifier {
        RelevanceClassifier::new(config, Some(backend), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn backend_verdicts_are_banded_and_cached() {
        let backend = Arc::new(FakeBackend::answering(0.65, Classification::Direct));
        let classifier = classifier_with(Arc::clone(&backend), &ClassifierConfig::default());

        let first = classifier.classify("Attention paper", "NLP", "transformers", "arxiv.org").await;
        assert_eq!(first.source, VerdictSource::Backend);
        assert_eq!(first.relevance_score, 0.65);
        assert_eq!(first.classification, Classification::Peripheral);

        let second = classifier.classify("Attention paper", "NLP", "transformers", "arxiv.org").await;
        assert_eq!(second.source, VerdictSource::Cached);
        assert_eq!(second.relevance_score, first.relevance_score);
        assert_eq!(second.classification, first.classification);
        assert_eq!(backend.classify_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_fall_back_to_rules_uncached() {
        let backend = Arc::new(FakeBackend::failing());
        let classifier = classifier_with(Arc::clone(&backend), &ClassifierConfig::default());

        for _ in 0..2 {
            let verdict = classifier.classify("Home", "NLP", "", "facebook.com").await;
            assert_eq!(verdict.source, VerdictSource::Rules);
            assert_eq!(verdict.classification, Classification::Distraction);
        }
        assert_eq!(backend.classify_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_backend_times_out_into_rules() {
        let backend = Arc::new(FakeBackend {
            delay: Duration::from_secs(5),
            ..FakeBackend::answering(0.95, Classification::Direct)
        });
        let classifier =
            RelevanceClassifier::new(&ClassifierConfig::default(), Some(backend), Duration::from_millis(50));

        let verdict = classifier.classify("Inbox", "NLP", "", "mail").await;
        assert_eq!(verdict.source, VerdictSource::Rules);
        assert_eq!(verdict.relevance_score, 0.5);
    }

    #[tokio::test]
    async fn unavailable_backend_is_not_called() {
        let backend = Arc::new(FakeBackend {
            available: false,
            ..FakeBackend::answering(0.95, Classification::Direct)
        });
        let classifier = classifier_with(Arc::clone(&backend), &ClassifierConfig::default());

        let verdict = classifier.classify("Inbox", "NLP", "", "mail").await;
        assert_eq!(verdict.source, VerdictSource::Rules);
        assert_eq!(backend.classify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn only_ambiguous_domains_reach_the_backend() {
        let config = ClassifierConfig {
            ambiguous_domains: Some(vec!["YouTube.com".to_string()]),
            ..ClassifierConfig::default()
        };
        let backend = Arc::new(FakeBackend::answering(0.9, Classification::Direct));
        let classifier = classifier_with(Arc::clone(&backend), &config);

        let rules = classifier.classify("Home", "NLP", "", "facebook.com").await;
        assert_eq!(rules.source, VerdictSource::Rules);

        let ai = classifier.classify("Transformers explained", "NLP", "", "youtube.com").await;
        assert_eq!(ai.source, VerdictSource::Backend);
        assert_eq!(backend.classify_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rules_only_classifier_is_deterministic() {
        let classifier = RelevanceClassifier::rules_only(&ClassifierConfig::default());
        assert!(!classifier.has_backend());

        let a = classifier.classify("ResNet Tutorial - YouTube", "Deep Learning", "studying CNNs", "youtube.com").await;
        let b = classifier.classify("ResNet Tutorial - YouTube", "Deep Learning", "studying CNNs", "youtube.com").await;
        assert_eq!(a, b);
        assert!(a.relevance_score > 0.7);
    }
}
