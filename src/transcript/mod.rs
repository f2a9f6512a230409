//! Transcript acquisition
//!
//! Resolves transcript text for an item, consulting the content cache first
//! and falling back to the external transcript source one language at a time.
//! Failures come back as classified values so the batch can keep going.

pub mod ytdlp;

use crate::cache::ContentCache;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_LANGUAGE: &str = "en";

/// Raw output of a transcript source for one language.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTranscript {
    pub text: String,
    pub language: String,
    pub duration_seconds: Option<f64>,
}

/// Everything a transcript source can report instead of text.
///
/// Sources translate their own failure signatures into these variants; the
/// acquirer never looks at message text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("No transcript track: {0}")]
    NoTrack(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, item_id: &str, language: &str) -> Result<RawTranscript, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoCaptions,
    Network,
    RateLimited,
    Unknown,
}

impl FailureKind {
    pub fn retryable(self) -> bool {
        matches!(self, FailureKind::Network | FailureKind::RateLimited)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCaptions => write!(f, "no_captions"),
            Self::Network => write!(f, "network"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Map a source error onto the failure taxonomy.
pub fn classify(err: &SourceError) -> FailureKind {
    match err {
        SourceError::NoTrack(_) => FailureKind::NoCaptions,
        SourceError::Network(_) | SourceError::Timeout(_) => FailureKind::Network,
        SourceError::RateLimited(_) => FailureKind::RateLimited,
        SourceError::Other(_) => FailureKind::Unknown,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptResult {
    pub item_id: String,
    pub text: String,
    pub language: String,
    pub duration_seconds: Option<f64>,
    pub cached: bool,
    /// Observability only.
    pub fetch_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptFailure {
    pub item_id: String,
    pub message: String,
    pub kind: FailureKind,
    pub retryable: bool,
}

impl TranscriptFailure {
    fn from_source(item_id: &str, err: &SourceError) -> Self {
        let kind = classify(err);
        Self {
            item_id: item_id.to_string(),
            message: err.to_string(),
            kind,
            retryable: kind.retryable(),
        }
    }
}

pub type TranscriptOutcome = Result<TranscriptResult, TranscriptFailure>;

/// What goes into the cache: the text plus the metadata needed to rebuild a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedTranscript {
    text: String,
    language: String,
    #[serde(default)]
    duration_seconds: Option<f64>,
}

pub struct TranscriptAcquirer {
    source: Arc<dyn TranscriptSource>,
    cache: ContentCache,
    fallback_language: String,
    call_timeout: Duration,
}

impl TranscriptAcquirer {
    pub fn new(source: Arc<dyn TranscriptSource>, cache: ContentCache) -> Self {
        Self {
            source,
            cache,
            fallback_language: DEFAULT_LANGUAGE.to_string(),
            call_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_fallback_language(mut self, language: &str) -> Self {
        self.fallback_language = language.to_string();
        self
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Caller languages in order, then the fallback, without repeats or blanks.
    fn candidate_languages(&self, languages: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for lang in languages
            .iter()
            .map(|l| l.trim())
            .chain(std::iter::once(self.fallback_language.as_str()))
        {
            if !lang.is_empty() && !out.iter().any(|l| l == lang) {
                out.push(lang.to_string());
            }
        }
        out
    }

    pub async fn fetch(
        &self,
        item_id: &str,
        languages: &[String],
        force_refresh: bool,
    ) -> TranscriptOutcome {
        let start = Instant::now();

        if !force_refresh {
            if let Some(hit) = self.cache.get::<CachedTranscript>(item_id) {
                log::debug!("Transcript cache hit for {}", item_id);
                return Ok(TranscriptResult {
                    item_id: item_id.to_string(),
                    text: hit.text,
                    language: hit.language,
                    duration_seconds: hit.duration_seconds,
                    cached: true,
                    fetch_duration_ms: start.elapsed().as_millis() as u64,
                });
            }
        }

        let mut last_miss: Option<SourceError> = None;

        for language in self.candidate_languages(languages) {
            let attempt =
                match tokio::time::timeout(self.call_timeout, self.source.fetch(item_id, &language))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Timeout(self.call_timeout)),
                };

            match attempt {
                Ok(raw) if !raw.text.trim().is_empty() => {
                    let cached = CachedTranscript {
                        text: raw.text,
                        language: raw.language,
                        duration_seconds: raw.duration_seconds,
                    };
                    if let Err(e) = self.cache.set(item_id, &cached, None) {
                        log::warn!("Failed to cache transcript for {}: {}", item_id, e);
                    }
                    return Ok(TranscriptResult {
                        item_id: item_id.to_string(),
                        text: cached.text,
                        language: cached.language,
                        duration_seconds: cached.duration_seconds,
                        cached: false,
                        fetch_duration_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Ok(_) => {
                    log::debug!("Empty {} transcript for {}", language, item_id);
                    last_miss = Some(SourceError::NoTrack(format!(
                        "empty transcript for language {}",
                        language
                    )));
                }
                Err(SourceError::NoTrack(msg)) => {
                    log::debug!("No {} transcript for {}: {}", language, item_id, msg);
                    last_miss = Some(SourceError::NoTrack(msg));
                }
                Err(other) => {
                    // Trying another language will not fix a connectivity problem
                    return Err(TranscriptFailure::from_source(item_id, &other));
                }
            }
        }

        let err = last_miss
            .unwrap_or_else(|| SourceError::NoTrack("no candidate languages".to_string()));
        Err(TranscriptFailure::from_source(item_id, &err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Source answering from a fixed table of (item, language) -> result.
    struct TableSource {
        answers: HashMap<(String, String), Result<RawTranscript, SourceError>>,
        calls: AtomicUsize,
        languages_seen: Mutex<Vec<String>>,
    }

    impl TableSource {
        fn new() -> Self {
            Self {
                answers: HashMap::new(),
                calls: AtomicUsize::new(0),
                languages_seen: Mutex::new(Vec::new()),
            }
        }

        fn answer(mut self, id: &str, lang: &str, res: Result<&str, SourceError>) -> Self {
            let res = res.map(|text| RawTranscript {
                text: text.to_string(),
                language: lang.to_string(),
                duration_seconds: Some(600.0),
            });
            self.answers.insert((id.to_string(), lang.to_string()), res);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranscriptSource for TableSource {
        async fn fetch(&self, item_id: &str, language: &str) -> Result<RawTranscript, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.languages_seen.lock().unwrap().push(language.to_string());
            self.answers
                .get(&(item_id.to_string(), language.to_string()))
                .cloned()
                .unwrap_or_else(|| Err(SourceError::NoTrack("not in table".into())))
        }
    }

    struct SlowSource;

    #[async_trait]
    impl TranscriptSource for SlowSource {
        async fn fetch(&self, _: &str, _: &str) -> Result<RawTranscript, SourceError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(SourceError::Other("unreachable".into()))
        }
    }

    fn acquirer(source: Arc<dyn TranscriptSource>) -> (TranscriptAcquirer, TempDir) {
        let temp = TempDir::new().unwrap();
        let cache = ContentCache::new(temp.path().join("transcripts"));
        (TranscriptAcquirer::new(source, cache), temp)
    }

    #[tokio::test]
    async fn test_second_fetch_served_from_cache() {
        let text = "a".repeat(3000);
        let source = Arc::new(TableSource::new().answer("v1", "en", Ok(&text)));
        let (acq, _temp) = acquirer(source.clone());

        let first = acq.fetch("v1", &[], false).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.text.len(), 3000);
        assert_eq!(source.calls(), 1);

        let second = acq.fetch("v1", &[], false).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.text, first.text);
        assert_eq!(second.language, "en");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let source = Arc::new(TableSource::new().answer("v1", "en", Ok("hello")));
        let (acq, _temp) = acquirer(source.clone());

        acq.fetch("v1", &[], false).await.unwrap();
        let refreshed = acq.fetch("v1", &[], true).await.unwrap();
        assert!(!refreshed.cached);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_captions_not_retryable_and_not_cached() {
        let source = Arc::new(TableSource::new().answer(
            "v2",
            "en",
            Err(SourceError::NoTrack("no captions available".into())),
        ));
        let (acq, _temp) = acquirer(source.clone());

        let failure = acq.fetch("v2", &[], false).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::NoCaptions);
        assert!(!failure.retryable);
        assert_eq!(failure.item_id, "v2");

        // Failures are retried on the next call
        let _ = acq.fetch("v2", &[], false).await;
        assert_eq!(source.calls(), 2);
        assert!(!acq.cache().has("v2"));
    }

    #[tokio::test]
    async fn test_language_priority_then_fallback() {
        let source = Arc::new(
            TableSource::new()
                .answer("v3", "de", Err(SourceError::NoTrack("none".into())))
                .answer("v3", "en", Ok("english text")),
        );
        let (acq, _temp) = acquirer(source.clone());

        let result = acq.fetch("v3", &["de".to_string()], false).await.unwrap();
        assert_eq!(result.language, "en");
        assert_eq!(
            *source.languages_seen.lock().unwrap(),
            vec!["de".to_string(), "en".to_string()]
        );
    }

    #[tokio::test]
    async fn test_preferred_language_wins_when_present() {
        let source = Arc::new(
            TableSource::new()
                .answer("v4", "fr", Ok("texte"))
                .answer("v4", "en", Ok("text")),
        );
        let (acq, _temp) = acquirer(source.clone());

        let result = acq.fetch("v4", &["fr".to_string()], false).await.unwrap();
        assert_eq!(result.text, "texte");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_text_falls_through() {
        let source = Arc::new(
            TableSource::new()
                .answer("v5", "es", Ok("   "))
                .answer("v5", "en", Ok("real")),
        );
        let (acq, _temp) = acquirer(source);
        let result = acq.fetch("v5", &["es".to_string()], false).await.unwrap();
        assert_eq!(result.text, "real");
    }

    #[tokio::test]
    async fn test_rate_limit_stops_language_walk() {
        let source = Arc::new(TableSource::new().answer(
            "v6",
            "de",
            Err(SourceError::RateLimited("429".into())),
        ));
        let (acq, _temp) = acquirer(source.clone());

        let failure = acq.fetch("v6", &["de".to_string()], false).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert!(failure.retryable);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retryable_network_failure() {
        let (acq, _temp) = acquirer(Arc::new(SlowSource));
        let acq = acq.with_call_timeout(Duration::from_secs(5));

        let failure = acq.fetch("slow", &[], false).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Network);
        assert!(failure.retryable);
    }

    #[test]
    fn test_classify_table() {
        assert_eq!(classify(&SourceError::NoTrack("x".into())), FailureKind::NoCaptions);
        assert_eq!(classify(&SourceError::Network("x".into())), FailureKind::Network);
        assert_eq!(
            classify(&SourceError::Timeout(Duration::from_secs(1))),
            FailureKind::Network
        );
        assert_eq!(classify(&SourceError::RateLimited("x".into())), FailureKind::RateLimited);
        assert_eq!(classify(&SourceError::Other("x".into())), FailureKind::Unknown);
        assert!(!FailureKind::Unknown.retryable());
    }

    #[test]
    fn test_candidate_languages_dedup() {
        let (acq, _temp) = acquirer(Arc::new(TableSource::new()));
        let langs = acq.candidate_languages(&["en".to_string(), " ".to_string(), "ja".to_string()]);
        assert_eq!(langs, vec!["en".to_string(), "ja".to_string()]);
    }
}
