//! Ingestion pipeline for the curated research corpus.
//!
//! Transcripts are fetched and cached, summarized by an LLM provider, and
//! merged into a JSON corpus file by a resumable batch orchestrator.

pub mod cache;
pub mod config;
pub mod corpus;
pub mod error;
pub mod ollama;
pub mod storage;
pub mod summarizer;
pub mod transcript;
pub mod worker;

use cache::ContentCache;
use config::{Provider, Settings};
use corpus::CorpusStore;
use error::{IngestError, Result};
use std::sync::Arc;
use summarizer::{anthropic::AnthropicClient, Summarizer, TextGenerator};
use transcript::{ytdlp::YtDlpSource, TranscriptAcquirer};
use worker::{BatchOrchestrator, BatchPaths};

/// Pick the configured summarization backend.
pub fn build_generator(settings: &Settings) -> Result<Arc<dyn TextGenerator>> {
    match settings.provider {
        Provider::Anthropic => {
            let key = settings.anthropic_api_key.as_deref().ok_or_else(|| {
                IngestError::Config(
                    "ANTHROPIC_API_KEY is not set (environment or .env)".to_string(),
                )
            })?;
            log::info!("Summaries via Anthropic ({})", settings.anthropic_model);
            Ok(Arc::new(
                AnthropicClient::new(key).with_model(&settings.anthropic_model),
            ))
        }
        Provider::Ollama => {
            log::info!(
                "Summaries via Ollama at {} ({})",
                settings.ollama_base_url,
                settings.ollama_model
            );
            Ok(Arc::new(
                ollama::OllamaClient::new()
                    .with_base_url(&settings.ollama_base_url)
                    .with_model(&settings.ollama_model),
            ))
        }
    }
}

/// Check that the configured provider can serve requests before a batch
/// starts. Only Ollama is probed; Anthropic credentials are checked when the
/// client is built.
pub async fn preflight(settings: &Settings, use_ai: bool) -> Result<()> {
    if !use_ai || settings.provider != Provider::Ollama {
        return Ok(());
    }
    let installed = ollama::OllamaClient::new()
        .with_base_url(&settings.ollama_base_url)
        .with_model(&settings.ollama_model)
        .ensure_model()
        .await
        .map_err(IngestError::Config)?;
    log::info!("Ollama ready ({} models installed)", installed.len());
    Ok(())
}

/// Wire the cache, transcript source, summarizer and store from settings.
///
/// The summarizer is only built when `use_ai` is set, so a run without AI
/// never needs provider credentials.
pub fn build_orchestrator(settings: &Settings, use_ai: bool) -> Result<BatchOrchestrator> {
    let ttl = settings.cache_ttl();

    let acquirer = TranscriptAcquirer::new(
        Arc::new(YtDlpSource::new(&settings.yt_dlp_path)),
        ContentCache::new(settings.transcript_cache_dir()).with_default_ttl(ttl),
    )
    .with_call_timeout(settings.call_timeout())
    .with_fallback_language(&settings.fallback_language);

    let summarizer = if use_ai {
        let generator = build_generator(settings)?;
        Some(Arc::new(
            Summarizer::new(
                generator,
                Some(ContentCache::new(settings.summary_cache_dir()).with_default_ttl(ttl)),
            )
            .with_max_transcript_chars(settings.max_transcript_chars)
            .with_call_timeout(settings.call_timeout()),
        ))
    } else {
        None
    };

    let store = CorpusStore::open(&settings.corpus_path)?;
    let paths = BatchPaths {
        checkpoint: settings.checkpoint_path.clone(),
        failures: settings.failures_path.clone(),
        transcripts_dir: settings.transcripts_dir.clone(),
    };

    Ok(
        BatchOrchestrator::new(Arc::new(acquirer), summarizer, store.into_shared(), paths)
            .with_summary_failure_tag(settings.tag_summary_failures),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_in(temp: &TempDir) -> Settings {
        Settings {
            corpus_path: temp.path().join("corpus.json"),
            cache_dir: temp.path().join(".cache"),
            checkpoint_path: temp.path().join(".import-progress.json"),
            failures_path: temp.path().join(".import-failures.json"),
            ..Settings::default()
        }
    }

    #[test]
    fn test_anthropic_requires_key() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(&temp);
        assert!(settings.anthropic_api_key.is_none());
        assert!(matches!(
            build_generator(&settings),
            Err(IngestError::Config(_))
        ));
        assert!(build_orchestrator(&settings, true).is_err());
    }

    #[test]
    fn test_orchestrator_without_ai_needs_no_credentials() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(&temp);
        assert!(build_orchestrator(&settings, false).is_ok());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let temp = TempDir::new().unwrap();
        let settings = Settings {
            provider: Provider::Ollama,
            ..settings_in(&temp)
        };
        assert!(build_generator(&settings).is_ok());
    }

    #[tokio::test]
    async fn test_preflight_fails_fast_on_missing_ollama_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "mistral:7b"}]
            })))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let settings = Settings {
            provider: Provider::Ollama,
            ollama_base_url: server.uri(),
            ..settings_in(&temp)
        };
        assert!(matches!(
            preflight(&settings, true).await,
            Err(IngestError::Config(_))
        ));
        // nothing to check when summaries are off
        assert!(preflight(&settings, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_preflight_skips_anthropic() {
        let temp = TempDir::new().unwrap();
        assert!(preflight(&settings_in(&temp), true).await.is_ok());
    }
}
