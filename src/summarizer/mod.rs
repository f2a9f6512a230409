//! AI summarization of transcripts
//!
//! Builds a prompt from the (truncated) transcript, sends it to a
//! [`TextGenerator`], and parses the reply leniently into a
//! [`SummaryResult`]. Results are cached per item and summary length.

pub mod anthropic;
pub mod parse;

use crate::cache::ContentCache;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use parse::{parse_response, ParsedSummary};

/// Upper bound on transcript characters sent downstream.
pub const DEFAULT_MAX_TRANSCRIPT_CHARS: usize = 150_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Brief,
    #[default]
    Medium,
    Detailed,
}

impl SummaryLength {
    fn instruction(self) -> &'static str {
        match self {
            Self::Brief => {
                "Provide a concise 2-3 sentence summary focusing on the main topic and key takeaway."
            }
            Self::Medium => {
                "Provide a comprehensive summary with main points, key concepts, and practical applications."
            }
            Self::Detailed => {
                "Provide an in-depth summary with detailed explanations, step-by-step breakdowns, and comprehensive coverage of all important topics."
            }
        }
    }
}

impl std::fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Brief => write!(f, "brief"),
            Self::Medium => write!(f, "medium"),
            Self::Detailed => write!(f, "detailed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tutorial {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub item_id: String,
    pub summary: String,
    pub key_points: Vec<String>,
    /// Unique, in first-mention order.
    pub technical_concepts: Vec<String>,
    pub tutorials: Vec<Tutorial>,
    pub structured_notes: String,
    pub tokens_used: u64,
    #[serde(skip)]
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryFailure {
    pub item_id: String,
    pub message: String,
}

pub type SummaryOutcome = Result<SummaryResult, SummaryFailure>;

#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    pub length: SummaryLength,
    pub title: Option<String>,
    pub category: Option<String>,
    pub force_refresh: bool,
}

/// A single completion from a text-generation provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation, String>;
}

/// One entry of a batch summarization request.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub item_id: String,
    pub transcript: String,
    pub title: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub length: SummaryLength,
    pub concurrency: usize,
    pub delay_between_requests: Duration,
    pub cancel: Option<CancellationToken>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            length: SummaryLength::Medium,
            concurrency: 2,
            delay_between_requests: Duration::from_millis(2000),
            cancel: None,
        }
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

pub fn build_prompt(
    transcript: &str,
    length: SummaryLength,
    title: Option<&str>,
    category: Option<&str>,
) -> String {
    let category_context = match category {
        Some(c) => format!(
            "This video is categorized as \"{}\". Focus on extracting information relevant to graphics programming, 3D development, and technical concepts.",
            c
        ),
        None => "Focus on extracting technical concepts, tutorials, and practical information relevant to graphics programming and 3D development.".to_string(),
    };

    format!(
        "You are an expert at analyzing video transcripts and extracting structured information for a graphics research knowledge base.

{category_context}

Video Title: {title}

{instruction}

Please analyze the following transcript and provide a structured response in JSON format:

TRANSCRIPT:
{transcript}

Respond with a JSON object containing these fields:
- summary: A comprehensive summary of the video content
- keyPoints: An array of 5-10 key points or takeaways from the video
- technicalConcepts: An array of technical concepts, tools, or technologies mentioned
- tutorials: An array of tutorial segments found (each with title, optional timestamp, and description)
- structuredNotes: Well-formatted notes organized by topic with markdown formatting

JSON Response:",
        category_context = category_context,
        title = title.unwrap_or("Unknown"),
        instruction = length.instruction(),
        transcript = transcript,
    )
}

pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    cache: Option<ContentCache>,
    max_transcript_chars: usize,
    call_timeout: Duration,
}

fn cache_id(item_id: &str, length: SummaryLength) -> String {
    format!("summary-{}-{}", item_id, length)
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, cache: Option<ContentCache>) -> Self {
        Self {
            generator,
            cache,
            max_transcript_chars: DEFAULT_MAX_TRANSCRIPT_CHARS,
            call_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_max_transcript_chars(mut self, max: usize) -> Self {
        self.max_transcript_chars = max;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub async fn summarize(
        &self,
        item_id: &str,
        transcript: &str,
        opts: &SummaryOptions,
    ) -> SummaryOutcome {
        let key = cache_id(item_id, opts.length);

        if !opts.force_refresh {
            if let Some(hit) = self.cache.as_ref().and_then(|c| c.get::<SummaryResult>(&key)) {
                log::debug!("Summary cache hit for {} ({})", item_id, opts.length);
                return Ok(SummaryResult { cached: true, ..hit });
            }
        }

        let prompt = build_prompt(
            truncate_chars(transcript, self.max_transcript_chars),
            opts.length,
            opts.title.as_deref(),
            opts.category.as_deref(),
        );

        log::info!(
            "Summarizing {}: transcript_len={}, prompt_len={}",
            item_id,
            transcript.len(),
            prompt.len()
        );

        let generation =
            match tokio::time::timeout(self.call_timeout, self.generator.generate(&prompt)).await {
                Ok(Ok(g)) => g,
                Ok(Err(e)) => {
                    return Err(SummaryFailure {
                        item_id: item_id.to_string(),
                        message: e,
                    })
                }
                Err(_) => {
                    return Err(SummaryFailure {
                        item_id: item_id.to_string(),
                        message: format!("Summarization timed out after {:?}", self.call_timeout),
                    })
                }
            };

        let parsed = parse_response(&generation.text);
        let result = SummaryResult {
            item_id: item_id.to_string(),
            summary: parsed.summary,
            key_points: parsed.key_points,
            technical_concepts: parsed.technical_concepts,
            tutorials: parsed.tutorials,
            structured_notes: parsed.structured_notes,
            tokens_used: generation.tokens_used,
            cached: false,
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &result, None) {
                log::warn!("Failed to cache summary for {}: {}", item_id, e);
            }
        }

        Ok(result)
    }

    /// Summarize `items` in windows of `opts.concurrency`.
    ///
    /// Each window is awaited in full before the next starts, with
    /// `opts.delay_between_requests` between windows. Results keep input order.
    pub async fn summarize_batch<F>(
        &self,
        items: &[BatchItem],
        opts: &BatchOptions,
        mut on_progress: F,
    ) -> Vec<SummaryOutcome>
    where
        F: FnMut(usize, usize),
    {
        let width = opts.concurrency.max(1);
        let total = items.len();
        let mut results = Vec::with_capacity(total);

        for (index, window) in items.chunks(width).enumerate() {
            let calls = window.iter().map(|item| {
                let item_opts = SummaryOptions {
                    length: opts.length,
                    title: item.title.clone(),
                    category: item.category.clone(),
                    force_refresh: false,
                };
                async move { self.summarize(&item.item_id, &item.transcript, &item_opts).await }
            });
            results.extend(join_all(calls).await);

            let done = (index * width + window.len()).min(total);
            on_progress(done, total);

            if done < total && !opts.delay_between_requests.is_zero() {
                let cancelled = match &opts.cancel {
                    Some(token) => {
                        tokio::select! {
                            _ = token.cancelled() => true,
                            _ = tokio::time::sleep(opts.delay_between_requests) => false,
                        }
                    }
                    None => {
                        tokio::time::sleep(opts.delay_between_requests).await;
                        false
                    }
                };
                if cancelled {
                    log::info!("Summary batch cancelled after {}/{}", done, total);
                    break;
                }
            }
        }

        results
    }
}
