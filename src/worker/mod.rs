//! Batch Orchestrator
//!
//! Drives work items through transcript acquisition, summarization and the
//! corpus store in fixed-size windows. Enrichment inside a window runs
//! concurrently; commits (corpus save, then checkpoint) are applied one item
//! at a time in window order, so the checkpoint only ever names items whose
//! corpus write is durable.

pub mod checkpoint;
pub mod document;
pub mod report;

use crate::config::JobSpec;
use crate::corpus::{ids, EntryPatch, SharedStore, Urls};
use crate::error::IngestError;
use crate::summarizer::{Summarizer, SummaryOptions, SummaryOutcome};
use crate::transcript::{TranscriptAcquirer, TranscriptOutcome};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use checkpoint::ProgressCheckpoint;
pub use report::{BatchReport, FailureRecord};

pub const NEEDS_TRANSCRIPT_TAG: &str = "needs-transcript";
pub const NEEDS_SUMMARY_TAG: &str = "needs-summary";
const DESCRIPTION_FALLBACK_CHARS: usize = 200;

/// One resolved source item, as handed over by the feed layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Per-item state machine. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    Pending,
    CacheHit,
    Fetching,
    TranscriptOk,
    TranscriptFailed,
    Summarizing,
    SummaryOk,
    SummaryFailed,
    Skipped,
    Upserted,
    Done,
    Failed,
}

impl ItemStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStage::Done | ItemStage::Failed)
    }
}

/// Progress update from any pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub item_id: String,
    pub stage: ItemStage,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct BatchPaths {
    pub checkpoint: PathBuf,
    pub failures: PathBuf,
    pub transcripts_dir: Option<PathBuf>,
}

/// A fatal store failure. Carries the checkpoint as it stood after the last
/// durable commit, so a resumed run picks up from there.
#[derive(Debug, thiserror::Error)]
#[error("Batch aborted: {source}")]
pub struct BatchAborted {
    pub checkpoint: ProgressCheckpoint,
    pub report: BatchReport,
    #[source]
    pub source: IngestError,
}

struct PlannedItem<'a> {
    item: &'a WorkItem,
    /// Checkpoint and cache key: the video id for videos, else the entry id.
    item_id: String,
    entry_id: String,
    link_kind: &'static str,
    link: String,
    is_video: bool,
}

fn plan_item(item: &WorkItem) -> crate::error::Result<PlannedItem<'_>> {
    let derived = ids::derive_entry_id(&item.url)?;
    let is_video = derived.link_kind == "video";
    let item_id = match derived.id.strip_prefix("yt-") {
        Some(video_id) if is_video => video_id.to_string(),
        _ => derived.id.clone(),
    };
    Ok(PlannedItem {
        item,
        item_id,
        entry_id: derived.id,
        link_kind: derived.link_kind,
        link: derived.link,
        is_video,
    })
}

struct Enriched<'a> {
    plan: &'a PlannedItem<'a>,
    transcript: Option<TranscriptOutcome>,
    summary: Option<SummaryOutcome>,
}

enum CommitError {
    /// This item failed; the batch continues.
    Item(String),
    /// The store could not be written; the batch stops.
    Fatal(IngestError),
}

fn fallback_description(item: &WorkItem, source_name: &str) -> String {
    let trimmed = item.description.trim();
    if !trimmed.is_empty() {
        return trimmed.chars().take(DESCRIPTION_FALLBACK_CHARS).collect();
    }
    format!("Video from {}", source_name)
}

pub struct BatchOrchestrator {
    acquirer: Arc<TranscriptAcquirer>,
    summarizer: Option<Arc<Summarizer>>,
    store: SharedStore,
    paths: BatchPaths,
    tag_summary_failures: bool,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(
        acquirer: Arc<TranscriptAcquirer>,
        summarizer: Option<Arc<Summarizer>>,
        store: SharedStore,
        paths: BatchPaths,
    ) -> Self {
        Self {
            acquirer,
            summarizer,
            store,
            paths,
            tag_summary_failures: false,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_summary_failure_tag(mut self, enabled: bool) -> Self {
        self.tag_summary_failures = enabled;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn emit(&self, item_id: &str, stage: ItemStage, completed: usize, total: usize) {
        if let Some(tx) = &self.progress {
            let update = ProgressUpdate {
                item_id: item_id.to_string(),
                stage,
                completed,
                total,
            };
            if tx.try_send(update).is_err() {
                log::debug!("Progress channel full or closed, dropping update");
            }
        }
    }

    /// Run one batch. Per-item problems are recorded in the report; only a
    /// store write failure aborts.
    pub async fn run(&self, job: &JobSpec) -> Result<BatchReport, BatchAborted> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("batch", run_id = %run_id, source = %job.source);
        self.run_inner(job, run_id).instrument(span).await
    }

    async fn run_inner(&self, job: &JobSpec, run_id: String) -> Result<BatchReport, BatchAborted> {
        let mut report = BatchReport {
            run_id,
            dry_run: job.dry_run,
            ..Default::default()
        };

        let mut checkpoint = if job.resume {
            ProgressCheckpoint::load(&self.paths.checkpoint)
        } else {
            ProgressCheckpoint::default()
        };
        if job.resume && !checkpoint.is_empty() {
            log::info!("Resuming: {} items already processed", checkpoint.len());
        }

        let mut planned = Vec::new();
        for item in job.selected_items() {
            match plan_item(item) {
                Ok(plan) if checkpoint.contains(&plan.item_id) => report.skipped += 1,
                Ok(plan) => planned.push(plan),
                Err(e) => {
                    log::warn!("Skipping {}: {}", item.url, e);
                    report.record_failure(&item.title, &item.url, e.to_string());
                }
            }
        }
        report.total = planned.len() + report.failed;

        log::info!(
            "Found {} items ({} already processed, {} to process)",
            report.total + report.skipped,
            report.skipped,
            planned.len()
        );

        if job.dry_run {
            log::info!("DRY RUN - would process:");
            for plan in &planned {
                log::info!("  - {} ({})", plan.item.title, plan.item_id);
                report.planned.push(plan.item_id.clone());
            }
            return Ok(report);
        }

        let width = job.concurrency.max(1);
        let window_count = planned.len().div_ceil(width);
        let languages = vec![job.language.clone()];
        let total = report.total;
        let mut completed = report.failed;

        for (index, window) in planned.chunks(width).enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            log::info!("Processing window {}/{}", index + 1, window_count);

            let enriched = join_all(
                window
                    .iter()
                    .map(|plan| self.enrich(plan, job, &languages, completed, total)),
            )
            .await;

            for item in &enriched {
                let plan = item.plan;
                match self.commit(item, job, &mut checkpoint, &mut report).await {
                    Ok(()) => {
                        self.emit(&plan.item_id, ItemStage::Upserted, completed, total);
                        completed += 1;
                        log::info!("[{}/{}] Added {} to corpus", completed, total, plan.entry_id);
                        self.emit(&plan.item_id, ItemStage::Done, completed, total);
                    }
                    Err(CommitError::Item(message)) => {
                        completed += 1;
                        log::error!("[{}/{}] Failed {}: {}", completed, total, plan.item_id, message);
                        report.record_failure(&plan.item.title, &plan.item.url, message);
                        self.emit(&plan.item_id, ItemStage::Failed, completed, total);
                    }
                    Err(CommitError::Fatal(source)) => {
                        log::error!("Aborting batch, store write failed for {}: {}", plan.item_id, source);
                        report.record_failure(&plan.item.title, &plan.item.url, source.to_string());
                        self.emit(&plan.item_id, ItemStage::Failed, completed, total);
                        self.write_failures(&report);
                        return Err(BatchAborted {
                            checkpoint,
                            report,
                            source,
                        });
                    }
                }
            }

            let more = (index + 1) < window_count;
            if more && !job.delay().is_zero() {
                log::info!("Waiting {}ms before next window", job.delay_ms);
                let cancelled = tokio::select! {
                    _ = self.cancel.cancelled() => true,
                    _ = tokio::time::sleep(job.delay()) => false,
                };
                if cancelled {
                    report.cancelled = true;
                    break;
                }
            }
        }

        self.finish(&report);
        for line in report.summary_lines(job.use_ai) {
            log::info!("{}", line);
        }
        Ok(report)
    }

    /// Transcript then summary for one item. Never fails; outcomes are values.
    async fn enrich<'a>(
        &self,
        plan: &'a PlannedItem<'a>,
        job: &JobSpec,
        languages: &[String],
        completed: usize,
        total: usize,
    ) -> Enriched<'a> {
        let id = plan.item_id.as_str();
        self.emit(id, ItemStage::Pending, completed, total);

        if !plan.is_video {
            self.emit(id, ItemStage::Skipped, completed, total);
            return Enriched {
                plan,
                transcript: None,
                summary: None,
            };
        }

        let stage = if self.acquirer.cache().has(id) {
            ItemStage::CacheHit
        } else {
            ItemStage::Fetching
        };
        self.emit(id, stage, completed, total);

        let transcript = self.acquirer.fetch(id, languages, false).await;
        match &transcript {
            Ok(t) => {
                log::info!(
                    "[{}] Transcript ({} chars{}, {}ms)",
                    id,
                    t.text.chars().count(),
                    if t.cached { ", cached" } else { "" },
                    t.fetch_duration_ms
                );
                self.emit(id, ItemStage::TranscriptOk, completed, total);
            }
            Err(f) => {
                log::warn!("[{}] Transcript unavailable: {} ({})", id, f.kind, f.message);
                self.emit(id, ItemStage::TranscriptFailed, completed, total);
            }
        }

        let summary = match (&transcript, &self.summarizer) {
            (Ok(t), Some(summarizer)) if job.use_ai => {
                self.emit(id, ItemStage::Summarizing, completed, total);
                let opts = SummaryOptions {
                    length: job.summary_length,
                    title: Some(plan.item.title.clone()),
                    category: Some(job.category.as_str().to_string()),
                    force_refresh: false,
                };
                let outcome = summarizer.summarize(id, &t.text, &opts).await;
                match &outcome {
                    Ok(s) => {
                        log::info!(
                            "[{}] AI summary ({} tokens{})",
                            id,
                            s.tokens_used,
                            if s.cached { ", cached" } else { "" }
                        );
                        self.emit(id, ItemStage::SummaryOk, completed, total);
                    }
                    Err(f) => {
                        log::warn!("[{}] AI summary failed: {}", id, f.message);
                        self.emit(id, ItemStage::SummaryFailed, completed, total);
                    }
                }
                Some(outcome)
            }
            _ => {
                self.emit(id, ItemStage::Skipped, completed, total);
                None
            }
        };

        Enriched {
            plan,
            transcript: Some(transcript),
            summary,
        }
    }

    async fn commit(
        &self,
        enriched: &Enriched<'_>,
        job: &JobSpec,
        checkpoint: &mut ProgressCheckpoint,
        report: &mut BatchReport,
    ) -> Result<(), CommitError> {
        let plan = enriched.plan;
        let item = plan.item;

        let mut tags: Vec<String> = job
            .tags
            .iter()
            .chain(item.tags.iter())
            .map(|t| t.trim().to_lowercase())
            .collect();

        let mut has_transcript = None;
        let mut transcript_text: Result<&str, &str> = Err("");
        match &enriched.transcript {
            Some(Ok(t)) => {
                has_transcript = Some(true);
                transcript_text = Ok(t.text.as_str());
            }
            Some(Err(f)) => {
                has_transcript = Some(false);
                tags.push(NEEDS_TRANSCRIPT_TAG.to_string());
                transcript_text = Err(f.message.as_str());
            }
            None => {}
        }

        let summary = match &enriched.summary {
            Some(Ok(s)) => Some(s),
            Some(Err(_)) => {
                if self.tag_summary_failures {
                    tags.push(NEEDS_SUMMARY_TAG.to_string());
                }
                None
            }
            None => None,
        };

        let source_name = job.source_name();
        let description = fallback_description(item, source_name);

        let mut urls = Urls::new();
        urls.insert(plan.link_kind.to_string(), plan.link.clone());

        if let (true, Some(dir)) = (plan.is_video, &self.paths.transcripts_dir) {
            let doc = document::TranscriptDocument {
                title: &item.title,
                url: &plan.link,
                description: Some(&description),
                summary,
                transcript: transcript_text,
            };
            document::write_document(dir, &plan.item_id, &doc.render()).map_err(|e| {
                CommitError::Item(format!("Failed to write transcript document: {}", e))
            })?;
            urls.insert(
                "transcript".to_string(),
                document::document_link(dir, &plan.item_id),
            );
        }

        {
            let mut store = self.store.lock().await;
            let existing = store.get(&plan.entry_id);
            let published = item.published.as_deref();
            let created_at = match existing {
                // Keep the original date of an existing record on re-ingest.
                Some(_) if published.and_then(ids::parse_date).is_none() => None,
                _ => Some(ids::normalize_date(published, chrono::Utc::now().date_naive())),
            };
            // The AI summary doubles as the description. Without one, the
            // source description stands in, unless an earlier run already
            // stored a summary.
            let summary_text = match summary {
                Some(s) => Some(s.summary.clone()),
                None if existing.is_some_and(|e| e.summary.is_some()) => None,
                None => Some(description),
            };
            store.upsert(EntryPatch {
                category: Some(job.category.as_str().to_string()),
                title: Some(item.title.clone()),
                description: summary_text.clone(),
                urls: Some(urls),
                tags: Some(tags),
                created_at,
                summary: summary_text,
                notes: None,
                has_transcript,
                ..EntryPatch::new(plan.entry_id.as_str())
            });
            if let Err(e) = store.save() {
                // Drop the unsaved patch so a later run on this store cannot persist it.
                if let Err(reload) = store.load() {
                    log::warn!("Failed to reload corpus after aborted save: {}", reload);
                }
                return Err(CommitError::Fatal(e));
            }
        }

        checkpoint.insert(&plan.item_id);
        checkpoint
            .persist(&self.paths.checkpoint)
            .map_err(CommitError::Fatal)?;

        report.succeeded += 1;
        if has_transcript == Some(true) {
            report.transcribed += 1;
        }
        if summary.is_some() {
            report.summarized += 1;
        }
        Ok(())
    }

    fn write_failures(&self, report: &BatchReport) {
        if report.failures.is_empty() {
            return;
        }
        match report.write_failures(&self.paths.failures) {
            Ok(()) => log::info!("Failures saved to {}", self.paths.failures.display()),
            Err(e) => log::error!("Failed to write failure report: {}", e),
        }
    }

    fn finish(&self, report: &BatchReport) {
        self.write_failures(report);
        if report.is_clean() {
            if let Err(e) = ProgressCheckpoint::remove(&self.paths.checkpoint) {
                log::warn!("Failed to clear checkpoint: {}", e);
            }
        } else {
            log::info!(
                "Keeping checkpoint at {} for a resumed run",
                self.paths.checkpoint.display()
            );
        }
    }
}
