use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One line of the failure side file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub title: String,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub run_id: String,
    /// Items selected for this run, after resume filtering.
    pub total: usize,
    /// Items skipped because the checkpoint already held them.
    pub skipped: usize,
    pub succeeded: usize,
    pub transcribed: usize,
    pub summarized: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub cancelled: bool,
    /// Item ids a dry run would have processed.
    pub planned: Vec<String>,
    pub failures: Vec<FailureRecord>,
}

impl BatchReport {
    pub fn record_failure(&mut self, title: &str, url: &str, error: impl Into<String>) {
        self.failed += 1;
        self.failures.push(FailureRecord {
            title: title.to_string(),
            url: url.to_string(),
            error: error.into(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }

    pub fn summary_lines(&self, use_ai: bool) -> Vec<String> {
        let mut lines = vec![
            format!("Total items:        {}", self.total),
            format!("Already processed:  {}", self.skipped),
            format!("Successfully added: {}", self.succeeded),
            format!("With transcripts:   {}", self.transcribed),
        ];
        if use_ai {
            lines.push(format!("With AI summaries:  {}", self.summarized));
        }
        lines.push(format!("Failed:             {}", self.failed));
        if self.cancelled {
            lines.push("Run was cancelled before all items were processed".to_string());
        }
        for f in &self.failures {
            let short: String = f.error.chars().take(100).collect();
            lines.push(format!("  - {}: {}", f.title, short));
        }
        lines
    }

    pub fn write_failures(&self, path: &Path) -> Result<()> {
        crate::storage::write_json_atomic(path, &self.failures)
            .map_err(|e| IngestError::persistence(path, e))
    }
}
