//! Per-item transcript Markdown documents

use crate::summarizer::SummaryResult;
use std::path::{Path, PathBuf};

pub struct TranscriptDocument<'a> {
    pub title: &'a str,
    pub url: &'a str,
    pub description: Option<&'a str>,
    pub summary: Option<&'a SummaryResult>,
    /// Transcript text, or the reason there is none.
    pub transcript: Result<&'a str, &'a str>,
}

impl TranscriptDocument<'_> {
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = vec![format!("# {}", self.title), String::new()];
        lines.push(format!("**Video:** {}", self.url));

        if let Some(desc) = self.description.map(str::trim).filter(|d| !d.is_empty()) {
            lines.extend([String::new(), "## Summary".to_string(), desc.to_string()]);
        }

        if let Some(summary) = self.summary {
            lines.extend([
                String::new(),
                "## AI-Generated Summary".to_string(),
                summary.summary.trim().to_string(),
            ]);
            if !summary.key_points.is_empty() {
                lines.extend([String::new(), "## Key Points".to_string()]);
                lines.extend(summary.key_points.iter().map(|p| format!("- {}", p)));
            }
            if !summary.technical_concepts.is_empty() {
                lines.extend([String::new(), "## Technical Concepts".to_string()]);
                lines.extend(summary.technical_concepts.iter().map(|c| format!("- {}", c)));
            }
            if !summary.structured_notes.trim().is_empty() {
                lines.extend([
                    String::new(),
                    "## Notes".to_string(),
                    summary.structured_notes.trim().to_string(),
                ]);
            }
        }

        lines.extend([String::new(), "## Transcript".to_string()]);
        match self.transcript {
            Ok(text) => lines.push(text.trim().to_string()),
            Err(reason) => lines.push(format!("Transcript not available: {}", reason)),
        }

        lines.push(String::new());
        lines.join("\n")
    }
}

/// Write `<dir>/<name>.md` and return its path.
pub fn write_document(dir: &Path, name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("{}.md", name));
    crate::storage::write_atomic(&path, contents.as_bytes())?;
    Ok(path)
}

/// Link stored under `urls.transcript`.
pub fn document_link(dir: &Path, name: &str) -> String {
    let folder = dir
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcripts".to_string());
    format!("{}/{}.md", folder, name)
}
