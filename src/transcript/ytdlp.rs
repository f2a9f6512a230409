//! Transcript source backed by the `yt-dlp` executable.
//!
//! Subtitles are downloaded as SRT into a scratch directory alongside the
//! video's info JSON, then flattened to plain text.

use super::{RawTranscript, SourceError, TranscriptSource};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

pub struct YtDlpSource {
    binary: PathBuf,
}

impl YtDlpSource {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

#[async_trait]
impl TranscriptSource for YtDlpSource {
    async fn fetch(&self, item_id: &str, language: &str) -> Result<RawTranscript, SourceError> {
        let scratch = tempfile::TempDir::new()
            .map_err(|e| SourceError::Other(format!("Failed to create scratch dir: {}", e)))?;
        let template = scratch.path().join("%(id)s.%(ext)s");

        log::info!("Running yt-dlp for {} ({})", item_id, language);

        let output = Command::new(&self.binary)
            .arg("--write-subs")
            .arg("--write-auto-subs")
            .arg("--sub-langs")
            .arg(language)
            .arg("--convert-subs")
            .arg("srt")
            .arg("--write-info-json")
            .arg("--skip-download")
            .arg("--no-progress")
            .arg("--output")
            .arg(&template)
            .arg(watch_url(item_id))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SourceError::Other(format!("Failed to spawn yt-dlp: {}", e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(classify_stderr(&stderr));
        }

        let Some(srt_path) = find_with_extension(scratch.path(), "srt") else {
            return Err(SourceError::NoTrack(format!(
                "no {} subtitles for {}",
                language, item_id
            )));
        };

        let srt = tokio::fs::read_to_string(&srt_path)
            .await
            .map_err(|e| SourceError::Other(format!("Failed to read subtitles: {}", e)))?;

        let duration_seconds = match find_with_extension(scratch.path(), "json") {
            Some(info) => read_duration(&info).await,
            None => None,
        };

        Ok(RawTranscript {
            text: parse_srt(&srt),
            language: language.to_string(),
            duration_seconds,
        })
    }
}

fn find_with_extension(dir: &Path, ext: &str) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().map(|x| x == ext).unwrap_or(false))
}

async fn read_duration(info_path: &Path) -> Option<f64> {
    let raw = tokio::fs::read_to_string(info_path).await.ok()?;
    let info: serde_json::Value = serde_json::from_str(&raw).ok()?;
    info.get("duration").and_then(|d| d.as_f64())
}

/// Translate yt-dlp's stderr into a typed source error.
pub fn classify_stderr(stderr: &str) -> SourceError {
    let lower = stderr.to_lowercase();
    let detail = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .unwrap_or_else(|| stderr.trim())
        .chars()
        .take(300)
        .collect::<String>();

    const NO_TRACK: &[&str] = &[
        "there are no subtitles",
        "has no subtitles",
        "has no automatic captions",
        "subtitles are disabled",
        "no captions",
    ];
    const RATE_LIMITED: &[&str] = &["http error 429", "too many requests", "rate limit"];
    const NETWORK: &[&str] = &[
        "unable to download",
        "timed out",
        "connection reset",
        "connection refused",
        "name resolution",
        "network is unreachable",
        "http error 5",
    ];

    if NO_TRACK.iter().any(|s| lower.contains(s)) {
        SourceError::NoTrack(detail)
    } else if RATE_LIMITED.iter().any(|s| lower.contains(s)) {
        SourceError::RateLimited(detail)
    } else if NETWORK.iter().any(|s| lower.contains(s)) {
        SourceError::Network(detail)
    } else {
        SourceError::Other(detail)
    }
}

fn markup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid markup regex"))
}

/// Strip cue numbers, timing lines and inline markup from SRT content.
///
/// Auto-generated captions repeat each line across consecutive cues, so
/// adjacent duplicates are collapsed.
pub fn parse_srt(content: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.contains("-->") {
            continue;
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let clean = markup_re().replace_all(trimmed, "").trim().to_string();
        if clean.is_empty() {
            continue;
        }
        if lines.last().map(|l| l == &clean).unwrap_or(false) {
            continue;
        }
        lines.push(clean);
    }

    lines
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_srt_strips_timing() {
        let srt = "1\n00:00:00,000 --> 00:00:02,000\nHello there\n\n2\n00:00:02,000 --> 00:00:04,000\nGeneral   Kenobi\n";
        assert_eq!(parse_srt(srt), "Hello there General Kenobi");
    }

    #[test]
    fn test_parse_srt_collapses_repeats_and_markup() {
        let srt = "1\n00:00:00,000 --> 00:00:01,000\n<font color=\"#fff\">geometry nodes</font>\n\n2\n00:00:01,000 --> 00:00:02,000\ngeometry nodes\n\n3\n00:00:02,000 --> 00:00:03,000\nare great\n";
        assert_eq!(parse_srt(srt), "geometry nodes are great");
    }

    #[test]
    fn test_parse_srt_keeps_numbers_inside_text() {
        let srt = "1\n00:00:00,000 --> 00:00:01,000\nBlender 4.5 has 3 new nodes\n";
        assert_eq!(parse_srt(srt), "Blender 4.5 has 3 new nodes");
    }

    #[test]
    fn test_parse_srt_empty() {
        assert_eq!(parse_srt(""), "");
    }

    #[test]
    fn test_classify_stderr_signatures() {
        assert!(matches!(
            classify_stderr("[info] abc: There are no subtitles for the requested languages"),
            SourceError::NoTrack(_)
        ));
        assert!(matches!(
            classify_stderr("ERROR: Unable to download webpage: HTTP Error 429: Too Many Requests"),
            SourceError::RateLimited(_)
        ));
        assert!(matches!(
            classify_stderr("ERROR: Unable to download webpage: <urlopen error timed out>"),
            SourceError::Network(_)
        ));
        assert!(matches!(
            classify_stderr("ERROR: [youtube] abc: Private video. Sign in"),
            SourceError::Other(_)
        ));
    }

    #[test]
    fn test_classify_stderr_keeps_error_line() {
        let err = classify_stderr("[youtube] Extracting URL\nERROR: [youtube] abc: Video unavailable\n");
        assert_eq!(err, SourceError::Other("ERROR: [youtube] abc: Video unavailable".to_string()));
    }

    #[test]
    fn test_watch_url() {
        assert_eq!(watch_url("7dm776rZz-s"), "https://www.youtube.com/watch?v=7dm776rZz-s");
    }
}
