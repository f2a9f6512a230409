//! Settings and batch job files
//!
//! `Settings` come from an optional YAML file, then `.env` in the project
//! directory, then the process environment (highest precedence). A
//! `JobSpec` describes a single batch run and is read from its own YAML file.

use crate::error::{IngestError, Result};
use crate::summarizer::SummaryLength;
use crate::worker::WorkItem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Category
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Threejs,
    ReactThreeFiber,
    Webgl,
    Shaders,
    Graphics,
    Blender,
    Design,
    Tooling,
    AiTools,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Threejs,
        Category::ReactThreeFiber,
        Category::Webgl,
        Category::Shaders,
        Category::Graphics,
        Category::Blender,
        Category::Design,
        Category::Tooling,
        Category::AiTools,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Threejs => "threejs",
            Category::ReactThreeFiber => "react-three-fiber",
            Category::Webgl => "webgl",
            Category::Shaders => "shaders",
            Category::Graphics => "graphics",
            Category::Blender => "blender",
            Category::Design => "design",
            Category::Tooling => "tooling",
            Category::AiTools => "ai-tools",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                let valid: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
                IngestError::Config(format!(
                    "Invalid category '{}'. Valid: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    Ollama,
}

impl FromStr for Provider {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "ollama" => Ok(Provider::Ollama),
            other => Err(IngestError::Config(format!("Unknown provider '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub corpus_path: PathBuf,
    /// Namespaces `transcripts/` and `summaries/` live beneath this.
    pub cache_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub failures_path: PathBuf,
    pub transcripts_dir: Option<PathBuf>,
    /// `<= 0` keeps cache entries forever.
    pub cache_ttl_hours: i64,
    pub call_timeout_secs: u64,
    pub max_transcript_chars: usize,
    pub provider: Provider,
    pub anthropic_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub yt_dlp_path: PathBuf,
    /// Tried after the job's language when that has no transcript track.
    pub fallback_language: String,
    /// Tag records whose AI summary failed with `needs-summary`.
    pub tag_summary_failures: bool,
    #[serde(skip_serializing)]
    pub anthropic_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("corpus/corpus.json"),
            cache_dir: PathBuf::from(".cache"),
            checkpoint_path: PathBuf::from(".import-progress.json"),
            failures_path: PathBuf::from(".import-failures.json"),
            transcripts_dir: Some(PathBuf::from("corpus/transcripts")),
            cache_ttl_hours: crate::cache::DEFAULT_TTL_HOURS,
            call_timeout_secs: 120,
            max_transcript_chars: crate::summarizer::DEFAULT_MAX_TRANSCRIPT_CHARS,
            provider: Provider::Anthropic,
            anthropic_model: crate::summarizer::anthropic::DEFAULT_MODEL.to_string(),
            ollama_base_url: crate::ollama::OLLAMA_BASE_URL.to_string(),
            ollama_model: crate::ollama::DEFAULT_MODEL.to_string(),
            yt_dlp_path: PathBuf::from("yt-dlp"),
            fallback_language: crate::transcript::DEFAULT_LANGUAGE.to_string(),
            tag_summary_failures: false,
            anthropic_api_key: None,
        }
    }
}

/// `<config_dir>/corpus-ingest/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("corpus-ingest").join("config.yaml"))
}

/// Read KEY=value from `<project_dir>/.env`.
pub fn load_env_value(project_dir: &Path, key: &str) -> Option<String> {
    let env_path = project_dir.join(".env");
    let prefix = format!("{}=", key);
    let content = std::fs::read_to_string(&env_path).ok()?;
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(&prefix) {
            let value = rest.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn lookup(project_dir: &Path, key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| load_env_value(project_dir, key))
}

impl Settings {
    /// Load settings. An explicit `config_path` must exist; the default
    /// location is optional.
    pub fn load(config_path: Option<&Path>, project_dir: &Path) -> Result<Self> {
        let mut settings = match config_path {
            Some(path) => Self::from_yaml_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_yaml_file(&path)?,
                None => Self::default(),
            },
        };
        settings.apply_env(project_dir)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&raw)?)
    }

    fn apply_env(&mut self, project_dir: &Path) -> Result<()> {
        if let Some(key) = lookup(project_dir, "ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(key);
        }
        if let Some(url) = lookup(project_dir, "OLLAMA_BASE_URL") {
            self.ollama_base_url = url;
        }
        if let Some(model) = lookup(project_dir, "OLLAMA_MODEL") {
            self.ollama_model = model;
        }
        if let Some(provider) = lookup(project_dir, "CORPUS_INGEST_PROVIDER") {
            self.provider = provider.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.call_timeout_secs == 0 {
            return Err(IngestError::Config("call_timeout_secs must be > 0".into()));
        }
        if self.max_transcript_chars == 0 {
            return Err(IngestError::Config("max_transcript_chars must be > 0".into()));
        }
        Ok(())
    }

    pub fn transcript_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("transcripts")
    }

    pub fn summary_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("summaries")
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

// ============================================================================
// Job file
// ============================================================================

fn default_language() -> String {
    crate::transcript::DEFAULT_LANGUAGE.to_string()
}

fn default_concurrency() -> usize {
    2
}

fn default_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Source URL or feed identifier the items came from.
    pub source: String,
    /// Human-readable source name used in fallback descriptions.
    #[serde(default)]
    pub source_name: Option<String>,
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub use_ai: bool,
    #[serde(default)]
    pub summary_length: SummaryLength,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub resume: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub items: Vec<WorkItem>,
}

impl JobSpec {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Failed to read job {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let job: JobSpec = serde_yaml::from_str(raw)?;
        Ok(job.normalized())
    }

    fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        self.tags = self
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if self.language.trim().is_empty() {
            self.language = default_language();
        }
        self
    }

    pub fn source_name(&self) -> &str {
        self.source_name.as_deref().unwrap_or(&self.source)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Items after applying `limit`.
    pub fn selected_items(&self) -> &[WorkItem] {
        match self.limit {
            Some(n) if n < self.items.len() => &self.items[..n],
            _ => &self.items,
        }
    }
}
