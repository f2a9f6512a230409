use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named link kinds (`video`, `transcript`, `code`, `misc`, ...) to URLs.
pub type Urls = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusEntry {
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub urls: Urls,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_transcript: Option<bool>,
    /// Fields written by other tools, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A partial entry for upsert. `None` means "leave the stored value alone".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPatch {
    pub id: String,
    pub category: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub urls: Option<Urls>,
    pub tags: Option<Vec<String>>,
    pub created_at: Option<String>,
    pub summary: Option<String>,
    pub notes: Option<String>,
    pub has_transcript: Option<bool>,
}

impl EntryPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Overwrite every field present on the patch.
    pub fn apply_to(&self, entry: &mut CorpusEntry) {
        if let Some(v) = &self.category {
            entry.category = v.clone();
        }
        if let Some(v) = &self.title {
            entry.title = v.clone();
        }
        if let Some(v) = &self.description {
            entry.description = v.clone();
        }
        if let Some(v) = &self.urls {
            entry.urls = v.clone();
        }
        if let Some(v) = &self.tags {
            entry.tags = dedup_tags(v);
        }
        if let Some(v) = &self.created_at {
            entry.created_at = v.clone();
        }
        if let Some(v) = &self.summary {
            entry.summary = Some(v.clone());
        }
        if let Some(v) = &self.notes {
            entry.notes = Some(v.clone());
        }
        if let Some(v) = self.has_transcript {
            entry.has_transcript = Some(v);
        }
    }

    pub fn to_entry(&self) -> CorpusEntry {
        let mut entry = CorpusEntry {
            id: self.id.clone(),
            category: String::new(),
            title: String::new(),
            description: String::new(),
            urls: Urls::new(),
            tags: Vec::new(),
            created_at: String::new(),
            summary: None,
            notes: None,
            has_transcript: None,
            extra: serde_json::Map::new(),
        };
        self.apply_to(&mut entry);
        entry
    }
}

/// Tags are a set; keep first occurrence order.
pub fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
