//! Corpus Store
//!
//! The corpus is a single JSON array of [`CorpusEntry`] records. Each save is
//! a compare-and-swap against the content hash observed at load time: when
//! another writer got there first, the file is reloaded, pending patches are
//! re-applied and the save is retried.

pub mod ids;
pub mod models;


use crate::error::{IngestError, Result};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use models::*;

pub const MAX_SAVE_ATTEMPTS: usize = 3;

pub type SharedStore = Arc<tokio::sync::Mutex<CorpusStore>>;

/// File access for the store. `read` returns `None` when the file is absent.
pub trait CorpusBackend: Send + Sync {
    fn read(&self, path: &Path) -> std::io::Result<Option<Vec<u8>>> {
        match std::fs::read(path) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Must only return once `bytes` are durably on disk.
    fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;
}

/// Temp file + fsync + rename.
pub struct AtomicFile;

impl CorpusBackend for AtomicFile {
    fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        crate::storage::write_atomic(path, bytes)
    }
}

struct Snapshot {
    entries: Vec<CorpusEntry>,
    version: Option<String>,
}

fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub struct CorpusStore {
    path: PathBuf,
    entries: Vec<CorpusEntry>,
    /// Hash of the bytes last read from or written to disk; `None` when the
    /// file did not exist.
    version: Option<String>,
    pending: Vec<EntryPatch>,
    backend: Arc<dyn CorpusBackend>,
}

impl CorpusStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self {
            path: path.into(),
            entries: Vec::new(),
            version: None,
            pending: Vec::new(),
            backend: Arc::new(AtomicFile),
        };
        store.load()?;
        Ok(store)
    }

    /// Swap the file backend and reload through it.
    pub fn with_backend(mut self, backend: Arc<dyn CorpusBackend>) -> Result<Self> {
        self.backend = backend;
        self.load()?;
        Ok(self)
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the store from disk, discarding unsaved patches.
    pub fn load(&mut self) -> Result<&[CorpusEntry]> {
        let snapshot = self.read_snapshot()?;
        self.entries = snapshot.entries;
        self.version = snapshot.version;
        self.pending.clear();
        log::info!(
            "Loaded {} corpus entries from {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(&self.entries)
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&CorpusEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Merge `patch` into the in-memory set. Nothing touches disk until [`save`](Self::save).
    pub fn upsert(&mut self, patch: EntryPatch) {
        apply_patch(&mut self.entries, &patch);
        self.pending.push(patch);
    }

    /// Persist the whole store in canonical order.
    pub fn save(&mut self) -> Result<()> {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let on_disk = self.read_snapshot()?;
            if on_disk.version != self.version {
                log::warn!(
                    "{} changed on disk (attempt {}/{}), re-applying {} pending change(s)",
                    self.path.display(),
                    attempt,
                    MAX_SAVE_ATTEMPTS,
                    self.pending.len()
                );
                self.entries = on_disk.entries;
                self.version = on_disk.version;
                for patch in &self.pending {
                    apply_patch(&mut self.entries, patch);
                }
                continue;
            }

            sort_entries(&mut self.entries);
            let mut body = serde_json::to_vec_pretty(&self.entries)
                .map_err(|e| IngestError::persistence(&self.path, e))?;
            body.push(b'\n');

            self.backend
                .write(&self.path, &body)
                .map_err(|e| IngestError::persistence(&self.path, e))?;

            self.version = Some(content_hash(&body));
            self.pending.clear();
            log::debug!(
                "Saved {} corpus entries to {}",
                self.entries.len(),
                self.path.display()
            );
            return Ok(());
        }

        Err(IngestError::Conflict {
            path: self.path.clone(),
        })
    }

    fn read_snapshot(&self) -> Result<Snapshot> {
        let bytes = match self.backend.read(&self.path) {
            Ok(Some(b)) => b,
            Ok(None) => {
                return Ok(Snapshot {
                    entries: Vec::new(),
                    version: None,
                })
            }
            Err(e) => return Err(IngestError::persistence(&self.path, e)),
        };

        let entries = if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            Vec::new()
        } else {
            serde_json::from_slice(&bytes).map_err(|e| {
                IngestError::persistence(&self.path, format!("unreadable corpus: {}", e))
            })?
        };

        Ok(Snapshot {
            entries,
            version: Some(content_hash(&bytes)),
        })
    }
}

fn apply_patch(entries: &mut Vec<CorpusEntry>, patch: &EntryPatch) {
    match entries.iter_mut().find(|e| e.id == patch.id) {
        Some(existing) => patch.apply_to(existing),
        None => entries.push(patch.to_entry()),
    }
}

/// Newest first; undated entries last; ids break ties.
pub fn sort_entries(entries: &mut [CorpusEntry]) {
    entries.sort_by(|a, b| {
        let da = ids::parse_created_at(&a.created_at);
        let db = ids::parse_created_at(&b.created_at);
        match (da, db) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.id.cmp(&b.id))
    });
}
