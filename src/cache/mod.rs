//! File-backed TTL cache
//!
//! One JSON file per key under a namespace directory. Keys are hashed so any
//! caller-supplied identifier maps to a short, filesystem-safe file name.
//! Expiry is checked lazily on read; `cleanup` sweeps eagerly.

use crate::error::{IngestError, Result};
use crate::storage;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Entries live for a week unless the caller says otherwise.
pub const DEFAULT_TTL_HOURS: i64 = 7 * 24;

const KEY_HEX_WIDTH: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at < now).unwrap_or(false)
    }
}

/// Only the timestamps, for sweeping and stats without knowing `T`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryHeader {
    created_at: DateTime<Utc>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub total_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheListing {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct ContentCache {
    dir: PathBuf,
    default_ttl: Duration,
}

/// Hash an identifier down to a fixed-width hex string.
pub fn cache_key(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(KEY_HEX_WIDTH);
    key
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            default_ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }

    /// A non-positive default means entries written without an explicit TTL never expire.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(id)))
    }

    /// Look up `id`. Missing, expired, unreadable and malformed entries are all misses.
    pub fn get<T: DeserializeOwned>(&self, id: &str) -> Option<T> {
        let path = self.entry_path(id);
        let content = std::fs::read_to_string(&path).ok()?;

        let entry: CacheEntry<T> = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Ignoring malformed cache entry {:?}: {}", path, e);
                return None;
            }
        };

        if entry.is_expired(Utc::now()) {
            log::debug!("Cache entry for {} expired, removing", id);
            self.delete(id);
            return None;
        }

        Some(entry.data)
    }

    /// Store `data` under `id`.
    ///
    /// `ttl` of `None` uses the cache default; any non-positive duration means
    /// the entry never expires.
    pub fn set<T: Serialize>(&self, id: &str, data: &T, ttl: Option<Duration>) -> Result<()> {
        let now = Utc::now();
        let effective = ttl.unwrap_or(self.default_ttl);
        let expires_at = if effective > Duration::zero() {
            Some(now + effective)
        } else {
            None
        };

        self.put_entry(
            id,
            &CacheEntry {
                data,
                created_at: now,
                expires_at,
            },
        )
    }

    pub(crate) fn put_entry<T: Serialize>(&self, id: &str, entry: &CacheEntry<T>) -> Result<()> {
        let path = self.entry_path(id);
        storage::write_json_atomic(&path, entry).map_err(|e| {
            IngestError::Io(format!("Failed to write cache entry {:?}: {}", path, e))
        })
    }

    pub fn delete(&self, id: &str) {
        // Already gone is fine
        let _ = std::fs::remove_file(self.entry_path(id));
    }

    pub fn has(&self, id: &str) -> bool {
        self.get::<serde_json::Value>(id).is_some()
    }

    fn json_files(&self) -> Vec<PathBuf> {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect()
    }

    fn read_header(path: &Path) -> Option<EntryHeader> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Remove every entry in this namespace.
    pub fn clear(&self) -> Result<()> {
        for path in self.json_files() {
            std::fs::remove_file(&path).map_err(|e| {
                IngestError::Io(format!("Failed to clear cache entry {:?}: {}", path, e))
            })?;
        }
        Ok(())
    }

    /// Eagerly delete expired entries, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        for path in self.json_files() {
            let Some(header) = Self::read_header(&path) else {
                continue;
            };
            if header.expires_at.map(|at| at < now).unwrap_or(false)
                && std::fs::remove_file(&path).is_ok()
            {
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("Cache cleanup removed {} expired entries from {:?}", removed, self.dir);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for path in self.json_files() {
            stats.count += 1;
            if let Ok(meta) = std::fs::metadata(&path) {
                stats.total_bytes += meta.len();
            }
            if let Some(header) = Self::read_header(&path) {
                let created = header.created_at;
                if stats.oldest.map(|o| created < o).unwrap_or(true) {
                    stats.oldest = Some(created);
                }
                if stats.newest.map(|n| created > n).unwrap_or(true) {
                    stats.newest = Some(created);
                }
            }
        }
        stats
    }

    /// Readable entries, newest first.
    pub fn list_entries(&self) -> Vec<CacheListing> {
        let mut listing: Vec<CacheListing> = self
            .json_files()
            .into_iter()
            .filter_map(|path| {
                let header = Self::read_header(&path)?;
                let key = path.file_stem()?.to_string_lossy().to_string();
                Some(CacheListing {
                    key,
                    created_at: header.created_at,
                    expires_at: header.expires_at,
                })
            })
            .collect();
        listing.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_cache() -> (ContentCache, TempDir) {
        let temp = TempDir::new().unwrap();
        let cache = ContentCache::new(temp.path().join("transcripts"));
        (cache, temp)
    }

    fn put_expired(cache: &ContentCache, id: &str) {
        let now = Utc::now();
        cache
            .put_entry(
                id,
                &CacheEntry {
                    data: "stale".to_string(),
                    created_at: now - Duration::days(10),
                    expires_at: Some(now - Duration::days(3)),
                },
            )
            .unwrap();
    }

    #[test]
    fn test_cache_key_fixed_width_hex() {
        let short = cache_key("v1");
        let long = cache_key(&"x/../?*:".repeat(500));
        assert_eq!(short.len(), 16);
        assert_eq!(long.len(), 16);
        assert!(long.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(short, long);
        assert_eq!(cache_key("v1"), short);
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _temp) = setup_cache();
        cache.set("v1", &"hello world".to_string(), None).unwrap();
        assert_eq!(cache.get::<String>("v1"), Some("hello world".to_string()));
        assert!(cache.has("v1"));
        assert!(!cache.has("v2"));
    }

    #[test]
    fn test_default_ttl_is_seven_days() {
        let (cache, _temp) = setup_cache();
        cache.set("v1", &1u32, None).unwrap();
        let listing = cache.list_entries();
        let entry = &listing[0];
        let ttl = entry.expires_at.unwrap() - entry.created_at;
        assert_eq!(ttl, Duration::days(7));
    }

    #[test]
    fn test_non_positive_ttl_never_expires() {
        let (cache, _temp) = setup_cache();
        cache.set("zero", &1u32, Some(Duration::zero())).unwrap();
        cache.set("neg", &2u32, Some(Duration::seconds(-5))).unwrap();
        assert!(cache.list_entries().iter().all(|e| e.expires_at.is_none()));
        assert_eq!(cache.get::<u32>("neg"), Some(2));
    }

    #[test]
    fn test_expired_entry_is_absent_and_deleted() {
        let (cache, _temp) = setup_cache();
        put_expired(&cache, "old");
        assert_eq!(cache.stats().count, 1);

        assert_eq!(cache.get::<String>("old"), None);
        assert!(!cache.has("old"));
        assert_eq!(cache.stats().count, 0);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let (cache, _temp) = setup_cache();
        std::fs::create_dir_all(cache.dir()).unwrap();
        std::fs::write(cache.entry_path("bad"), "{ not json").unwrap();
        assert_eq!(cache.get::<String>("bad"), None);
        assert!(!cache.has("bad"));
    }

    #[test]
    fn test_wrong_shape_is_a_miss() {
        let (cache, _temp) = setup_cache();
        cache.set("v1", &vec![1, 2, 3], None).unwrap();
        assert_eq!(cache.get::<String>("v1"), None);
    }

    #[test]
    fn test_missing_dir_behaves_empty() {
        let (cache, _temp) = setup_cache();
        assert_eq!(cache.get::<String>("anything"), None);
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(cache.cleanup(), 0);
        cache.clear().unwrap();
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let (cache, _temp) = setup_cache();
        put_expired(&cache, "a");
        put_expired(&cache, "b");
        cache.set("fresh", &"ok".to_string(), None).unwrap();
        cache.set("forever", &"ok".to_string(), Some(Duration::zero())).unwrap();

        assert_eq!(cache.cleanup(), 2);
        assert_eq!(cache.stats().count, 2);
        assert!(cache.has("fresh"));
        assert!(cache.has("forever"));
    }

    #[test]
    fn test_clear_and_stats() {
        let (cache, _temp) = setup_cache();
        cache.set("a", &"one".to_string(), None).unwrap();
        cache.set("b", &"two".to_string(), None).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.count, 2);
        assert!(stats.total_bytes > 0);
        assert!(stats.oldest.unwrap() <= stats.newest.unwrap());

        cache.clear().unwrap();
        assert_eq!(cache.stats().count, 0);
        assert!(!cache.has("a"));
    }

    #[test]
    fn test_delete() {
        let (cache, _temp) = setup_cache();
        cache.set("a", &"one".to_string(), None).unwrap();
        cache.delete("a");
        cache.delete("never-existed");
        assert!(!cache.has("a"));
    }

    #[test]
    fn test_entry_file_shape() {
        let (cache, _temp) = setup_cache();
        cache.set("v1", &"text".to_string(), None).unwrap();
        let raw = std::fs::read_to_string(cache.entry_path("v1")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["data"], "text");
        assert!(value["createdAt"].is_string());
        assert!(value["expiresAt"].is_string());
    }
}
