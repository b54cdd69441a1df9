//! Embedding/score cache backends.
//!
//! Both backends implement [`EmbeddingCache`] and are pure memoization:
//! every backend failure inside `get`/`save` is logged and swallowed, so a
//! broken cache degrades to recomputation, never to a wrong result.

use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use fragdb_core::traits::EmbeddingCache;
use fragdb_core::types::CacheStats;
use fragdb_core::Error;

/// Unbounded cache with one JSON file per key under a root directory.
/// Survives process restarts.
pub struct DiskCache<T> {
    root: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> DiskCache<T> {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, _marker: PhantomData })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are fragment ids or hex digests; anything else is flattened
        // to a file-system-safe name.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.json"))
    }

    fn entry_paths(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl<T> EmbeddingCache<T> for DiskCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "corrupt cache entry, treating as miss");
                    None
                }
            },
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    fn save(&self, key: &str, value: &T) {
        let path = self.path_for(key);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "cache serialization failed, skipping");
                return;
            }
        };
        if let Err(e) = fs::write(&path, raw) {
            warn!(key, error = %e, "cache write failed, skipping");
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }

    fn clear(&self) {
        for path in self.entry_paths() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "cache entry removal failed");
            }
        }
    }

    fn stats(&self) -> CacheStats {
        let paths = self.entry_paths();
        let size_bytes = paths
            .iter()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        CacheStats { entries: paths.len(), capacity: None, size_bytes: Some(size_bytes) }
    }
}

/// Bounded in-memory cache with least-recently-used eviction.
pub struct MemoryCache<T> {
    inner: Mutex<LruCache<String, T>>,
    capacity: usize,
}

impl<T> MemoryCache<T> {
    pub fn new(max_items: usize) -> anyhow::Result<Self> {
        let capacity = NonZeroUsize::new(max_items)
            .ok_or_else(|| Error::InvalidConfig("cache max_items must be > 0".to_string()))?;
        Ok(Self { inner: Mutex::new(LruCache::new(capacity)), capacity: max_items })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> EmbeddingCache<T> for MemoryCache<T>
where
    T: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<T> {
        self.lock().get(key).cloned()
    }

    fn save(&self, key: &str, value: &T) {
        self.lock().put(key.to_string(), value.clone());
    }

    fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.lock().len(),
            capacity: Some(self.capacity),
            size_bytes: None,
        }
    }
}

/// Disk cache rooted at `<cache_dir>/<namespace>`, the conventional layout
/// for per-index embedding and score caches.
pub fn disk_cache_at<T>(cache_dir: &Path, namespace: &str) -> anyhow::Result<DiskCache<T>> {
    DiskCache::new(cache_dir.join(namespace))
}
