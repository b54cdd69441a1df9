use std::fs;
use tempfile::TempDir;

use fragdb_core::traits::EmbeddingCache;
use fragdb_embed::{DiskCache, MemoryCache};

#[test]
fn memory_cache_round_trip() {
    let cache: MemoryCache<Vec<f32>> = MemoryCache::new(4).expect("cache");
    let v = vec![1.0f32, 2.0, 3.0];
    cache.save("k1", &v);
    assert!(cache.contains("k1"));
    assert_eq!(cache.get("k1"), Some(v));
    assert_eq!(cache.get("k2"), None);
}

#[test]
fn memory_cache_evicts_least_recently_used() {
    let cache: MemoryCache<f32> = MemoryCache::new(2).expect("cache");
    cache.save("a", &1.0);
    cache.save("b", &2.0);
    // Touch "a" so "b" becomes the eviction candidate.
    assert_eq!(cache.get("a"), Some(1.0));
    cache.save("c", &3.0);

    assert_eq!(cache.get("b"), None, "least recently used entry evicted");
    assert_eq!(cache.get("a"), Some(1.0));
    assert_eq!(cache.get("c"), Some(3.0));
    assert_eq!(cache.stats().entries, 2);
}

#[test]
fn memory_cache_rejects_zero_capacity() {
    assert!(MemoryCache::<f32>::new(0).is_err());
}

#[test]
fn memory_cache_clear_empties_it() {
    let cache: MemoryCache<f32> = MemoryCache::new(4).expect("cache");
    cache.save("a", &1.0);
    cache.clear();
    assert_eq!(cache.get("a"), None);
    assert_eq!(cache.stats().entries, 0);
}

#[test]
fn disk_cache_survives_reopening() {
    let tmp = TempDir::new().expect("tempdir");
    let v = vec![0.5f32, -0.25];
    {
        let cache: DiskCache<Vec<f32>> = DiskCache::new(tmp.path()).expect("cache");
        cache.save("frag-1", &v);
        assert!(cache.contains("frag-1"));
    }
    let reopened: DiskCache<Vec<f32>> = DiskCache::new(tmp.path()).expect("cache");
    assert_eq!(reopened.get("frag-1"), Some(v));

    let stats = reopened.stats();
    assert_eq!(stats.entries, 1);
    assert!(stats.size_bytes.unwrap_or(0) > 0);
}

#[test]
fn corrupt_disk_entry_is_a_miss() {
    let tmp = TempDir::new().expect("tempdir");
    let cache: DiskCache<Vec<f32>> = DiskCache::new(tmp.path()).expect("cache");
    cache.save("frag-1", &vec![1.0f32]);
    fs::write(tmp.path().join("frag-1.json"), b"not json at all").expect("corrupt");
    assert_eq!(cache.get("frag-1"), None);
}

#[test]
fn disk_cache_clear_removes_entries() {
    let tmp = TempDir::new().expect("tempdir");
    let cache: DiskCache<f32> = DiskCache::new(tmp.path()).expect("cache");
    cache.save("a", &1.0);
    cache.save("b", &2.0);
    cache.clear();
    assert!(!cache.contains("a"));
    assert_eq!(cache.stats().entries, 0);
}
