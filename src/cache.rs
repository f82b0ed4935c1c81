//! Idempotent run cache
//!
//! A flat JSON map from cache key to run id, stored in the runs directory.
//! Entries are append-only. Callers hold a [`CacheGuard`] (an exclusive
//! advisory lock on a sibling `.lock` file) for the whole
//! lookup → execute → store cycle, so two identical requests cannot both
//! miss and both compute. The map itself is committed by writing a temp
//! file and renaming it over the old one.

use crate::error::{display_name, EvidenceError, Result};
use fs4::fs_std::FileExt;
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use tracing::debug;

/// Deterministic key over plan text, dataset version, and caller token
pub fn cache_key(plan_text: &str, dataset_mtime: f64, token: Option<&str>) -> String {
    let material = serde_json::json!([plan_text, dataset_mtime, token]);
    hex::encode(Sha256::digest(material.to_string().as_bytes()))
}

/// Last-modified time of a file, in seconds since the Unix epoch
pub fn modified_secs(path: &Path) -> Result<f64> {
    let meta = fs::metadata(path).map_err(|e| {
        EvidenceError::storage(format!("failed to stat {}", display_name(path)), e)
    })?;
    let modified = meta.modified().map_err(|e| {
        EvidenceError::storage(format!("no modification time for {}", display_name(path)), e)
    })?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).map_err(|e| {
        EvidenceError::storage(format!("modification time of {} predates epoch", display_name(path)), e)
    })?;
    Ok(since_epoch.as_secs_f64())
}

/// Write `bytes` to `path` via a uniquely named temp file in the same
/// directory and a rename; concurrent writers of one path never share a temp
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let name = display_name(path);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| EvidenceError::storage(format!("failed to create temp file for {name}"), e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| EvidenceError::storage(format!("failed to write {name}"), e))?;
    tmp.persist(path)
        .map_err(|e| EvidenceError::storage(format!("failed to commit {name}"), e.error))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RunCache {
    path: PathBuf,
}

impl RunCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let name = display_name(&self.path);
        self.path.with_file_name(format!("{name}.lock"))
    }

    /// Block until the cache lock is held, then load the current map
    pub fn lock(&self) -> Result<CacheGuard<'_>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| EvidenceError::storage("failed to create runs directory", e))?;
        }

        let lock_path = self.lock_path();
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| {
                EvidenceError::storage(format!("failed to open {}", display_name(&lock_path)), e)
            })?;
        lock.lock_exclusive()
            .map_err(|e| EvidenceError::storage("failed to acquire cache lock", e))?;
        debug!("cache lock acquired");

        let entries = self.load()?;
        Ok(CacheGuard {
            cache: self,
            entries,
            _lock: lock,
        })
    }

    fn load(&self) -> Result<IndexMap<String, String>> {
        let name = display_name(&self.path);
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| EvidenceError::storage(format!("corrupt cache file {name}"), e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(IndexMap::new()),
            Err(e) => Err(EvidenceError::storage(format!("failed to read {name}"), e)),
        }
    }
}

/// Exclusive view of the cache map; the lock is released on drop
#[derive(Debug)]
pub struct CacheGuard<'a> {
    cache: &'a RunCache,
    entries: IndexMap<String, String>,
    _lock: File,
}

impl CacheGuard<'_> {
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `key → run_id`; an existing entry is never overwritten
    pub fn store(&mut self, key: &str, run_id: &str) -> Result<()> {
        if self.entries.contains_key(key) {
            return Ok(());
        }
        self.entries.insert(key.to_string(), run_id.to_string());
        let text = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| EvidenceError::storage("failed to encode cache map", e))?;
        write_atomic(&self.cache.path, text.as_bytes())?;
        debug!(run_id, entries = self.entries.len(), "cache entry stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_changes_with_each_input() {
        let base = cache_key("plan", 1.5, None);
        assert_eq!(base, cache_key("plan", 1.5, None));
        assert_eq!(base.len(), 64);
        assert_ne!(base, cache_key("plan2", 1.5, None));
        assert_ne!(base, cache_key("plan", 2.5, None));
        assert_ne!(base, cache_key("plan", 1.5, Some("token")));
        assert_ne!(cache_key("plan", 1.5, Some("a")), cache_key("plan", 1.5, Some("b")));
    }

    #[test]
    fn test_store_and_lookup_persist() {
        let dir = TempDir::new().unwrap();
        let cache = RunCache::new(dir.path().join("runs").join("cache.json"));
        {
            let mut guard = cache.lock().unwrap();
            assert!(guard.is_empty());
            assert_eq!(guard.lookup("k"), None);
            guard.store("k", "run1").unwrap();
        }
        let guard = cache.lock().unwrap();
        assert_eq!(guard.lookup("k"), Some("run1"));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_entries_are_append_only() {
        let dir = TempDir::new().unwrap();
        let cache = RunCache::new(dir.path().join("cache.json"));
        let mut guard = cache.lock().unwrap();
        guard.store("k", "run1").unwrap();
        guard.store("k", "run2").unwrap();
        assert_eq!(guard.lookup("k"), Some("run1"));
    }

    #[test]
    fn test_corrupt_cache_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{not json").unwrap();
        let err = RunCache::new(&path).lock().unwrap_err();
        assert!(matches!(err, EvidenceError::Storage { .. }));
        assert!(!err.to_string().contains(dir.path().to_str().unwrap()));
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        write_atomic(&path, b"{}").unwrap();
        write_atomic(&path, b"[]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_write_atomic_concurrent_writers_of_one_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        let barrier = std::sync::Barrier::new(8);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let (path, barrier) = (&path, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        write_atomic(path, format!("{{\"writer\": {i}}}").as_bytes())
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }
        });

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\"writer\": "));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_modified_secs_of_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(modified_secs(&dir.path().join("nope.csv")).is_err());
        let path = dir.path().join("data.csv");
        fs::write(&path, "a\n1\n").unwrap();
        assert!(modified_secs(&path).unwrap() > 0.0);
    }
}
