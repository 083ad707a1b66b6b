//! On-disk HTTP response cache
//!
//! Entries live in one directory shared by the whole process. Each entry is
//! a `<key>.json` metadata file plus a `<key>.body` file, where the key is
//! the URL-safe base64 SHA-256 of `METHOD url`. The metadata file is written
//! last, so an entry without one is never served.
//!
//! Freshness comes from the stored `Cache-Control` header. Eviction is
//! least-recently-used once the byte bound is exceeded.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use log::{debug, warn};
use ring::digest;
use serde::{Deserialize, Serialize};

use super::{Method, UpstreamResponse};
use crate::utils::error::CacheError;

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";

/// Statuses stored without explicit freshness information elsewhere
const CACHEABLE_STATUSES: &[u16] = &[200, 203, 204, 300, 301, 308, 404, 405, 410, 414, 501];

/// `max-age` of a `Cache-Control` value.
///
/// Responses reach the cache after the header rewrite, so this is the only
/// directive they carry.
fn max_age(header: &str) -> Option<Duration> {
    header.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("max-age") {
            return None;
        }
        value.trim().parse().ok().map(Duration::from_secs)
    })
}

/// Metadata persisted next to each body file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
    stored_at: u64,
    ttl_secs: u64,
}

/// A cached response loaded from disk
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: UpstreamResponse,
    /// When this entry was stored
    pub stored_at: SystemTime,
    /// Time-to-live duration
    pub ttl: Duration,
}

impl CacheEntry {
    /// Check if this entry is still fresh
    pub fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }

    /// Age of this entry
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.stored_at)
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    size: u64,
    last_access: u64,
}

#[derive(Debug, Default)]
struct CacheIndex {
    entries: HashMap<String, IndexEntry>,
    current_size: u64,
    clock: u64,
}

impl CacheIndex {
    fn touch(&mut self, key: &str) {
        self.clock += 1;
        let clock = self.clock;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_access = clock;
        }
    }

    fn insert(&mut self, key: String, size: u64) {
        self.clock += 1;
        let entry = IndexEntry {
            size,
            last_access: self.clock,
        };
        if let Some(old) = self.entries.insert(key, entry) {
            self.current_size = self.current_size.saturating_sub(old.size);
        }
        self.current_size += size;
    }

    fn remove(&mut self, key: &str) -> Option<IndexEntry> {
        let entry = self.entries.remove(key)?;
        self.current_size = self.current_size.saturating_sub(entry.size);
        Some(entry)
    }

    fn least_recently_used(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(key, _)| key.clone())
    }
}

/// Size-bounded response cache backed by a directory
pub struct DiskCache {
    dir: PathBuf,
    max_size: u64,
    index: Mutex<CacheIndex>,
}

impl DiskCache {
    /// Open (creating if needed) a cache directory and index its entries
    pub fn open(dir: impl Into<PathBuf>, max_size: u64) -> Result<Self, CacheError> {
        let dir = dir.into();
        let directory_error = |source: io::Error| CacheError::Directory {
            path: dir.display().to_string(),
            source,
        };

        fs::create_dir_all(&dir).map_err(directory_error)?;

        let mut found = Vec::new();
        for item in fs::read_dir(&dir).map_err(directory_error)? {
            let path = item.map_err(directory_error)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let body = body_path(&dir, key);
            match (fs::metadata(&path), fs::metadata(&body)) {
                (Ok(meta), Ok(body_meta)) => {
                    let modified = meta.modified().unwrap_or(UNIX_EPOCH);
                    found.push((key.to_string(), meta.len() + body_meta.len(), modified));
                }
                _ => {
                    debug!("dropping incomplete cache entry {}", key);
                    let _ = fs::remove_file(&path);
                    let _ = fs::remove_file(&body);
                }
            }
        }

        // Oldest files get the lowest access ticks
        found.sort_by_key(|(_, _, modified)| *modified);
        let mut index = CacheIndex::default();
        for (key, size, _) in found {
            index.insert(key, size);
        }

        let cache = Self {
            dir,
            max_size,
            index: Mutex::new(index),
        };
        cache.evict_if_needed(0);
        Ok(cache)
    }

    /// Directory holding the entries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get a fresh entry. Stale or unreadable entries are removed.
    pub fn get(&self, method: Method, url: &str) -> Option<CacheEntry> {
        let key = cache_key(method, url);
        if !self.lock().entries.contains_key(&key) {
            return None;
        }

        let entry = match self.read_entry(&key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("unreadable cache entry for {}: {}", url, e);
                self.remove_key(&key);
                return None;
            }
        };

        if !entry.is_fresh() {
            debug!("cache entry for {} expired", url);
            self.remove_key(&key);
            return None;
        }

        self.lock().touch(&key);
        Some(entry)
    }

    /// Store a response if its status and headers allow it.
    ///
    /// Returns whether the response was written.
    pub fn put(
        &self,
        method: Method,
        url: &str,
        response: &UpstreamResponse,
    ) -> Result<bool, CacheError> {
        if !CACHEABLE_STATUSES.contains(&response.status()) {
            return Ok(false);
        }

        let ttl = match response.header("cache-control").and_then(max_age) {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => return Ok(false),
        };

        let meta = EntryMeta {
            method: method.to_string(),
            url: url.to_string(),
            status: response.status(),
            reason: response.reason().to_string(),
            headers: response.headers().to_vec(),
            stored_at: unix_secs(SystemTime::now()),
            ttl_secs: ttl.as_secs(),
        };
        let meta_bytes = serde_json::to_vec(&meta)?;
        let size = (meta_bytes.len() + response.body().len()) as u64;

        // Don't cache if single entry exceeds max size
        if size > self.max_size {
            return Ok(false);
        }

        let key = cache_key(method, url);
        fs::write(body_path(&self.dir, &key), response.body())?;
        fs::write(meta_path(&self.dir, &key), &meta_bytes)?;

        self.lock().insert(key, size);
        self.evict_if_needed(0);
        Ok(true)
    }

    /// Remove an entry from cache
    pub fn remove(&self, method: Method, url: &str) {
        self.remove_key(&cache_key(method, url));
    }

    /// Clear all cached entries
    pub fn clear(&self) {
        let keys: Vec<String> = self.lock().entries.keys().cloned().collect();
        for key in keys {
            self.remove_key(&key);
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let index = self.lock();
        CacheStats {
            entries: index.entries.len(),
            size_bytes: index.current_size,
            max_size_bytes: self.max_size,
        }
    }

    fn read_entry(&self, key: &str) -> Result<CacheEntry, CacheError> {
        let meta: EntryMeta = serde_json::from_slice(&fs::read(meta_path(&self.dir, key))?)?;
        let body = fs::read(body_path(&self.dir, key))?;

        let mut response = UpstreamResponse::new(meta.status, meta.reason).with_body(body);
        response.headers_mut().extend(meta.headers);

        Ok(CacheEntry {
            response,
            stored_at: UNIX_EPOCH + Duration::from_secs(meta.stored_at),
            ttl: Duration::from_secs(meta.ttl_secs),
        })
    }

    fn remove_key(&self, key: &str) {
        self.lock().remove(key);
        for path in [meta_path(&self.dir, key), body_path(&self.dir, key)] {
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != io::ErrorKind::NotFound
            {
                warn!("failed to delete {}: {}", path.display(), e);
            }
        }
    }

    /// Evict least recently used entries until `needed_size` more bytes fit
    fn evict_if_needed(&self, needed_size: u64) {
        loop {
            let victim = {
                let index = self.lock();
                if index.current_size + needed_size <= self.max_size {
                    return;
                }
                index.least_recently_used()
            };
            match victim {
                Some(key) => {
                    debug!("evicting cache entry {}", key);
                    self.remove_key(&key);
                }
                None => return,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Maximum cache size
    pub max_size_bytes: u64,
}

/// File-name-safe key for a request
pub fn cache_key(method: Method, url: &str) -> String {
    let source = format!("{} {}", method, url);
    let hash = digest::digest(&digest::SHA256, source.as_bytes());
    URL_SAFE_NO_PAD.encode(hash.as_ref())
}

fn meta_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", key, META_EXT))
}

fn body_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", key, BODY_EXT))
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
