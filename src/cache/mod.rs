//! A two-level cache for persisted feature documents: a RAM tier holding
//! deserialized values and a disk tier mapping keys to numbered blob files
//! on a [`BlobStore`]. Values evicted from RAM write back to disk while it
//! has room; on shutdown the disk tier's key-to-entry mapping survives in a
//! `cached.map` manifest that the next construction replays and removes.
//!
//! All operations serialize on one internal mutex; blob I/O happens while
//! it is held, so a `try_get` can block briefly on disk.

mod lru;
mod store;

pub use store::{BlobStore, FsBlobStore, MemoryBlobStore};

use std::path::Path;
use std::sync::Mutex;

use serde_json::Value;

use lru::LruCache;

use crate::{MapError, Result};

/// Shutdown manifest: one `"{key} {entry_number}"` line per surviving disk
/// entry.
const MANIFEST_NAME: &str = "cached.map";

pub const DEFAULT_RAM_CACHE_SIZE: usize = 64;
pub const DEFAULT_DISK_CACHE_SIZE: usize = 256;

fn entry_name(entry_number: u64) -> String {
    format!("cache.entry_{}.json", entry_number)
}

struct CacheInner {
    ram: LruCache<String, Value>,
    disk: LruCache<String, u64>,
    disk_cap: usize,
    /// Live disk entries. Grows on insert, shrinks when a blob is erased.
    entry_count: usize,
    /// Allocator for entry numbers. Never reused, so replayed entries and
    /// fresh ones cannot collide on a blob file.
    next_entry: u64,
    is_active: bool,
    /// Set during shutdown: disk evictions then persist to the manifest
    /// instead of deleting blobs.
    on_final_clear: bool,
    closed: bool,
}

pub struct MapCache<S: BlobStore = FsBlobStore> {
    store: S,
    inner: Mutex<CacheInner>,
}

impl MapCache<FsBlobStore> {
    /// Opens a cache over a directory, creating it if needed and replaying
    /// a `cached.map` manifest left by a previous shutdown.
    pub fn open<P: AsRef<Path>>(
        file_cache_path: P,
        ram_cache_size: usize,
        disk_cache_size: usize,
    ) -> Result<MapCache<FsBlobStore>> {
        MapCache::with_store(
            FsBlobStore::new(file_cache_path)?,
            ram_cache_size,
            disk_cache_size,
        )
    }
}

impl<S: BlobStore> MapCache<S> {
    /// Builds a cache over an arbitrary blob store, replaying the manifest
    /// if the store carries one.
    pub fn with_store(store: S, ram_cache_size: usize, disk_cache_size: usize) -> Result<MapCache<S>> {
        let disk_cap = disk_cache_size.max(1);
        let mut inner = CacheInner {
            ram: LruCache::new(ram_cache_size),
            disk: LruCache::new(disk_cap),
            disk_cap,
            entry_count: 0,
            next_entry: 0,
            is_active: true,
            on_final_clear: false,
            closed: false,
        };

        if store.exists(MANIFEST_NAME) {
            match store.get(MANIFEST_NAME) {
                Ok(bytes) => {
                    for line in String::from_utf8_lossy(&bytes).lines() {
                        if inner.entry_count >= inner.disk_cap {
                            // Cache too small to hold the previous contents.
                            break;
                        }
                        let mut parts = line.split_whitespace();
                        match (
                            parts.next(),
                            parts.next().and_then(|n| n.parse::<u64>().ok()),
                        ) {
                            (Some(key), Some(entry_number)) => {
                                inner.disk.insert(key.to_string(), entry_number);
                                inner.entry_count += 1;
                                inner.next_entry = inner.next_entry.max(entry_number + 1);
                            }
                            _ => warn!("skipping malformed manifest line {:?}", line),
                        }
                    }
                    if let Err(err) = store.delete(MANIFEST_NAME) {
                        error!("failed to remove consumed manifest: {}", err);
                    }
                    info!("replayed {} cache entries from manifest", inner.entry_count);
                }
                Err(err) => error!("failed to read cache manifest: {}", err),
            }
        }

        Ok(MapCache {
            store,
            inner: Mutex::new(inner),
        })
    }

    /// Stores a value under a key in both tiers. No-op while the cache is
    /// turned off. An `Err` means the blob could not be persisted; both
    /// in-memory tiers still hold the value.
    pub fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.is_active {
            warn!("cache is not active, dropping put for {:?}", key);
            return Ok(());
        }
        let key = key.to_string();

        let mut result = Ok(());
        if let Some((evicted_key, evicted_value)) = inner.ram.insert(key.clone(), value.clone()) {
            if let Err(err) = self.write_back(&mut inner, evicted_key, evicted_value) {
                result = Err(err);
            }
        }

        if inner.disk.contains_key(&key) {
            return result;
        }

        let entry_number = inner.next_entry;
        inner.next_entry += 1;
        inner.entry_count += 1;
        if let Some((old_key, old_entry)) = inner.disk.insert(key, entry_number) {
            self.drop_disk_entry(&mut inner, old_key, old_entry);
        }
        if let Err(err) = self.persist_blob(entry_number, &value) {
            error!("failed to persist cache entry {}: {}", entry_number, err);
            return Err(err);
        }
        result
    }

    /// Looks a key up: RAM first, then disk (reloading the blob into RAM).
    /// Misses on an empty key, an inactive cache, or an unreadable blob;
    /// blob failures are logged and never disturb the RAM tier.
    pub fn try_get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.is_active {
            warn!("cache is not active, cannot get {:?}", key);
            return None;
        }
        if key.is_empty() {
            return None;
        }
        let key = key.to_string();

        if let Some(value) = inner.ram.get(&key) {
            return Some(value.clone());
        }

        let entry_number = *inner.disk.get(&key)?;
        let bytes = match self.store.get(&entry_name(entry_number)) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("failed to load cache entry {}: {}", entry_number, err);
                return None;
            }
        };
        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                error!("cache entry {} is not valid JSON: {}", entry_number, err);
                return None;
            }
        };

        if let Some((evicted_key, evicted_value)) = inner.ram.insert(key, value.clone()) {
            if let Err(err) = self.write_back(&mut inner, evicted_key, evicted_value) {
                error!("write-back during get failed: {}", err);
            }
        }
        Some(value)
    }

    /// Persists the disk tier's key-to-entry mapping to the manifest and
    /// marks the cache closed. Idempotent; also runs on drop.
    pub fn close_and_persist(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;
        inner.on_final_clear = true;
        info!("persisting {} disk cache entries to manifest", inner.disk.len());
        while let Some((key, entry_number)) = inner.disk.pop_lru() {
            self.drop_disk_entry(&mut inner, key, entry_number);
        }
        Ok(())
    }

    /// Suspends all cache operations without losing state.
    pub fn turn_off(&self) {
        self.inner.lock().unwrap().is_active = false;
    }

    pub fn turn_on(&self) {
        self.inner.lock().unwrap().is_active = true;
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().is_active
    }

    pub fn ram_len(&self) -> usize {
        self.inner.lock().unwrap().ram.len()
    }

    pub fn disk_len(&self) -> usize {
        self.inner.lock().unwrap().disk.len()
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().unwrap().entry_count
    }

    /// RAM eviction path: write the value through to disk unless it's
    /// already there or the disk tier is full, in which case it's dropped.
    fn write_back(&self, inner: &mut CacheInner, key: String, value: Value) -> Result<()> {
        if inner.disk.contains_key(&key) || inner.entry_count >= inner.disk_cap {
            return Ok(());
        }
        let entry_number = inner.next_entry;
        inner.next_entry += 1;
        inner.entry_count += 1;
        if let Some((old_key, old_entry)) = inner.disk.insert(key, entry_number) {
            self.drop_disk_entry(inner, old_key, old_entry);
        }
        self.persist_blob(entry_number, &value)
    }

    /// Disk eviction path: during shutdown the mapping is appended to the
    /// manifest and the blob survives; otherwise the blob is removed.
    fn drop_disk_entry(&self, inner: &mut CacheInner, key: String, entry_number: u64) {
        if inner.on_final_clear {
            let line = format!("{} {}\n", key, entry_number);
            if let Err(err) = self.store.append(MANIFEST_NAME, line.as_bytes()) {
                error!("failed to append {:?} to cache manifest: {}", key, err);
            }
        } else {
            if let Err(err) = self.store.delete(&entry_name(entry_number)) {
                warn!("failed to remove evicted cache entry {}: {}", entry_number, err);
            }
            inner.entry_count = inner.entry_count.saturating_sub(1);
        }
    }

    fn persist_blob(&self, entry_number: u64, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|err| {
            MapError::CacheIo(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
        })?;
        self.store
            .put(&entry_name(entry_number), &bytes)
            .map_err(MapError::CacheIo)
    }
}

impl<S: BlobStore> Drop for MapCache<S> {
    fn drop(&mut self) {
        if let Err(err) = self.close_and_persist() {
            error!("cache shutdown failed: {}", err);
        }
    }
}
