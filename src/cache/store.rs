//! Byte-blob storage behind the disk cache tier. The cache addresses blobs
//! by relative name; stores decide where the bytes live.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Byte-blob I/O under a cache root. Names are flat relative paths like
/// `cache.entry_3.json`.
pub trait BlobStore: Send + Sync {
    fn put(&self, name: &str, bytes: &[u8]) -> std::io::Result<()>;
    fn get(&self, name: &str) -> std::io::Result<Vec<u8>>;
    fn append(&self, name: &str, bytes: &[u8]) -> std::io::Result<()>;
    fn delete(&self, name: &str) -> std::io::Result<()>;
    fn exists(&self, name: &str) -> bool;
}

/// Stores shared across cache generations (e.g. a survival test reopening
/// the same in-memory store).
impl<S: BlobStore + ?Sized> BlobStore for std::sync::Arc<S> {
    fn put(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        (**self).put(name, bytes)
    }

    fn get(&self, name: &str) -> std::io::Result<Vec<u8>> {
        (**self).get(name)
    }

    fn append(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        (**self).append(name, bytes)
    }

    fn delete(&self, name: &str) -> std::io::Result<()> {
        (**self).delete(name)
    }

    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }
}

/// Blobs as plain files under a root directory, created on construction.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> std::io::Result<FsBlobStore> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(FsBlobStore { root })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = File::create(self.path(name))?;
        file.write_all(bytes)
    }

    fn get(&self, name: &str) -> std::io::Result<Vec<u8>> {
        let mut file = File::open(self.path(name))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(name))?;
        file.write_all(bytes)
    }

    fn delete(&self, name: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.path(name))
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }
}

/// An in-memory store for tests and for callers that only want the RAM
/// tier's behavior without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> MemoryBlobStore {
        MemoryBlobStore::default()
    }

    pub fn blob_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> std::io::Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, name.to_string()))
    }

    fn append(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.blobs
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn delete(&self, name: &str) -> std::io::Result<()> {
        self.blobs
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, name.to_string()))
    }

    fn exists(&self, name: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(name)
    }
}
