//! In-memory storage backend for tests and dry runs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use train_core::{Error, Result};

use crate::backend::check_key;
use crate::StorageBackend;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, Bytes>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, simulating a full disk
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Bytes> {
        check_key(key)?;
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::StoragePathNotFound {
                path: key.to_string(),
            })
    }

    async fn write(&self, key: &str, data: Bytes) -> Result<u64> {
        check_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage {
                message: format!("write of {} rejected: no space left on device", key),
            });
        }

        let size = data.len() as u64;
        self.objects.write().insert(key.to_string(), data);
        Ok(size)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::StoragePathNotFound {
                path: key.to_string(),
            })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
