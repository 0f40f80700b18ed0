//! Storage backend trait definition

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path};
use train_core::{Error, Result};

/// Async byte store addressed by relative keys such as `checkpoint-epoch4.ckpt`
///
/// Writing an existing key replaces its contents, so repeated writes of the
/// same checkpoint are safe.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the object stored under `key`
    ///
    /// # Errors
    /// `StoragePathNotFound` if nothing is stored under `key`
    async fn read(&self, key: &str) -> Result<Bytes>;

    /// Store `data` under `key`, returning the number of bytes written
    async fn write(&self, key: &str, data: Bytes) -> Result<u64>;

    /// Remove the object stored under `key`
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Reject keys that would escape the storage root
pub(crate) fn check_key(key: &str) -> Result<()> {
    let path = Path::new(key);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if key.is_empty() || escapes {
        return Err(Error::Storage {
            message: format!("invalid storage key: {:?}", key),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key() {
        assert!(check_key("model_best.ckpt").is_ok());
        assert!(check_key("runs/a/checkpoint-epoch2.ckpt").is_ok());
        assert!(check_key("").is_err());
        assert!(check_key("../outside.ckpt").is_err());
        assert!(check_key("/etc/passwd").is_err());
    }
}
