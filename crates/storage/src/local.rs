//! Local filesystem storage backend

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use train_core::{Error, Result};
use uuid::Uuid;

use crate::backend::check_key;
use crate::StorageBackend;

/// Stores objects as files below a root directory
///
/// Writes go to a hidden temporary file that is synced and then renamed over
/// the target, so readers never observe a partially written checkpoint.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the file backing `key`
    pub fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn storage_err(action: &str, path: &Path, e: std::io::Error) -> Error {
        Error::Storage {
            message: format!("Failed to {} {}: {}", action, path.display(), e),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    #[instrument(skip(self), fields(backend = "local"))]
    async fn read(&self, key: &str) -> Result<Bytes> {
        check_key(key)?;
        let path = self.path_of(key);

        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: key.to_string(),
            }),
            Err(e) => Err(Self::storage_err("read", &path, e)),
        }
    }

    #[instrument(skip(self, data), fields(backend = "local", size = data.len()))]
    async fn write(&self, key: &str, data: Bytes) -> Result<u64> {
        check_key(key)?;
        let path = self.path_of(key);
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();

        fs::create_dir_all(&parent)
            .await
            .map_err(|e| Self::storage_err("create directory", &parent, e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| Self::storage_err("create", &temp, e))?;
        file.write_all(&data)
            .await
            .map_err(|e| Self::storage_err("write", &temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| Self::storage_err("sync", &temp, e))?;
        drop(file);

        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(Self::storage_err("rename into", &path, e));
        }

        debug!(path = %path.display(), "Wrote file");
        Ok(data.len() as u64)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        let path = self.path_of(key);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: key.to_string(),
            }),
            Err(e) => Err(Self::storage_err("delete", &path, e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(fs::try_exists(self.path_of(key)).await.unwrap_or(false))
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Self::storage_err("list", &dir, e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                    continue;
                }

                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    // in-flight temporary file
                    continue;
                }

                if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                    let key = relative.to_string_lossy().replace('\\', "/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());
        (temp_dir, storage)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_dir, storage) = setup();
        let data = Bytes::from_static(b"weights");

        assert_eq!(storage.write("model_best.ckpt", data.clone()).await.unwrap(), 7);
        assert_eq!(storage.read("model_best.ckpt").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_overwrite_same_key() {
        let (_dir, storage) = setup();

        storage.write("checkpoint-epoch2.ckpt", Bytes::from_static(b"first")).await.unwrap();
        storage.write("checkpoint-epoch2.ckpt", Bytes::from_static(b"second")).await.unwrap();

        let data = storage.read("checkpoint-epoch2.ckpt").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"second"));
        assert_eq!(storage.list("").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let (_dir, storage) = setup();

        assert!(!storage.exists("missing.ckpt").await.unwrap());
        assert!(matches!(
            storage.read("missing.ckpt").await,
            Err(Error::StoragePathNotFound { .. })
        ));
        assert!(matches!(
            storage.delete("missing.ckpt").await,
            Err(Error::StoragePathNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_prefix_and_nested() {
        let (_dir, storage) = setup();

        storage.write("checkpoint-epoch2.ckpt", Bytes::from_static(b"2")).await.unwrap();
        storage.write("checkpoint-epoch4.ckpt", Bytes::from_static(b"4")).await.unwrap();
        storage.write("model_best.ckpt", Bytes::from_static(b"b")).await.unwrap();
        storage.write("exports/model.bin", Bytes::from_static(b"e")).await.unwrap();

        let epochs = storage.list("checkpoint-epoch").await.unwrap();
        assert_eq!(epochs, vec!["checkpoint-epoch2.ckpt", "checkpoint-epoch4.ckpt"]);
        assert_eq!(storage.list("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_list_missing_root() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("not-created-yet"));
        assert!(storage.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_temp_files_left() {
        let (dir, storage) = setup();
        storage.write("model_best.ckpt", Bytes::from_static(b"x")).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_key() {
        let (_dir, storage) = setup();
        let result = storage.write("../escape.ckpt", Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(Error::Storage { .. })));
    }
}
