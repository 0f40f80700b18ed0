//! Checkpoint store: epoch-keyed slots plus a fixed best slot

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use storage::StorageBackend;
use tracing::{debug, info, warn};
use train_core::{Epoch, Error, Result};

use crate::record::CheckpointRecord;

/// Key of the best-so-far checkpoint
pub const BEST_CHECKPOINT: &str = "model_best.ckpt";

const EPOCH_PREFIX: &str = "checkpoint-epoch";
const EXTENSION: &str = ".ckpt";

/// Storage key for the checkpoint of `epoch`
pub fn epoch_key(epoch: Epoch) -> String {
    format!("{}{}{}", EPOCH_PREFIX, epoch, EXTENSION)
}

/// Epoch encoded in an epoch checkpoint key
pub fn parse_epoch_key(key: &str) -> Option<Epoch> {
    key.strip_prefix(EPOCH_PREFIX)?
        .strip_suffix(EXTENSION)?
        .parse()
        .ok()
}

/// Where a checkpoint ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCheckpoint {
    pub epoch: Epoch,
    pub key: String,
    /// Set when the record was also written to the best slot
    pub best_key: Option<String>,
    pub size_bytes: u64,
}

/// Persists checkpoint records through a storage backend
pub struct CheckpointStore {
    backend: Arc<dyn StorageBackend>,

    /// Number of epoch checkpoints to keep; the best slot is never pruned
    keep_count: Option<usize>,

    /// Epoch checkpoints present in storage
    epochs: RwLock<BTreeMap<Epoch, String>>,
}

impl CheckpointStore {
    /// Open a store, indexing the epoch checkpoints already present
    pub async fn open(backend: Arc<dyn StorageBackend>, keep_count: Option<usize>) -> Result<Self> {
        let existing: BTreeMap<Epoch, String> = backend
            .list(EPOCH_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| parse_epoch_key(&key).map(|epoch| (epoch, key)))
            .collect();

        debug!(count = existing.len(), "Indexed existing checkpoints");

        Ok(Self {
            backend,
            keep_count,
            epochs: RwLock::new(existing),
        })
    }

    /// Write `record` to its epoch slot, and to the best slot when `is_best`
    ///
    /// Saving the same epoch twice overwrites the earlier file.
    pub async fn save(&self, record: &CheckpointRecord, is_best: bool) -> Result<SavedCheckpoint> {
        let data = record.encode()?;
        let key = epoch_key(record.epoch);

        let size_bytes = self.backend.write(&key, data.clone()).await.map_err(|e| {
            Error::CheckpointWriteFailed {
                message: format!("{}: {}", key, e),
            }
        })?;
        info!(key = %key, epoch = record.epoch, size_bytes, "Saving checkpoint");

        self.epochs.write().insert(record.epoch, key.clone());

        let best_key = if is_best {
            self.backend.write(BEST_CHECKPOINT, data).await.map_err(|e| {
                Error::CheckpointWriteFailed {
                    message: format!("{}: {}", BEST_CHECKPOINT, e),
                }
            })?;
            info!(key = BEST_CHECKPOINT, epoch = record.epoch, "Saving current best");
            Some(BEST_CHECKPOINT.to_string())
        } else {
            None
        };

        self.enforce_retention(record.epoch).await;

        Ok(SavedCheckpoint {
            epoch: record.epoch,
            key,
            best_key,
            size_bytes,
        })
    }

    /// Load and decode the checkpoint stored under `key`
    pub async fn load(&self, key: &str) -> Result<CheckpointRecord> {
        let data = match self.backend.read(key).await {
            Ok(data) => data,
            Err(Error::StoragePathNotFound { .. }) => {
                return Err(Error::CheckpointNotFound {
                    checkpoint_id: key.to_string(),
                })
            }
            Err(e) => return Err(e),
        };
        CheckpointRecord::decode(key, data)
    }

    pub async fn load_epoch(&self, epoch: Epoch) -> Result<CheckpointRecord> {
        self.load(&epoch_key(epoch)).await
    }

    pub async fn load_best(&self) -> Result<CheckpointRecord> {
        self.load(BEST_CHECKPOINT).await
    }

    pub async fn has_best(&self) -> Result<bool> {
        self.backend.exists(BEST_CHECKPOINT).await
    }

    /// Epochs with a checkpoint, ascending
    pub fn epochs(&self) -> Vec<Epoch> {
        self.epochs.read().keys().copied().collect()
    }

    pub fn latest_epoch(&self) -> Option<Epoch> {
        self.epochs.read().keys().next_back().copied()
    }

    /// Most recent epoch checkpoint, for resuming
    pub async fn latest(&self) -> Result<Option<CheckpointRecord>> {
        match self.latest_epoch() {
            Some(epoch) => self.load_epoch(epoch).await.map(Some),
            None => Ok(None),
        }
    }

    /// Delete the oldest epoch checkpoints beyond `keep_count`
    ///
    /// Only epochs below `saved` are candidates, so the checkpoint just
    /// written survives even when later epochs from another run are indexed.
    async fn enforce_retention(&self, saved: Epoch) {
        let Some(keep) = self.keep_count else {
            return;
        };

        let expired: Vec<String> = {
            let mut epochs = self.epochs.write();
            let mut expired = Vec::new();
            while epochs.len() > keep {
                match epochs.first_key_value() {
                    Some((&epoch, _)) if epoch < saved => {
                        if let Some((_, key)) = epochs.pop_first() {
                            expired.push(key);
                        }
                    }
                    _ => break,
                }
            }
            expired
        };

        for key in expired {
            match self.backend.delete(&key).await {
                Ok(()) => debug!(key = %key, "Deleted old checkpoint"),
                Err(e) => warn!(key = %key, error = %e, "Failed to delete old checkpoint"),
            }
        }
    }
}

/// Thread-safe handle to a checkpoint store
pub type CheckpointStoreHandle = Arc<CheckpointStore>;
