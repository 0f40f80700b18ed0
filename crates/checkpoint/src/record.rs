//! Checkpoint record and its on-disk format
//!
//! Layout (little endian):
//!
//! ```text
//! magic "CXRK" | version u32 | epoch u64 | monitor_best f64
//! meta_len u32 | meta JSON (arch, config, class_to_idx, created_at)
//! model_len u64 | model bytes | optimizer_len u64 | optimizer bytes
//! ```
//!
//! `monitor_best` lives in the fixed header because it may still be the
//! ±infinity sentinel, which JSON cannot represent.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use train_core::{ClassToIdx, Epoch, Error, ModelState, Result};

/// Magic bytes for checkpoint files
pub const CHECKPOINT_MAGIC: [u8; 4] = *b"CXRK";

/// Checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

const FIXED_HEADER_LEN: usize = 4 + 4 + 8 + 8 + 4;

/// Durable snapshot of a training run at one epoch
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    /// Architecture identifier
    pub arch: String,

    /// Epoch the snapshot was taken after
    pub epoch: Epoch,

    /// Serialized model weights
    pub model: Bytes,

    /// Serialized optimizer state
    pub optimizer: Bytes,

    /// Best monitored value at the time of the snapshot
    pub monitor_best: f64,

    /// Configuration the run was started with
    pub config: serde_json::Value,

    /// Label mapping of the training dataset
    pub class_to_idx: Option<ClassToIdx>,

    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct RecordMeta {
    arch: String,
    config: serde_json::Value,
    class_to_idx: Option<ClassToIdx>,
    created_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(
        epoch: Epoch,
        state: ModelState,
        monitor_best: f64,
        config: serde_json::Value,
    ) -> Self {
        Self {
            arch: state.arch,
            epoch,
            model: state.model,
            optimizer: state.optimizer,
            monitor_best,
            config,
            class_to_idx: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_class_to_idx(mut self, class_to_idx: Option<ClassToIdx>) -> Self {
        self.class_to_idx = class_to_idx;
        self
    }

    /// Model and optimizer state, for handing back to a training step
    pub fn state(&self) -> ModelState {
        ModelState {
            arch: self.arch.clone(),
            model: self.model.clone(),
            optimizer: self.optimizer.clone(),
        }
    }

    /// Serialize into the checkpoint file format
    pub fn encode(&self) -> Result<Bytes> {
        let meta = serde_json::to_vec(&RecordMeta {
            arch: self.arch.clone(),
            config: self.config.clone(),
            class_to_idx: self.class_to_idx.clone(),
            created_at: self.created_at,
        })?;

        let mut buf = BytesMut::with_capacity(
            FIXED_HEADER_LEN + meta.len() + 16 + self.model.len() + self.optimizer.len(),
        );
        buf.put_slice(&CHECKPOINT_MAGIC);
        buf.put_u32_le(CHECKPOINT_VERSION);
        buf.put_u64_le(self.epoch);
        buf.put_f64_le(self.monitor_best);
        buf.put_u32_le(metadata_len(meta.len())?);
        buf.put_slice(&meta);
        buf.put_u64_le(self.model.len() as u64);
        buf.put_slice(&self.model);
        buf.put_u64_le(self.optimizer.len() as u64);
        buf.put_slice(&self.optimizer);

        Ok(buf.freeze())
    }

    /// Parse a checkpoint file; `id` names the file in error messages
    pub fn decode(id: &str, mut data: Bytes) -> Result<Self> {
        let corrupted = |reason: String| Error::CheckpointCorrupted {
            checkpoint_id: id.to_string(),
            reason,
        };

        if data.remaining() < FIXED_HEADER_LEN {
            return Err(corrupted(format!("truncated header ({} bytes)", data.len())));
        }

        let mut magic = [0u8; 4];
        data.copy_to_slice(&mut magic);
        if magic != CHECKPOINT_MAGIC {
            return Err(corrupted("invalid checkpoint magic".to_string()));
        }

        let version = data.get_u32_le();
        if version != CHECKPOINT_VERSION {
            return Err(corrupted(format!("unsupported version {}", version)));
        }

        let epoch = data.get_u64_le();
        let monitor_best = data.get_f64_le();

        let meta_len = data.get_u32_le() as usize;
        let meta_bytes =
            take(&mut data, meta_len).ok_or_else(|| corrupted("truncated metadata".into()))?;
        let meta: RecordMeta = serde_json::from_slice(&meta_bytes)
            .map_err(|e| corrupted(format!("metadata: {}", e)))?;

        let model =
            take_blob(&mut data).ok_or_else(|| corrupted("truncated model state".into()))?;
        let optimizer =
            take_blob(&mut data).ok_or_else(|| corrupted("truncated optimizer state".into()))?;

        if data.has_remaining() {
            return Err(corrupted(format!("{} trailing bytes", data.remaining())));
        }

        Ok(Self {
            arch: meta.arch,
            epoch,
            model,
            optimizer,
            monitor_best,
            config: meta.config,
            class_to_idx: meta.class_to_idx,
            created_at: meta.created_at,
        })
    }
}

fn take(data: &mut Bytes, len: usize) -> Option<Bytes> {
    (data.remaining() >= len).then(|| data.split_to(len))
}

fn take_blob(data: &mut Bytes) -> Option<Bytes> {
    if data.remaining() < 8 {
        return None;
    }
    let len = usize::try_from(data.get_u64_le()).ok()?;
    take(data, len)
}

/// Metadata block length as stored in the u32 header field
fn metadata_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::CheckpointWriteFailed {
        message: format!("metadata block of {} bytes exceeds the format limit", len),
    })
}
