//! Checkpoint management for the training harness
//!
//! Provides the checkpoint file format and a store that keeps one file per
//! checkpointed epoch plus a best-so-far slot.

pub mod record;
pub mod store;

pub use record::{CheckpointRecord, CHECKPOINT_MAGIC, CHECKPOINT_VERSION};
pub use store::{
    epoch_key, parse_epoch_key, CheckpointStore, CheckpointStoreHandle, SavedCheckpoint,
    BEST_CHECKPOINT,
};
