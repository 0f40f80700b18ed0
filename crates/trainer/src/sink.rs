//! Checkpoint persistence seen from the training loop

use checkpoint::{CheckpointRecord, CheckpointStoreHandle, SavedCheckpoint};
use train_core::{Result, RuntimeManager};

/// Receives checkpoint records from the controller
///
/// Writing the same epoch twice must be safe; errors abort the run.
pub trait CheckpointSink {
    fn write(&mut self, record: &CheckpointRecord, is_best: bool) -> Result<()>;
}

/// Sink that writes through a [`checkpoint::CheckpointStore`] on the harness runtime
pub struct StoreSink<'a> {
    runtime: &'a RuntimeManager,
    store: CheckpointStoreHandle,
    saved: Vec<SavedCheckpoint>,
}

impl<'a> StoreSink<'a> {
    pub fn new(runtime: &'a RuntimeManager, store: CheckpointStoreHandle) -> Self {
        Self {
            runtime,
            store,
            saved: Vec::new(),
        }
    }

    /// Checkpoints written so far, in order
    pub fn saved(&self) -> &[SavedCheckpoint] {
        &self.saved
    }
}

impl CheckpointSink for StoreSink<'_> {
    fn write(&mut self, record: &CheckpointRecord, is_best: bool) -> Result<()> {
        let saved = self.runtime.block_on(self.store.save(record, is_best))?;
        self.saved.push(saved);
        Ok(())
    }
}
