//! Checkpoint cadence and early-stop decisions

use train_core::Epoch;

/// True on save-period boundaries
pub fn should_checkpoint(epoch: Epoch, save_period: Epoch) -> bool {
    epoch % save_period == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    save_period: Epoch,
}

impl CheckpointPolicy {
    /// `save_period` must be positive; the controller validates it
    pub fn new(save_period: Epoch) -> Self {
        Self { save_period }
    }

    pub fn save_period(&self) -> Epoch {
        self.save_period
    }

    pub fn should_checkpoint(&self, epoch: Epoch) -> bool {
        should_checkpoint(epoch, self.save_period)
    }
}

/// Stops once the epochs without improvement exceed the patience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EarlyStopPolicy {
    patience: Option<u64>,
}

impl EarlyStopPolicy {
    pub fn new(patience: Option<u64>) -> Self {
        Self { patience }
    }

    pub fn patience(&self) -> Option<u64> {
        self.patience
    }

    pub fn should_stop(&self, epochs_since_improvement: u64) -> bool {
        self.patience
            .map(|patience| epochs_since_improvement > patience)
            .unwrap_or(false)
    }
}
