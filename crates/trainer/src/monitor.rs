//! Monitored-metric tracking

use serde::Serialize;
use tracing::{debug, warn};
use train_core::{Epoch, EpochResult, MonitorMode};

/// True when `current` is strictly better than `best` under `mode`
pub fn is_improvement(mode: MonitorMode, current: f64, best: f64) -> bool {
    match mode {
        MonitorMode::Min => current < best,
        MonitorMode::Max => current > best,
    }
}

/// Best value seen so far and the number of epochs since it was set
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonitorState {
    pub best_value: f64,
    pub epochs_since_improvement: u64,
}

impl MonitorState {
    pub fn new(mode: MonitorMode) -> Self {
        Self {
            best_value: mode.initial_best(),
            epochs_since_improvement: 0,
        }
    }
}

/// What one epoch's result did to the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// New best value
    Improved { value: f64 },

    /// Metric present but not better than the best
    NotImproved { value: f64 },

    /// Metric absent; state untouched
    MetricMissing,
}

/// Tracks the monitored metric across epochs of one run
#[derive(Debug, Clone)]
pub struct MetricTracker {
    mode: MonitorMode,
    metric: String,
    state: MonitorState,
}

impl MetricTracker {
    pub fn new(mode: MonitorMode, metric: impl Into<String>) -> Self {
        Self {
            mode,
            metric: metric.into(),
            state: MonitorState::new(mode),
        }
    }

    /// Start from a best value carried over from an earlier run
    pub fn with_best(mut self, best_value: f64) -> Self {
        self.state.best_value = best_value;
        self
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Fold one epoch's result into the state
    pub fn observe(&mut self, epoch: Epoch, result: &EpochResult) -> Observation {
        let Some(current) = result.get(&self.metric) else {
            warn!(epoch, metric = %self.metric, "Monitored metric missing from epoch result");
            return Observation::MetricMissing;
        };

        if is_improvement(self.mode, current, self.state.best_value) {
            debug!(epoch, metric = %self.metric, previous = self.state.best_value, current, "Metric improved");
            self.state.best_value = current;
            self.state.epochs_since_improvement = 0;
            Observation::Improved { value: current }
        } else {
            self.state.epochs_since_improvement += 1;
            Observation::NotImproved { value: current }
        }
    }
}
