//! Epoch loop: improvement tracking, early stopping and checkpoint cadence

use checkpoint::CheckpointRecord;
use serde::Serialize;
use tracing::{debug, info, warn};
use train_core::{
    ClassToIdx, Epoch, Error, InterruptFlag, Result, TerminationReason, TrainingConfig,
};

use crate::epoch_log::EpochObserver;
use crate::monitor::{MetricTracker, MonitorState, Observation};
use crate::policy::{CheckpointPolicy, EarlyStopPolicy};
use crate::sink::CheckpointSink;
use crate::step::EpochStep;

/// How a run ended and where the monitor stood
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub reason: TerminationReason,

    /// Last epoch whose step completed
    pub last_epoch: Option<Epoch>,

    pub epochs_run: u64,

    /// Epoch that set the current best value during this run
    pub best_epoch: Option<Epoch>,

    pub monitor: MonitorState,
}

/// Drives one training run over a range of epochs
pub struct TrainingLoopController {
    tracker: MetricTracker,
    checkpoints: CheckpointPolicy,
    early_stop: EarlyStopPolicy,
    start_epoch: Epoch,
    epochs: Epoch,
    config: serde_json::Value,
    class_to_idx: Option<ClassToIdx>,
    interrupt: Option<InterruptFlag>,
    observers: Vec<Box<dyn EpochObserver>>,
}

impl TrainingLoopController {
    /// Build a controller; fails before any epoch runs if the config is invalid
    pub fn new(config: &TrainingConfig) -> Result<Self> {
        config.validate()?;
        let mode = config.monitor.mode()?;

        Ok(Self {
            tracker: MetricTracker::new(mode, config.monitor.metric()),
            checkpoints: CheckpointPolicy::new(config.save_period),
            early_stop: EarlyStopPolicy::new(config.early_stop),
            start_epoch: config.start_epoch,
            epochs: config.epochs,
            config: serde_json::to_value(config)?,
            class_to_idx: None,
            interrupt: None,
            observers: Vec::new(),
        })
    }

    /// Label mapping embedded in every checkpoint
    pub fn with_class_to_idx(mut self, class_to_idx: Option<ClassToIdx>) -> Self {
        self.class_to_idx = class_to_idx;
        self
    }

    /// Stop between epochs once `flag` is raised
    pub fn with_interrupt(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn with_observer(mut self, observer: impl EpochObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Continue from the best value recorded by an earlier run
    pub fn with_best(mut self, best_value: f64) -> Self {
        self.tracker = self.tracker.with_best(best_value);
        self
    }

    /// Start from `epoch` instead of the configured `start_epoch`
    pub fn with_start_epoch(mut self, epoch: Epoch) -> Self {
        self.start_epoch = epoch;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.tracker.state()
    }

    pub fn tracker(&self) -> &MetricTracker {
        &self.tracker
    }

    /// Run the configured epochs
    pub fn run(
        &mut self,
        step: &mut dyn EpochStep,
        sink: &mut dyn CheckpointSink,
    ) -> Result<TrainingSummary> {
        self.run_range(self.start_epoch, self.epochs, step, sink)
    }

    /// Run epochs `start..=end` in order
    pub fn run_range(
        &mut self,
        start: Epoch,
        end: Epoch,
        step: &mut dyn EpochStep,
        sink: &mut dyn CheckpointSink,
    ) -> Result<TrainingSummary> {
        if start == 0 {
            return Err(Error::invalid_config("epochs are numbered from 1"));
        }

        info!(
            start,
            end,
            monitor = %self.tracker.mode(),
            metric = %self.tracker.metric(),
            save_period = self.checkpoints.save_period(),
            early_stop = ?self.early_stop.patience(),
            "Starting training"
        );

        let mut last_epoch = None;
        let mut epochs_run = 0;
        let mut best_epoch = None;

        for epoch in start..=end {
            if self.interrupted() {
                warn!(epoch, "Interrupt received, stopping before epoch");
                return Ok(self.summary(
                    TerminationReason::Interrupted,
                    last_epoch,
                    epochs_run,
                    best_epoch,
                ));
            }

            // A step killed by the same interrupt leaves the epoch unfinished
            let result = match step.run_epoch(epoch) {
                Ok(result) => result,
                Err(e) if self.interrupted() => {
                    warn!(epoch, error = %e, "Step aborted by interrupt, epoch discarded");
                    return Ok(self.summary(
                        TerminationReason::Interrupted,
                        last_epoch,
                        epochs_run,
                        best_epoch,
                    ));
                }
                Err(e) => return Err(e),
            };
            last_epoch = Some(epoch);
            epochs_run += 1;

            info!(epoch, "Epoch finished");
            for (name, value) in result.sorted() {
                info!(epoch, metric = name, value, "    {:15}: {}", name, value);
            }
            for observer in self.observers.iter_mut() {
                observer.on_epoch(epoch, &result)?;
            }

            let is_best = match self.tracker.observe(epoch, &result) {
                Observation::Improved { .. } => {
                    best_epoch = Some(epoch);
                    true
                }
                Observation::NotImproved { .. } | Observation::MetricMissing => false,
            };

            let state = self.tracker.state();
            if self.early_stop.should_stop(state.epochs_since_improvement) {
                info!(
                    epoch,
                    epochs_since_improvement = state.epochs_since_improvement,
                    "Validation performance didn't improve, training stops"
                );
                return Ok(self.summary(
                    TerminationReason::EarlyStopped,
                    last_epoch,
                    epochs_run,
                    best_epoch,
                ));
            }

            if self.checkpoints.should_checkpoint(epoch) {
                let record = CheckpointRecord::new(
                    epoch,
                    step.snapshot()?,
                    state.best_value,
                    self.config.clone(),
                )
                .with_class_to_idx(self.class_to_idx.clone());
                sink.write(&record, is_best)?;
            } else {
                debug!(epoch, is_best, "Not a checkpoint epoch");
            }
        }

        Ok(self.summary(TerminationReason::Completed, last_epoch, epochs_run, best_epoch))
    }

    fn interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(|flag| flag.is_raised())
    }

    fn summary(
        &self,
        reason: TerminationReason,
        last_epoch: Option<Epoch>,
        epochs_run: u64,
        best_epoch: Option<Epoch>,
    ) -> TrainingSummary {
        let summary = TrainingSummary {
            reason,
            last_epoch,
            epochs_run,
            best_epoch,
            monitor: self.tracker.state(),
        };
        info!(
            reason = %reason,
            epochs_run,
            best = summary.monitor.best_value,
            "Training finished"
        );
        summary
    }
}
