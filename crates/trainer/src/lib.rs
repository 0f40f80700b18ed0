//! Training-loop controller for the chest X-ray training harness
//!
//! The controller runs epochs through an [`EpochStep`], tracks the monitored
//! metric, stops early when it plateaus and hands checkpoint records to a
//! [`CheckpointSink`] on every save-period boundary.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use checkpoint::CheckpointStore;
//! use storage::LocalStorage;
//! use train_core::{DeviceBackend, RuntimeManager, TrainingConfig};
//! use trainer::{CommandStep, StoreSink, TrainingLoopController};
//!
//! # fn example() -> train_core::Result<()> {
//! let config = TrainingConfig::from_file("config.yaml")?;
//! let runtime = RuntimeManager::new(config.runtime.io_threads)?;
//!
//! let backend = DeviceBackend::detect(config.device);
//! let step_config = config.step.clone().expect("step program");
//! let mut step = CommandStep::new(step_config, "resnet18", &backend);
//!
//! let storage = Arc::new(LocalStorage::new(&config.save_dir));
//! let store = Arc::new(runtime.block_on(CheckpointStore::open(storage, None))?);
//! let mut sink = StoreSink::new(&runtime, store);
//!
//! let summary = TrainingLoopController::new(&config)?.run(&mut step, &mut sink)?;
//! println!("{}", summary.reason);
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod controller;
pub mod epoch_log;
pub mod monitor;
pub mod policy;
pub mod sink;
pub mod step;

pub use controller::{TrainingLoopController, TrainingSummary};
pub use epoch_log::{CsvEpochLog, EpochObserver};
pub use monitor::{is_improvement, MetricTracker, MonitorState, Observation};
pub use policy::{should_checkpoint, CheckpointPolicy, EarlyStopPolicy};
pub use sink::{CheckpointSink, StoreSink};
pub use step::{CommandStep, EpochStep, EPOCH_ENV};
