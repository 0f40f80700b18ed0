//! Train Core - Foundation for the chest X-ray training harness
//!
//! Provides configuration, error handling, shared types, device selection
//! and the async runtime used for checkpoint I/O.

pub mod config;
pub mod device;
pub mod error;
pub mod runtime;
pub mod types;

pub use config::{
    CheckpointConfig, DataConfig, MonitorSpec, RuntimeSettings, StepConfig, TrainingConfig,
};
pub use device::{select_device, ComputeBackend, DeviceBackend, DeviceKind, DeviceProbe};
pub use error::{Error, Result};
pub use runtime::{InterruptFlag, RuntimeManager};
pub use types::*;
