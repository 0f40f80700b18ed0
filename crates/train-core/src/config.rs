//! Training configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::Level;

use crate::device::DeviceKind;
use crate::{Epoch, Error, MonitorMode, Result};

/// Main training configuration, loaded from a YAML or JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Run name used in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Architecture identifier recorded when the step does not report one
    #[serde(default)]
    pub arch: Option<String>,

    /// Last epoch to run (inclusive)
    pub epochs: Epoch,

    /// Checkpoint cadence in epochs
    pub save_period: Epoch,

    /// `[mode, metric_name]`
    pub monitor: MonitorSpec,

    /// Maximum epochs without improvement before stopping
    #[serde(default)]
    pub early_stop: Option<u64>,

    /// First epoch to run
    #[serde(default = "default_start_epoch")]
    pub start_epoch: Epoch,

    /// 0 = warn, 1 = info, 2 = debug
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,

    /// Checkpoint directory
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,

    /// Requested compute device (auto-detected when absent)
    #[serde(default)]
    pub device: Option<DeviceKind>,

    /// Class-folder dataset settings
    #[serde(default)]
    pub data: Option<DataConfig>,

    /// External per-epoch step program
    #[serde(default)]
    pub step: Option<StepConfig>,

    /// Checkpoint storage settings
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Async runtime settings
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

fn default_name() -> String {
    "train".to_string()
}

fn default_start_epoch() -> Epoch {
    1
}

fn default_verbosity() -> u8 {
    2
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("saved/models")
}

/// Monitor setting as written in the config file: `[mode, metric_name]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSpec(pub String, pub String);

impl MonitorSpec {
    pub fn new(mode: MonitorMode, metric: impl Into<String>) -> Self {
        Self(mode.as_str().to_string(), metric.into())
    }

    /// Parsed monitor mode
    pub fn mode(&self) -> Result<MonitorMode> {
        self.0.parse()
    }

    pub fn metric(&self) -> &str {
        &self.1
    }
}

/// Class-folder dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root directory with one sub-directory per class
    pub data_dir: PathBuf,

    /// Fraction of samples held out for validation
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,

    /// Seed for the train/validation split
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Image file extensions to index
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_validation_split() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_extensions() -> Vec<String> {
    vec!["png".to_string()]
}

/// External program that performs one epoch of optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Executable to run once per epoch
    pub program: String,

    /// Arguments; `{epoch}` is replaced by the epoch number
    #[serde(default)]
    pub args: Vec<String>,

    /// File the program writes model weights to
    pub model_state: PathBuf,

    /// File the program writes optimizer state to
    #[serde(default)]
    pub optimizer_state: Option<PathBuf>,

    /// Working directory for the program
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Checkpoint storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Number of epoch checkpoints to keep (all when absent)
    #[serde(default)]
    pub keep_count: Option<usize>,

    /// Append per-epoch metrics to `metrics.csv` in the save directory
    #[serde(default = "default_metrics_log")]
    pub metrics_log: bool,
}

fn default_metrics_log() -> bool {
    true
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            keep_count: None,
            metrics_log: default_metrics_log(),
        }
    }
}

/// Async runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Number of Tokio worker threads for storage I/O
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,
}

fn default_io_threads() -> usize {
    2
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            io_threads: default_io_threads(),
        }
    }
}

impl TrainingConfig {
    /// Minimal configuration for the given run length and monitor
    pub fn new(epochs: Epoch, save_period: Epoch, monitor: MonitorSpec) -> Self {
        Self {
            name: default_name(),
            arch: None,
            epochs,
            save_period,
            monitor,
            early_stop: None,
            start_epoch: default_start_epoch(),
            verbosity: default_verbosity(),
            save_dir: default_save_dir(),
            device: None,
            data: None,
            step: None,
            checkpoint: CheckpointConfig::default(),
            runtime: RuntimeSettings::default(),
        }
    }

    /// Load a configuration file; the format is chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("cannot read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            _ => Err(Error::invalid_config(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check every field that has a constrained range
    pub fn validate(&self) -> Result<()> {
        self.monitor.mode()?;

        if self.monitor.metric().is_empty() {
            return Err(Error::invalid_config("monitor metric name is empty"));
        }
        if self.epochs == 0 {
            return Err(Error::invalid_config("epochs must be positive"));
        }
        if self.save_period == 0 {
            return Err(Error::invalid_config("save_period must be positive"));
        }
        if self.start_epoch == 0 {
            return Err(Error::invalid_config("start_epoch must be at least 1"));
        }
        if self.early_stop == Some(0) {
            return Err(Error::invalid_config("early_stop must be positive when set"));
        }
        if self.verbosity > 2 {
            return Err(Error::invalid_config(format!(
                "verbosity option {} is invalid, valid options are 0, 1, 2",
                self.verbosity
            )));
        }
        if let Some(data) = &self.data {
            if !(data.validation_split > 0.0 && data.validation_split < 1.0) {
                return Err(Error::invalid_config(format!(
                    "validation_split must be in (0, 1), got {}",
                    data.validation_split
                )));
            }
        }
        if self.checkpoint.keep_count == Some(0) {
            return Err(Error::invalid_config("keep_count must be positive when set"));
        }
        if self.runtime.io_threads == 0 {
            return Err(Error::invalid_config("io_threads must be positive"));
        }

        Ok(())
    }

    /// Log level for the configured verbosity
    pub fn log_level(&self) -> Level {
        match self.verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    }
}
