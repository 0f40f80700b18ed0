//! Core type definitions for the training harness

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Training epoch counter (1-based)
pub type Epoch = u64;

/// Class name to label index, as produced by a class-folder dataset
pub type ClassToIdx = BTreeMap<String, usize>;

/// Metrics observed during one epoch, keyed by metric name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpochResult(HashMap<String, f64>);

impl EpochResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Metrics sorted by name, for stable log output
    pub fn sorted(&self) -> Vec<(&str, f64)> {
        let mut entries: Vec<_> = self.0.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for EpochResult {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Direction in which the monitored metric improves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Lower is better (losses)
    Min,

    /// Higher is better (accuracy, dice)
    Max,
}

impl MonitorMode {
    /// Sentinel best value before any epoch has been observed
    pub fn initial_best(self) -> f64 {
        match self {
            MonitorMode::Min => f64::INFINITY,
            MonitorMode::Max => f64::NEG_INFINITY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MonitorMode::Min => "min",
            MonitorMode::Max => "max",
        }
    }
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min" => Ok(MonitorMode::Min),
            "max" => Ok(MonitorMode::Max),
            other => Err(Error::invalid_config(format!(
                "monitor mode should be either 'min' or 'max', got '{}'",
                other
            ))),
        }
    }
}

/// Why a training run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// All configured epochs ran
    Completed,

    /// The monitored metric stopped improving for longer than `early_stop`
    EarlyStopped,

    /// An external interrupt was observed between epochs
    Interrupted,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationReason::Completed => "completed",
            TerminationReason::EarlyStopped => "early stopped",
            TerminationReason::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Opaque model and optimizer state handed over by the training step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelState {
    /// Architecture identifier
    pub arch: String,

    /// Serialized model weights
    pub model: Bytes,

    /// Serialized optimizer state
    pub optimizer: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_mode_parse() {
        assert_eq!("min".parse::<MonitorMode>().unwrap(), MonitorMode::Min);
        assert_eq!("max".parse::<MonitorMode>().unwrap(), MonitorMode::Max);

        let err = "off".parse::<MonitorMode>().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_initial_best() {
        assert_eq!(MonitorMode::Min.initial_best(), f64::INFINITY);
        assert_eq!(MonitorMode::Max.initial_best(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_epoch_result_json() {
        let result: EpochResult = serde_json::from_str(r#"{"val_loss": 0.5, "accuracy": 0.9}"#).unwrap();
        assert_eq!(result.get("val_loss"), Some(0.5));
        assert!(result.contains("accuracy"));
        assert!(!result.contains("loss"));
        assert_eq!(result.sorted()[0].0, "accuracy");
    }
}
