//! Compute device selection
//!
//! The controller never looks at devices. The selected backend is handed to
//! the training step, which decides how to use it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::Error;

/// Environment variable carrying the selected device name to the step program
pub const DEVICE_ENV: &str = "TRAINER_DEVICE";

/// Supported compute devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Cuda,
    /// Habana Gaudi
    Hpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "cuda",
            DeviceKind::Hpu => "hpu",
        };
        f.write_str(s)
    }
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceKind::Cpu),
            "cuda" | "gpu" => Ok(DeviceKind::Cuda),
            "hpu" => Ok(DeviceKind::Hpu),
            other => Err(Error::invalid_config(format!("unknown device '{}'", other))),
        }
    }
}

/// Reports which accelerators are present on this host
pub trait DeviceProbe {
    fn cuda_available(&self) -> bool;
    fn hpu_available(&self) -> bool;
}

/// Probe that looks for accelerator device nodes
#[derive(Debug, Clone, Default)]
pub struct SystemProbe;

impl DeviceProbe for SystemProbe {
    fn cuda_available(&self) -> bool {
        Path::new("/dev/nvidiactl").exists() || Path::new("/dev/nvidia0").exists()
    }

    fn hpu_available(&self) -> bool {
        Path::new("/dev/hl0").exists() || Path::new("/dev/accel/accel0").exists()
    }
}

/// Resolve the device to use from the requested one and what the host offers
pub fn select_device(requested: Option<DeviceKind>, probe: &dyn DeviceProbe) -> DeviceKind {
    let fallback = || {
        if probe.cuda_available() {
            DeviceKind::Cuda
        } else {
            info!("No accelerator found, defaulting to using the CPU");
            DeviceKind::Cpu
        }
    };

    let device = match requested {
        None => fallback(),
        Some(DeviceKind::Hpu) if probe.hpu_available() => DeviceKind::Hpu,
        Some(DeviceKind::Hpu) => {
            info!("HPU requested but not available");
            fallback()
        }
        Some(DeviceKind::Cuda) if probe.cuda_available() => DeviceKind::Cuda,
        Some(DeviceKind::Cuda) => {
            info!("CUDA requested but not available, defaulting to using the CPU");
            DeviceKind::Cpu
        }
        Some(DeviceKind::Cpu) => DeviceKind::Cpu,
    };

    info!(device = %device, "Using device");
    device
}

/// Device capability injected into the training step
pub trait ComputeBackend: Send + Sync {
    fn device(&self) -> DeviceKind;

    /// Environment the step process needs to target this device
    fn env(&self) -> Vec<(String, String)>;
}

/// Backend for a single selected device
#[derive(Debug, Clone, Copy)]
pub struct DeviceBackend {
    kind: DeviceKind,
}

impl DeviceBackend {
    pub fn new(kind: DeviceKind) -> Self {
        Self { kind }
    }

    /// Select a device with the system probe
    pub fn detect(requested: Option<DeviceKind>) -> Self {
        Self::new(select_device(requested, &SystemProbe))
    }
}

impl ComputeBackend for DeviceBackend {
    fn device(&self) -> DeviceKind {
        self.kind
    }

    fn env(&self) -> Vec<(String, String)> {
        let mut env = vec![(DEVICE_ENV.to_string(), self.kind.to_string())];
        if self.kind == DeviceKind::Cpu {
            env.push(("CUDA_VISIBLE_DEVICES".to_string(), "-1".to_string()));
        }
        env
    }
}
