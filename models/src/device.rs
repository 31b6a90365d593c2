//! Compute device selection.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where model weights live and inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Cuda(usize),
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

impl Serialize for Device {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Configured device choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    /// Use the accelerator when one is visible, the CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl DevicePreference {
    /// Picks the device for this preference given what the host offers.
    pub fn resolve(self, probe: &AcceleratorProbe) -> Device {
        match self {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => Device::Cuda(0),
            DevicePreference::Auto if probe.available() => Device::Cuda(0),
            DevicePreference::Auto => Device::Cpu,
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DevicePreference::Auto => "auto",
            DevicePreference::Cpu => "cpu",
            DevicePreference::Cuda => "cuda",
        })
    }
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            other => Err(format!("unknown device {other:?} (expected auto, cpu or cuda)")),
        }
    }
}

/// What the host reports about NVIDIA accelerators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceleratorProbe {
    /// Accelerator names reported by the driver, one per device.
    pub devices: Vec<String>,
    /// A device node exists even if the driver listed nothing.
    pub device_node: bool,
    /// `CUDA_VISIBLE_DEVICES` hides every device.
    pub hidden: bool,
}

const NVIDIA_GPUS_DIR: &str = "/proc/driver/nvidia/gpus";
const NVIDIA_DEVICE_NODE: &str = "/dev/nvidia0";

impl AcceleratorProbe {
    /// Inspects the driver and environment of the current host.
    pub fn detect() -> Self {
        let devices = read_driver_devices(Path::new(NVIDIA_GPUS_DIR));
        let device_node = Path::new(NVIDIA_DEVICE_NODE).exists();
        let hidden = matches!(
            std::env::var("CUDA_VISIBLE_DEVICES").as_deref().map(str::trim),
            Ok("") | Ok("-1")
        );
        Self {
            devices,
            device_node,
            hidden,
        }
    }

    /// True when at least one accelerator is present and not hidden.
    pub fn available(&self) -> bool {
        !self.hidden && (!self.devices.is_empty() || self.device_node)
    }
}

/// Reads `Model:` lines from the driver's per-GPU information files.
fn read_driver_devices(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut gpus: Vec<_> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
    gpus.sort();

    gpus.iter()
        .map(|gpu| {
            std::fs::read_to_string(gpu.join("information"))
                .ok()
                .and_then(|info| {
                    info.lines()
                        .find_map(|line| line.strip_prefix("Model:"))
                        .map(|model| model.trim().to_string())
                })
                .unwrap_or_else(|| "unknown accelerator".to_string())
        })
        .collect()
}
