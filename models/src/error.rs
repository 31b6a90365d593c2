use std::path::PathBuf;

use thiserror::Error;

use crate::registry::StartupPolicy;

/// Errors returned by model backends.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model: {0}")]
    Runtime(String),

    #[error("model: tensor shape {shape:?} needs {expected} values, got {got}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },

    #[error("model: mask is {width}x{height} but has {got} pixels")]
    MaskSize { width: u32, height: u32, got: usize },

    #[error("model: checkpoint {}: {reason}", .path.display())]
    Checkpoint { path: PathBuf, reason: String },

    #[error("model: device {0} unavailable")]
    DeviceUnavailable(String),
}

/// Why a model ended up unloaded at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadFailure {
    /// None of the backend sources for the model is registered; the
    /// deployment is missing the model package.
    #[error("no model backend available (tried {})", .tried.join(", "))]
    BackendMissing { tried: Vec<String> },

    /// The backend was found but building or preparing the model failed.
    #[error("backend {backend:?} failed during {step}: {message}")]
    Construction {
        backend: String,
        step: &'static str,
        message: String,
    },
}

/// Returned when the loaded models do not satisfy the startup policy.
#[derive(Debug, Error)]
#[error("startup policy {policy} not met: unloaded models: {}", .unloaded.join(", "))]
pub struct StartupError {
    pub policy: StartupPolicy,
    pub unloaded: Vec<String>,
}
