use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::capability::{ImageEncoder, Reconstructor};
use crate::device::Device;
use crate::error::{LoadFailure, StartupError};

/// The two models served by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelName {
    Encoder,
    Reconstructor,
}

impl ModelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::Encoder => "encoder",
            ModelName::Reconstructor => "reconstructor",
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registry entry: a loaded model or the reason it is not loaded.
pub enum ModelSlot<T: ?Sized> {
    Loaded(Box<T>),
    Unloaded(LoadFailure),
}

impl<T: ?Sized> ModelSlot<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            ModelSlot::Loaded(model) => Some(model.as_ref()),
            ModelSlot::Unloaded(_) => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelSlot::Loaded(_))
    }

    pub fn failure(&self) -> Option<&LoadFailure> {
        match self {
            ModelSlot::Loaded(_) => None,
            ModelSlot::Unloaded(failure) => Some(failure),
        }
    }
}

impl<T: ?Sized> fmt::Debug for ModelSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSlot::Loaded(_) => f.write_str("Loaded"),
            ModelSlot::Unloaded(failure) => f.debug_tuple("Unloaded").field(failure).finish(),
        }
    }
}

/// Load state of one model, as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub name: ModelName,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The models loaded at startup and the device they run on.
///
/// Built once by [`load`](crate::load) and never modified afterwards: an
/// unloaded model stays unloaded until the process restarts. Share it
/// read-only (e.g. behind an `Arc`) across request handlers.
#[derive(Debug)]
pub struct ModelRegistry {
    device: Device,
    encoder: ModelSlot<dyn ImageEncoder>,
    reconstructor: ModelSlot<dyn Reconstructor>,
}

impl ModelRegistry {
    pub fn new(
        device: Device,
        encoder: ModelSlot<dyn ImageEncoder>,
        reconstructor: ModelSlot<dyn Reconstructor>,
    ) -> Self {
        Self {
            device,
            encoder,
            reconstructor,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// The encoder, if it loaded.
    pub fn encoder(&self) -> Option<&dyn ImageEncoder> {
        self.encoder.get()
    }

    /// The reconstructor, if it loaded.
    pub fn reconstructor(&self) -> Option<&dyn Reconstructor> {
        self.reconstructor.get()
    }

    pub fn is_loaded(&self, name: ModelName) -> bool {
        match name {
            ModelName::Encoder => self.encoder.is_loaded(),
            ModelName::Reconstructor => self.reconstructor.is_loaded(),
        }
    }

    /// Why a model is unloaded, `None` when it is loaded.
    pub fn failure(&self, name: ModelName) -> Option<&LoadFailure> {
        match name {
            ModelName::Encoder => self.encoder.failure(),
            ModelName::Reconstructor => self.reconstructor.failure(),
        }
    }

    /// Load state of every model, encoder first.
    pub fn status(&self) -> Vec<ModelStatus> {
        [ModelName::Encoder, ModelName::Reconstructor]
            .into_iter()
            .map(|name| ModelStatus {
                name,
                loaded: self.is_loaded(name),
                reason: self.failure(name).map(|f| f.to_string()),
            })
            .collect()
    }

    /// Number of models that loaded.
    pub fn loaded_count(&self) -> usize {
        usize::from(self.encoder.is_loaded()) + usize::from(self.reconstructor.is_loaded())
    }

    /// Checks the registry against the startup policy.
    pub fn enforce(&self, policy: StartupPolicy) -> Result<(), StartupError> {
        let met = match policy {
            StartupPolicy::ServeDegraded => true,
            StartupPolicy::RequireAny => self.loaded_count() > 0,
            StartupPolicy::RequireAll => self.loaded_count() == 2,
        };
        if met {
            return Ok(());
        }
        Err(StartupError {
            policy,
            unloaded: self
                .status()
                .into_iter()
                .filter(|s| !s.loaded)
                .map(|s| s.name.to_string())
                .collect(),
        })
    }
}

/// What the worker requires of the registry before it starts serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPolicy {
    /// Serve whatever loaded; requests for an unloaded model fail explicitly.
    #[default]
    ServeDegraded,
    /// Refuse to serve when no model loaded.
    RequireAny,
    /// Refuse to serve unless both models loaded.
    RequireAll,
}

impl fmt::Display for StartupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StartupPolicy::ServeDegraded => "serve_degraded",
            StartupPolicy::RequireAny => "require_any",
            StartupPolicy::RequireAll => "require_all",
        })
    }
}

impl FromStr for StartupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "serve_degraded" => Ok(StartupPolicy::ServeDegraded),
            "require_any" => Ok(StartupPolicy::RequireAny),
            "require_all" => Ok(StartupPolicy::RequireAll),
            other => Err(format!(
                "unknown startup policy {other:?} (expected serve_degraded, require_any or require_all)"
            )),
        }
    }
}
