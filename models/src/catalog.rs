//! Backend catalog: named factories that build model capabilities.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::capability::{ImageEncoder, Reconstructor};
use crate::device::Device;
use crate::error::ModelError;

/// Inputs handed to a backend factory.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Weights file found for the model, `None` to build without weights.
    pub checkpoint: Option<&'a Path>,
    /// Device the model will be moved to.
    pub device: Device,
}

/// Builds one kind of model capability.
pub trait ModelFactory<T: ?Sized>: Send + Sync {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<Box<T>, ModelError>;
}

/// Factory for [`ImageEncoder`] backends.
pub type EncoderFactory = dyn ModelFactory<dyn ImageEncoder>;

/// Factory for [`Reconstructor`] backends.
pub type ReconstructorFactory = dyn ModelFactory<dyn Reconstructor>;

/// The model backends compiled into or registered with a deployment.
///
/// Backend names are the source names listed in a
/// [`ModelPlan`](crate::ModelPlan); a name missing from the catalog means the
/// backend package is not installed.
#[derive(Default, Clone)]
pub struct BackendCatalog {
    encoders: HashMap<String, Arc<EncoderFactory>>,
    reconstructors: HashMap<String, Arc<ReconstructorFactory>>,
}

impl BackendCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an encoder backend under `name`, replacing any previous one.
    pub fn register_encoder<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: ModelFactory<dyn ImageEncoder> + 'static,
    {
        self.encoders.insert(name.into(), Arc::new(factory));
        self
    }

    /// Registers a reconstructor backend under `name`, replacing any previous one.
    pub fn register_reconstructor<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: ModelFactory<dyn Reconstructor> + 'static,
    {
        self.reconstructors.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn encoder(&self, name: &str) -> Option<Arc<EncoderFactory>> {
        self.encoders.get(name).cloned()
    }

    pub fn reconstructor(&self, name: &str) -> Option<Arc<ReconstructorFactory>> {
        self.reconstructors.get(name).cloned()
    }

    /// Registered encoder backend names, sorted.
    pub fn encoder_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.encoders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered reconstructor backend names, sorted.
    pub fn reconstructor_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.reconstructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty() && self.reconstructors.is_empty()
    }
}
