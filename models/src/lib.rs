//! Model capabilities and their startup lifecycle.
//!
//! # Architecture
//!
//! The worker serves two models:
//!
//! 1. [`ImageEncoder`]: RGB image -> [`FeatureTensor`] (`[1, 256, 64, 64]`)
//! 2. [`Reconstructor`]: RGB image + [`Mask`] + quality preset -> point cloud
//!
//! Both are opaque capability objects built by backend factories that a
//! deployment registers in a [`BackendCatalog`]. [`load`] runs once at
//! startup and produces a [`ModelRegistry`] in which each model is either
//! loaded or explicitly unloaded; one model failing never prevents the
//! other from loading.
//!
//! # Checkpoint Discovery
//!
//! Each model lives under a fixed subdirectory of the model root. An ordered
//! list of filename globs is tried against that subdirectory recursively:
//!
//! ```text
//! sam3/                     encoder patterns, most specific first
//!   sam3.pt                 1. sam3.pt
//!   weights/extra.pt        2. sam3_vit_h.pth
//!                           3. model.safetensors
//!                           4. *.pt
//!                           5. *.pth
//! ```
//!
//! The first pattern with any match wins and the largest matching file is
//! selected. No match is not fatal: the model is built without weights and a
//! warning is logged.

mod capability;
mod catalog;
pub mod checkpoint;
mod device;
mod error;
mod lifecycle;
mod registry;

pub use capability::{FeatureTensor, ImageEncoder, MASK_THRESHOLD, Mask, ModelLifecycle, Reconstructor};
pub use catalog::{BackendCatalog, BuildContext, EncoderFactory, ModelFactory, ReconstructorFactory};
pub use checkpoint::{CheckpointCandidate, find_checkpoint};
pub use device::{AcceleratorProbe, Device, DevicePreference};
pub use error::{LoadFailure, ModelError, StartupError};
pub use lifecycle::{LoadOptions, ModelPlan, load};
pub use registry::{ModelName, ModelRegistry, ModelSlot, ModelStatus, StartupPolicy};

/// Renders a panic payload caught with `catch_unwind` as a message.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
