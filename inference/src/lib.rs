//! Task dispatch for the image-to-3D worker.
//!
//! A request is a JSON object naming one of two tasks:
//!
//! | task            | reads                          | writes                          |
//! |-----------------|--------------------------------|---------------------------------|
//! | `get_embedding` | `image_s3_key`                 | `<dir of image>/embeddings.json`  |
//! | `generate_3d`   | `image_s3_key`, `mask_s3_key`  | `<dir of mask>/output_mesh.ply`   |
//!
//! [`Dispatcher::dispatch`] always answers with a [`TaskResult`]. Failures,
//! including a model that did not load at startup, come back as
//! `status: failed` with the error text and an [`ErrorKind`]; no result is
//! ever produced without running the model.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use gen3d_blobstore::MemoryBlobStore;
//! use gen3d_inference::{Dispatcher, hooks};
//! use gen3d_models::{BackendCatalog, LoadOptions, load};
//!
//! // No backends registered: both models stay unloaded.
//! let models = load(
//!     std::path::Path::new("/nonexistent/model"),
//!     &BackendCatalog::new(),
//!     &LoadOptions::default(),
//! );
//! let dispatcher = Dispatcher::new(Arc::new(models), Arc::new(MemoryBlobStore::new()));
//!
//! let request = hooks::deserialize(
//!     br#"{"task": "get_embedding", "image_s3_key": "sess/img.png"}"#,
//!     "application/json",
//! )
//! .unwrap();
//! let result = dispatcher.dispatch(&request);
//! assert!(!result.is_success());
//! assert!(result.note.is_some());
//! ```

mod dispatcher;
mod error;
pub mod hooks;
mod request;
mod result;
pub mod stage;

#[cfg(test)]
mod testing;

pub use dispatcher::{DEFAULT_BUCKET, Dispatcher};
pub use error::{DEPLOYMENT_NOTE, ErrorKind, TaskError};
pub use request::{
    Correlation, DEFAULT_QUALITY, EmbeddingTask, ReconstructionTask, RequestEnvelope, TaskKind,
    TaskRequest, UNKNOWN_ID,
};
pub use result::{TaskResult, TaskStatus};
