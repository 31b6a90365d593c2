//! The two processing stages.

pub mod embedding;
pub mod reconstruction;

pub use embedding::{EmbeddingOutput, EmbeddingPackage};
pub use reconstruction::ReconstructionOutput;

use gen3d_blobstore::BlobStore;
use gen3d_models::{ModelName, ModelRegistry};
use image::DynamicImage;
use tracing::info;

use crate::error::TaskError;

const MB: f64 = 1024.0 * 1024.0;

pub(crate) fn size_mb(len: usize) -> f64 {
    len as f64 / MB
}

/// The error returned when a stage's model did not load at startup.
pub(crate) fn unavailable(models: &ModelRegistry, model: ModelName) -> TaskError {
    let reason = models
        .failure(model)
        .map(|f| f.to_string())
        .unwrap_or_else(|| "not loaded".to_string());
    TaskError::ModelUnavailable { model, reason }
}

/// Downloads and decodes an image; `what` names it in errors.
pub(crate) fn fetch_image(
    store: &dyn BlobStore,
    bucket: &str,
    key: &str,
    what: &'static str,
) -> Result<DynamicImage, TaskError> {
    info!("downloading {what} from s3://{bucket}/{key}");
    let bytes = store.get(bucket, key)?;
    image::load_from_memory(&bytes).map_err(|source| TaskError::ImageDecode {
        what,
        key: key.to_string(),
        source,
    })
}
