//! `generate_3d`: image + mask -> point cloud -> `output_mesh.ply`.

use gen3d_blobstore::{BlobStore, sibling_key};
use gen3d_models::{Mask, ModelName, ModelRegistry};
use tracing::{info, warn};

use super::{fetch_image, size_mb, unavailable};
use crate::error::TaskError;
use crate::request::ReconstructionTask;

/// File name of the stored point cloud, next to the mask.
pub const MESH_FILE: &str = "output_mesh.ply";

pub const CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionOutput {
    pub output_s3_key: String,
    /// Encoded PLY size in MiB.
    pub mesh_size_mb: f64,
    pub num_points: usize,
}

/// Reconstructs the masked object and stores it as binary PLY.
pub fn run(
    models: &ModelRegistry,
    store: &dyn BlobStore,
    bucket: &str,
    task: &ReconstructionTask,
) -> Result<ReconstructionOutput, TaskError> {
    let reconstructor = models
        .reconstructor()
        .ok_or_else(|| unavailable(models, ModelName::Reconstructor))?;

    let image = fetch_image(store, bucket, &task.image_s3_key, "image")?.to_rgb8();
    let mask = Mask::from_image(&fetch_image(store, bucket, &task.mask_s3_key, "mask")?);

    if mask.is_empty() {
        return Err(TaskError::EmptyMask {
            key: task.mask_s3_key.clone(),
        });
    }
    if (mask.width(), mask.height()) != image.dimensions() {
        warn!(
            image = ?image.dimensions(),
            mask = ?(mask.width(), mask.height()),
            "mask and image sizes differ"
        );
    }
    info!(
        width = mask.width(),
        height = mask.height(),
        selected = mask.selected_count(),
        "mask loaded"
    );

    info!(quality = %task.quality, "running reconstruction");
    let cloud = reconstructor.reconstruct(&image, &mask, &task.quality)?;
    info!(points = cloud.len(), colors = cloud.has_colors(), "reconstruction complete");

    let body = gen3d_ply::encode(&cloud);
    let key = sibling_key(&task.mask_s3_key, MESH_FILE);
    info!("saving point cloud to s3://{bucket}/{key}");
    store.put(bucket, &key, &body, CONTENT_TYPE)?;

    Ok(ReconstructionOutput {
        output_s3_key: key,
        mesh_size_mb: size_mb(body.len()),
        num_points: cloud.len(),
    })
}
