//! `get_embedding`: image -> encoder features -> `embeddings.json`.

use gen3d_blobstore::{BlobStore, sibling_key};
use gen3d_models::{FeatureTensor, ModelName, ModelRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{fetch_image, size_mb, unavailable};
use crate::error::TaskError;
use crate::request::EmbeddingTask;

/// File name of the stored embedding, next to the source image.
pub const EMBEDDING_FILE: &str = "embeddings.json";

pub const CONTENT_TYPE: &str = "application/json";

/// The stored form of an image embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingPackage {
    /// Little-endian f32 elements in row-major order, standard base64 in JSON.
    #[serde(with = "base64_bytes")]
    pub embedding: Vec<u8>,
    pub shape: Vec<usize>,
    pub dtype: String,
}

impl EmbeddingPackage {
    pub fn from_tensor(tensor: &FeatureTensor) -> Self {
        Self {
            embedding: tensor.to_le_bytes(),
            shape: tensor.shape().to_vec(),
            dtype: FeatureTensor::DTYPE.to_string(),
        }
    }

    /// Decodes the elements, `None` if the byte length is not a multiple of 4.
    pub fn values(&self) -> Option<Vec<f32>> {
        if self.embedding.len() % 4 != 0 {
            return None;
        }
        Some(
            self.embedding
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    pub output_s3_key: String,
    /// Raw tensor bytes in MiB, before base64.
    pub embedding_size_mb: f64,
}

/// Computes and stores the embedding of `task.image_s3_key`.
pub fn run(
    models: &ModelRegistry,
    store: &dyn BlobStore,
    bucket: &str,
    task: &EmbeddingTask,
) -> Result<EmbeddingOutput, TaskError> {
    let encoder = models
        .encoder()
        .ok_or_else(|| unavailable(models, ModelName::Encoder))?;

    let image = fetch_image(store, bucket, &task.image_s3_key, "image")?.to_rgb8();
    info!(width = image.width(), height = image.height(), "image loaded");

    let tensor = encoder.features(&image)?;
    if tensor.shape() != FeatureTensor::ENCODER_SHAPE {
        debug!(shape = ?tensor.shape(), expected = ?FeatureTensor::ENCODER_SHAPE, "unexpected embedding shape");
    }
    info!(shape = ?tensor.shape(), "embedding extracted");

    let package = EmbeddingPackage::from_tensor(&tensor);
    let raw_len = package.embedding.len();
    let body = serde_json::to_vec(&package)?;

    let key = sibling_key(&task.image_s3_key, EMBEDDING_FILE);
    info!("saving embedding to s3://{bucket}/{key}");
    store.put(bucket, &key, &body, CONTENT_TYPE)?;

    Ok(EmbeddingOutput {
        output_s3_key: key,
        embedding_size_mb: size_mb(raw_len),
    })
}
