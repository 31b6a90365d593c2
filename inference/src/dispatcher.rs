use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use gen3d_blobstore::BlobStore;
use gen3d_models::{ModelRegistry, panic_message};
use tracing::{error, info, warn};

use crate::error::TaskError;
use crate::request::{
    Correlation, RequestEnvelope, TaskKind, TaskRequest, requested_quality,
};
use crate::result::TaskResult;
use crate::stage::{self, EmbeddingOutput, ReconstructionOutput};

/// Bucket used when a request names none.
pub const DEFAULT_BUCKET: &str = "gen3d-data-bucket";

enum Output {
    Embedding(EmbeddingOutput),
    Reconstruction(ReconstructionOutput, String),
}

/// Routes requests to the stage named by their `task` field.
///
/// Holds the startup model registry and the blob store; both are shared
/// read-only, so one dispatcher serves concurrent requests.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    models: Arc<ModelRegistry>,
    store: Arc<dyn BlobStore>,
    default_bucket: String,
}

impl Dispatcher {
    pub fn new(models: Arc<ModelRegistry>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            models,
            store,
            default_bucket: DEFAULT_BUCKET.to_string(),
        }
    }

    /// Sets the bucket used when a request has no `bucket` field.
    pub fn with_default_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.default_bucket = bucket.into();
        self
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    /// Handles one request. Never fails: every problem, including a panic
    /// inside a model, is reported as a failed [`TaskResult`].
    ///
    /// Task fields are validated before the model is looked up, so a
    /// malformed request against an unloaded model fails as an `input`
    /// error without a deployment note.
    pub fn dispatch(&self, envelope: &RequestEnvelope) -> TaskResult {
        let corr = Correlation::from_envelope(envelope);

        let kind = match TaskKind::from_envelope(envelope) {
            Ok(kind) => kind,
            Err(e) => {
                let raw = envelope
                    .get("task")
                    .filter(|t| !t.is_null())
                    .map(|t| match t.as_str() {
                        Some(s) => s.to_string(),
                        None => t.to_string(),
                    });
                warn!(
                    task = raw.as_deref().unwrap_or("<none>"),
                    session_id = %corr.session_id,
                    "rejecting request: {e}"
                );
                return TaskResult::failed(raw, &corr, None, &e);
            }
        };

        info!(
            task = %kind,
            session_id = %corr.session_id,
            user_id = %corr.user_id,
            keys = ?envelope.keys().collect::<Vec<_>>(),
            "routing request"
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| self.run(kind, envelope)))
            .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(&*payload))));

        match outcome {
            Ok(Output::Embedding(out)) => {
                info!(task = %kind, output = %out.output_s3_key, "task complete");
                TaskResult::embedding(&corr, out)
            }
            Ok(Output::Reconstruction(out, quality)) => {
                info!(
                    task = %kind,
                    output = %out.output_s3_key,
                    points = out.num_points,
                    "task complete"
                );
                TaskResult::reconstruction(&corr, out, quality)
            }
            Err(e) => {
                error!(
                    task = %kind,
                    session_id = %corr.session_id,
                    kind = ?e.kind(),
                    "task failed: {e}"
                );
                let quality = match kind {
                    TaskKind::GetEmbedding => None,
                    TaskKind::Generate3d => Some(requested_quality(envelope)),
                };
                TaskResult::failed(Some(kind.as_str().to_string()), &corr, quality, &e)
            }
        }
    }

    fn run(&self, kind: TaskKind, envelope: &RequestEnvelope) -> Result<Output, TaskError> {
        match TaskRequest::parse(kind, envelope)? {
            TaskRequest::GetEmbedding(task) => {
                let bucket = task.bucket.as_deref().unwrap_or(&self.default_bucket);
                stage::embedding::run(&self.models, self.store.as_ref(), bucket, &task)
                    .map(Output::Embedding)
            }
            TaskRequest::Generate3d(task) => {
                let bucket = task.bucket.as_deref().unwrap_or(&self.default_bucket);
                let out =
                    stage::reconstruction::run(&self.models, self.store.as_ref(), bucket, &task)?;
                Ok(Output::Reconstruction(out, task.quality))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DEPLOYMENT_NOTE, ErrorKind};
    use crate::result::TaskStatus;
    use crate::testing::{FakeEncoder, FakeReconstructor, gray_png, png, registry};
    use gen3d_blobstore::MemoryBlobStore;
    use gen3d_models::{
        Device, FeatureTensor, ImageEncoder, LoadFailure, ModelError, ModelLifecycle, ModelSlot,
    };
    use image::RgbImage;
    use serde_json::{Value, json};

    fn envelope(v: Value) -> RequestEnvelope {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn dispatcher(
        store: &MemoryBlobStore,
        encoder: Option<FakeEncoder>,
        reconstructor: Option<FakeReconstructor>,
    ) -> Dispatcher {
        Dispatcher::new(
            Arc::new(registry(encoder, reconstructor)),
            Arc::new(store.clone()),
        )
    }

    #[test]
    fn test_unknown_task_lists_valid_values() {
        let store = MemoryBlobStore::new();
        let d = dispatcher(&store, None, None);

        let result = d.dispatch(&envelope(json!({"task": "segment", "session_id": "s9"})));
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.task.as_deref(), Some("segment"));
        assert_eq!(result.session_id, "s9");
        assert_eq!(result.error_kind, Some(ErrorKind::Input));
        let error = result.error.unwrap();
        assert!(error.contains("'get_embedding'"));
        assert!(error.contains("'generate_3d'"));
    }

    #[test]
    fn test_missing_task() {
        let store = MemoryBlobStore::new();
        let d = dispatcher(&store, None, None);

        let result = d.dispatch(&envelope(json!({"task": null})));
        assert!(result.task.is_none());
        assert_eq!(result.user_id, "unknown");
        assert!(result.error.unwrap().contains("Valid tasks"));
    }

    #[test]
    fn test_missing_required_field_echoes_quality() {
        let store = MemoryBlobStore::new();
        let d = dispatcher(&store, None, Some(FakeReconstructor::new(1, false)));

        let result = d.dispatch(&envelope(json!({
            "task": "generate_3d",
            "image_s3_key": "s/img.png",
            "quality": "fast",
        })));
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.quality.as_deref(), Some("fast"));
        assert_eq!(result.error_kind, Some(ErrorKind::Input));
        assert!(result.error.unwrap().contains("mask_s3_key"));
    }

    #[test]
    fn test_malformed_request_fails_before_model_lookup() {
        let store = MemoryBlobStore::new();
        let d = dispatcher(&store, None, None);

        let result = d.dispatch(&envelope(json!({
            "task": "generate_3d",
            "image_s3_key": "s/img.png",
        })));
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.error_kind, Some(ErrorKind::Input));
        assert!(result.note.is_none());
        assert!(result.error.unwrap().contains("mask_s3_key"));
    }

    #[test]
    fn test_unloaded_models_always_fail_with_note() {
        let store = MemoryBlobStore::new();
        store
            .put(DEFAULT_BUCKET, "s/img.png", &png(2, 2, [1, 2, 3]), "image/png")
            .unwrap();
        store
            .put(DEFAULT_BUCKET, "s/mask.png", &gray_png(2, 2, 255), "image/png")
            .unwrap();
        let d = dispatcher(&store, None, None);

        for request in [
            json!({"task": "get_embedding", "image_s3_key": "s/img.png"}),
            json!({"task": "generate_3d", "image_s3_key": "s/img.png", "mask_s3_key": "s/mask.png"}),
        ] {
            let result = d.dispatch(&envelope(request));
            assert_eq!(result.status, TaskStatus::Failed);
            assert_eq!(result.note.as_deref(), Some(DEPLOYMENT_NOTE));
            assert_eq!(result.error_kind, Some(ErrorKind::Deployment));
            assert!(result.output_s3_key.is_none());
        }
        assert_eq!(store.keys(DEFAULT_BUCKET).len(), 2);
    }

    #[test]
    fn test_request_bucket_overrides_default() {
        let store = MemoryBlobStore::new();
        store
            .put("custom", "a/img.png", &png(2, 2, [9, 9, 9]), "image/png")
            .unwrap();
        let d = dispatcher(&store, Some(FakeEncoder::new(vec![1, 2])), None)
            .with_default_bucket("unused");
        assert_eq!(d.default_bucket(), "unused");

        let result = d.dispatch(&envelope(json!({
            "task": "get_embedding",
            "image_s3_key": "a/img.png",
            "bucket": "custom",
        })));
        assert!(result.is_success(), "{result:?}");
        assert!(store.get("custom", "a/embeddings.json").is_ok());
    }

    #[test]
    fn test_reconstruction_success_echoes_quality() {
        let store = MemoryBlobStore::new();
        store
            .put(DEFAULT_BUCKET, "s/img.png", &png(3, 3, [1, 2, 3]), "image/png")
            .unwrap();
        store
            .put(DEFAULT_BUCKET, "s/mask.png", &gray_png(3, 3, 200), "image/png")
            .unwrap();
        let d = dispatcher(&store, None, Some(FakeReconstructor::new(5, true)));

        let result = d.dispatch(&envelope(json!({
            "task": "generate_3d",
            "image_s3_key": "s/img.png",
            "mask_s3_key": "s/mask.png",
            "user_id": "u1",
        })));
        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.task.as_deref(), Some("generate_3d"));
        assert_eq!(result.quality.as_deref(), Some("balanced"));
        assert_eq!(result.num_points, Some(5));
        assert_eq!(result.user_id, "u1");
        assert_eq!(result.output_s3_key.as_deref(), Some("s/output_mesh.ply"));
    }

    struct PanickingEncoder;

    impl ModelLifecycle for PanickingEncoder {}

    impl ImageEncoder for PanickingEncoder {
        fn features(&self, _image: &RgbImage) -> Result<FeatureTensor, ModelError> {
            panic!("kernel launch failed");
        }
    }

    #[test]
    fn test_panic_in_model_becomes_failed_result() {
        let store = MemoryBlobStore::new();
        store
            .put(DEFAULT_BUCKET, "s/img.png", &png(2, 2, [0, 0, 0]), "image/png")
            .unwrap();
        let models = ModelRegistry::new(
            Device::Cpu,
            ModelSlot::Loaded(Box::new(PanickingEncoder)),
            ModelSlot::Unloaded(LoadFailure::BackendMissing { tried: vec![] }),
        );
        let d = Dispatcher::new(Arc::new(models), Arc::new(store.clone()));

        let result = d.dispatch(&envelope(json!({"task": "get_embedding", "image_s3_key": "s/img.png"})));
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.error_kind, Some(ErrorKind::Internal));
        assert!(result.error.unwrap().contains("kernel launch failed"));
    }
}
