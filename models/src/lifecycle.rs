//! One-shot model loading at worker startup.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::capability::{ImageEncoder, ModelLifecycle, Reconstructor};
use crate::catalog::{BackendCatalog, BuildContext, ModelFactory};
use crate::checkpoint::{find_checkpoint, log_directory_tree};
use crate::device::{AcceleratorProbe, Device, DevicePreference};
use crate::error::{LoadFailure, ModelError};
use crate::panic_message;
use crate::registry::{ModelName, ModelRegistry, ModelSlot};

/// Depth of the model directory listing logged at startup.
const TREE_DEPTH: usize = 2;

/// How to find and build one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPlan {
    pub name: ModelName,
    /// Subdirectory of the model root holding this model's files.
    pub subdir: String,
    /// Backend source names, tried in order; the first registered one is used.
    pub sources: Vec<String>,
    /// Checkpoint filename globs, most specific first.
    pub patterns: Vec<String>,
}

impl ModelPlan {
    /// The image encoder: `sam3/`, preferring the `sam3` backend over
    /// `segment_anything`.
    pub fn encoder() -> Self {
        Self {
            name: ModelName::Encoder,
            subdir: "sam3".to_string(),
            sources: strings(&["sam3", "segment_anything"]),
            patterns: strings(&[
                "sam3.pt",
                "sam3_vit_h.pth",
                "model.safetensors",
                "*.pt",
                "*.pth",
            ]),
        }
    }

    /// The 3-D reconstructor: `sam3d/`, `sam3d` backend.
    pub fn reconstructor() -> Self {
        Self {
            name: ModelName::Reconstructor,
            subdir: "sam3d".to_string(),
            sources: strings(&["sam3d"]),
            patterns: strings(&["*.ckpt", "*.pt", "*.pth"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Options for [`load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub device: DevicePreference,
    pub encoder: ModelPlan,
    pub reconstructor: ModelPlan,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            device: DevicePreference::default(),
            encoder: ModelPlan::encoder(),
            reconstructor: ModelPlan::reconstructor(),
        }
    }
}

/// Loads both models from `model_dir` using the backends in `catalog`.
///
/// Never fails: each model is loaded independently and a model that cannot
/// be loaded is recorded as unloaded with the reason. Callers decide whether
/// the result is good enough via [`ModelRegistry::enforce`].
pub fn load(model_dir: &Path, catalog: &BackendCatalog, opts: &LoadOptions) -> ModelRegistry {
    info!(
        model_dir = %model_dir.display(),
        exists = model_dir.exists(),
        "loading models"
    );
    log_directory_tree(model_dir, TREE_DEPTH);

    let probe = AcceleratorProbe::detect();
    let device = opts.device.resolve(&probe);
    info!(
        preference = %opts.device,
        device = %device,
        accelerator_available = probe.available(),
        accelerators = ?probe.devices,
        "resolved device"
    );

    let encoder = load_one::<dyn ImageEncoder>(model_dir, &opts.encoder, device, |source| {
        catalog.encoder(source)
    });
    let reconstructor =
        load_one::<dyn Reconstructor>(model_dir, &opts.reconstructor, device, |source| {
            catalog.reconstructor(source)
        });

    let registry = ModelRegistry::new(device, encoder, reconstructor);
    info!(
        encoder_loaded = registry.is_loaded(ModelName::Encoder),
        reconstructor_loaded = registry.is_loaded(ModelName::Reconstructor),
        device = %device,
        "model loading finished"
    );
    if registry.loaded_count() == 0 {
        error!(
            model_dir = %model_dir.display(),
            "no model loaded; every request will fail until the deployment is fixed"
        );
    }
    registry
}

/// Resolves, locates, builds and prepares one model.
fn load_one<T>(
    model_dir: &Path,
    plan: &ModelPlan,
    device: Device,
    lookup: impl Fn(&str) -> Option<Arc<dyn ModelFactory<T>>>,
) -> ModelSlot<T>
where
    T: ?Sized + ModelLifecycle,
{
    let model = plan.name;

    info!(model = %model, step = "resolve", sources = ?plan.sources, "resolving backend");
    let Some((source, factory)) = plan
        .sources
        .iter()
        .find_map(|source| lookup(source.as_str()).map(|factory| (source.as_str(), factory)))
    else {
        let failure = LoadFailure::BackendMissing {
            tried: plan.sources.clone(),
        };
        error!(model = %model, error = %failure, "package missing");
        return ModelSlot::Unloaded(failure);
    };
    info!(model = %model, backend = source, "backend resolved");

    let dir = model_dir.join(&plan.subdir);
    info!(model = %model, step = "locate", dir = %dir.display(), "searching for checkpoint");
    if model == ModelName::Reconstructor {
        let checkpoints = dir.join("checkpoints");
        if checkpoints.is_dir() {
            log_directory_tree(&checkpoints, 1);
        }
    }
    let checkpoint = find_checkpoint(&dir, &plan.patterns);
    if checkpoint.is_none() {
        warn!(
            model = %model,
            dir = %dir.display(),
            patterns = ?plan.patterns,
            "no checkpoint found, building without weights"
        );
    }

    let ctx = BuildContext {
        checkpoint: checkpoint.as_ref().map(|c| c.path.as_path()),
        device,
    };

    info!(model = %model, step = "instantiate", backend = source, "building model");
    let built = guarded(|| {
        let mut instance = factory.build(&ctx).map_err(|e| ("build", e))?;
        instance.to_device(device).map_err(|e| ("to_device", e))?;
        instance.eval().map_err(|e| ("eval", e))?;
        Ok(instance)
    });

    match built {
        Ok(instance) => {
            info!(model = %model, backend = source, device = %device, "model loaded");
            ModelSlot::Loaded(instance)
        }
        Err((step, message)) => {
            let failure = LoadFailure::Construction {
                backend: source.to_string(),
                step,
                message,
            };
            error!(model = %model, error = %failure, "runtime error during construction");
            ModelSlot::Unloaded(failure)
        }
    }
}

/// Runs a construction step, turning panics into errors.
fn guarded<R>(
    f: impl FnOnce() -> Result<R, (&'static str, ModelError)>,
) -> Result<R, (&'static str, String)> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err((step, e))) => Err((step, e.to_string())),
        Err(payload) => Err(("build", format!("panic: {}", panic_message(&*payload)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{FeatureTensor, Mask};
    use gen3d_ply::PointCloud;
    use image::RgbImage;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records what the factory saw.
    #[derive(Default)]
    struct Seen {
        checkpoint: Mutex<Option<Option<PathBuf>>>,
    }

    struct TestEncoder {
        evaluated: bool,
        device: Option<Device>,
    }

    impl ModelLifecycle for TestEncoder {
        fn to_device(&mut self, device: Device) -> Result<(), ModelError> {
            self.device = Some(device);
            Ok(())
        }

        fn eval(&mut self) -> Result<(), ModelError> {
            self.evaluated = true;
            Ok(())
        }
    }

    impl ImageEncoder for TestEncoder {
        fn features(&self, _image: &RgbImage) -> Result<FeatureTensor, ModelError> {
            if !self.evaluated || self.device.is_none() {
                return Err(ModelError::Runtime("not prepared".into()));
            }
            FeatureTensor::new(vec![1], vec![1.0])
        }
    }

    struct EncoderFactory(Arc<Seen>);

    impl ModelFactory<dyn ImageEncoder> for EncoderFactory {
        fn build(&self, ctx: &BuildContext<'_>) -> Result<Box<dyn ImageEncoder>, ModelError> {
            *self.0.checkpoint.lock().unwrap() = Some(ctx.checkpoint.map(Path::to_path_buf));
            Ok(Box::new(TestEncoder {
                evaluated: false,
                device: None,
            }))
        }
    }

    struct TestReconstructor;

    impl ModelLifecycle for TestReconstructor {}

    impl Reconstructor for TestReconstructor {
        fn reconstruct(
            &self,
            _image: &RgbImage,
            _mask: &Mask,
            _quality: &str,
        ) -> Result<PointCloud, ModelError> {
            Ok(PointCloud::from_points(vec![[0.0; 3]]))
        }
    }

    struct ReconstructorFactory;

    impl ModelFactory<dyn Reconstructor> for ReconstructorFactory {
        fn build(&self, _ctx: &BuildContext<'_>) -> Result<Box<dyn Reconstructor>, ModelError> {
            Ok(Box::new(TestReconstructor))
        }
    }

    struct PanickingFactory;

    impl ModelFactory<dyn Reconstructor> for PanickingFactory {
        fn build(&self, _ctx: &BuildContext<'_>) -> Result<Box<dyn Reconstructor>, ModelError> {
            panic!("CUDA out of memory");
        }
    }

    struct FailingFactory;

    impl ModelFactory<dyn ImageEncoder> for FailingFactory {
        fn build(&self, ctx: &BuildContext<'_>) -> Result<Box<dyn ImageEncoder>, ModelError> {
            Err(ModelError::Checkpoint {
                path: ctx.checkpoint.map(Path::to_path_buf).unwrap_or_default(),
                reason: "truncated".into(),
            })
        }
    }

    struct BadDevice;

    impl ModelLifecycle for BadDevice {
        fn to_device(&mut self, device: Device) -> Result<(), ModelError> {
            Err(ModelError::DeviceUnavailable(device.to_string()))
        }
    }

    impl Reconstructor for BadDevice {
        fn reconstruct(
            &self,
            _image: &RgbImage,
            _mask: &Mask,
            _quality: &str,
        ) -> Result<PointCloud, ModelError> {
            unreachable!()
        }
    }

    struct BadDeviceFactory;

    impl ModelFactory<dyn Reconstructor> for BadDeviceFactory {
        fn build(&self, _ctx: &BuildContext<'_>) -> Result<Box<dyn Reconstructor>, ModelError> {
            Ok(Box::new(BadDevice))
        }
    }

    fn cpu() -> LoadOptions {
        LoadOptions {
            device: DevicePreference::Cpu,
            ..LoadOptions::default()
        }
    }

    #[test]
    fn test_default_plans() {
        let opts = LoadOptions::default();
        assert_eq!(opts.encoder.subdir, "sam3");
        assert_eq!(opts.encoder.sources, vec!["sam3", "segment_anything"]);
        assert_eq!(opts.encoder.patterns[0], "sam3.pt");
        assert_eq!(opts.reconstructor.subdir, "sam3d");
        assert_eq!(opts.reconstructor.patterns, vec!["*.ckpt", "*.pt", "*.pth"]);
    }

    #[test]
    fn test_loads_both_models_with_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sam3")).unwrap();
        std::fs::write(dir.path().join("sam3/sam3.pt"), b"weights").unwrap();

        let seen = Arc::new(Seen::default());
        let mut catalog = BackendCatalog::new();
        catalog
            .register_encoder("sam3", EncoderFactory(seen.clone()))
            .register_reconstructor("sam3d", ReconstructorFactory);

        let registry = load(dir.path(), &catalog, &cpu());
        assert_eq!(registry.loaded_count(), 2);
        assert_eq!(registry.device(), Device::Cpu);
        assert_eq!(
            seen.checkpoint.lock().unwrap().clone(),
            Some(Some(dir.path().join("sam3/sam3.pt")))
        );

        // to_device and eval ran before the model was handed out
        let encoder = registry.encoder().unwrap();
        assert!(encoder.features(&RgbImage::new(1, 1)).is_ok());
    }

    #[test]
    fn test_missing_checkpoint_builds_without_weights() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Seen::default());
        let mut catalog = BackendCatalog::new();
        catalog.register_encoder("sam3", EncoderFactory(seen.clone()));

        let registry = load(dir.path(), &catalog, &cpu());
        assert!(registry.is_loaded(ModelName::Encoder));
        assert_eq!(seen.checkpoint.lock().unwrap().clone(), Some(None));
    }

    #[test]
    fn test_falls_back_to_second_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = BackendCatalog::new();
        catalog.register_encoder("segment_anything", EncoderFactory(Arc::default()));

        let registry = load(dir.path(), &catalog, &cpu());
        assert!(registry.is_loaded(ModelName::Encoder));
    }

    #[test]
    fn test_missing_backend_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let registry = load(dir.path(), &BackendCatalog::new(), &cpu());

        assert_eq!(registry.loaded_count(), 0);
        assert_eq!(
            registry.failure(ModelName::Encoder),
            Some(&LoadFailure::BackendMissing {
                tried: vec!["sam3".into(), "segment_anything".into()],
            })
        );
        assert!(registry.reconstructor().is_none());
    }

    #[test]
    fn test_panic_in_one_model_spares_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = BackendCatalog::new();
        catalog
            .register_encoder("sam3", EncoderFactory(Arc::default()))
            .register_reconstructor("sam3d", PanickingFactory);

        let registry = load(dir.path(), &catalog, &cpu());
        assert!(registry.is_loaded(ModelName::Encoder));
        match registry.failure(ModelName::Reconstructor) {
            Some(LoadFailure::Construction {
                backend,
                step,
                message,
            }) => {
                assert_eq!(backend, "sam3d");
                assert_eq!(*step, "build");
                assert!(message.contains("CUDA out of memory"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_build_error_spares_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = BackendCatalog::new();
        catalog
            .register_encoder("sam3", FailingFactory)
            .register_reconstructor("sam3d", ReconstructorFactory);

        let registry = load(dir.path(), &catalog, &cpu());
        assert!(registry.is_loaded(ModelName::Reconstructor));
        let failure = registry.failure(ModelName::Encoder).unwrap();
        assert!(failure.to_string().contains("truncated"));
    }

    #[test]
    fn test_device_move_failure_is_construction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = BackendCatalog::new();
        catalog.register_reconstructor("sam3d", BadDeviceFactory);

        let registry = load(dir.path(), &catalog, &cpu());
        assert!(matches!(
            registry.failure(ModelName::Reconstructor),
            Some(LoadFailure::Construction { step: "to_device", .. })
        ));
    }
}
