//! gen3d-worker - long-lived inference worker.
//!
//! Loads both models once, then serves tasks over HTTP until stopped.
//! The shipped binary registers no model backends and therefore runs with
//! both models unloaded; deployments that bundle backends call [`serve`]
//! with their own [`BackendCatalog`].

pub mod config;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use gen3d_blobstore::FsBlobStore;
use gen3d_inference::Dispatcher;
use gen3d_models::{BackendCatalog, LoadOptions, load};
use tracing::info;

pub use config::WorkerConfig;

/// Loads the models and checks them against the configured startup policy.
pub fn build_dispatcher(cfg: &WorkerConfig, catalog: &BackendCatalog) -> Result<Dispatcher> {
    let opts = LoadOptions {
        device: cfg.device,
        ..LoadOptions::default()
    };
    let models = load(&cfg.model_dir, catalog, &opts);
    models
        .enforce(cfg.startup_policy)
        .context("refusing to serve")?;

    let store = FsBlobStore::new(&cfg.storage.root);
    info!(
        root = %cfg.storage.root.display(),
        default_bucket = %cfg.storage.default_bucket,
        "blob store ready"
    );
    Ok(Dispatcher::new(Arc::new(models), Arc::new(store))
        .with_default_bucket(cfg.storage.default_bucket.clone()))
}

/// Loads the models and serves requests on `cfg.listen`.
pub async fn serve(cfg: WorkerConfig, catalog: BackendCatalog) -> Result<()> {
    let listen = cfg.listen.clone();
    let dispatcher = tokio::task::spawn_blocking(move || build_dispatcher(&cfg, &catalog))
        .await
        .context("model loading task failed")??;
    server::start_server(&listen, dispatcher).await
}
