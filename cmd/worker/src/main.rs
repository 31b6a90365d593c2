//! gen3d-worker - serves image embedding and 3-D reconstruction tasks.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gen3d_models::{BackendCatalog, DevicePreference, StartupPolicy};
use gen3d_worker::WorkerConfig;
use tracing_subscriber::EnvFilter;

/// Serves image embedding and 3-D reconstruction tasks.
#[derive(Parser, Debug)]
#[command(name = "gen3d-worker")]
#[command(about = "Serves image embedding and 3-D reconstruction tasks")]
struct Args {
    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (e.g. :8080)
    #[arg(long)]
    listen: Option<String>,

    /// Model root containing sam3/ and sam3d/
    #[arg(long, env = "SM_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Blob store root directory
    #[arg(long)]
    blob_root: Option<PathBuf>,

    /// Default bucket for requests without one
    #[arg(long)]
    bucket: Option<String>,

    /// Compute device: auto, cpu or cuda
    #[arg(long)]
    device: Option<DevicePreference>,

    /// serve_degraded, require_any or require_all
    #[arg(long)]
    startup_policy: Option<StartupPolicy>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Applies command-line overrides on top of the config file.
    fn apply(&self, cfg: &mut WorkerConfig) {
        if let Some(listen) = &self.listen {
            cfg.listen = listen.clone();
        }
        if let Some(dir) = &self.model_dir {
            cfg.model_dir = dir.clone();
        }
        if let Some(root) = &self.blob_root {
            cfg.storage.root = root.clone();
        }
        if let Some(bucket) = &self.bucket {
            cfg.storage.default_bucket = bucket.clone();
        }
        if let Some(device) = self.device {
            cfg.device = device;
        }
        if let Some(policy) = self.startup_policy {
            cfg.startup_policy = policy;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut cfg = match &args.config {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    args.apply(&mut cfg);

    gen3d_worker::serve(cfg, BackendCatalog::new()).await
}
