//! Worker configuration file.
//!
//! ```yaml
//! listen: 0.0.0.0:8080
//! model_dir: $SM_MODEL_DIR
//! device: auto              # auto | cpu | cuda
//! startup_policy: serve_degraded
//! storage:
//!   root: /var/lib/gen3d/blobs
//!   default_bucket: gen3d-data-bucket
//! ```
//!
//! String values written as `$VAR` or `${VAR}` are read from the environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gen3d_inference::DEFAULT_BUCKET;
use gen3d_models::{DevicePreference, StartupPolicy};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_MODEL_DIR: &str = "/opt/ml/model";
pub const DEFAULT_BLOB_ROOT: &str = "./blobs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Address of the HTTP surface; `:8080` binds all interfaces.
    pub listen: String,
    /// Root directory holding the `sam3/` and `sam3d/` model subdirectories.
    pub model_dir: PathBuf,
    pub device: DevicePreference,
    pub startup_policy: StartupPolicy,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory under which each bucket is a subdirectory.
    pub root: PathBuf,
    /// Bucket used when a request names none.
    pub default_bucket: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            device: DevicePreference::default(),
            startup_policy: StartupPolicy::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_BLOB_ROOT),
            default_bucket: DEFAULT_BUCKET.to_string(),
        }
    }
}

impl WorkerConfig {
    /// Reads a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml(&data).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parses YAML, filling absent fields with defaults and expanding
    /// environment references.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let mut cfg: WorkerConfig = if data.trim().is_empty() {
            WorkerConfig::default()
        } else {
            serde_yaml::from_str(data)?
        };
        cfg.expand_env();
        Ok(cfg)
    }

    fn expand_env(&mut self) {
        self.listen = expand_env(&self.listen);
        self.model_dir = expand_env_path(&self.model_dir);
        self.storage.root = expand_env_path(&self.storage.root);
        self.storage.default_bucket = expand_env(&self.storage.default_bucket);
    }
}

/// Expands a whole-value `$VAR` / `${VAR}` reference; other strings are
/// returned unchanged. Unset variables expand to the empty string.
fn expand_env(s: &str) -> String {
    let Some(rest) = s.strip_prefix('$') else {
        return s.to_string();
    };
    let name = rest
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(rest);
    std::env::var(name).unwrap_or_default()
}

fn expand_env_path(p: &Path) -> PathBuf {
    match p.to_str() {
        Some(s) => PathBuf::from(expand_env(s)),
        None => p.to_path_buf(),
    }
}
