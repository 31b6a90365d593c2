//! Filesystem-backed blob store implementation.
//!
//! Each bucket is a directory under the store root and each key is a
//! relative path inside it, so `s3://bucket/sess/img.png` lives at
//! `<root>/bucket/sess/img.png`.

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::{BlobError, BlobResult, BlobStore};

/// A blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `root`. The directory is created on first write.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, bucket: &str, key: &str) -> BlobResult<PathBuf> {
        validate_segment(bucket)?;
        if key.is_empty() {
            return Err(BlobError::InvalidKey {
                key: key.to_string(),
                reason: "empty key",
            });
        }

        let mut path = self.root.join(bucket);
        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(BlobError::InvalidKey {
                        key: key.to_string(),
                        reason: "parent directory reference",
                    });
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(BlobError::InvalidKey {
                        key: key.to_string(),
                        reason: "absolute key",
                    });
                }
            }
        }
        Ok(path)
    }
}

fn validate_segment(bucket: &str) -> BlobResult<()> {
    if bucket.is_empty() || bucket == "." || bucket == ".." || bucket.contains(['/', '\\']) {
        return Err(BlobError::InvalidKey {
            key: bucket.to_string(),
            reason: "invalid bucket name",
        });
    }
    Ok(())
}

impl BlobStore for FsBlobStore {
    fn get(&self, bucket: &str, key: &str) -> BlobResult<Vec<u8>> {
        let path = self.blob_path(bucket, key)?;
        match std::fs::read(&path) {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(BlobError::Storage(format!("read {}: {e}", path.display()))),
        }
    }

    fn put(&self, bucket: &str, key: &str, body: &[u8], content_type: &str) -> BlobResult<()> {
        let path = self.blob_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BlobError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        std::fs::write(&path, body)
            .map_err(|e| BlobError::Storage(format!("write {}: {e}", path.display())))?;

        debug!(
            bucket,
            key,
            content_type,
            bytes = body.len(),
            "blob written"
        );
        Ok(())
    }
}
