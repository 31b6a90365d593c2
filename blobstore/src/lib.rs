//! Blob store interface and implementations.
//!
//! The inference stages read their inputs from and write their outputs to an
//! object store addressed by `(bucket, key)`. This crate provides the trait
//! boundary plus two implementations: an in-memory store for tests and a
//! filesystem store that maps buckets to directories.

pub mod fs;
pub mod memory;

use std::fmt;
use thiserror::Error;

/// Errors that can occur in blob store operations.
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blobstore: s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("blobstore: invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("blobstore: storage error: {0}")]
    Storage(String),
}

/// Result type for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Bucket/key addressed blob storage.
///
/// Calls are blocking from the caller's point of view. Implementations must
/// be safe for concurrent use; two writers only contend when they target the
/// same key.
pub trait BlobStore: Send + Sync {
    /// Fetch the full contents of a blob.
    fn get(&self, bucket: &str, key: &str) -> BlobResult<Vec<u8>>;

    /// Store a blob, replacing any previous contents.
    fn put(&self, bucket: &str, key: &str, body: &[u8], content_type: &str) -> BlobResult<()>;
}

impl fmt::Debug for dyn BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobStore {{ ... }}")
    }
}

/// Returns the directory part of a key: everything before the last `/`.
///
/// A key without a separator lives at the bucket root and yields `""`.
pub fn key_dir(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..idx],
        None => "",
    }
}

/// Builds the key of a file stored next to `key`.
///
/// ```
/// use gen3d_blobstore::sibling_key;
///
/// assert_eq!(sibling_key("sess/img.png", "embeddings.json"), "sess/embeddings.json");
/// assert_eq!(sibling_key("img.png", "embeddings.json"), "embeddings.json");
/// ```
pub fn sibling_key(key: &str, file_name: &str) -> String {
    let dir = key_dir(key);
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}

// Re-export the implementations
pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
