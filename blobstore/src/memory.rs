//! In-memory blob store implementation for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{BlobError, BlobResult, BlobStore};

#[derive(Debug, Clone)]
struct Blob {
    body: Vec<u8>,
    content_type: String,
}

/// An in-memory blob store backed by a HashMap keyed on `(bucket, key)`.
///
/// Cloning shares the underlying data, so a test can hand one clone to the
/// code under test and inspect the other.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    data: Arc<Mutex<HashMap<(String, String), Blob>>>,
}

impl MemoryBlobStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the content type recorded by the last `put` of a blob.
    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        let data = self.data.lock().ok()?;
        data.get(&(bucket.to_string(), key.to_string()))
            .map(|blob| blob.content_type.clone())
    }

    /// Lists the keys stored in a bucket, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let Ok(data) = self.data.lock() else {
            return Vec::new();
        };
        let mut keys: Vec<String> = data
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, bucket: &str, key: &str) -> BlobResult<Vec<u8>> {
        let data = self
            .data
            .lock()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        data.get(&(bucket.to_string(), key.to_string()))
            .map(|blob| blob.body.clone())
            .ok_or_else(|| BlobError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn put(&self, bucket: &str, key: &str, body: &[u8], content_type: &str) -> BlobResult<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        data.insert(
            (bucket.to_string(), key.to_string()),
            Blob {
                body: body.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}
