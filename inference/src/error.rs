use gen3d_blobstore::BlobError;
use gen3d_models::{ModelError, ModelName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attached to every failure caused by a model that did not load.
pub const DEPLOYMENT_NOTE: &str = "Model loading failed during container startup. \
     This is a deployment error, not a problem with the request.";

/// Coarse classification of a task failure, reported to callers so they can
/// tell a broken deployment from a bad request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required model is not loaded; retrying will not help.
    Deployment,
    /// The request itself is malformed or refers to unusable inputs.
    Input,
    /// Storage failed; the same request may succeed later.
    Transient,
    /// A model or encoding step failed unexpectedly.
    Internal,
}

/// Errors that fail a task.
///
/// The `Display` text is returned verbatim to the caller in the result's
/// `error` field.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{model} model not loaded: {reason}. Check container logs for model loading errors.")]
    ModelUnavailable { model: ModelName, reason: String },

    #[error("Missing task. Valid tasks: 'get_embedding', 'generate_3d'")]
    MissingTask,

    #[error("Unknown task: {0}. Valid tasks: 'get_embedding', 'generate_3d'")]
    UnknownTask(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("empty mask: no pixel of {key} is above the selection threshold")]
    EmptyMask { key: String },

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("cannot decode {what} {key}: {source}")]
    ImageDecode {
        what: &'static str,
        key: String,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Storage(#[from] BlobError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("cannot encode result: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::ModelUnavailable { .. } => ErrorKind::Deployment,
            TaskError::MissingTask
            | TaskError::UnknownTask(_)
            | TaskError::InvalidRequest(_)
            | TaskError::EmptyMask { .. }
            | TaskError::UnsupportedContentType(_)
            | TaskError::ImageDecode { .. } => ErrorKind::Input,
            TaskError::Storage(_) => ErrorKind::Transient,
            TaskError::Model(_) | TaskError::Encoding(_) | TaskError::Panicked(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Operator note for deployment errors.
    pub fn note(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Deployment => Some(DEPLOYMENT_NOTE),
            _ => None,
        }
    }
}
