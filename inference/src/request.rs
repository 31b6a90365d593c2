//! Task requests: the raw JSON envelope and its typed form.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;

/// A request as received: a JSON object with a `task` field and
/// task-specific parameters.
pub type RequestEnvelope = serde_json::Map<String, Value>;

/// Value of `session_id` / `user_id` when the caller sends none.
pub const UNKNOWN_ID: &str = "unknown";

/// Reconstruction quality preset used when the caller sends none.
pub const DEFAULT_QUALITY: &str = "balanced";

/// The two tasks the worker serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "get_embedding")]
    GetEmbedding,
    #[serde(rename = "generate_3d")]
    Generate3d,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::GetEmbedding => "get_embedding",
            TaskKind::Generate3d => "generate_3d",
        }
    }

    /// Reads the `task` field of an envelope.
    pub fn from_envelope(envelope: &RequestEnvelope) -> Result<Self, TaskError> {
        match envelope.get("task") {
            None | Some(Value::Null) => Err(TaskError::MissingTask),
            Some(Value::String(s)) => s.parse(),
            Some(other) => Err(TaskError::UnknownTask(other.to_string())),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get_embedding" => Ok(TaskKind::GetEmbedding),
            "generate_3d" => Ok(TaskKind::Generate3d),
            other => Err(TaskError::UnknownTask(other.to_string())),
        }
    }
}

/// Caller-supplied identifiers echoed in every result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub session_id: String,
    pub user_id: String,
}

impl Correlation {
    /// Extracts the identifiers without failing; absent values become `"unknown"`.
    pub fn from_envelope(envelope: &RequestEnvelope) -> Self {
        Self {
            session_id: id_field(envelope, "session_id"),
            user_id: id_field(envelope, "user_id"),
        }
    }
}

impl Default for Correlation {
    fn default() -> Self {
        Self {
            session_id: UNKNOWN_ID.to_string(),
            user_id: UNKNOWN_ID.to_string(),
        }
    }
}

fn id_field(envelope: &RequestEnvelope, name: &str) -> String {
    match envelope.get(name) {
        None | Some(Value::Null) => UNKNOWN_ID.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Parameters of `get_embedding`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmbeddingTask {
    pub image_s3_key: String,
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Parameters of `generate_3d`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconstructionTask {
    pub image_s3_key: String,
    pub mask_s3_key: String,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_quality")]
    pub quality: String,
}

fn default_quality() -> String {
    DEFAULT_QUALITY.to_string()
}

/// A fully parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRequest {
    GetEmbedding(EmbeddingTask),
    Generate3d(ReconstructionTask),
}

impl TaskRequest {
    /// Parses the task-specific fields of an envelope whose task is `kind`.
    pub fn parse(kind: TaskKind, envelope: &RequestEnvelope) -> Result<Self, TaskError> {
        match kind {
            TaskKind::GetEmbedding => {
                let task: EmbeddingTask = fields(kind, envelope)?;
                non_empty("image_s3_key", &task.image_s3_key)?;
                Ok(TaskRequest::GetEmbedding(task))
            }
            TaskKind::Generate3d => {
                let task: ReconstructionTask = fields(kind, envelope)?;
                non_empty("image_s3_key", &task.image_s3_key)?;
                non_empty("mask_s3_key", &task.mask_s3_key)?;
                Ok(TaskRequest::Generate3d(task))
            }
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            TaskRequest::GetEmbedding(_) => TaskKind::GetEmbedding,
            TaskRequest::Generate3d(_) => TaskKind::Generate3d,
        }
    }
}

/// Quality preset requested for a reconstruction, readable even when the
/// rest of the request is invalid.
pub fn requested_quality(envelope: &RequestEnvelope) -> String {
    envelope
        .get("quality")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_QUALITY)
        .to_string()
}

fn fields<T: DeserializeOwned>(kind: TaskKind, envelope: &RequestEnvelope) -> Result<T, TaskError> {
    serde_json::from_value(Value::Object(envelope.clone()))
        .map_err(|e| TaskError::InvalidRequest(format!("{kind}: {e}")))
}

fn non_empty(field: &str, value: &str) -> Result<(), TaskError> {
    if value.is_empty() {
        return Err(TaskError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(())
}
