use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, TaskError};
use crate::request::Correlation;
use crate::stage::{EmbeddingOutput, ReconstructionOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
}

/// The response to one request. Absent fields are omitted from the JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    /// The task as named by the caller; absent when the request had none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub session_id: String,
    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_s3_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_size_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_size_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_points: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TaskResult {
    fn new(status: TaskStatus, task: Option<String>, corr: &Correlation) -> Self {
        Self {
            status,
            task,
            session_id: corr.session_id.clone(),
            user_id: corr.user_id.clone(),
            output_s3_key: None,
            embedding_size_mb: None,
            mesh_size_mb: None,
            num_points: None,
            quality: None,
            error: None,
            error_kind: None,
            note: None,
        }
    }

    pub fn embedding(corr: &Correlation, out: EmbeddingOutput) -> Self {
        Self {
            output_s3_key: Some(out.output_s3_key),
            embedding_size_mb: Some(out.embedding_size_mb),
            ..Self::new(TaskStatus::Success, Some("get_embedding".into()), corr)
        }
    }

    pub fn reconstruction(corr: &Correlation, out: ReconstructionOutput, quality: String) -> Self {
        Self {
            output_s3_key: Some(out.output_s3_key),
            mesh_size_mb: Some(out.mesh_size_mb),
            num_points: Some(out.num_points),
            quality: Some(quality),
            ..Self::new(TaskStatus::Success, Some("generate_3d".into()), corr)
        }
    }

    /// A failed result carrying the error text, its kind and, for deployment
    /// errors, the operator note.
    pub fn failed(
        task: Option<String>,
        corr: &Correlation,
        quality: Option<String>,
        err: &TaskError,
    ) -> Self {
        Self {
            quality,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            note: err.note().map(str::to_string),
            ..Self::new(TaskStatus::Failed, task, corr)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}
