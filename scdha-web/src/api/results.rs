//! Manifest lookup
//!
//! GET /results/:prefix returns the public view of one upload request: its
//! expected artifacts and run state. Server paths and failure details stay in
//! the sidecar file and the logs; a failed run reports the same error value
//! the upload response carried.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use scdha_common::manifest::{ManifestEntry, RunStatus};
use scdha_common::{ArtifactSet, ResultPrefix};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::analysis::UNKNOWN_ERROR;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Client-facing run state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PublicStatus {
    Running,
    Succeeded,
    Rejected { flag: Value },
    Failed { error: Value },
    Cancelled,
}

impl From<&RunStatus> for PublicStatus {
    fn from(status: &RunStatus) -> Self {
        match status {
            RunStatus::Running => PublicStatus::Running,
            RunStatus::Succeeded => PublicStatus::Succeeded,
            RunStatus::Rejected { flag } => PublicStatus::Rejected { flag: flag.clone() },
            RunStatus::Failed { .. } => PublicStatus::Failed {
                error: Value::String(UNKNOWN_ERROR.to_string()),
            },
            RunStatus::Cancelled => PublicStatus::Cancelled,
        }
    }
}

/// GET /results/:prefix response
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    pub prefix: ResultPrefix,
    pub request_id: Uuid,
    pub session: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether a metadata file was uploaded with the matrix
    pub with_metadata: bool,
    pub artifacts: ArtifactSet,
    pub status: PublicStatus,
}

impl From<ManifestEntry> for ResultSummary {
    fn from(entry: ManifestEntry) -> Self {
        Self {
            status: PublicStatus::from(&entry.status),
            with_metadata: entry.inputs.metadata.is_some(),
            prefix: entry.prefix,
            request_id: entry.request_id,
            session: entry.session,
            created_at: entry.created_at,
            finished_at: entry.finished_at,
            artifacts: entry.artifacts,
        }
    }
}

/// Build manifest routes
pub fn result_routes() -> Router<AppState> {
    Router::new().route("/results/:prefix", get(get_result))
}

/// GET /results/:prefix
pub async fn get_result(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<ResultSummary>> {
    let prefix = ResultPrefix::parse(&raw)
        .ok_or_else(|| ApiError::NotFound(format!("Rejected prefix: {:?}", raw)))?;

    state
        .manifest
        .get(&prefix)
        .await?
        .map(|entry| Json(ResultSummary::from(entry)))
        .ok_or_else(|| ApiError::NotFound(format!("No manifest entry for {}", prefix)))
}
