//! Upload handlers
//!
//! - POST /upload1: matrix file only
//! - POST /upload2: matrix and metadata files
//! - POST /upload3: reference to a pre-computed dataset, no upload
//!
//! Upload flow: derive the result prefix from the session cookie and the
//! current second, stream each file to `uploaded_files/`, record the request
//! in the manifest, run the analysis, answer with the artifact descriptor.
//!
//! Analysis failures answer 200 `{"error": ...}` unless
//! `analysis.strict_status` is set. A client that disconnects mid-run
//! cancels the run; its manifest entry ends as `cancelled`.

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use axum_extra::extract::CookieJar;
use scdha_common::manifest::{ArtifactManifest, InputFiles, ManifestEntry, RunStatus};
use scdha_common::{time, uuid_utils, ArtifactSet, ResultPrefix, SessionId};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::SESSION_COOKIE;
use crate::analysis::{AnalysisError, AnalysisJob};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Multipart field holding the expression matrix
pub const MATRIX_FIELD: &str = "fileMatrix";

/// Multipart field holding the cell metadata
pub const METADATA_FIELD: &str = "fileMetadata";

/// POST /upload3 request
#[derive(Debug, Deserialize)]
pub struct DatasetRequest {
    pub dataset_name: String,
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/upload1", post(upload_matrix))
        .route("/upload2", post(upload_matrix_and_metadata))
        .route("/upload3", post(select_dataset))
}

/// POST /upload1
pub async fn upload_matrix(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> ApiResult<Response> {
    upload_and_analyze(state, session_from(&jar), multipart, false).await
}

/// POST /upload2
pub async fn upload_matrix_and_metadata(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> ApiResult<Response> {
    upload_and_analyze(state, session_from(&jar), multipart, true).await
}

/// POST /upload3
///
/// Pure templating: the dataset is not checked for existence and no
/// analysis runs.
pub async fn select_dataset(
    jar: CookieJar,
    Json(request): Json<DatasetRequest>,
) -> ApiResult<Json<ArtifactSet>> {
    let prefix = ResultPrefix::from_dataset_name(&request.dataset_name)?;
    debug!(
        dataset = %prefix,
        session = %session_from(&jar),
        "Dataset reference requested"
    );
    Ok(Json(ArtifactSet::for_prefix(&prefix)))
}

fn session_from(jar: &CookieJar) -> SessionId {
    SessionId::from_cookie(jar.get(SESSION_COOKIE).map(|c| c.value()))
}

/// Files claimed for one upload request
struct UploadTarget {
    prefix: ResultPrefix,
    matrix_path: PathBuf,
    matrix_file: Option<File>,
    metadata_path: Option<PathBuf>,
}

impl UploadTarget {
    /// Remove whatever was written for a request that failed validation
    async fn discard(self) {
        drop(self.matrix_file);
        let mut paths = vec![self.matrix_path];
        paths.extend(self.metadata_path);
        for path in paths {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!(path = %path.display(), error = %e, "Could not remove partial upload");
            }
        }
    }
}

async fn upload_and_analyze(
    state: AppState,
    session: SessionId,
    mut multipart: Multipart,
    with_metadata: bool,
) -> ApiResult<Response> {
    let request_id = uuid_utils::generate();
    let stamp = time::stamp(&state.clock.now());
    let base = ResultPrefix::new(&session, &stamp);

    let (prefix, matrix_file) = state
        .layout
        .claim_matrix_file(base, &request_id, state.options.unique_prefixes)
        .await?;

    let mut target = UploadTarget {
        matrix_path: state.layout.matrix_path(&prefix),
        prefix,
        matrix_file: Some(matrix_file),
        metadata_path: None,
    };

    if let Err(e) = receive_files(&state, &mut target, &mut multipart, with_metadata).await {
        target.discard().await;
        return Err(e);
    }

    let prefix = target.prefix;
    info!(
        request_id = %request_id,
        prefix = %prefix,
        session = %session,
        with_metadata,
        "Upload stored"
    );

    let inputs = InputFiles {
        matrix: target.matrix_path.clone(),
        metadata: target.metadata_path.clone(),
    };
    state
        .manifest
        .record(ManifestEntry::new(
            prefix.clone(),
            request_id,
            session.as_option().map(str::to_string),
            inputs,
        ))
        .await?;

    let job = AnalysisJob {
        matrix: target.matrix_path,
        metadata: target.metadata_path,
        prefix: prefix.clone(),
    };
    let pending = PendingRun::new(state.manifest.clone(), prefix.clone());
    let outcome = state.invoker.invoke(job).await;
    pending.settle();

    let status = match &outcome {
        Ok(_) => RunStatus::Succeeded,
        Err(AnalysisError::Rejected(flag)) => RunStatus::Rejected { flag: flag.clone() },
        Err(e) => RunStatus::Failed {
            reason: e.to_string(),
        },
    };
    if let Err(e) = state.manifest.finish(&prefix, status).await {
        warn!(prefix = %prefix, error = %e, "Failed to update manifest");
    }

    Ok(analysis_response(outcome, state.options.strict_status))
}

/// Marks the manifest entry cancelled if the request is dropped mid-run
struct PendingRun {
    manifest: ArtifactManifest,
    prefix: Option<ResultPrefix>,
}

impl PendingRun {
    fn new(manifest: ArtifactManifest, prefix: ResultPrefix) -> Self {
        Self {
            manifest,
            prefix: Some(prefix),
        }
    }

    /// The run finished; the caller records the outcome
    fn settle(mut self) {
        self.prefix = None;
    }
}

impl Drop for PendingRun {
    fn drop(&mut self) {
        let Some(prefix) = self.prefix.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let manifest = self.manifest.clone();
        runtime.spawn(async move {
            info!(prefix = %prefix, "Client disconnected, analysis cancelled");
            if let Err(e) = manifest.finish(&prefix, RunStatus::Cancelled).await {
                warn!(prefix = %prefix, error = %e, "Failed to update manifest");
            }
        });
    }
}

/// Read every multipart field into the claimed files
async fn receive_files(
    state: &AppState,
    target: &mut UploadTarget,
    multipart: &mut Multipart,
    with_metadata: bool,
) -> ApiResult<()> {
    let mut matrix_bytes = None;
    let mut metadata_bytes = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            MATRIX_FIELD if matrix_bytes.is_none() => {
                if let Some(mut file) = target.matrix_file.take() {
                    matrix_bytes = Some(write_field(&mut field, &mut file).await?);
                }
            }
            METADATA_FIELD if with_metadata && metadata_bytes.is_none() => {
                let path = state.layout.metadata_path(&target.prefix);
                let mut file = File::create(&path).await?;
                target.metadata_path = Some(path);
                metadata_bytes = Some(write_field(&mut field, &mut file).await?);
            }
            other => {
                debug!(field = other, "Ignoring multipart field");
            }
        }
    }

    if matrix_bytes.is_none() {
        return Err(ApiError::Validation(format!(
            "Missing file field: {}",
            MATRIX_FIELD
        )));
    }
    if with_metadata && metadata_bytes.is_none() {
        return Err(ApiError::Validation(format!(
            "Missing file field: {}",
            METADATA_FIELD
        )));
    }

    debug!(
        prefix = %target.prefix,
        matrix_bytes = matrix_bytes.unwrap_or(0),
        metadata_bytes = metadata_bytes.unwrap_or(0),
        "Upload fields written"
    );
    Ok(())
}

/// Stream one field to disk verbatim
async fn write_field(field: &mut Field<'_>, file: &mut File) -> ApiResult<u64> {
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Map an analysis outcome to the response
fn analysis_response(outcome: Result<ArtifactSet, AnalysisError>, strict: bool) -> Response {
    let err = match outcome {
        Ok(artifacts) => return (StatusCode::OK, Json(artifacts)).into_response(),
        Err(e) => e,
    };

    let status = match (&err, strict) {
        (_, false) => StatusCode::OK,
        (AnalysisError::Rejected(_), true) => StatusCode::UNPROCESSABLE_ENTITY,
        (AnalysisError::Timeout(_), true) => StatusCode::GATEWAY_TIMEOUT,
        (_, true) => StatusCode::BAD_GATEWAY,
    };

    (status, Json(json!({ "error": err.client_value() }))).into_response()
}
