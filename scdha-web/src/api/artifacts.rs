//! Artifact retrieval
//!
//! - GET /download/:filename: result tables from `processed_files/`
//! - GET /showResultImg/:filename: result images from `images/`
//!
//! Filenames go through the storage layout's allow-list before they touch
//! the filesystem; unsafe names get the same 404 as missing files.

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::path::Path as FsPath;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Media type of every result image response
pub const RESULT_IMAGE_MEDIA_TYPE: &str = "image/jpeg";

/// Build artifact retrieval routes
pub fn artifact_routes() -> Router<AppState> {
    Router::new()
        .route("/download/:filename", get(download_file))
        .route("/showResultImg/:filename", get(show_result_image))
}

/// GET /download/:filename
///
/// Sent as an attachment under its own name.
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = state
        .layout
        .resolve_download(&filename)
        .ok_or_else(|| ApiError::NotFound(format!("Rejected download name: {:?}", filename)))?;
    let file = open_regular(&path).await?;

    Ok((
        [
            (header::CONTENT_TYPE, media_type_for(&filename).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// GET /showResultImg/:filename
pub async fn show_result_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = state
        .layout
        .resolve_image(&filename)
        .ok_or_else(|| ApiError::NotFound(format!("Rejected image name: {:?}", filename)))?;
    let file = open_regular(&path).await?;

    Ok((
        [(header::CONTENT_TYPE, RESULT_IMAGE_MEDIA_TYPE)],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Open `path` if it is an existing regular file
async fn open_regular(path: &FsPath) -> ApiResult<File> {
    let missing = || ApiError::NotFound(format!("No file at {}", path.display()));

    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(missing()),
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() {
        return Err(missing());
    }

    match File::open(path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(missing()),
        Err(e) => Err(e.into()),
    }
}

/// Media type guessed from the file extension
pub fn media_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "tsv" => "text/tab-separated-values",
        "csv" => "text/csv",
        "txt" => "text/plain; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_types() {
        assert_eq!(media_type_for("x_pt.tsv"), "text/tab-separated-values");
        assert_eq!(media_type_for("x_latent.TSV"), "text/tab-separated-values");
        assert_eq!(media_type_for("x_result.png"), "image/png");
        assert_eq!(media_type_for("cells.csv"), "text/csv");
        assert_eq!(media_type_for("notes.txt"), "text/plain; charset=utf-8");
        assert_eq!(media_type_for("x_manifest.json"), "application/json");
        assert_eq!(media_type_for("plot.jpg"), "image/jpeg");
        assert_eq!(media_type_for("plot.JPEG"), "image/jpeg");
        assert_eq!(media_type_for("report.pdf"), "application/pdf");
        assert_eq!(media_type_for("archive.rds"), "application/octet-stream");
        assert_eq!(media_type_for("noextension"), "application/octet-stream");
    }
}
