//! UI serving routes
//!
//! `index.html` is read from the storage root on every request, so the page
//! can be edited without a restart. Assets under `/static` are served by
//! `ServeDir` in the router.

use axum::{extract::State, response::Html, routing::get, Router};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Build UI routes
pub fn ui_routes() -> Router<AppState> {
    Router::new().route("/", get(serve_index))
}

/// GET /
pub async fn serve_index(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let path = state.layout.index_path();
    match tokio::fs::read_to_string(path).await {
        Ok(page) => Ok(Html(page)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::NotFound(format!(
            "Index page missing: {}",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}
