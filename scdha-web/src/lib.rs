//! scdha-web library - upload, analysis and artifact retrieval service
//!
//! Exposes the router and state for the binary and for integration testing.

pub mod analysis;
pub mod api;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use scdha_common::config::TomlConfig;
use scdha_common::manifest::ArtifactManifest;
use scdha_common::time::{Clock, SystemClock};
use scdha_common::StorageLayout;
use std::sync::Arc;
use std::time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::analysis::{AnalysisBackend, AnalysisInvoker};

/// Request-handling options taken from configuration
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Report analysis failures with non-200 statuses
    pub strict_status: bool,
    /// Never let two requests share a result prefix
    pub unique_prefixes: bool,
    /// Request body limit in bytes
    pub max_upload_bytes: usize,
}

impl ServiceOptions {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            strict_status: config.analysis.strict_status,
            unique_prefixes: config.analysis.unique_prefixes,
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Directory layout for uploads and artifacts
    pub layout: StorageLayout,
    /// Prefix → request record
    pub manifest: ArtifactManifest,
    /// Runs the analysis backend
    pub invoker: AnalysisInvoker,
    /// Time source for result prefixes
    pub clock: Arc<dyn Clock>,
    pub options: ServiceOptions,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: &TomlConfig, backend: Arc<dyn AnalysisBackend>) -> Self {
        let layout = StorageLayout::from_config(&config.storage);
        let invoker = AnalysisInvoker::new(
            backend,
            config.analysis.max_concurrent,
            config.analysis.timeout_secs.map(Duration::from_secs),
            layout.clone(),
        );
        Self {
            manifest: ArtifactManifest::new(layout.clone()),
            layout,
            invoker,
            clock: Arc::new(SystemClock),
            options: ServiceOptions::from_config(config),
            startup_time: Utc::now(),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let static_files = ServeDir::new(state.layout.public_dir());
    let body_limit = state.options.max_upload_bytes;

    Router::new()
        .merge(api::ui_routes())
        .merge(api::upload_routes())
        .merge(api::artifact_routes())
        .merge(api::result_routes())
        .merge(api::health_routes())
        .nest_service("/static", static_files)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
