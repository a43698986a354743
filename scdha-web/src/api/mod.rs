//! HTTP API handlers for scdha-web

pub mod artifacts;
pub mod health;
pub mod results;
pub mod ui;
pub mod upload;

pub use artifacts::artifact_routes;
pub use health::health_routes;
pub use results::result_routes;
pub use ui::ui_routes;
pub use upload::upload_routes;

/// Cookie carrying the client session identifier
pub const SESSION_COOKIE: &str = "scDHA_session_id";
