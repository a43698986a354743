//! Analysis backend abstraction
//!
//! The statistical routine is opaque: it takes the uploaded matrix path, an
//! optional metadata path and the result prefix, and on success writes the
//! three artifacts named by [`ArtifactSet::for_prefix`].
//!
//! # Architecture
//! - [`AnalysisBackend`]: one capability, `run`, returning a typed result
//! - [`rscript::RscriptBackend`]: production backend, spawns `Rscript`
//! - [`invoker::AnalysisInvoker`]: throttling, timeout and logging around a backend

use async_trait::async_trait;
use scdha_common::{ArtifactSet, ResultPrefix};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod invoker;
pub mod rscript;

pub use invoker::AnalysisInvoker;
pub use rscript::RscriptBackend;

/// Message clients see for every failure other than a rejection flag
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Inputs of one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub matrix: PathBuf,
    pub metadata: Option<PathBuf>,
    pub prefix: ResultPrefix,
}

/// Why an analysis run produced no artifacts
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The routine ran and returned a non-success flag
    #[error("Analysis rejected the input: {0}")]
    Rejected(Value),

    /// No run slot could be obtained
    #[error("Analysis unavailable: {0}")]
    Unavailable(String),

    /// The external process could not be started
    #[error("Failed to start analysis process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The external process exited unsuccessfully
    #[error("Analysis process exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// The run exceeded the configured time limit
    #[error("Analysis did not finish within {0:?}")]
    Timeout(Duration),

    /// The process finished but its output carried no result flag
    #[error("Unrecognized analysis output: {0}")]
    Protocol(String),

    /// The backend task panicked or was aborted
    #[error("Analysis task crashed: {0}")]
    Crashed(String),
}

impl AnalysisError {
    /// Value placed in the `error` field of the response body
    ///
    /// Only a rejection flag is passed through; everything else collapses to
    /// [`UNKNOWN_ERROR`].
    pub fn client_value(&self) -> Value {
        match self {
            AnalysisError::Rejected(flag) => flag.clone(),
            _ => Value::String(UNKNOWN_ERROR.to_string()),
        }
    }
}

/// External analysis routine
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Short name for logs and the health endpoint
    fn name(&self) -> &str;

    /// Run the analysis for `job`
    async fn run(&self, job: &AnalysisJob) -> Result<ArtifactSet, AnalysisError>;
}
