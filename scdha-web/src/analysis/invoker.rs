//! Analysis invoker
//!
//! Runs a backend off the request task: each run is spawned onto the tokio
//! runtime, gated by a semaphore (`analysis.max_concurrent`) and optionally
//! bounded by `analysis.timeout_secs`. A panicking backend is reported as
//! [`AnalysisError::Crashed`] rather than taking the request down.
//!
//! The run slot is owned by the spawned task, so it is only released once the
//! backend has actually stopped. Dropping the `invoke` future (client
//! disconnect) or hitting the timeout aborts the task, which drops the child
//! process handle and kills it.

use scdha_common::{ArtifactSet, StorageLayout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::{AnalysisBackend, AnalysisError, AnalysisJob};

/// Shared handle that schedules analysis runs
#[derive(Clone)]
pub struct AnalysisInvoker {
    backend: Arc<dyn AnalysisBackend>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Option<Duration>,
    layout: StorageLayout,
}

impl AnalysisInvoker {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        max_concurrent: usize,
        timeout: Option<Duration>,
        layout: StorageLayout,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            backend,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout,
            layout,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Runs currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run `job` and wait for its outcome
    pub async fn invoke(&self, job: AnalysisJob) -> Result<ArtifactSet, AnalysisError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AnalysisError::Unavailable("analysis slots closed".to_string()))?;

        let prefix = job.prefix.clone();
        let started = Instant::now();
        info!(prefix = %prefix, backend = self.backend.name(), "Analysis started");

        let backend = Arc::clone(&self.backend);
        let task = tokio::spawn(async move {
            let _permit = permit;
            backend.run(&job).await
        });
        let mut abort_on_drop = AbortOnDrop::new(task.abort_handle(), prefix.to_string());

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    let err = AnalysisError::Timeout(limit);
                    warn!(prefix = %prefix, error = %err, "Analysis timed out");
                    return Err(err);
                }
            },
            None => task.await,
        };
        abort_on_drop.disarm();

        let result = joined.unwrap_or_else(|e| Err(AnalysisError::Crashed(e.to_string())));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(artifacts) => {
                let paths = artifacts.paths(&self.layout);
                for missing in paths.missing() {
                    warn!(
                        prefix = %prefix,
                        path = %missing.display(),
                        "Analysis reported success but artifact is missing"
                    );
                }
                info!(prefix = %prefix, elapsed_ms, "Analysis succeeded");
            }
            Err(AnalysisError::Rejected(flag)) => {
                info!(prefix = %prefix, elapsed_ms, flag = %flag, "Analysis rejected input");
            }
            Err(e) => {
                warn!(prefix = %prefix, elapsed_ms, error = %e, "Analysis failed");
            }
        }

        result
    }
}

/// Aborts a spawned run unless disarmed
struct AbortOnDrop {
    handle: AbortHandle,
    prefix: String,
    armed: bool,
}

impl AbortOnDrop {
    fn new(handle: AbortHandle, prefix: String) -> Self {
        Self {
            handle,
            prefix,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if self.armed {
            debug!(prefix = %self.prefix, "Aborting analysis run");
            self.handle.abort();
        }
    }
}
