//! Artifact manifest
//!
//! Maps each result prefix to the request that produced it: inputs, expected
//! artifacts and run status. Every entry is written to
//! `{prefix}_manifest.json` in the uploads directory; only runs still in
//! progress are also held in memory. Finished runs are answered from disk.

use crate::artifacts::ArtifactSet;
use crate::storage::{ResultPrefix, StorageLayout};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Outcome of one analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    /// The routine ran and returned a non-success flag
    Rejected { flag: serde_json::Value },
    /// The routine could not run or crashed
    Failed { reason: String },
    /// The client went away before the run finished
    Cancelled,
}

/// Uploaded input files of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFiles {
    pub matrix: PathBuf,
    pub metadata: Option<PathBuf>,
}

/// One manifest record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub prefix: ResultPrefix,
    pub request_id: Uuid,
    pub session: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub inputs: InputFiles,
    pub artifacts: ArtifactSet,
    pub status: RunStatus,
}

impl ManifestEntry {
    pub fn new(
        prefix: ResultPrefix,
        request_id: Uuid,
        session: Option<String>,
        inputs: InputFiles,
    ) -> Self {
        let artifacts = ArtifactSet::for_prefix(&prefix);
        Self {
            prefix,
            request_id,
            session,
            created_at: crate::time::now(),
            finished_at: None,
            inputs,
            artifacts,
            status: RunStatus::Running,
        }
    }
}

/// Prefix → entry registry shared across requests
#[derive(Debug, Clone)]
pub struct ArtifactManifest {
    layout: StorageLayout,
    entries: Arc<RwLock<HashMap<ResultPrefix, ManifestEntry>>>,
}

impl ArtifactManifest {
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new request
    pub async fn record(&self, entry: ManifestEntry) -> Result<()> {
        self.persist(&entry).await?;
        self.entries.write().await.insert(entry.prefix.clone(), entry);
        Ok(())
    }

    /// Set the final status of a request
    ///
    /// The entry leaves memory once its final state is on disk.
    pub async fn finish(&self, prefix: &ResultPrefix, status: RunStatus) -> Result<ManifestEntry> {
        let entry = {
            let mut entries = self.entries.write().await;
            let entry = entries
                .get_mut(prefix)
                .ok_or_else(|| Error::NotFound(format!("Manifest entry not found: {}", prefix)))?;
            entry.status = status;
            entry.finished_at = Some(crate::time::now());
            entry.clone()
        };
        self.persist(&entry).await?;
        self.entries.write().await.remove(prefix);
        Ok(entry)
    }

    /// Look up an entry, falling back to the on-disk copy
    pub async fn get(&self, prefix: &ResultPrefix) -> Result<Option<ManifestEntry>> {
        if let Some(entry) = self.entries.read().await.get(prefix) {
            return Ok(Some(entry.clone()));
        }

        let path = self.layout.manifest_path(prefix);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, entry: &ManifestEntry) -> Result<()> {
        let path = self.layout.manifest_path(&entry.prefix);
        tokio::fs::write(&path, serde_json::to_vec_pretty(entry)?).await?;
        debug!(prefix = %entry.prefix, path = %path.display(), "Manifest entry written");
        Ok(())
    }
}
