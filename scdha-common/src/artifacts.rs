//! Result artifact naming
//!
//! One analysis run produces three files named from its result prefix:
//! `{prefix}_result.png` (served from the images directory),
//! `{prefix}_latent.tsv` and `{prefix}_pt.tsv` (served from the processed
//! directory). The serialized form is the JSON descriptor returned to clients.

use crate::storage::{ResultPrefix, StorageLayout};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filenames of the three outputs of one analysis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    #[serde(rename = "image_url")]
    pub image: String,
    #[serde(rename = "latent_filename")]
    pub latent: String,
    #[serde(rename = "result_filename")]
    pub result: String,
}

impl ArtifactSet {
    pub fn for_prefix(prefix: &ResultPrefix) -> Self {
        Self {
            image: format!("{}_result.png", prefix),
            latent: format!("{}_latent.tsv", prefix),
            result: format!("{}_pt.tsv", prefix),
        }
    }

    /// On-disk locations within `layout`
    pub fn paths(&self, layout: &StorageLayout) -> ArtifactPaths {
        ArtifactPaths {
            image: layout.images_dir().join(&self.image),
            latent: layout.processed_dir().join(&self.latent),
            result: layout.processed_dir().join(&self.result),
        }
    }
}

/// On-disk locations of an [`ArtifactSet`]
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub image: PathBuf,
    pub latent: PathBuf,
    pub result: PathBuf,
}

impl ArtifactPaths {
    /// Paths that do not exist yet
    pub fn missing(&self) -> Vec<&PathBuf> {
        [&self.image, &self.latent, &self.result]
            .into_iter()
            .filter(|p| !p.exists())
            .collect()
    }
}
