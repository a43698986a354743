//! Storage layout and file naming
//!
//! All files live in flat directories under a single root:
//! - `uploaded_files/`: raw uploads, `{prefix}_matrix.tsv` / `{prefix}_metadata.tsv`
//! - `processed_files/`: result tables written by the analysis routine
//! - `images/`: result images written by the analysis routine
//! - `public/` and `index.html`: front-end assets
//!
//! Anything that reaches a filesystem path from a request (session cookie,
//! download filename, dataset name) passes through the sanitizers here first.

use crate::config::StorageConfig;
use crate::{Error, Result};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest session identifier kept after sanitizing
pub const MAX_SESSION_LEN: usize = 64;

/// Longest filename accepted for retrieval or as a dataset name
pub const MAX_FILENAME_LEN: usize = 255;

/// Text used in place of an absent session identifier
pub const ABSENT_SESSION: &str = "None";

/// Sanitized session identifier taken from the `scDHA_session_id` cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(Option<String>);

impl SessionId {
    /// Keep only `[A-Za-z0-9_-]`, truncated to [`MAX_SESSION_LEN`].
    /// Nothing left after filtering counts as absent.
    pub fn from_cookie(raw: Option<&str>) -> Self {
        let cleaned: Option<String> = raw.map(|value| {
            value
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .take(MAX_SESSION_LEN)
                .collect()
        });

        match cleaned {
            Some(s) if !s.is_empty() => {
                if raw.map(|r| r != s).unwrap_or(false) {
                    debug!(session = %s, "Session identifier sanitized");
                }
                Self(Some(s))
            }
            _ => Self(None),
        }
    }

    pub fn absent() -> Self {
        Self(None)
    }

    pub fn as_option(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_deref().unwrap_or(ABSENT_SESSION))
    }
}

/// True when `name` is a plain file name safe to join under a base directory
///
/// Allowed: `[A-Za-z0-9._-]`, not starting with `.`, at most
/// [`MAX_FILENAME_LEN`] characters.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_FILENAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

/// Name shared by an upload and its artifacts
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ResultPrefix(String);

impl ResultPrefix {
    /// `{session}{stamp}`
    pub fn new(session: &SessionId, stamp: &str) -> Self {
        Self(format!("{}{}", session, stamp))
    }

    /// Prefix naming a pre-computed dataset
    pub fn from_dataset_name(name: &str) -> Result<Self> {
        if !is_safe_filename(name) {
            return Err(Error::InvalidInput(format!("Invalid dataset name: {:?}", name)));
        }
        Ok(Self(name.to_string()))
    }

    /// Parse a prefix supplied by a client (manifest lookups)
    pub fn parse(raw: &str) -> Option<Self> {
        is_safe_filename(raw).then(|| Self(raw.to_string()))
    }

    /// `{prefix}_{suffix}`
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}_{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved directory layout
#[derive(Debug, Clone)]
pub struct StorageLayout {
    uploads: PathBuf,
    processed: PathBuf,
    images: PathBuf,
    public: PathBuf,
    index_file: PathBuf,
}

impl StorageLayout {
    pub fn from_config(config: &StorageConfig) -> Self {
        let root = &config.root;
        Self {
            uploads: root.join(&config.uploads_dir),
            processed: root.join(&config.processed_dir),
            images: root.join(&config.images_dir),
            public: root.join(&config.public_dir),
            index_file: root.join(&config.index_file),
        }
    }

    /// Layout with default directory names under `root`
    pub fn under(root: impl Into<PathBuf>) -> Self {
        Self::from_config(&StorageConfig {
            root: root.into(),
            ..StorageConfig::default()
        })
    }

    /// Create the upload, processed and image directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.uploads, &self.processed, &self.images] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                info!("Created directory: {}", dir.display());
            }
        }
        if !self.public.exists() {
            warn!("Static asset directory missing: {}", self.public.display());
        }
        Ok(())
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed
    }

    pub fn images_dir(&self) -> &Path {
        &self.images
    }

    pub fn public_dir(&self) -> &Path {
        &self.public
    }

    pub fn index_path(&self) -> &Path {
        &self.index_file
    }

    pub fn matrix_path(&self, prefix: &ResultPrefix) -> PathBuf {
        self.uploads.join(format!("{}_matrix.tsv", prefix))
    }

    pub fn metadata_path(&self, prefix: &ResultPrefix) -> PathBuf {
        self.uploads.join(format!("{}_metadata.tsv", prefix))
    }

    pub fn manifest_path(&self, prefix: &ResultPrefix) -> PathBuf {
        self.uploads.join(format!("{}_manifest.json", prefix))
    }

    /// Path of a downloadable table, `None` for unsafe names
    pub fn resolve_download(&self, filename: &str) -> Option<PathBuf> {
        is_safe_filename(filename).then(|| self.processed.join(filename))
    }

    /// Path of a result image, `None` for unsafe names
    pub fn resolve_image(&self, filename: &str) -> Option<PathBuf> {
        is_safe_filename(filename).then(|| self.images.join(filename))
    }

    /// Create the matrix upload file for `base`
    ///
    /// With `unique` set, an existing file for the same prefix (same session,
    /// same second) is never overwritten: the prefix gets the short form of
    /// `request_id` appended instead. Without it the old file is truncated.
    pub async fn claim_matrix_file(
        &self,
        base: ResultPrefix,
        request_id: &Uuid,
        unique: bool,
    ) -> Result<(ResultPrefix, File)> {
        if !unique {
            let file = File::create(self.matrix_path(&base)).await?;
            return Ok((base, file));
        }

        match create_new(&self.matrix_path(&base)).await {
            Ok(file) => Ok((base, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let prefix = base.with_suffix(&crate::uuid_utils::short(request_id));
                warn!(
                    taken = %base,
                    prefix = %prefix,
                    "Result prefix already in use, disambiguating with request id"
                );
                let file = create_new(&self.matrix_path(&prefix)).await?;
                Ok((prefix, file))
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn create_new(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_session_renders_none() {
        assert_eq!(SessionId::from_cookie(None).to_string(), "None");
        assert_eq!(SessionId::absent().as_option(), None);
    }

    #[test]
    fn test_session_keeps_safe_characters() {
        let session = SessionId::from_cookie(Some("abc-123_XYZ"));
        assert_eq!(session.to_string(), "abc-123_XYZ");
    }

    #[test]
    fn test_session_strips_traversal() {
        let session = SessionId::from_cookie(Some("../../etc/passwd"));
        assert_eq!(session.to_string(), "etcpasswd");
    }

    #[test]
    fn test_session_of_only_unsafe_chars_is_absent() {
        assert_eq!(SessionId::from_cookie(Some("/../")), SessionId::absent());
        assert_eq!(SessionId::from_cookie(Some("")), SessionId::absent());
    }

    #[test]
    fn test_session_truncated() {
        let long = "a".repeat(200);
        let session = SessionId::from_cookie(Some(&long));
        assert_eq!(session.to_string().len(), MAX_SESSION_LEN);
    }

    #[test]
    fn test_safe_filename() {
        assert!(is_safe_filename("abc20230101120000_pt.tsv"));
        assert!(is_safe_filename("None20230101120000_result.png"));
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename(".."));
        assert!(!is_safe_filename(".hidden"));
        assert!(!is_safe_filename("../secret.tsv"));
        assert!(!is_safe_filename("a/b.tsv"));
        assert!(!is_safe_filename("a\\b.tsv"));
        assert!(!is_safe_filename(&"x".repeat(MAX_FILENAME_LEN + 1)));
    }

    #[test]
    fn test_prefix_concatenates_session_and_stamp() {
        let session = SessionId::from_cookie(Some("s1"));
        assert_eq!(ResultPrefix::new(&session, "20230101120000").as_str(), "s120230101120000");
        assert_eq!(
            ResultPrefix::new(&SessionId::absent(), "20230101120000").as_str(),
            "None20230101120000"
        );
    }

    #[test]
    fn test_dataset_prefix_validation() {
        assert_eq!(ResultPrefix::from_dataset_name("foo").unwrap().as_str(), "foo");
        assert!(ResultPrefix::from_dataset_name("../foo").is_err());
        assert!(ResultPrefix::from_dataset_name("").is_err());
    }

    #[test]
    fn test_layout_paths() {
        let layout = StorageLayout::under("/srv");
        let prefix = ResultPrefix::new(&SessionId::absent(), "20230101120000");
        assert_eq!(
            layout.matrix_path(&prefix),
            PathBuf::from("/srv/uploaded_files/None20230101120000_matrix.tsv")
        );
        assert_eq!(
            layout.metadata_path(&prefix),
            PathBuf::from("/srv/uploaded_files/None20230101120000_metadata.tsv")
        );
        assert_eq!(
            layout.resolve_download("x_pt.tsv"),
            Some(PathBuf::from("/srv/processed_files/x_pt.tsv"))
        );
        assert_eq!(
            layout.resolve_image("x_result.png"),
            Some(PathBuf::from("/srv/images/x_result.png"))
        );
        assert_eq!(layout.resolve_download("../x_pt.tsv"), None);
        assert_eq!(layout.index_path(), Path::new("/srv/index.html"));
    }

    #[test]
    fn test_ensure_directories_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::under(dir.path());
        layout.ensure_directories().unwrap();
        assert!(layout.uploads_dir().is_dir());
        assert!(layout.processed_dir().is_dir());
        assert!(layout.images_dir().is_dir());
        // Idempotent
        layout.ensure_directories().unwrap();
    }

    #[tokio::test]
    async fn test_claim_disambiguates_taken_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::under(dir.path());
        layout.ensure_directories().unwrap();

        let base = ResultPrefix::new(&SessionId::from_cookie(Some("s")), "20230101120000");
        let first_id = Uuid::new_v4();
        let second_id = Uuid::new_v4();

        let (first, _f1) = layout.claim_matrix_file(base.clone(), &first_id, true).await.unwrap();
        let (second, _f2) = layout.claim_matrix_file(base.clone(), &second_id, true).await.unwrap();

        assert_eq!(first, base);
        assert_ne!(second, base);
        assert!(second.as_str().starts_with(base.as_str()));
        assert!(layout.matrix_path(&first).exists());
        assert!(layout.matrix_path(&second).exists());
    }

    #[tokio::test]
    async fn test_claim_without_unique_reuses_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::under(dir.path());
        layout.ensure_directories().unwrap();

        let base = ResultPrefix::new(&SessionId::absent(), "20230101120000");
        let (a, _f1) = layout.claim_matrix_file(base.clone(), &Uuid::new_v4(), false).await.unwrap();
        let (b, _f2) = layout.claim_matrix_file(base.clone(), &Uuid::new_v4(), false).await.unwrap();
        assert_eq!(a, b);
    }
}
