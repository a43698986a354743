//! Configuration loading
//!
//! Bootstrap configuration is resolved in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SCDHA_*`, handled by the CLI parser)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is never fatal: the compiled defaults are used and the
//! caller is told no file was found. A TOML file that exists but fails to
//! parse is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
}

/// `[server]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Largest accepted request body in bytes (multipart uploads included)
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address {}:{}: {}", self.host, self.port, e)))
    }
}

/// `[storage]` section
///
/// Directory names are resolved relative to `root`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub uploads_dir: String,
    pub processed_dir: String,
    pub images_dir: String,
    pub public_dir: String,
    pub index_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            uploads_dir: "uploaded_files".to_string(),
            processed_dir: "processed_files".to_string(),
            images_dir: "images".to_string(),
            public_dir: "public".to_string(),
            index_file: "index.html".to_string(),
        }
    }
}

/// `[analysis]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// R interpreter executable
    pub rscript: String,
    /// R source file defining the analysis function
    pub script: PathBuf,
    /// Name of the R function to call
    pub function: String,
    /// Cap on simultaneously running analyses
    pub max_concurrent: usize,
    /// Per-run timeout; `None` waits indefinitely
    pub timeout_secs: Option<u64>,
    /// Report analysis failures through HTTP status instead of always 200
    pub strict_status: bool,
    /// Disambiguate same-session, same-second prefixes with a request id
    pub unique_prefixes: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rscript: "Rscript".to_string(),
            script: PathBuf::from("utils.R"),
            function: "timeInferenceFunc".to_string(),
            max_concurrent: default_max_concurrent(),
            timeout_secs: None,
            strict_status: false,
            unique_prefixes: true,
        }
    }
}

fn default_max_concurrent() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command-line / environment overrides on top of file values
    pub fn apply_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(host) = &overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(root) = &overrides.root {
            self.storage.root = root.clone();
        }
        self
    }
}

/// Configuration plus the file it came from (`None` = compiled defaults)
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: Option<PathBuf>,
}

/// Load the TOML configuration
///
/// An explicit path must exist. Without one, the default locations are
/// searched; when none exists the compiled defaults are returned.
///
/// Runs before logging is initialized, so it reports through its return
/// value instead of logging.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = match explicit {
        Some(path) if !path.exists() => {
            return Err(Error::Config(format!("Config file not found: {}", path.display())));
        }
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    match path {
        Some(path) => Ok(LoadedConfig {
            config: read_config_file(&path)?,
            source: Some(path),
        }),
        None => Ok(LoadedConfig {
            config: TomlConfig::default(),
            source: None,
        }),
    }
}

fn read_config_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    TomlConfig::from_toml_str(&content)
}

/// Default configuration file locations, in search order
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("scdha").join("config.toml"));
    }
    if cfg!(unix) {
        paths.push(PathBuf::from("/etc/scdha/config.toml"));
    }
    paths
}

fn find_config_file() -> Option<PathBuf> {
    default_config_paths().into_iter().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_legacy_layout() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.uploads_dir, "uploaded_files");
        assert_eq!(config.storage.processed_dir, "processed_files");
        assert_eq!(config.storage.images_dir, "images");
        assert_eq!(config.storage.public_dir, "public");
        assert_eq!(config.storage.index_file, "index.html");
        assert_eq!(config.analysis.function, "timeInferenceFunc");
        assert!(!config.analysis.strict_status);
        assert!(config.analysis.unique_prefixes);
        assert!(config.analysis.timeout_secs.is_none());
        assert!(config.analysis.max_concurrent >= 1);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [server]
            port = 9100

            [analysis]
            timeout_secs = 600
            strict_status = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.analysis.timeout_secs, Some(600));
        assert!(config.analysis.strict_status);
        assert_eq!(config.analysis.rscript, "Rscript");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[server\nport = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_overrides_take_priority() {
        let overrides = ConfigOverrides {
            host: Some("127.0.0.1".to_string()),
            port: Some(8123),
            root: Some(PathBuf::from("/srv/scdha")),
        };
        let config = TomlConfig::default().apply_overrides(&overrides);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.storage.root, PathBuf::from("/srv/scdha"));
    }

    #[test]
    fn test_empty_overrides_change_nothing() {
        let config = TomlConfig::default().apply_overrides(&ConfigOverrides::default());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.storage.root, PathBuf::from("."));
    }

    #[test]
    fn test_bind_addr() {
        let config = TomlConfig::default();
        assert_eq!(config.server.bind_addr().unwrap().port(), 8000);

        let bad = ServerConfig {
            host: "not an address".to_string(),
            ..ServerConfig::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\nroot = \"/data/scdha\"").unwrap();

        let loaded = load_config(Some(file.path())).unwrap();
        assert_eq!(loaded.config.storage.root, PathBuf::from("/data/scdha"));
        assert_eq!(loaded.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(load_config(Some(missing.as_path())), Err(Error::Config(_))));
    }
}
