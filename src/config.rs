use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Defaults
// =============================================================================

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Upper bound on a single request, including blob lookups (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 512;

/// Timeout for a single blob store lookup (5 seconds)
pub const DEFAULT_BLOB_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_ANALYTICS_QUEUE_CAPACITY: usize = 10_000;

pub const DEFAULT_ANALYTICS_BATCH_SIZE: usize = 256;

pub const DEFAULT_TOKEN_PHRASE: &str = "analytics token";

pub const DEFAULT_EXAMPLE_TOKEN: &str = "my-tf-application";

/// Registry configuration, loaded once and shared as an immutable snapshot
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub namespaces: NamespacesConfig,
    pub classification: ClassificationConfig,
    pub resolution: ResolutionConfig,
    pub analytics: AnalyticsConfig,
    pub blob_store: BlobStoreConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub bind: String,
    /// Public base URL used in the discovery document; empty means relative
    pub base_path: String,
    pub request_timeout_ms: u64,
    pub concurrency_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            base_path: String::new(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Catalog database file; defaults to `db_path()`
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(db_path)
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct NamespacesConfig {
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassificationConfig {
    /// Namespaces treated as trusted regardless of their stored flag
    pub trusted_namespaces: Vec<String>,
    pub trusted_label: String,
    pub verified_label: String,
    pub contributed_label: String,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            trusted_namespaces: Vec::new(),
            trusted_label: "Trusted".to_string(),
            verified_label: "Verified".to_string(),
            contributed_label: "Contributed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolutionConfig {
    /// Fall back to pre-releases when no stable version satisfies
    pub allow_prerelease_fallback: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyticsConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub allow_unidentified_downloads: bool,
    pub token_phrase: String,
    pub example_token: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_ANALYTICS_QUEUE_CAPACITY,
            batch_size: DEFAULT_ANALYTICS_BATCH_SIZE,
            allow_unidentified_downloads: true,
            token_phrase: DEFAULT_TOKEN_PHRASE.to_string(),
            example_token: DEFAULT_EXAMPLE_TOKEN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BlobStoreConfig {
    pub base_url: String,
    /// Probe the blob store with HEAD before returning a location
    pub verify_existence: bool,
    pub timeout_ms: u64,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            verify_existence: false,
            timeout_ms: DEFAULT_BLOB_TIMEOUT_MS,
        }
    }
}

impl BlobStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    pub json: bool,
    /// Log file; stdout when unset
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl RegistryConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Returns the path to the data directory for module-registry.
/// Uses $XDG_DATA_HOME/module-registry if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/module-registry,
/// or ./module-registry if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the catalog database file.
pub fn db_path() -> PathBuf {
    data_dir().join("registry.db")
}

/// Returns the path to the analytics database file.
pub fn analytics_db_path(catalog_db: &Path) -> PathBuf {
    catalog_db.with_file_name("analytics.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("module-registry.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("module-registry")
}
