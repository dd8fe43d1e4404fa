use thiserror::Error;

use crate::catalog::types::{ModuleId, VersionStatus};
use crate::version::VersionError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    InvalidVersion(#[from] VersionError),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Namespace already exists: {0}")]
    DuplicateNamespace(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(ModuleId),

    #[error("Version {version} of {module} not found")]
    VersionNotFound { module: ModuleId, version: String },

    #[error("Version {version} of {module} already exists")]
    DuplicateVersion { module: ModuleId, version: String },

    #[error("Version {version} of {module} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        module: ModuleId,
        version: String,
        from: VersionStatus,
        to: VersionStatus,
    },
}
