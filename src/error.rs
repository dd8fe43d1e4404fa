use thiserror::Error;
use tracing::error;

use crate::analytics::AnalyticsError;
use crate::blob::BlobError;
use crate::catalog::{CatalogError, ModuleId};
use crate::version::VersionError;

/// Coarse classification used to pick a protocol status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NoSatisfyingVersion,
    InvalidInput,
    Unauthorized,
    Conflict,
    BackendUnavailable,
    Internal,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Module not found: {0}")]
    ModuleNotFound(ModuleId),

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Version {version} of {module} not found")]
    VersionNotFound { module: ModuleId, version: String },

    #[error("No version of {module} satisfies '{constraint}'")]
    NoSatisfyingVersion { module: ModuleId, constraint: String },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::ModuleNotFound(_)
            | RegistryError::NamespaceNotFound(_)
            | RegistryError::VersionNotFound { .. } => ErrorKind::NotFound,
            RegistryError::NoSatisfyingVersion { .. } => ErrorKind::NoSatisfyingVersion,
            RegistryError::Version(_)
            | RegistryError::InvalidInput(_)
            | RegistryError::InvalidMetadata(_) => ErrorKind::InvalidInput,
            RegistryError::Unauthorized(_) => ErrorKind::Unauthorized,
            RegistryError::Conflict(_) => ErrorKind::Conflict,
            RegistryError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            RegistryError::Internal(_) => ErrorKind::Internal,
        }
    }
}

fn is_backend_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy)
            | Some(rusqlite::ErrorCode::DatabaseLocked)
            | Some(rusqlite::ErrorCode::CannotOpen)
    )
}

impl From<CatalogError> for RegistryError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Database(e) if is_backend_busy(&e) => {
                RegistryError::BackendUnavailable(e.to_string())
            }
            CatalogError::Database(e) => {
                error!("Catalog database error: {}", e);
                RegistryError::Internal(e.to_string())
            }
            CatalogError::LockPoisoned => {
                error!("Catalog lock poisoned");
                RegistryError::Internal("catalog lock poisoned".to_string())
            }
            CatalogError::InvalidVersion(e) => RegistryError::Version(e),
            CatalogError::InvalidIdentifier(message) => RegistryError::InvalidInput(message),
            CatalogError::InvalidMetadata(message) => RegistryError::InvalidMetadata(message),
            CatalogError::NamespaceNotFound(name) => RegistryError::NamespaceNotFound(name),
            CatalogError::ModuleNotFound(id) => RegistryError::ModuleNotFound(id),
            CatalogError::VersionNotFound { module, version } => {
                RegistryError::VersionNotFound { module, version }
            }
            e @ (CatalogError::DuplicateNamespace(_)
            | CatalogError::DuplicateVersion { .. }
            | CatalogError::InvalidStatusTransition { .. }) => {
                RegistryError::Conflict(e.to_string())
            }
        }
    }
}

impl From<BlobError> for RegistryError {
    fn from(err: BlobError) -> Self {
        match err {
            // The catalog points at an artifact the store does not have
            BlobError::ArtifactMissing(artifact) => {
                error!(artifact = %artifact, "Catalog references missing artifact");
                RegistryError::Internal(format!("artifact {} is missing", artifact))
            }
            e @ (BlobError::Network(_) | BlobError::Unavailable(_) | BlobError::Timeout(_)) => {
                RegistryError::BackendUnavailable(e.to_string())
            }
        }
    }
}

impl From<AnalyticsError> for RegistryError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::Database(e) if is_backend_busy(&e) => {
                RegistryError::BackendUnavailable(e.to_string())
            }
            e => {
                error!("Analytics query failed: {}", e);
                RegistryError::Internal(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ArtifactRef;
    use rstest::rstest;
    use std::time::Duration;

    fn id() -> ModuleId {
        ModuleId::new("acme", "vpc", "aws")
    }

    #[rstest]
    #[case(CatalogError::ModuleNotFound(id()), ErrorKind::NotFound)]
    #[case(CatalogError::DuplicateVersion { module: id(), version: "1.0.0".into() }, ErrorKind::Conflict)]
    #[case(CatalogError::InvalidIdentifier("bad".into()), ErrorKind::InvalidInput)]
    #[case(CatalogError::InvalidMetadata("bad".into()), ErrorKind::InvalidInput)]
    #[case(CatalogError::LockPoisoned, ErrorKind::Internal)]
    #[case(
        CatalogError::InvalidVersion(VersionError::InvalidVersion { version: "x".into(), reason: "y".into() }),
        ErrorKind::InvalidInput
    )]
    fn catalog_errors_map_to_kinds(#[case] err: CatalogError, #[case] expected: ErrorKind) {
        assert_eq!(RegistryError::from(err).kind(), expected);
    }

    #[rstest]
    #[case(BlobError::ArtifactMissing(ArtifactRef::new("a.zip")), ErrorKind::Internal)]
    #[case(BlobError::Unavailable("down".into()), ErrorKind::BackendUnavailable)]
    #[case(BlobError::Timeout(Duration::from_secs(1)), ErrorKind::BackendUnavailable)]
    fn blob_errors_map_to_kinds(#[case] err: BlobError, #[case] expected: ErrorKind) {
        assert_eq!(RegistryError::from(err).kind(), expected);
    }

    #[test]
    fn busy_database_is_backend_unavailable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert_eq!(
            RegistryError::from(CatalogError::Database(busy)).kind(),
            ErrorKind::BackendUnavailable
        );
    }

    #[test]
    fn no_satisfying_version_is_distinct_from_not_found() {
        let err = RegistryError::NoSatisfyingVersion {
            module: id(),
            constraint: "~>9".into(),
        };
        assert_eq!(err.kind(), ErrorKind::NoSatisfyingVersion);
        assert_ne!(err.kind(), ErrorKind::NotFound);
    }
}
