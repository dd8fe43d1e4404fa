//! Persistent repository interface behind the catalog

use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::catalog::error::CatalogError;
use crate::catalog::types::{
    CatalogStats, ModuleId, ModuleKind, ModuleMetadata, Namespace, PublishRequest, VersionRecord,
    VersionStatus,
};

/// Trait for storing and retrieving the namespace/module/version graph
///
/// Implementations must make `insert_version` atomic: the namespace, module
/// and version rows become visible together or not at all, and a second
/// insert of the same (module, version) fails with
/// [`CatalogError::DuplicateVersion`].
#[cfg_attr(test, automock)]
pub trait CatalogRepository: Send + Sync + 'static {
    fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, CatalogError>;

    /// Create a namespace explicitly (admin action)
    fn create_namespace(
        &self,
        name: &str,
        display_name: Option<String>,
    ) -> Result<Namespace, CatalogError>;

    fn set_namespace_trusted(&self, name: &str, trusted: bool) -> Result<(), CatalogError>;

    fn get_module(&self, id: &ModuleId) -> Result<Option<ModuleMetadata>, CatalogError>;

    fn set_module_verified(&self, id: &ModuleId, verified: bool) -> Result<(), CatalogError>;

    /// Targets registered under (namespace, name) for the given kind
    fn list_targets(
        &self,
        namespace: &str,
        name: &str,
        kind: ModuleKind,
    ) -> Result<Vec<String>, CatalogError>;

    /// All versions of a module that are not deleted, in storage order
    fn list_version_records(&self, id: &ModuleId) -> Result<Vec<VersionRecord>, CatalogError>;

    /// A single non-deleted version by its exact stored string
    fn get_version_record(
        &self,
        id: &ModuleId,
        version: &str,
    ) -> Result<Option<VersionRecord>, CatalogError>;

    /// Atomically create namespace and module if missing and insert the version
    fn insert_version(
        &self,
        request: &PublishRequest,
        published_at: DateTime<Utc>,
    ) -> Result<VersionRecord, CatalogError>;

    /// Move a version to a new status, enforcing one-way transitions
    fn set_version_status(
        &self,
        id: &ModuleId,
        version: &str,
        status: VersionStatus,
    ) -> Result<(), CatalogError>;

    fn stats(&self) -> Result<CatalogStats, CatalogError>;

    /// The published version with the newest publish time, across all modules of a kind
    fn most_recently_published(
        &self,
        kind: ModuleKind,
    ) -> Result<Option<(ModuleId, VersionRecord)>, CatalogError>;
}
