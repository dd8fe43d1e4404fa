//! Version discovery, download and constraint resolution
//!
//! The engine answers "which versions exist" and "which version should be
//! downloaded" from catalog state plus version semantics. It hands back
//! opaque artifact references; turning them into URLs is the blob store's
//! job.

use std::cmp::Ordering;
use std::sync::Arc;

use semver::Version;
use tracing::{debug, error};

use crate::catalog::{ArtifactRef, CatalogStore, ModuleId, StoredVersion};
use crate::error::RegistryError;
use crate::version::{self, Constraint, PrereleasePolicy, latest_satisfying};

/// What a client should download for a resolved request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub module: ModuleId,
    pub version: Version,
    pub artifact: ArtifactRef,
}

impl DownloadDescriptor {
    fn from_stored(module: &ModuleId, stored: &StoredVersion) -> Self {
        Self {
            module: module.clone(),
            version: stored.version.clone(),
            artifact: stored.record.artifact.clone(),
        }
    }
}

pub struct ResolutionEngine {
    catalog: Arc<CatalogStore>,
    policy: PrereleasePolicy,
}

impl ResolutionEngine {
    pub fn new(catalog: Arc<CatalogStore>, policy: PrereleasePolicy) -> Self {
        Self { catalog, policy }
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    /// Published versions of a module, ascending
    pub fn list_versions(&self, id: &ModuleId) -> Result<Vec<String>, RegistryError> {
        let versions = self.sorted_versions(id)?;
        Ok(versions.iter().map(|v| v.version.to_string()).collect())
    }

    /// Published versions of a module with their records, ascending
    pub fn sorted_versions(&self, id: &ModuleId) -> Result<Vec<StoredVersion>, RegistryError> {
        let mut versions = self.published_or_not_found(id)?;
        versions.sort_by(|a, b| version::compare(&a.version, &b.version));

        if let Some(pair) = versions
            .windows(2)
            .find(|pair| version::compare(&pair[0].version, &pair[1].version) == Ordering::Equal)
        {
            error!(
                module = %id,
                version = %pair[0].version,
                "Catalog holds two versions that compare equal"
            );
            return Err(RegistryError::Internal(format!(
                "duplicate version {} stored for {}",
                pair[0].version, id
            )));
        }

        Ok(versions)
    }

    /// Resolve what to download: an exact version, or the latest one
    pub fn resolve_download(
        &self,
        id: &ModuleId,
        version: Option<&str>,
    ) -> Result<DownloadDescriptor, RegistryError> {
        let stored = match version {
            Some(raw) => self.get_version(id, raw)?,
            None => self.resolve_latest(id)?,
        };
        debug!("Resolved {} to version {}", id, stored.version);
        Ok(DownloadDescriptor::from_stored(id, &stored))
    }

    /// Greatest version satisfying a constraint expression
    pub fn resolve_constraint(
        &self,
        id: &ModuleId,
        constraint: &str,
    ) -> Result<Version, RegistryError> {
        let parsed = Constraint::parse(constraint)?;
        let versions = self.published_or_not_found(id)?;

        latest_satisfying(versions.iter().map(|v| &v.version), &parsed, self.policy).ok_or_else(
            || RegistryError::NoSatisfyingVersion {
                module: id.clone(),
                constraint: constraint.to_string(),
            },
        )
    }

    /// Latest version a client gets when it does not name one
    pub fn resolve_latest(&self, id: &ModuleId) -> Result<StoredVersion, RegistryError> {
        let versions = self.published_or_not_found(id)?;
        let any = Constraint::any();

        let latest = latest_satisfying(versions.iter().map(|v| &v.version), &any, self.policy)
            .ok_or_else(|| RegistryError::NoSatisfyingVersion {
                module: id.clone(),
                constraint: any.to_string(),
            })?;

        versions
            .into_iter()
            .find(|v| v.version == latest)
            .ok_or_else(|| RegistryError::Internal(format!("lost resolved version {}", latest)))
    }

    /// A specific version, including beta versions
    pub fn get_version(&self, id: &ModuleId, raw: &str) -> Result<StoredVersion, RegistryError> {
        let version = version::parse(raw)?;
        if !self.catalog.exists(id)? {
            return Err(RegistryError::ModuleNotFound(id.clone()));
        }
        Ok(self.catalog.get_version(id, &version)?)
    }

    fn published_or_not_found(&self, id: &ModuleId) -> Result<Vec<StoredVersion>, RegistryError> {
        let versions = self.catalog.list_versions(id)?;
        if versions.is_empty() && !self.catalog.exists(id)? {
            return Err(RegistryError::ModuleNotFound(id.clone()));
        }
        Ok(versions)
    }
}
