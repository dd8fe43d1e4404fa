//! Catalog access with validation and identity normalization
//!
//! `CatalogStore` is the only entry point to the namespace/module/version
//! graph. It validates publishes against the metadata schema, canonicalizes
//! version strings and skips malformed stored data on reads.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use semver::Version;
use tracing::{info, warn};

use crate::catalog::error::CatalogError;
use crate::catalog::repository::CatalogRepository;
use crate::catalog::types::{
    CatalogStats, METADATA_SCHEMA_VERSION, ModuleId, ModuleKind, ModuleMetadata, Namespace,
    PublishRequest, StoredVersion, VersionRecord, VersionStatus,
};
use crate::version;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Za-z][0-9A-Za-z_-]*$").expect("identifier pattern is valid")
});

/// Validate a namespace, module name or target identifier
pub fn validate_identifier(kind: &str, value: &str) -> Result<(), CatalogError> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(CatalogError::InvalidIdentifier(format!(
            "{} '{}' must start with a letter or digit and contain only letters, digits, '-' or '_'",
            kind, value
        )))
    }
}

pub struct CatalogStore {
    repository: Arc<dyn CatalogRepository>,
    case_insensitive_namespaces: bool,
}

impl CatalogStore {
    pub fn new(repository: Arc<dyn CatalogRepository>, case_insensitive_namespaces: bool) -> Self {
        Self {
            repository,
            case_insensitive_namespaces,
        }
    }

    /// Normalize a namespace name according to the case policy
    pub fn namespace_key(&self, namespace: &str) -> String {
        if self.case_insensitive_namespaces {
            namespace.to_lowercase()
        } else {
            namespace.to_string()
        }
    }

    fn key(&self, id: &ModuleId) -> ModuleId {
        ModuleId {
            namespace: self.namespace_key(&id.namespace),
            name: id.name.clone(),
            target: id.target.clone(),
        }
    }

    /// Whether a module record exists for this identity
    pub fn exists(&self, id: &ModuleId) -> Result<bool, CatalogError> {
        Ok(self.repository.get_module(&self.key(id))?.is_some())
    }

    /// Published versions of a module; empty if the module is unknown
    ///
    /// Stored entries whose version string does not parse are skipped.
    pub fn list_versions(&self, id: &ModuleId) -> Result<Vec<StoredVersion>, CatalogError> {
        let records = self.repository.list_version_records(&self.key(id))?;
        Ok(records
            .into_iter()
            .filter(|record| record.status == VersionStatus::Published)
            .filter_map(|record| Self::parse_record(id, record))
            .collect())
    }

    /// A single version, published or beta
    pub fn get_version(
        &self,
        id: &ModuleId,
        version: &Version,
    ) -> Result<StoredVersion, CatalogError> {
        let raw = version.to_string();
        let not_found = || CatalogError::VersionNotFound {
            module: id.clone(),
            version: raw.clone(),
        };

        let record = self
            .repository
            .get_version_record(&self.key(id), &raw)?
            .ok_or_else(not_found)?;

        Self::parse_record(id, record).ok_or_else(not_found)
    }

    pub fn get_module_metadata(&self, id: &ModuleId) -> Result<ModuleMetadata, CatalogError> {
        self.repository
            .get_module(&self.key(id))?
            .ok_or_else(|| CatalogError::ModuleNotFound(id.clone()))
    }

    pub fn get_namespace(&self, name: &str) -> Result<Namespace, CatalogError> {
        self.repository
            .get_namespace(&self.namespace_key(name))?
            .ok_or_else(|| CatalogError::NamespaceNotFound(name.to_string()))
    }

    /// Targets published under (namespace, name) for a kind, e.g. provider platforms
    pub fn list_targets(
        &self,
        namespace: &str,
        name: &str,
        kind: ModuleKind,
    ) -> Result<Vec<String>, CatalogError> {
        self.repository
            .list_targets(&self.namespace_key(namespace), name, kind)
    }

    /// Publish a version
    ///
    /// The version string is stored in its canonical form.
    pub fn publish(&self, request: PublishRequest) -> Result<StoredVersion, CatalogError> {
        validate_identifier("namespace", &request.id.namespace)?;
        validate_identifier("name", &request.id.name)?;
        validate_identifier("target", &request.id.target)?;
        Self::validate_metadata(&request)?;

        let parsed = version::parse(&request.version)?;
        let request = PublishRequest {
            id: self.key(&request.id),
            version: parsed.to_string(),
            metadata: request.metadata,
        };

        let record = self.repository.insert_version(&request, Utc::now())?;
        Ok(StoredVersion {
            version: parsed,
            record,
        })
    }

    fn validate_metadata(request: &PublishRequest) -> Result<(), CatalogError> {
        let metadata = &request.metadata;

        if metadata.schema_version != METADATA_SCHEMA_VERSION {
            return Err(CatalogError::InvalidMetadata(format!(
                "unsupported schema_version {}, expected {}",
                metadata.schema_version, METADATA_SCHEMA_VERSION
            )));
        }

        if metadata.artifact.as_str().trim().is_empty() {
            return Err(CatalogError::InvalidMetadata(
                "artifact is required".to_string(),
            ));
        }

        if metadata.kind == ModuleKind::Provider {
            let platform_ok = request
                .id
                .target
                .split_once('_')
                .is_some_and(|(os, arch)| !os.is_empty() && !arch.is_empty());
            if !platform_ok {
                return Err(CatalogError::InvalidMetadata(format!(
                    "provider target '{}' must be <os>_<arch>",
                    request.id.target
                )));
            }
            if metadata.protocols.is_empty() {
                return Err(CatalogError::InvalidMetadata(
                    "providers must declare at least one protocol".to_string(),
                ));
            }
        } else if metadata.signing.is_some() {
            return Err(CatalogError::InvalidMetadata(
                "signing details only apply to providers".to_string(),
            ));
        }

        Ok(())
    }

    pub fn create_namespace(
        &self,
        name: &str,
        display_name: Option<String>,
    ) -> Result<Namespace, CatalogError> {
        validate_identifier("namespace", name)?;
        self.repository
            .create_namespace(&self.namespace_key(name), display_name)
    }

    pub fn set_namespace_trusted(&self, name: &str, trusted: bool) -> Result<(), CatalogError> {
        info!("Setting namespace {} trusted={}", name, trusted);
        self.repository
            .set_namespace_trusted(&self.namespace_key(name), trusted)
    }

    pub fn set_module_verified(&self, id: &ModuleId, verified: bool) -> Result<(), CatalogError> {
        info!("Setting module {} verified={}", id, verified);
        self.repository.set_module_verified(&self.key(id), verified)
    }

    /// Promote a beta version to published
    pub fn finalize_version(&self, id: &ModuleId, version: &Version) -> Result<(), CatalogError> {
        self.repository.set_version_status(
            &self.key(id),
            &version.to_string(),
            VersionStatus::Published,
        )
    }

    /// Soft-delete a version; its version string stays reserved
    pub fn delete_version(&self, id: &ModuleId, version: &Version) -> Result<(), CatalogError> {
        self.repository
            .set_version_status(&self.key(id), &version.to_string(), VersionStatus::Deleted)
    }

    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        self.repository.stats()
    }

    /// The module version published last, skipping betas and deleted versions
    pub fn most_recently_published(
        &self,
    ) -> Result<Option<(ModuleId, StoredVersion)>, CatalogError> {
        let Some((id, record)) = self.repository.most_recently_published(ModuleKind::Module)?
        else {
            return Ok(None);
        };
        Ok(Self::parse_record(&id, record).map(|stored| (id, stored)))
    }

    fn parse_record(id: &ModuleId, record: VersionRecord) -> Option<StoredVersion> {
        match version::parse(&record.version) {
            Ok(version) => Some(StoredVersion { version, record }),
            Err(e) => {
                warn!(
                    module = %id,
                    version = %record.version,
                    "Skipping malformed stored version: {}",
                    e
                );
                None
            }
        }
    }
}
