//! Catalog data model

use std::fmt;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Identity of a publishable unit: (namespace, name, target)
///
/// For modules the target is the provider the module is written for
/// (e.g. `aws`); for providers it is the `<os>_<arch>` platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    pub namespace: String,
    pub name: String,
    pub target: String,
}

impl ModuleId {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            target: target.into(),
        }
    }

    /// Source string as used by clients: `namespace/name/target`
    pub fn source(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.name, self.target)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.name, self.target)
    }
}

/// Kind of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    #[default]
    Module,
    Provider,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Module => "module",
            ModuleKind::Provider => "provider",
        }
    }
}

impl std::str::FromStr for ModuleKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "module" => Ok(ModuleKind::Module),
            "provider" => Ok(ModuleKind::Provider),
            _ => Err(()),
        }
    }
}

/// Lifecycle of a version
///
/// `Beta` -> `Published` is one-way. `Deleted` is terminal and hides the
/// version from every read while still reserving its version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Beta,
    Published,
    Deleted,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Beta => "beta",
            VersionStatus::Published => "published",
            VersionStatus::Deleted => "deleted",
        }
    }

    /// Whether moving from `self` to `next` is permitted
    pub fn can_transition_to(&self, next: VersionStatus) -> bool {
        matches!(
            (self, next),
            (VersionStatus::Beta, VersionStatus::Published)
                | (VersionStatus::Beta, VersionStatus::Deleted)
                | (VersionStatus::Published, VersionStatus::Deleted)
        )
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VersionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beta" => Ok(VersionStatus::Beta),
            "published" => Ok(VersionStatus::Published),
            "deleted" => Ok(VersionStatus::Deleted),
            _ => Err(()),
        }
    }
}

/// Opaque handle into the blob store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
    pub display_name: Option<String>,
    /// Set by an administrator; combined with the configured trusted list
    pub trusted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadata {
    pub id: ModuleId,
    pub kind: ModuleKind,
    pub verified: bool,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Current version of the publish metadata schema
pub const METADATA_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    METADATA_SCHEMA_VERSION
}

/// Metadata supplied when publishing a version
///
/// `artifact` is required; everything else is optional. Unknown fields are
/// rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionMetadata {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub artifact: ArtifactRef,
    #[serde(default)]
    pub kind: ModuleKind,
    /// Publish as beta: reachable by exact version only
    #[serde(default)]
    pub beta: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub provider_logo: Option<String>,
    /// Plugin protocol versions (providers only)
    #[serde(default)]
    pub protocols: Vec<String>,
    /// SHA-256 of the artifact (providers only)
    #[serde(default)]
    pub shasum: Option<String>,
    /// Checksum file, its signature and the keys that signed it (providers only)
    #[serde(default)]
    pub signing: Option<ProviderSigning>,
}

/// Signed checksums published alongside a provider package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSigning {
    pub shasums_url: String,
    pub shasums_signature_url: String,
    #[serde(default)]
    pub gpg_public_keys: Vec<GpgPublicKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GpgPublicKey {
    pub key_id: String,
    pub ascii_armor: String,
    #[serde(default)]
    pub trust_signature: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl VersionMetadata {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            schema_version: METADATA_SCHEMA_VERSION,
            artifact: ArtifactRef::new(artifact),
            kind: ModuleKind::Module,
            beta: false,
            description: None,
            owner: None,
            source_url: None,
            provider_logo: None,
            protocols: Vec::new(),
            shasum: None,
            signing: None,
        }
    }
}

/// A request to publish one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub id: ModuleId,
    pub version: String,
    pub metadata: VersionMetadata,
}

impl PublishRequest {
    pub fn new(id: ModuleId, version: impl Into<String>, metadata: VersionMetadata) -> Self {
        Self {
            id,
            version: version.into(),
            metadata,
        }
    }
}

/// A version row as persisted; the version string is not validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub version: String,
    pub status: VersionStatus,
    pub artifact: ArtifactRef,
    pub published_at: DateTime<Utc>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub source_url: Option<String>,
    pub provider_logo: Option<String>,
    pub protocols: Vec<String>,
    pub shasum: Option<String>,
    pub signing: Option<ProviderSigning>,
}

/// A stored version whose version string parsed successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    pub version: Version,
    pub record: VersionRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub namespaces: u64,
    pub modules: u64,
    pub module_versions: u64,
}
