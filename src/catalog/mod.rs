//! Namespace, module and version catalog
//!
//! The repository trait is the persistence seam; [`SqliteCatalog`] is the
//! durable implementation and [`CachedRepository`] an optional listing cache
//! in front of it. [`CatalogStore`] is what the rest of the registry talks to.

pub mod cached;
pub mod error;
pub mod repository;
pub mod sqlite;
pub mod store;
pub mod types;

pub use cached::CachedRepository;
pub use error::CatalogError;
pub use repository::CatalogRepository;
pub use sqlite::SqliteCatalog;
pub use store::{CatalogStore, validate_identifier};
pub use types::{
    ArtifactRef, CatalogStats, GpgPublicKey, METADATA_SCHEMA_VERSION, ModuleId, ModuleKind,
    ModuleMetadata, Namespace, ProviderSigning, PublishRequest, StoredVersion, VersionMetadata,
    VersionRecord, VersionStatus,
};
