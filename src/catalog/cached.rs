//! Listing cache in front of a catalog repository
//!
//! Version listings are cached per module and invalidated synchronously by
//! every write touching that module, before the write returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::catalog::error::CatalogError;
use crate::catalog::repository::CatalogRepository;
use crate::catalog::types::{
    CatalogStats, ModuleId, ModuleKind, ModuleMetadata, Namespace, PublishRequest, VersionRecord,
    VersionStatus,
};

#[derive(Default)]
struct CacheState {
    /// Bumped on every invalidation; a listing read under an older
    /// generation is never inserted.
    generation: u64,
    listings: HashMap<ModuleId, Arc<Vec<VersionRecord>>>,
}

pub struct CachedRepository<R: CatalogRepository> {
    inner: R,
    state: Mutex<CacheState>,
}

impl<R: CatalogRepository> CachedRepository<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, CacheState>, CatalogError> {
        self.state.lock().map_err(|_| CatalogError::LockPoisoned)
    }

    fn invalidate(&self, id: &ModuleId) -> Result<(), CatalogError> {
        let mut state = self.lock_state()?;
        state.generation += 1;
        state.listings.remove(id);
        debug!("Invalidated version listing for {}", id);
        Ok(())
    }

    /// Number of cached listings
    pub fn cached_listings(&self) -> usize {
        self.lock_state().map(|s| s.listings.len()).unwrap_or(0)
    }
}

impl<R: CatalogRepository> CatalogRepository for CachedRepository<R> {
    fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, CatalogError> {
        self.inner.get_namespace(name)
    }

    fn create_namespace(
        &self,
        name: &str,
        display_name: Option<String>,
    ) -> Result<Namespace, CatalogError> {
        self.inner.create_namespace(name, display_name)
    }

    fn set_namespace_trusted(&self, name: &str, trusted: bool) -> Result<(), CatalogError> {
        self.inner.set_namespace_trusted(name, trusted)
    }

    fn get_module(&self, id: &ModuleId) -> Result<Option<ModuleMetadata>, CatalogError> {
        self.inner.get_module(id)
    }

    fn set_module_verified(&self, id: &ModuleId, verified: bool) -> Result<(), CatalogError> {
        self.inner.set_module_verified(id, verified)
    }

    fn list_targets(
        &self,
        namespace: &str,
        name: &str,
        kind: ModuleKind,
    ) -> Result<Vec<String>, CatalogError> {
        self.inner.list_targets(namespace, name, kind)
    }

    fn list_version_records(&self, id: &ModuleId) -> Result<Vec<VersionRecord>, CatalogError> {
        let generation = {
            let state = self.lock_state()?;
            if let Some(records) = state.listings.get(id) {
                debug!("Version listing cache hit for {}", id);
                return Ok(records.as_ref().clone());
            }
            state.generation
        };

        debug!("Version listing cache miss for {}", id);
        let records = self.inner.list_version_records(id)?;

        let mut state = self.lock_state()?;
        if state.generation == generation {
            state
                .listings
                .insert(id.clone(), Arc::new(records.clone()));
        }
        Ok(records)
    }

    fn get_version_record(
        &self,
        id: &ModuleId,
        version: &str,
    ) -> Result<Option<VersionRecord>, CatalogError> {
        self.inner.get_version_record(id, version)
    }

    fn insert_version(
        &self,
        request: &PublishRequest,
        published_at: DateTime<Utc>,
    ) -> Result<VersionRecord, CatalogError> {
        let result = self.inner.insert_version(request, published_at);
        self.invalidate(&request.id)?;
        result
    }

    fn set_version_status(
        &self,
        id: &ModuleId,
        version: &str,
        status: VersionStatus,
    ) -> Result<(), CatalogError> {
        let result = self.inner.set_version_status(id, version, status);
        self.invalidate(id)?;
        result
    }

    fn stats(&self) -> Result<CatalogStats, CatalogError> {
        self.inner.stats()
    }

    fn most_recently_published(
        &self,
        kind: ModuleKind,
    ) -> Result<Option<(ModuleId, VersionRecord)>, CatalogError> {
        self.inner.most_recently_published(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::repository::MockCatalogRepository;
    use crate::catalog::types::{ArtifactRef, VersionMetadata};

    fn record(version: &str) -> VersionRecord {
        VersionRecord {
            version: version.to_string(),
            status: VersionStatus::Published,
            artifact: ArtifactRef::new(format!("{}.zip", version)),
            published_at: Utc::now(),
            description: None,
            owner: None,
            source_url: None,
            provider_logo: None,
            protocols: Vec::new(),
            shasum: None,
            signing: None,
        }
    }

    #[test]
    fn list_version_records_hits_inner_once_until_invalidated() {
        let id = ModuleId::new("acme", "vpc", "aws");
        let mut mock = MockCatalogRepository::new();
        mock.expect_list_version_records()
            .times(2)
            .returning(|_| Ok(vec![record("1.0.0")]));
        mock.expect_insert_version()
            .times(1)
            .returning(|request, _| Ok(record(&request.version)));

        let cached = CachedRepository::new(mock);

        assert_eq!(cached.list_version_records(&id).unwrap().len(), 1);
        assert_eq!(cached.list_version_records(&id).unwrap().len(), 1);
        assert_eq!(cached.cached_listings(), 1);

        let request = PublishRequest::new(id.clone(), "1.1.0", VersionMetadata::new("a.zip"));
        cached.insert_version(&request, Utc::now()).unwrap();
        assert_eq!(cached.cached_listings(), 0);

        // Second inner call after invalidation
        cached.list_version_records(&id).unwrap();
    }

    #[test]
    fn failed_write_still_invalidates() {
        let id = ModuleId::new("acme", "vpc", "aws");
        let mut mock = MockCatalogRepository::new();
        mock.expect_list_version_records()
            .returning(|_| Ok(vec![record("1.0.0")]));
        mock.expect_set_version_status().returning(|id, version, _| {
            Err(CatalogError::VersionNotFound {
                module: id.clone(),
                version: version.to_string(),
            })
        });

        let cached = CachedRepository::new(mock);
        cached.list_version_records(&id).unwrap();

        assert!(
            cached
                .set_version_status(&id, "9.9.9", VersionStatus::Deleted)
                .is_err()
        );
        assert_eq!(cached.cached_listings(), 0);
    }

    #[test]
    fn listings_are_cached_per_module() {
        let mut mock = MockCatalogRepository::new();
        mock.expect_list_version_records()
            .times(2)
            .returning(|_| Ok(Vec::new()));

        let cached = CachedRepository::new(mock);
        cached
            .list_version_records(&ModuleId::new("a", "b", "c"))
            .unwrap();
        cached
            .list_version_records(&ModuleId::new("a", "b", "d"))
            .unwrap();
        cached
            .list_version_records(&ModuleId::new("a", "b", "c"))
            .unwrap();

        assert_eq!(cached.cached_listings(), 2);
    }
}
