//! Application-owned registry of service handles
//!
//! With caching on, each handle (manager, catalog, crawl scope, query
//! service) is created on first use and kept. Every handle warms the ones it
//! depends on itself, so asking for the crawl scope manager first is fine.
//! With caching off, every call builds fresh handles.

use crate::error::{SearchError, SearchResult, ServiceResult};
use crate::service::{
    CatalogManager, CrawlScopeManager, QueryService, SYSTEM_INDEX, SearchBackend, SearchManager,
};
use std::sync::{Arc, Mutex, PoisonError};

/// Whether the registry keeps handles between calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub cache: bool,
}

impl CachePolicy {
    pub fn cached() -> Self {
        Self { cache: true }
    }

    pub fn uncached() -> Self {
        Self { cache: false }
    }
}

type Slot<T> = Mutex<Option<Arc<T>>>;

pub struct ServiceRegistry {
    backend: Arc<dyn SearchBackend>,
    policy: CachePolicy,
    manager: Slot<dyn SearchManager>,
    catalog: Slot<dyn CatalogManager>,
    crawl_scope: Slot<dyn CrawlScopeManager>,
    query: Slot<dyn QueryService>,
}

impl ServiceRegistry {
    pub fn new(backend: Arc<dyn SearchBackend>, policy: CachePolicy) -> Self {
        Self {
            backend,
            policy,
            manager: Mutex::new(None),
            catalog: Mutex::new(None),
            crawl_scope: Mutex::new(None),
            query: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn cached<T: ?Sized>(
        &self,
        slot: &Slot<T>,
        create: impl FnOnce() -> ServiceResult<Arc<T>>,
    ) -> ServiceResult<Arc<T>> {
        if !self.policy.cache {
            return create();
        }

        if let Some(handle) = slot.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(handle));
        }

        let handle = create()?;
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&handle));
        Ok(handle)
    }

    pub fn search_manager(&self) -> ServiceResult<Arc<dyn SearchManager>> {
        self.cached(&self.manager, || self.backend.search_manager())
    }

    pub fn system_index_catalog(&self) -> ServiceResult<Arc<dyn CatalogManager>> {
        self.cached(&self.catalog, || self.search_manager()?.catalog(SYSTEM_INDEX))
    }

    pub fn crawl_scope_manager(&self) -> ServiceResult<Arc<dyn CrawlScopeManager>> {
        self.cached(&self.crawl_scope, || {
            self.system_index_catalog()?.crawl_scope_manager()
        })
    }

    pub fn query_service(&self) -> ServiceResult<Arc<dyn QueryService>> {
        self.cached(&self.query, || self.backend.query_service())
    }

    /// Whether `path` lies inside the system index crawl scope
    pub fn is_path_included_in_index(&self, path: &str) -> SearchResult<bool> {
        self.crawl_scope_manager()
            .and_then(|scope| scope.included_in_crawl_scope(path))
            .map_err(SearchError::ScopeCheckFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::memory::{MemoryIndex, MemoryItem};

    fn index() -> Arc<MemoryIndex> {
        MemoryIndex::new(vec![MemoryItem::file("/home/a/docs/x.txt")], &["/home/a/docs"])
    }

    #[test]
    fn test_cached_crawl_scope_warms_its_own_dependencies() {
        let index = index();
        let registry = ServiceRegistry::new(index.clone(), CachePolicy::cached());

        // nothing warmed beforehand
        assert!(registry.is_path_included_in_index("/home/a/docs/x.txt").unwrap());
        assert_eq!(index.stats().admin_handles_created, 3);

        assert!(!registry.is_path_included_in_index("/home/b").unwrap());
        registry.search_manager().unwrap();
        registry.system_index_catalog().unwrap();
        assert_eq!(index.stats().admin_handles_created, 3);
    }

    #[test]
    fn test_uncached_creates_per_call() {
        let index = index();
        let registry = ServiceRegistry::new(index.clone(), CachePolicy::uncached());

        registry.is_path_included_in_index("/home/a/docs").unwrap();
        registry.is_path_included_in_index("/home/a/docs").unwrap();
        assert_eq!(index.stats().admin_handles_created, 6);
    }

    #[test]
    fn test_cached_catalog_without_manager_first() {
        let index = index();
        let registry = ServiceRegistry::new(index.clone(), CachePolicy::cached());
        registry.system_index_catalog().unwrap();
        registry.search_manager().unwrap();
        assert_eq!(index.stats().admin_handles_created, 2);
    }

    #[test]
    fn test_scope_check_failure() {
        let index = index();
        index.set_online(false);
        let registry = ServiceRegistry::new(index, CachePolicy::cached());
        assert!(matches!(
            registry.is_path_included_in_index("/home/a"),
            Err(SearchError::ScopeCheckFailed(_))
        ));
    }

    #[test]
    fn test_failed_creation_is_not_cached() {
        let index = index();
        index.set_online(false);
        let registry = ServiceRegistry::new(index.clone(), CachePolicy::cached());
        assert!(registry.search_manager().is_err());

        index.set_online(true);
        assert!(registry.search_manager().is_ok());
    }
}
