//! Registry mapping code-host service IDs to permissions fetchers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::rate_limit::RateLimitedFetcher;
use super::types::PermsFetcher;

/// Read-mostly registry of [`PermsFetcher`] implementations, keyed by
/// service ID.
///
/// Not every authorization provider participates in background syncing;
/// absence from the registry means "do not sync". Lookups hand out `Arc`
/// clones and [`snapshot`](Self::snapshot) clones the whole map, so swapping
/// the registry with [`replace_all`](Self::replace_all) never invalidates
/// the view a running sync captured.
#[derive(Default)]
pub struct FetcherRegistry {
    inner: RwLock<HashMap<String, Arc<dyn PermsFetcher>>>,
}

impl FetcherRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetcher under its own service ID, replacing any previous
    /// fetcher for that service.
    pub fn register(&self, fetcher: Arc<dyn PermsFetcher>) {
        let service_id = fetcher.service_id().to_string();
        self.write_lock().insert(service_id, fetcher);
    }

    /// Register a fetcher wrapped in a rate-limiting decorator.
    pub fn register_rate_limited<F>(&self, fetcher: F, requests_per_second: u32)
    where
        F: PermsFetcher + 'static,
    {
        self.register(Arc::new(RateLimitedFetcher::new(
            fetcher,
            requests_per_second,
        )));
    }

    /// Look up the fetcher for a service ID.
    pub fn by_service_id(&self, service_id: &str) -> Option<Arc<dyn PermsFetcher>> {
        self.read_lock().get(service_id).map(Arc::clone)
    }

    /// Clone the full service-ID → fetcher map.
    ///
    /// A sync in flight works against the snapshot it captured, independent
    /// of later registry swaps.
    pub fn snapshot(&self) -> HashMap<String, Arc<dyn PermsFetcher>> {
        self.read_lock().clone()
    }

    /// Replace the whole registry with a new set of fetchers.
    pub fn replace_all(&self, fetchers: Vec<Arc<dyn PermsFetcher>>) {
        let mut map = HashMap::with_capacity(fetchers.len());
        for fetcher in fetchers {
            map.insert(fetcher.service_id().to_string(), fetcher);
        }
        *self.write_lock() = map;
    }

    /// Number of registered fetchers.
    pub fn len(&self) -> usize {
        self.read_lock().len()
    }

    /// Whether no fetchers are registered.
    pub fn is_empty(&self) -> bool {
        self.read_lock().is_empty()
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn PermsFetcher>>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn PermsFetcher>>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services: Vec<String> = self.read_lock().keys().cloned().collect();
        f.debug_struct("FetcherRegistry")
            .field("services", &services)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::external_account::Model as ExternalAccount;
    use crate::fetcher::{ExternalAccountId, ExternalRepoId, ExternalRepoSpec, FetchResult};
    use async_trait::async_trait;

    struct StaticFetcher {
        service_type: String,
        service_id: String,
    }

    #[async_trait]
    impl crate::fetcher::PermsFetcher for StaticFetcher {
        fn service_type(&self) -> &str {
            &self.service_type
        }

        fn service_id(&self) -> &str {
            &self.service_id
        }

        async fn fetch_user_perms(
            &self,
            _account: &ExternalAccount,
        ) -> FetchResult<ExternalRepoId> {
            FetchResult::ok(Vec::new())
        }

        async fn fetch_repo_perms(
            &self,
            _repo: &ExternalRepoSpec,
        ) -> FetchResult<ExternalAccountId> {
            FetchResult::ok(Vec::new())
        }
    }

    fn fetcher(service_id: &str) -> Arc<dyn crate::fetcher::PermsFetcher> {
        Arc::new(StaticFetcher {
            service_type: "gitlab".to_string(),
            service_id: service_id.to_string(),
        })
    }

    #[test]
    fn lookup_by_service_id() {
        let registry = FetcherRegistry::new();
        registry.register(fetcher("https://gitlab.example.com/"));

        assert!(registry.by_service_id("https://gitlab.example.com/").is_some());
        assert!(registry.by_service_id("https://other.example.com/").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_replaces_same_service() {
        let registry = FetcherRegistry::new();
        registry.register(fetcher("https://gitlab.example.com/"));
        registry.register(fetcher("https://gitlab.example.com/"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_survives_replace_all() {
        let registry = FetcherRegistry::new();
        registry.register(fetcher("https://gitlab.example.com/"));

        let snapshot = registry.snapshot();
        registry.replace_all(vec![fetcher("https://other.example.com/")]);

        // The captured snapshot still resolves the old service.
        assert!(snapshot.contains_key("https://gitlab.example.com/"));
        assert!(registry.by_service_id("https://gitlab.example.com/").is_none());
        assert!(registry.by_service_id("https://other.example.com/").is_some());
    }
}
