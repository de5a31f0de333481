//! Shared cache of discovered resource types and resolved schemas.
//!
//! Every apply may change the set of served kinds (a CRD being one of the objects
//! applied), so callers invalidate after each write. Invalidation swaps in an empty
//! snapshot; the next read rebuilds. Staleness only ever costs a rebuild.
//! Resources and schemas are invalidated separately by their respective owners.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use arc_swap::{ArcSwap, ArcSwapOption};
use metrics::counter;
use once_cell::sync::Lazy;
use tracing::debug;

use manifold_core::Type;

use crate::DiscoveredResource;

static GLOBAL: Lazy<Arc<DiscoveryCache>> = Lazy::new(|| Arc::new(DiscoveryCache::new()));

#[derive(Default)]
pub struct DiscoveryCache {
    resources: ArcSwapOption<Vec<DiscoveredResource>>,
    schemas: ArcSwap<HashMap<String, Type>>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance.
    pub fn global() -> Arc<DiscoveryCache> {
        Arc::clone(&GLOBAL)
    }

    /// Cached resource list, or the result of `rebuild` stored for later readers.
    pub async fn resources_or_rebuild<F, Fut>(&self, rebuild: F) -> Result<Arc<Vec<DiscoveredResource>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<DiscoveredResource>>>,
    {
        if let Some(cached) = self.resources.load_full() {
            return Ok(cached);
        }
        let fresh = Arc::new(rebuild().await?);
        counter!("discovery_rebuild_total", 1u64);
        self.resources.store(Some(Arc::clone(&fresh)));
        Ok(fresh)
    }

    pub fn schema(&self, key: &str) -> Option<Type> {
        self.schemas.load().get(key).cloned()
    }

    pub fn put_schema(&self, key: &str, ty: Type) {
        self.schemas.rcu(|cur| {
            let mut next = HashMap::clone(cur);
            next.insert(key.to_string(), ty.clone());
            next
        });
    }

    /// Drop the resource snapshot. Schemas are left alone; a scope resolver and a schema
    /// source sharing one cache each clear their own half, so a full reset after an
    /// apply touches every part once.
    pub fn invalidate_resources(&self) {
        self.resources.store(None);
        counter!("discovery_invalidations_total", 1u64);
        debug!("discovery snapshot invalidated");
    }

    pub fn invalidate_schemas(&self) {
        self.schemas.store(Arc::new(HashMap::new()));
        counter!("schema_cache_invalidations_total", 1u64);
        debug!("schema cache invalidated");
    }

    pub fn is_warm(&self) -> bool {
        self.resources.load().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cm() -> DiscoveredResource {
        DiscoveredResource { group: String::new(), version: "v1".into(), kind: "ConfigMap".into(), plural: "configmaps".into(), namespaced: true }
    }

    #[tokio::test]
    async fn rebuilds_only_after_invalidate() {
        let cache = DiscoveryCache::new();
        let calls = AtomicUsize::new(0);
        let rebuild = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![cm()])
        };
        assert!(!cache.is_warm());
        let a = cache.resources_or_rebuild(rebuild).await.unwrap();
        let b = cache.resources_or_rebuild(rebuild).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        cache.invalidate_resources();
        assert!(!cache.is_warm());
        cache.resources_or_rebuild(rebuild).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_rebuild_leaves_cache_cold() {
        let cache = DiscoveryCache::new();
        let res = cache.resources_or_rebuild(|| async { Err(anyhow::anyhow!("apiserver unreachable")) }).await;
        assert!(res.is_err());
        assert!(!cache.is_warm());
    }

    #[tokio::test]
    async fn halves_are_invalidated_independently() {
        let cache = DiscoveryCache::new();
        cache.resources_or_rebuild(|| async { Ok(vec![cm()]) }).await.unwrap();
        cache.put_schema("v1/ConfigMap", Type::String);
        assert_eq!(cache.schema("v1/ConfigMap"), Some(Type::String));

        cache.invalidate_schemas();
        assert!(cache.schema("v1/ConfigMap").is_none());
        assert!(cache.is_warm());

        cache.put_schema("v1/ConfigMap", Type::String);
        cache.invalidate_resources();
        assert!(!cache.is_warm());
        assert_eq!(cache.schema("v1/ConfigMap"), Some(Type::String));
    }
}
