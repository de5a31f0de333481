//! Scope resolution (plural name + namespaced flag) backed by the discovery cache.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use kube::Client;
use tracing::debug;

use manifold_core::{Gvk, ResourceScope, ScopeResolver};

use crate::{discover, DiscoveredResource, DiscoveryCache};

pub struct KubeScope {
    client: Client,
    cache: Arc<DiscoveryCache>,
}

impl KubeScope {
    pub fn new(client: Client, cache: Arc<DiscoveryCache>) -> Self {
        Self { client, cache }
    }
}

#[async_trait]
impl ScopeResolver for KubeScope {
    async fn scope(&self, gvk: &Gvk) -> Result<ResourceScope> {
        let client = self.client.clone();
        let resources = self.cache.resources_or_rebuild(|| discover(client)).await?;
        let found = lookup(&resources, gvk)?;
        debug!(gvk = %gvk, plural = %found.plural, namespaced = found.namespaced, "scope resolved");
        Ok(found)
    }

    fn invalidate(&self) {
        self.cache.invalidate_resources();
    }
}

/// Find `gvk` among discovered resources.
pub fn lookup(resources: &[DiscoveredResource], gvk: &Gvk) -> Result<ResourceScope> {
    resources
        .iter()
        .find(|r| r.matches(gvk))
        .map(|r| ResourceScope { gvk: r.gvk(), plural: r.plural.clone(), namespaced: r.namespaced })
        .ok_or_else(|| anyhow!("GVK not found: {}", gvk))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn served() -> Vec<DiscoveredResource> {
        vec![
            DiscoveredResource { group: String::new(), version: "v1".into(), kind: "Namespace".into(), plural: "namespaces".into(), namespaced: false },
            DiscoveredResource { group: "apps".into(), version: "v1".into(), kind: "Deployment".into(), plural: "deployments".into(), namespaced: true },
        ]
    }

    #[test]
    fn lookup_returns_plural_and_scope() {
        let s = lookup(&served(), &Gvk::new("apps", "v1", "Deployment")).expect("ok");
        assert_eq!(s.plural, "deployments");
        assert!(s.namespaced);
        let ns = lookup(&served(), &Gvk::new("", "v1", "Namespace")).expect("ok");
        assert!(!ns.namespaced);
    }

    #[test]
    fn lookup_unknown_kind_errors() {
        let err = lookup(&served(), &Gvk::new("example.com", "v1", "Widget")).unwrap_err();
        assert!(err.to_string().contains("example.com/v1/Widget"));
        assert!(lookup(&served(), &Gvk::new("apps", "v2", "Deployment")).is_err());
    }
}
