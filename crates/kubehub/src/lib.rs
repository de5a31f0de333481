//! Manifold kubehub: kube client, discovery cache, scope resolution and the dynamic
//! store transport.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use kube::{
    discovery::{Discovery, Scope},
    Client,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use manifold_core::Gvk;

pub mod cache;
pub mod scope;
pub mod transport;

pub use cache::DiscoveryCache;
pub use scope::KubeScope;
pub use transport::{KubeHandle, KubeTransport};

static CLIENT: Lazy<OnceCell<Client>> = Lazy::new(OnceCell::new);

/// Process-wide kube client built from the default kubeconfig / in-cluster config.
pub async fn get_kube_client() -> Result<Client> {
    let client = CLIENT
        .get_or_try_init(|| async { Client::try_default().await.context("building kube client") })
        .await?;
    Ok(client.clone())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredResource {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl DiscoveredResource {
    pub fn gvk(&self) -> Gvk {
        Gvk::new(self.group.clone(), self.version.clone(), self.kind.clone())
    }

    pub fn matches(&self, gvk: &Gvk) -> bool {
        self.group == gvk.group && self.version == gvk.version && self.kind == gvk.kind
    }
}

/// Discover served resources (incl. CRDs) using kube Discovery.
pub async fn discover(client: Client) -> Result<Vec<DiscoveredResource>> {
    let discovery = Discovery::new(client).run().await.context("running API discovery")?;
    let mut out = Vec::new();
    for group in discovery.groups() {
        // every served version, not just the preferred one
        for version in group.versions() {
            for (ar, caps) in group.versioned_resources(version) {
                out.push(DiscoveredResource {
                    group: ar.group.clone(),
                    version: ar.version.clone(),
                    kind: ar.kind.clone(),
                    plural: ar.plural.clone(),
                    namespaced: matches!(caps.scope, Scope::Namespaced),
                });
            }
        }
    }
    out.sort_by(|a, b| a.group.cmp(&b.group).then(a.version.cmp(&b.version)).then(a.kind.cmp(&b.kind)));
    debug!(count = out.len(), "discovery complete");
    Ok(out)
}
