//! Schema source backed by CustomResourceDefinitions, with a static registry for
//! built-in kinds.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1 as apiextv1;
use kube::{api::ListParams, Api, Client};
use serde_json::Value as Json;
use tracing::{debug, trace};

use manifold_core::{Gvk, SchemaSource, SchemaVariant, Type};
use manifold_kubehub::DiscoveryCache;

use crate::{crd_type, variant_of, SchemaRegistry};

pub struct CrdSchemaSource {
    client: Client,
    cache: Arc<DiscoveryCache>,
    registry: SchemaRegistry,
}

impl CrdSchemaSource {
    pub fn new(client: Client, cache: Arc<DiscoveryCache>, registry: SchemaRegistry) -> Self {
        Self { client, cache, registry }
    }

    async fn full_type(&self, gvk: &Gvk) -> Result<Type> {
        if let Some(t) = self.registry.full(gvk) {
            return Ok(t.clone());
        }
        let key = gvk.key();
        if let Some(t) = self.cache.schema(&key) {
            trace!(gvk = %gvk, "schema cache hit");
            return Ok(t);
        }
        if gvk.group.is_empty() {
            return Err(anyhow!("no schema registered for built-in kind {}", gvk));
        }
        let crd = self.fetch_crd(gvk).await?;
        let schema = version_schema(&crd, &gvk.version)?;
        let ty = crd_type(schema).with_context(|| format!("converting openAPIV3Schema of {}", gvk))?;
        self.cache.put_schema(&key, ty.clone());
        debug!(gvk = %gvk, "schema loaded from CRD");
        Ok(ty)
    }

    async fn fetch_crd(&self, gvk: &Gvk) -> Result<Json> {
        let api: Api<apiextv1::CustomResourceDefinition> = Api::all(self.client.clone());
        let crds = api.list(&ListParams::default()).await.context("listing CustomResourceDefinitions")?;
        for crd in crds {
            if crd.spec.group == gvk.group && crd.spec.names.kind == gvk.kind {
                return serde_json::to_value(&crd).context("encoding CRD");
            }
        }
        Err(anyhow!("CRD not found for {}", gvk))
    }
}

#[async_trait]
impl SchemaSource for CrdSchemaSource {
    async fn type_for_kind(&self, gvk: &Gvk, variant: SchemaVariant) -> Result<Type> {
        Ok(variant_of(self.full_type(gvk).await?, variant))
    }

    fn invalidate(&self) {
        self.cache.invalidate_schemas();
    }
}

/// `openAPIV3Schema` of the named version; the legacy top-level
/// `spec.validation` schema applies when the version carries none.
pub fn version_schema<'a>(crd: &'a Json, version: &str) -> Result<&'a Json> {
    let spec = crd.get("spec").ok_or_else(|| anyhow!("CRD has no spec"))?;
    let versions = spec.get("versions").and_then(Json::as_array).map(Vec::as_slice).unwrap_or_default();
    let ver = versions
        .iter()
        .find(|v| v.get("name").and_then(Json::as_str) == Some(version))
        .ok_or_else(|| anyhow!("CRD does not define version {}", version))?;
    if ver.get("served").and_then(Json::as_bool) == Some(false) {
        return Err(anyhow!("CRD version {} is not served", version));
    }
    ver.get("schema")
        .and_then(|s| s.get("openAPIV3Schema"))
        .or_else(|| spec.get("validation").and_then(|s| s.get("openAPIV3Schema")))
        .ok_or_else(|| anyhow!("CRD version {} has no openAPIV3Schema", version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crd() -> Json {
        json!({
            "spec": {
                "group": "example.com",
                "names": {"kind": "Widget", "plural": "widgets"},
                "versions": [
                    {"name": "v1alpha1", "served": false, "storage": false},
                    {"name": "v1", "served": true, "storage": true,
                     "schema": {"openAPIV3Schema": {"type": "object", "properties": {
                        "spec": {"type": "object", "properties": {"size": {"type": "integer"}}},
                        "status": {"type": "object", "properties": {"ready": {"type": "boolean"}}}
                     }}}}
                ]
            }
        })
    }

    #[test]
    fn picks_requested_version() {
        let crd = crd();
        let s = version_schema(&crd, "v1").expect("ok");
        assert!(s.get("properties").is_some());
        assert!(version_schema(&crd, "v1alpha1").is_err());
        assert!(version_schema(&crd, "v2").is_err());
    }

    #[test]
    fn legacy_validation_schema_is_used() {
        let crd = json!({"spec": {"versions": [{"name": "v1beta1", "served": true}],
            "validation": {"openAPIV3Schema": {"type": "object"}}}});
        assert_eq!(version_schema(&crd, "v1beta1").expect("ok"), &json!({"type": "object"}));
    }

    #[test]
    fn write_variant_of_crd_type_drops_status() {
        let crd = crd();
        let full = crd_type(version_schema(&crd, "v1").expect("ok")).expect("type");
        assert!(full.attribute("status").is_some());
        let write = variant_of(full, SchemaVariant::Write);
        assert!(write.attribute("status").is_none());
        assert!(write.attribute("spec").is_some());
    }

    #[tokio::test]
    async fn scope_and_schema_sources_clear_their_own_half_of_a_shared_cache() {
        use manifold_core::ScopeResolver;
        use manifold_kubehub::{DiscoveredResource, KubeScope};

        let config = kube::Config::new("http://127.0.0.1:6443".parse().expect("uri"));
        let client = Client::try_from(config).expect("client");
        let cache = Arc::new(DiscoveryCache::new());
        let scopes = KubeScope::new(client.clone(), Arc::clone(&cache));
        let schemas = CrdSchemaSource::new(client, Arc::clone(&cache), SchemaRegistry::new());

        let widget = DiscoveredResource { group: "example.com".into(), version: "v1".into(), kind: "Widget".into(), plural: "widgets".into(), namespaced: true };
        cache.resources_or_rebuild(|| async { Ok(vec![widget]) }).await.expect("warm");
        cache.put_schema("example.com/v1/Widget", Type::String);

        ScopeResolver::invalidate(&scopes);
        assert!(!cache.is_warm());
        assert!(cache.schema("example.com/v1/Widget").is_some());

        SchemaSource::invalidate(&schemas);
        assert!(cache.schema("example.com/v1/Widget").is_none());
    }
}
