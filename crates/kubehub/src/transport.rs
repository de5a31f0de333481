//! Dynamic store transport over `Api<DynamicObject>`.

use std::sync::Arc;

use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use serde_json::Value as Json;
use tracing::debug;

use manifold_core::{ResourceHandle, ResourceScope, StoreError, StoreStatus, Transport};

pub struct KubeTransport {
    client: Client,
}

impl KubeTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for KubeTransport {
    fn handle(&self, scope: &ResourceScope, namespace: Option<&str>) -> Arc<dyn ResourceHandle> {
        let ar = api_resource(scope);
        let api = match (scope.namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        };
        Arc::new(KubeHandle { api })
    }
}

pub struct KubeHandle {
    api: Api<DynamicObject>,
}

#[async_trait]
impl ResourceHandle for KubeHandle {
    async fn get(&self, name: &str) -> Result<Json, StoreError> {
        let obj = self.api.get(name).await.map_err(map_kube_error)?;
        encode(&obj)
    }

    async fn apply_patch(&self, name: &str, payload: &Json, field_manager: &str) -> Result<Json, StoreError> {
        let pp = PatchParams::apply(field_manager);
        let obj = self.api.patch(name, &pp, &Patch::Apply(payload)).await.map_err(map_kube_error)?;
        debug!(name, field_manager, "server-side apply ok");
        encode(&obj)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.api.delete(name, &DeleteParams::default()).await.map_err(map_kube_error)?;
        Ok(())
    }
}

pub fn api_resource(scope: &ResourceScope) -> ApiResource {
    let gvk = GroupVersionKind::gvk(&scope.gvk.group, &scope.gvk.version, &scope.gvk.kind);
    ApiResource::from_gvk_with_plural(&gvk, &scope.plural)
}

/// kube's error response carries no per-field causes; only the status line survives.
pub fn map_kube_error(e: kube::Error) -> StoreError {
    match e {
        kube::Error::Api(ae) => StoreError::Status(StoreStatus {
            status: ae.status,
            code: ae.code,
            reason: ae.reason,
            message: ae.message,
            causes: Vec::new(),
        }),
        other => StoreError::Transport(other.to_string()),
    }
}

fn encode(obj: &DynamicObject) -> Result<Json, StoreError> {
    serde_json::to_value(obj).map_err(|e| StoreError::Transport(format!("encoding response object: {e}")))
}
