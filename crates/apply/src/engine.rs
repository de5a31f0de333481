use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use manifold_core::{
    CompletionWaiter, Gvk, Path, ResourceHandle, SchemaSource, SchemaVariant, ScopeResolver, StoreError, Transport, Type, Value,
};
use manifold_morph::{collapse_unknown_to_null, expand_to_unknown, from_untyped, to_untyped};

use crate::computed::{backfill, ComputedFields};
use crate::diag::{status_diagnostics, Diagnostic};
use crate::error::ApplyError;
use crate::payload::{gvk_of, json_node_budget_exceeded, max_payload_nodes, remove_nulls, strip_server_side_fields, ResourceId};
use crate::{FIELD_MANAGER, MANIFEST_RESOURCE_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Noop,
}

impl Operation {
    pub fn of(prior: &Value, planned: &Value) -> Operation {
        match (prior.is_null(), planned.is_null()) {
            (true, true) => Operation::Noop,
            (true, false) => Operation::Create,
            (false, false) => Operation::Update,
            (false, true) => Operation::Delete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Noop => "noop",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApplyConfig {
    pub field_manager: String,
    pub max_payload_nodes: usize,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self { field_manager: FIELD_MANAGER.to_string(), max_payload_nodes: 100_000 }
    }
}

impl ApplyConfig {
    pub fn from_env() -> Self {
        Self { max_payload_nodes: max_payload_nodes(), ..Self::default() }
    }
}

/// What the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub schemas: Arc<dyn SchemaSource>,
    pub scopes: Arc<dyn ScopeResolver>,
    pub transport: Arc<dyn Transport>,
    pub waiter: Option<Arc<dyn CompletionWaiter>>,
}

#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub resource_type: String,
    pub prior: Value,
    pub planned: Value,
    pub computed_fields: Option<Vec<String>>,
}

impl ApplyRequest {
    /// Computed fields come from the planned state's `computed_fields` attribute when it
    /// is a known list; unknown or null elements are skipped.
    pub fn new(resource_type: impl Into<String>, prior: Value, planned: Value) -> Self {
        let computed_fields = planned
            .attr("computed_fields")
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect());
        Self { resource_type: resource_type.into(), prior, planned, computed_fields }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyResponse {
    pub new_state: Option<Value>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ApplyEngine {
    collab: Collaborators,
    config: ApplyConfig,
}

impl ApplyEngine {
    pub fn new(collab: Collaborators, config: ApplyConfig) -> Self {
        Self { collab, config }
    }

    /// Apply one planned change. In-band failures (validation, conflict, store
    /// rejections) come back as diagnostics with no new state; the discovery caches
    /// are invalidated whatever the outcome.
    pub async fn apply_resource_change(&self, req: ApplyRequest, cancel: &CancellationToken) -> Result<ApplyResponse, ApplyError> {
        let t0 = Instant::now();
        counter!("apply_attempts", 1u64);
        let op = Operation::of(&req.prior, &req.planned);
        let span = info_span!("apply", op = op.as_str());
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApplyError::Cancelled),
            r = self.run(op, req).instrument(span) => r,
        };
        self.collab.scopes.invalidate();
        self.collab.schemas.invalidate();
        histogram!("apply_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match res {
            Ok(state) => {
                counter!("apply_ok", 1u64, "op" => op.as_str());
                Ok(ApplyResponse { new_state: Some(state), diagnostics: Vec::new() })
            }
            Err(e) => {
                counter!("apply_err", 1u64);
                if matches!(e, ApplyError::Conflict { .. }) {
                    counter!("apply_conflict_total", 1u64);
                }
                let kind = e.kind();
                match e.into_diagnostics() {
                    Ok(diagnostics) => {
                        warn!(op = op.as_str(), kind, count = diagnostics.len(), "apply returned diagnostics");
                        Ok(ApplyResponse { new_state: None, diagnostics })
                    }
                    Err(e) => {
                        error!(op = op.as_str(), error = %e, "apply failed");
                        Err(e)
                    }
                }
            }
        }
    }

    async fn run(&self, op: Operation, req: ApplyRequest) -> Result<Value, ApplyError> {
        let computed = self.preflight(op, &req)?;
        match op {
            Operation::Noop => {
                debug!("prior and planned are both null; nothing to do");
                Ok(req.planned)
            }
            Operation::Create | Operation::Update => self.apply_object(op, req.planned, &computed).await,
            Operation::Delete => self.delete_object(req.prior, req.planned).await,
        }
    }

    /// Checks that need no I/O.
    fn preflight(&self, op: Operation, req: &ApplyRequest) -> Result<ComputedFields, ApplyError> {
        if req.resource_type != MANIFEST_RESOURCE_TYPE {
            return Err(ApplyError::validation(
                "Failed to determine planned resource type",
                format!("unsupported resource type {:?}, expected {:?}", req.resource_type, MANIFEST_RESOURCE_TYPE),
            ));
        }
        req.prior.validate().map_err(|e| ApplyError::validation("Failed to unmarshal prior resource state", e.to_string()))?;
        req.planned.validate().map_err(|e| ApplyError::validation("Failed to unmarshal planned resource state", e.to_string()))?;
        let computed = ComputedFields::from_config(req.computed_fields.as_deref()).map_err(ApplyError::Rejected)?;
        if matches!(op, Operation::Create | Operation::Update) {
            if req.planned.attr("wait_for").is_some_and(Value::is_unknown) {
                return Err(ApplyError::validation("Cannot wait for resource completion", "wait_for is not known until after apply"));
            }
            if declared_wait(&req.planned).is_some() && self.collab.waiter.is_none() {
                return Err(ApplyError::validation("Cannot wait for resource completion", "wait_for is set but no completion waiter is configured"));
            }
        }
        Ok(computed)
    }

    async fn apply_object(&self, op: Operation, planned: Value, computed: &ComputedFields) -> Result<Value, ApplyError> {
        let object = planned.attr("object").cloned().ok_or_else(|| {
            ApplyError::validation("Failed to find object value in planned resource state", "planned state has no \"object\" attribute")
        })?;
        let gvk = gvk_of(&object)?;
        let write_ty = self.type_for(&gvk, SchemaVariant::Write).await?;
        let manifest = planned.attr("manifest").cloned().unwrap_or_else(|| Value::null(Type::Dynamic));
        trace!(object = ?object, "planned object");

        let filled = backfill(object, &manifest, computed, &write_ty)
            .map_err(|e| ApplyError::validation("Failed to backfill computed values in proposed object", e.to_string()))?;
        let collapsed = collapse_unknown_to_null(filled);
        trace!(object = ?collapsed, "backfilled object");
        let payload = remove_nulls(to_untyped(&collapsed, &Path::root())?);
        if json_node_budget_exceeded(&payload, self.config.max_payload_nodes) {
            return Err(ApplyError::validation(
                "Resource payload too large",
                format!("{} payload exceeds {} nodes", gvk, self.config.max_payload_nodes),
            ));
        }
        let id = ResourceId::from_payload(gvk.clone(), &payload)?;
        let handle = self.handle_for(&id, |e| ApplyError::store(format!("Failed to discover scope of resource '{}'", id), format!("{e:#}"))).await?;

        if op == Operation::Create {
            match handle.get(&id.name).await {
                Ok(_) => {
                    return Err(ApplyError::Conflict {
                        summary: "Cannot create resource that already exists".into(),
                        detail: format!("resource {:?} already exists", id.to_string()),
                    })
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(ApplyError::store(format!("Failed to determine if resource {:?} exists", id.to_string()), e.to_string())),
            }
        }

        trace!(payload = %payload, "server-side apply payload");
        let response = match handle.apply_patch(&id.name, &payload, &self.config.field_manager).await {
            Ok(r) => r,
            Err(e) => {
                error!(resource = %id, error = %e, "server-side apply failed");
                return Err(match e {
                    StoreError::Status(s) => ApplyError::Rejected(status_diagnostics(&s)),
                    StoreError::Transport(msg) => ApplyError::store(format!("PATCH for resource \"{}\" failed to apply", id), msg),
                });
            }
        };
        let applied = from_untyped(&strip_server_side_fields(response), &write_ty, &Path::root())?;
        trace!(object = ?applied, "store response");

        if let Some(spec) = declared_wait(&planned) {
            let waiter = self.collab.waiter.as_ref().ok_or_else(|| ApplyError::Internal(anyhow::anyhow!("no completion waiter configured")))?;
            let full_ty = self.type_for(&gvk, SchemaVariant::Full).await?;
            debug!(resource = %id, "waiting for completion");
            waiter.wait(handle.as_ref(), &id.name, spec, &full_ty).await.map_err(ApplyError::Wait)?;
        }

        let new_object = collapse_unknown_to_null(expand_to_unknown(&write_ty, &applied, &Path::root())?);
        let mut state = planned;
        if !state.set_attr("object", new_object) {
            return Err(ApplyError::Internal(anyhow::anyhow!("planned state is not an object")));
        }
        info!(resource = %id, gvk = %gvk, op = op.as_str(), "resource applied");
        Ok(state)
    }

    async fn delete_object(&self, prior: Value, planned: Value) -> Result<Value, ApplyError> {
        let object = prior.attr("object").ok_or_else(|| {
            ApplyError::validation("Failed to find object value in prior resource state", "prior state has no \"object\" attribute")
        })?;
        let gvk = gvk_of(object)?;
        let ident = to_untyped(&collapse_unknown_to_null(object.clone()), &Path::root())?;
        let id = ResourceId::from_payload(gvk.clone(), &ident)?;
        let handle = self.handle_for(&id, |e| ApplyError::Internal(e.context(format!("failed to determine resource GVR for {}", id.gvk)))).await?;
        if let Err(e) = handle.delete(&id.name).await {
            error!(resource = %id, error = %e, "delete failed");
            return Err(ApplyError::store(format!("DELETE resource {} failed: {}", id, e), e.to_string()));
        }
        info!(resource = %id, gvk = %gvk, "resource deleted");
        Ok(planned)
    }

    async fn type_for(&self, gvk: &Gvk, variant: SchemaVariant) -> Result<Type, ApplyError> {
        self.collab
            .schemas
            .type_for_kind(gvk, variant)
            .await
            .map_err(|e| ApplyError::Internal(e.context(format!("failed to determine resource type ID for {}", gvk))))
    }

    /// Resolve scope and bind a handle; namespaced kinds require a namespace.
    async fn handle_for<F>(&self, id: &ResourceId, on_scope_err: F) -> Result<Arc<dyn ResourceHandle>, ApplyError>
    where
        F: FnOnce(anyhow::Error) -> ApplyError,
    {
        let scope = self.collab.scopes.scope(&id.gvk).await.map_err(on_scope_err)?;
        let namespace = if scope.namespaced {
            let ns = id.namespace.as_deref().ok_or_else(|| {
                ApplyError::validation("namespace required for namespaced kind", format!("{} {:?} has no metadata.namespace", id.gvk.kind, id.name))
            })?;
            Some(ns)
        } else {
            None
        };
        debug!(resource = %id, plural = %scope.plural, namespaced = scope.namespaced, "scope resolved");
        Ok(self.collab.transport.handle(&scope, namespace))
    }
}

/// The `wait_for` condition when declared and neither null nor unknown.
fn declared_wait(planned: &Value) -> Option<&Value> {
    planned.attr("wait_for").filter(|v| !v.is_null() && !v.is_unknown())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_follows_nullness() {
        let null = Value::null(Type::Dynamic);
        let some = Value::object([("object", Value::string("x"))]);
        assert_eq!(Operation::of(&null, &null), Operation::Noop);
        assert_eq!(Operation::of(&null, &some), Operation::Create);
        assert_eq!(Operation::of(&some, &some), Operation::Update);
        assert_eq!(Operation::of(&some, &null), Operation::Delete);
    }

    #[test]
    fn request_reads_computed_fields_from_planned() {
        let planned = Value::object([
            ("computed_fields", Value::list(Type::String, vec![Value::string("spec.replicas"), Value::unknown(Type::String)])),
        ]);
        let req = ApplyRequest::new(MANIFEST_RESOURCE_TYPE, Value::null(Type::Dynamic), planned);
        assert_eq!(req.computed_fields, Some(vec!["spec.replicas".to_string()]));
        let req = ApplyRequest::new(MANIFEST_RESOURCE_TYPE, Value::null(Type::Dynamic), Value::object([("manifest", Value::string("m"))]));
        assert!(req.computed_fields.is_none());
    }

    #[test]
    fn wait_for_null_or_unknown_is_not_declared() {
        let planned = Value::object([("wait_for", Value::null(Type::Dynamic))]);
        assert!(declared_wait(&planned).is_none());
        let planned = Value::object([("wait_for", Value::object([("fields", Value::string("x"))]))]);
        assert!(declared_wait(&planned).is_some());
        let planned = Value::object([("wait_for", Value::unknown(Type::Dynamic))]);
        assert!(declared_wait(&planned).is_none());
    }
}
