//! Contracts for the collaborators the apply engine drives: schema lookup, scope
//! resolution, the store transport and completion waiting.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use crate::types::Type;
use crate::value::Value;

/// Group/version/kind of a resource. The core group is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), kind: kind.into() }
    }

    /// Split an `apiVersion` such as `apps/v1` or `v1`.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((g, v)) => Self::new(g, v, kind),
            None => Self::new("", api_version, kind),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }

    /// `v1/ConfigMap` or `apps/v1/Deployment`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.api_version(), self.kind)
    }

    pub fn parse_key(key: &str) -> Result<Self> {
        let parts: Vec<_> = key.split('/').collect();
        match parts.as_slice() {
            [version, kind] if !version.is_empty() && !kind.is_empty() => Ok(Self::new("", *version, *kind)),
            [group, version, kind] if !group.is_empty() && !version.is_empty() && !kind.is_empty() => Ok(Self::new(*group, *version, *kind)),
            _ => Err(anyhow!("invalid gvk key: {} (expect v1/Kind or group/v1/Kind)", key)),
        }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Which shape of a kind's schema is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVariant {
    /// What a write may carry: the schema without `status`.
    Write,
    /// Everything the store may return, `status` included.
    Full,
}

#[async_trait::async_trait]
pub trait SchemaSource: Send + Sync {
    async fn type_for_kind(&self, gvk: &Gvk, variant: SchemaVariant) -> Result<Type>;

    /// Drop anything cached; the next lookup rebuilds.
    fn invalidate(&self) {}
}

/// REST mapping of a kind: its plural resource name and scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceScope {
    pub gvk: Gvk,
    pub plural: String,
    pub namespaced: bool,
}

#[async_trait::async_trait]
pub trait ScopeResolver: Send + Sync {
    async fn scope(&self, gvk: &Gvk) -> Result<ResourceScope>;

    fn invalidate(&self) {}
}

/// One cause attached to a structured store failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCause {
    pub field: String,
    pub reason: String,
    pub message: String,
}

/// Structured failure status returned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub status: String,
    pub code: u16,
    pub reason: String,
    pub message: String,
    pub causes: Vec<StatusCause>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{}", render_status(.0))]
    Status(StoreStatus),
    #[error("transport: {0}")]
    Transport(String),
}

fn render_status(s: &StoreStatus) -> String {
    format!("{} ({}): {}", s.reason, s.code, s.message)
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Status(s) if s.code == 404 || s.reason == "NotFound")
    }

    pub fn not_found(name: &str) -> Self {
        StoreError::Status(StoreStatus {
            status: "Failure".into(),
            code: 404,
            reason: "NotFound".into(),
            message: format!("{:?} not found", name),
            causes: Vec::new(),
        })
    }
}

/// Store operations bound to one resource type and, for namespaced kinds, one namespace.
#[async_trait::async_trait]
pub trait ResourceHandle: Send + Sync {
    async fn get(&self, name: &str) -> Result<Json, StoreError>;

    /// Server-side apply of `payload` on behalf of `field_manager`.
    async fn apply_patch(&self, name: &str, payload: &Json, field_manager: &str) -> Result<Json, StoreError>;

    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

pub trait Transport: Send + Sync {
    fn handle(&self, scope: &ResourceScope, namespace: Option<&str>) -> Arc<dyn ResourceHandle>;
}

/// Blocks until the caller-declared condition holds on the stored object, or fails.
#[async_trait::async_trait]
pub trait CompletionWaiter: Send + Sync {
    async fn wait(&self, handle: &dyn ResourceHandle, name: &str, spec: &Value, response_type: &Type) -> Result<()>;
}
