//! Manifold schema: where a kind's type tree comes from.
//!
//! Two sources: a static [`SchemaRegistry`] read from a type document (one entry per
//! gvk key, values in the JSON type encoding), and [`CrdSchemaSource`], which converts
//! a CustomResourceDefinition's `openAPIV3Schema` and falls back to a registry for
//! built-in kinds.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::Path as FsPath;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value as Json;
use tracing::debug;

use manifold_core::{Gvk, SchemaSource, SchemaVariant, Type};

pub mod crd;
pub mod openapi;

pub use crd::CrdSchemaSource;
pub use openapi::{crd_type, object_meta_type, type_from_openapi};

/// Server-populated attribute excluded from the Write variant.
pub const STATUS_ATTRIBUTE: &str = "status";

/// Narrow a kind's full type to the requested variant.
pub fn variant_of(full: Type, variant: SchemaVariant) -> Type {
    match variant {
        SchemaVariant::Full => full,
        SchemaVariant::Write => full.without_attribute(STATUS_ATTRIBUTE),
    }
}

/// Full types keyed by gvk key (`v1/ConfigMap`, `apps/v1/Deployment`).
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: BTreeMap<String, Type>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, gvk: &Gvk, full: Type) {
        self.types.insert(gvk.key(), full);
    }

    /// Build from a document `{ "<gvk key>": <type encoding>, ... }`.
    pub fn from_json(doc: &Json) -> Result<Self> {
        let entries = doc.as_object().ok_or_else(|| anyhow!("schema document must be an object keyed by gvk"))?;
        let mut reg = Self::new();
        for (key, enc) in entries {
            let gvk = Gvk::parse_key(key)?;
            let ty = Type::from_json(enc).with_context(|| format!("decoding type for {}", key))?;
            reg.insert(&gvk, ty);
        }
        Ok(reg)
    }

    /// Read a JSON or YAML (by extension) type document.
    pub fn load(path: &FsPath) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let doc: Json = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw).with_context(|| format!("parsing YAML {}", path.display()))?,
            _ => serde_json::from_str(&raw).with_context(|| format!("parsing JSON {}", path.display()))?,
        };
        let reg = Self::from_json(&doc)?;
        debug!(path = %path.display(), kinds = reg.len(), "schema registry loaded");
        Ok(reg)
    }

    pub fn full(&self, gvk: &Gvk) -> Option<&Type> {
        self.types.get(&gvk.key())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[async_trait]
impl SchemaSource for SchemaRegistry {
    async fn type_for_kind(&self, gvk: &Gvk, variant: SchemaVariant) -> Result<Type> {
        let full = self.full(gvk).ok_or_else(|| anyhow!("no schema registered for {}", gvk))?;
        Ok(variant_of(full.clone(), variant))
    }
}
