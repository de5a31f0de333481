//! Shaping of write payloads and store responses, and resource identity.

use std::fmt;

use serde_json::Value as Json;

use manifold_core::{Gvk, Value};

use crate::error::ApplyError;

pub fn max_payload_nodes() -> usize {
    std::env::var("MANIFOLD_MAX_PAYLOAD_NODES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(100_000)
}

pub fn json_node_budget_exceeded(v: &Json, max: usize) -> bool {
    fn walk(v: &Json, cur: &mut usize, max: usize) {
        if *cur > max {
            return;
        }
        *cur += 1;
        match v {
            Json::Object(map) => {
                for vv in map.values() {
                    if *cur > max {
                        break;
                    }
                    walk(vv, cur, max);
                }
            }
            Json::Array(arr) => {
                for vv in arr {
                    if *cur > max {
                        break;
                    }
                    walk(vv, cur, max);
                }
            }
            _ => {}
        }
    }
    let mut count = 0usize;
    walk(v, &mut count, max);
    count > max
}

/// Drop explicit nulls: null map entries at any depth, and null list elements.
pub fn remove_nulls(v: Json) -> Json {
    match v {
        Json::Object(map) => Json::Object(map.into_iter().filter(|(_, v)| !v.is_null()).map(|(k, v)| (k, remove_nulls(v))).collect()),
        Json::Array(items) => Json::Array(items.into_iter().filter(|v| !v.is_null()).map(remove_nulls).collect()),
        other => other,
    }
}

const SERVER_SIDE_METADATA: [&str; 6] = ["uid", "creationTimestamp", "resourceVersion", "generation", "selfLink", "managedFields"];

/// Remove what the store populates on its own: `status` and server-owned metadata.
pub fn strip_server_side_fields(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(Json::as_object_mut) {
        for k in SERVER_SIDE_METADATA {
            meta.remove(k);
        }
    }
    if let Some(obj) = v.as_object_mut() {
        obj.remove("status");
    }
    v
}

/// GVK of a typed resource object, from its `apiVersion` and `kind` attributes.
pub fn gvk_of(object: &Value) -> Result<Gvk, ApplyError> {
    let api_version = object.attr("apiVersion").and_then(Value::as_str);
    let kind = object.attr("kind").and_then(Value::as_str);
    match (api_version, kind) {
        (Some(av), Some(k)) if !av.is_empty() && !k.is_empty() => Ok(Gvk::from_api_version(av, k)),
        _ => Err(ApplyError::Internal(anyhow::anyhow!("failed to determine resource GVK: object lacks a known apiVersion and kind"))),
    }
}

/// Identity of the resource a payload addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub gvk: Gvk,
    pub name: String,
    pub namespace: Option<String>,
}

impl ResourceId {
    pub fn from_payload(gvk: Gvk, payload: &Json) -> Result<Self, ApplyError> {
        let meta = payload.get("metadata");
        let name = meta.and_then(|m| m.get("name")).and_then(Json::as_str).filter(|s| !s.is_empty());
        let name = name.ok_or_else(|| ApplyError::validation("Resource has no name", format!("{} object is missing metadata.name", gvk)))?;
        let namespace = meta.and_then(|m| m.get("namespace")).and_then(Json::as_str).filter(|s| !s.is_empty()).map(str::to_string);
        Ok(Self { gvk, name: name.to_string(), namespace })
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}
