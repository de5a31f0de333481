//! OpenAPI v3 (structural CRD schema) → type tree.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde_json::Value as Json;

use manifold_core::Type;

const MAX_DEPTH: usize = 64;

/// Convert one structural schema node.
///
/// `x-kubernetes-preserve-unknown-fields` and schemas without a usable `type` become
/// Dynamic; `x-kubernetes-int-or-string` becomes String (the bridge stringifies numbers).
pub fn type_from_openapi(schema: &Json) -> Result<Type> {
    convert(schema, 0)
}

fn convert(s: &Json, depth: usize) -> Result<Type> {
    if depth > MAX_DEPTH {
        return Err(anyhow!("schema nesting exceeds {} levels", MAX_DEPTH));
    }
    let node = s.as_object().ok_or_else(|| anyhow!("schema node must be an object, found {}", s))?;
    if flag(s, "x-kubernetes-preserve-unknown-fields") {
        return Ok(Type::Dynamic);
    }
    if flag(s, "x-kubernetes-int-or-string") {
        return Ok(Type::String);
    }
    let ty = node.get("type").and_then(Json::as_str);
    match ty {
        Some("string") => Ok(Type::String),
        Some("integer") | Some("number") => Ok(Type::Number),
        Some("boolean") => Ok(Type::Bool),
        Some("array") => match node.get("items") {
            Some(items) => Ok(Type::list(convert(items, depth + 1)?)),
            None => Ok(Type::list(Type::Dynamic)),
        },
        Some("object") | None => object(node, depth),
        Some(other) => Err(anyhow!("unsupported schema type {:?}", other)),
    }
}

fn object(node: &serde_json::Map<String, Json>, depth: usize) -> Result<Type> {
    if let Some(Json::Object(props)) = node.get("properties") {
        let mut attrs = BTreeMap::new();
        for (name, sub) in props {
            attrs.insert(name.clone(), convert(sub, depth + 1)?);
        }
        return Ok(Type::Object(attrs));
    }
    match node.get("additionalProperties") {
        Some(sub @ Json::Object(m)) if !m.is_empty() => Ok(Type::map(convert(sub, depth + 1)?)),
        Some(Json::Bool(true)) | Some(Json::Object(_)) => Ok(Type::map(Type::Dynamic)),
        _ => Ok(Type::Dynamic),
    }
}

fn flag(s: &Json, name: &str) -> bool {
    s.get(name).and_then(Json::as_bool).unwrap_or(false)
}

/// The subset of ObjectMeta a manifest or a store response carries.
pub fn object_meta_type() -> Type {
    let owner_ref = Type::object([
        ("apiVersion", Type::String),
        ("kind", Type::String),
        ("name", Type::String),
        ("uid", Type::String),
        ("controller", Type::Bool),
        ("blockOwnerDeletion", Type::Bool),
    ]);
    Type::object([
        ("name", Type::String),
        ("generateName", Type::String),
        ("namespace", Type::String),
        ("uid", Type::String),
        ("resourceVersion", Type::String),
        ("generation", Type::Number),
        ("creationTimestamp", Type::String),
        ("deletionTimestamp", Type::String),
        ("selfLink", Type::String),
        ("labels", Type::map(Type::String)),
        ("annotations", Type::map(Type::String)),
        ("finalizers", Type::list(Type::String)),
        ("ownerReferences", Type::list(owner_ref)),
        ("managedFields", Type::Dynamic),
    ])
}

/// Full type of a custom resource: its `openAPIV3Schema` plus the envelope
/// (`apiVersion`, `kind`, `metadata`) the CRD schema leaves implicit.
pub fn crd_type(schema: &Json) -> Result<Type> {
    match type_from_openapi(schema)? {
        Type::Object(mut attrs) => {
            attrs.insert("apiVersion".into(), Type::String);
            attrs.insert("kind".into(), Type::String);
            attrs.insert("metadata".into(), object_meta_type());
            Ok(Type::Object(attrs))
        }
        other => Err(anyhow!("top-level CRD schema must be an object, found {}", other.name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_and_containers() {
        let s = json!({
            "type": "object",
            "properties": {
                "replicas": {"type": "integer"},
                "paused": {"type": "boolean"},
                "port": {"x-kubernetes-int-or-string": true},
                "args": {"type": "array", "items": {"type": "string"}},
                "env": {"type": "object", "additionalProperties": {"type": "string"}},
                "raw": {"type": "object", "x-kubernetes-preserve-unknown-fields": true}
            }
        });
        let t = type_from_openapi(&s).expect("ok");
        assert_eq!(t.attribute("replicas"), Some(&Type::Number));
        assert_eq!(t.attribute("paused"), Some(&Type::Bool));
        assert_eq!(t.attribute("port"), Some(&Type::String));
        assert_eq!(t.attribute("args"), Some(&Type::list(Type::String)));
        assert_eq!(t.attribute("env"), Some(&Type::map(Type::String)));
        assert_eq!(t.attribute("raw"), Some(&Type::Dynamic));
    }

    #[test]
    fn untyped_and_open_objects() {
        assert_eq!(type_from_openapi(&json!({})).expect("ok"), Type::Dynamic);
        assert_eq!(type_from_openapi(&json!({"type": "object", "additionalProperties": true})).expect("ok"), Type::map(Type::Dynamic));
        assert_eq!(type_from_openapi(&json!({"type": "array"})).expect("ok"), Type::list(Type::Dynamic));
        assert!(type_from_openapi(&json!({"type": "file"})).is_err());
        assert!(type_from_openapi(&json!("string")).is_err());
    }

    #[test]
    fn depth_is_bounded() {
        let mut s = json!({"type": "string"});
        for _ in 0..(MAX_DEPTH + 2) {
            s = json!({"type": "array", "items": s});
        }
        assert!(type_from_openapi(&s).is_err());
    }

    #[test]
    fn crd_type_adds_envelope() {
        let t = crd_type(&json!({
            "type": "object",
            "properties": {"spec": {"type": "object", "properties": {"size": {"type": "integer"}}}}
        }))
        .expect("ok");
        assert_eq!(t.attribute("kind"), Some(&Type::String));
        assert_eq!(t.attribute("metadata"), Some(&object_meta_type()));
        assert!(t.walk(&"spec.size".parse().expect("path")).is_ok());
        assert!(t.walk(&"metadata.labels[\"app\"]".parse().expect("path")).is_ok());
        assert!(crd_type(&json!({"type": "string"})).is_err());
    }
}
