//! State documents: how typed states travel through files.
//!
//! ```yaml
//! type: [object, {manifest: dynamic, object: [object, {spec: [object, {replicas: number}]}]}]
//! value: {manifest: {spec: {replicas: 3}}, object: {spec: {replicas: null}}}
//! unknown: [object.spec.replicas]
//! ```

use std::convert::Infallible;
use std::path::Path as FsPath;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use manifold_core::{Path, Type, Value};
use manifold_morph::{collapse_unknown_to_null, from_untyped, to_untyped};

fn dynamic() -> Type {
    Type::Dynamic
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDoc {
    #[serde(rename = "type", default = "dynamic")]
    pub ty: Type,
    #[serde(default)]
    pub value: Json,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown: Vec<Path>,
}

impl StateDoc {
    pub fn into_value(self) -> Result<Value> {
        let mut v = from_untyped(&self.value, &self.ty, &Path::root()).context("state value does not match its type")?;
        for p in &self.unknown {
            if !v.mark_unknown(p) {
                bail!("unknown path {} does not address a value in the state", p);
            }
        }
        Ok(v)
    }

    pub fn from_value(v: &Value) -> Result<Self> {
        let mut unknown = Vec::new();
        v.clone().transform(&mut |at: &Path, node: Value| -> Result<Value, Infallible> {
            if node.is_unknown() {
                unknown.push(at.clone());
            }
            Ok(node)
        })?;
        let value = to_untyped(&collapse_unknown_to_null(v.clone()), &Path::root())?;
        Ok(Self { ty: v.ty().clone(), value, unknown })
    }
}

/// Read a JSON or YAML (by extension) state document.
pub fn read_state(path: &FsPath) -> Result<Value> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let doc: StateDoc = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&raw).with_context(|| format!("parsing YAML {}", path.display()))?,
        _ => serde_json::from_str(&raw).with_context(|| format!("parsing JSON {}", path.display()))?,
    };
    doc.into_value().with_context(|| format!("decoding state {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLANNED: &str = r#"
type: [object, {manifest: dynamic, object: [object, {metadata: [object, {name: string}], spec: [object, {replicas: number}]}]}]
value:
  manifest: {metadata: {name: web}, spec: {replicas: 3}}
  object: {metadata: {name: web}, spec: {replicas: null}}
unknown: [object.spec.replicas]
"#;

    #[test]
    fn yaml_state_marks_unknowns() {
        let doc: StateDoc = serde_yaml::from_str(PLANNED).expect("parse");
        let v = doc.into_value().expect("decode");
        assert!(v.walk(&Path::parse("object.spec.replicas").expect("p")).expect("r").is_unknown());
        assert_eq!(v.walk(&Path::parse("manifest.spec.replicas").expect("p")), Some(&Value::number(3)));
        assert!(v.validate().is_ok());
    }

    #[test]
    fn unknown_path_must_exist() {
        let doc = StateDoc { ty: Type::object([("a", Type::String)]), value: json!({"a": "x"}), unknown: vec![Path::parse("b").expect("p")] };
        assert!(doc.into_value().is_err());
    }

    #[test]
    fn missing_type_means_dynamic_null() {
        let doc: StateDoc = serde_json::from_str("{}").expect("parse");
        let v = doc.into_value().expect("decode");
        assert!(v.is_null());
    }

    #[test]
    fn from_value_lists_unknowns() {
        let v = Value::object([("a", Value::unknown(Type::String)), ("b", Value::number(1))]);
        let doc = StateDoc::from_value(&v).expect("encode");
        assert_eq!(doc.value, json!({"a": null, "b": 1}));
        assert_eq!(doc.unknown, vec![Path::parse("a").expect("p")]);
        assert_eq!(doc.into_value().expect("decode"), v);
    }
}
