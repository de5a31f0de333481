//! Schema type tree.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value as Json};
use thiserror::Error;

use crate::path::{display_path, Path, Step};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Bool,
    Number,
    String,
    /// Any shape; concrete values placed here carry their own inferred type.
    Dynamic,
    List(Box<Type>),
    Map(Box<Type>),
    Object(BTreeMap<String, Type>),
    Tuple(Vec<Type>),
}

const DYNAMIC: &Type = &Type::Dynamic;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", display_path(.path))]
pub struct TypeWalkError {
    pub path: Path,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid type encoding: {0}")]
pub struct TypeDecodeError(pub String);

impl Type {
    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn map(elem: Type) -> Type {
        Type::Map(Box::new(elem))
    }

    pub fn object<K: Into<String>>(attrs: impl IntoIterator<Item = (K, Type)>) -> Type {
        Type::Object(attrs.into_iter().map(|(k, t)| (k.into(), t)).collect())
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Number | Type::String)
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Dynamic)
    }

    /// Short human name used in conversion errors.
    pub fn name(&self) -> &'static str {
        match self {
            Type::Bool => "bool",
            Type::Number => "number",
            Type::String => "string",
            Type::Dynamic => "dynamic",
            Type::List(_) => "list",
            Type::Map(_) => "map",
            Type::Object(_) => "object",
            Type::Tuple(_) => "tuple",
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Object(attrs) => attrs.get(name),
            _ => None,
        }
    }

    /// The type one step below this one, if the step is addressable here.
    pub fn child(&self, step: &Step) -> Option<&Type> {
        match (self, step) {
            (Type::Dynamic, _) => Some(DYNAMIC),
            (Type::Object(attrs), Step::Attr(name)) => attrs.get(name),
            (Type::Map(elem), Step::Key(_)) => Some(elem.as_ref()),
            (Type::List(elem), Step::Index(_)) => Some(elem.as_ref()),
            (Type::Tuple(elems), Step::Index(i)) => elems.get(*i),
            _ => None,
        }
    }

    /// Resolve `path` against this type; fails at the first step the shape cannot address.
    pub fn walk(&self, path: &Path) -> Result<&Type, TypeWalkError> {
        let mut cur = self;
        let mut at = Path::root();
        for step in path.steps() {
            at.push(step.clone());
            cur = cur.child(step).ok_or_else(|| TypeWalkError {
                path: at.clone(),
                message: format!("not addressable in {}", cur.name()),
            })?;
        }
        Ok(cur)
    }

    /// Same type with the named top-level attribute removed (no-op for non-objects).
    pub fn without_attribute(&self, name: &str) -> Type {
        match self {
            Type::Object(attrs) => Type::Object(attrs.iter().filter(|(k, _)| k.as_str() != name).map(|(k, v)| (k.clone(), v.clone())).collect()),
            other => other.clone(),
        }
    }

    /// JSON type encoding: `"string"`, `["list","string"]`, `["object",{"a":"bool"}]`, ...
    pub fn to_json(&self) -> Json {
        match self {
            Type::Bool => json!("bool"),
            Type::Number => json!("number"),
            Type::String => json!("string"),
            Type::Dynamic => json!("dynamic"),
            Type::List(e) => json!(["list", e.to_json()]),
            Type::Map(e) => json!(["map", e.to_json()]),
            Type::Object(attrs) => {
                let m: serde_json::Map<String, Json> = attrs.iter().map(|(k, t)| (k.clone(), t.to_json())).collect();
                json!(["object", m])
            }
            Type::Tuple(elems) => json!(["tuple", elems.iter().map(Type::to_json).collect::<Vec<_>>()]),
        }
    }

    pub fn from_json(v: &Json) -> Result<Type, TypeDecodeError> {
        match v {
            Json::String(s) => match s.as_str() {
                "bool" => Ok(Type::Bool),
                "number" => Ok(Type::Number),
                "string" => Ok(Type::String),
                "dynamic" => Ok(Type::Dynamic),
                other => Err(TypeDecodeError(format!("unknown primitive type {:?}", other))),
            },
            Json::Array(parts) if parts.len() == 2 => {
                let kind = parts[0].as_str().ok_or_else(|| TypeDecodeError("type constructor must be a string".into()))?;
                match (kind, &parts[1]) {
                    ("list", e) => Ok(Type::list(Type::from_json(e)?)),
                    ("map", e) => Ok(Type::map(Type::from_json(e)?)),
                    ("object", Json::Object(m)) => {
                        let mut attrs = BTreeMap::new();
                        for (k, t) in m {
                            attrs.insert(k.clone(), Type::from_json(t)?);
                        }
                        Ok(Type::Object(attrs))
                    }
                    ("tuple", Json::Array(elems)) => Ok(Type::Tuple(elems.iter().map(Type::from_json).collect::<Result<_, _>>()?)),
                    (other, _) => Err(TypeDecodeError(format!("unsupported type constructor {:?}", other))),
                }
            }
            other => Err(TypeDecodeError(format!("unexpected {}", other))),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Json::deserialize(deserializer)?;
        Type::from_json(&v).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment() -> Type {
        Type::object([
            ("apiVersion", Type::String),
            ("kind", Type::String),
            ("metadata", Type::object([("name", Type::String), ("labels", Type::map(Type::String))])),
            ("spec", Type::object([("replicas", Type::Number), ("ports", Type::list(Type::object([("port", Type::Number)])))])),
        ])
    }

    #[test]
    fn walk_resolves_schema_positions() {
        let t = deployment();
        assert_eq!(t.walk(&Path::parse("metadata.labels").unwrap()).unwrap(), &Type::map(Type::String));
        assert_eq!(t.walk(&Path::parse(r#"metadata.labels["app"]"#).unwrap()).unwrap(), &Type::String);
        assert_eq!(t.walk(&Path::parse("spec.ports[4].port").unwrap()).unwrap(), &Type::Number);
        let err = t.walk(&Path::parse("spec.missing.x").unwrap()).unwrap_err();
        assert_eq!(err.path.to_string(), "spec.missing");
        // map entries are keys, not attributes
        assert!(t.walk(&Path::parse("metadata.labels.app").unwrap()).is_err());
    }

    #[test]
    fn dynamic_addresses_anything() {
        assert_eq!(Type::Dynamic.walk(&Path::parse("a[0].b").unwrap()).unwrap(), &Type::Dynamic);
    }

    #[test]
    fn json_encoding_round_trips() {
        let t = Type::object([("t", Type::Tuple(vec![Type::Bool, Type::Dynamic])), ("d", deployment())]);
        let enc = serde_json::to_string(&t).unwrap();
        let back: Type = serde_json::from_str(&enc).unwrap();
        assert_eq!(back, t);
        assert!(Type::from_json(&json!(["set", "string"])).is_err());
        assert!(Type::from_json(&json!("integer")).is_err());
    }

    #[test]
    fn without_attribute_drops_top_level_only() {
        let t = Type::object([("spec", Type::String), ("status", Type::object([("phase", Type::String)]))]);
        assert_eq!(t.without_attribute("status"), Type::object([("spec", Type::String)]));
        assert_eq!(Type::String.without_attribute("status"), Type::String);
    }
}
