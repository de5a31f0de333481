//! Typed value tree with explicit Null and Unknown states.

use std::collections::BTreeMap;

use serde_json::Number;
use thiserror::Error;

use crate::path::{display_path, Path, Step};
use crate::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Null,
    /// Not yet determined; resolved only after a write completes.
    Unknown,
    Bool(bool),
    Number(Number),
    String(String),
    /// Elements of a `List` or `Tuple` typed node.
    List(Vec<Value>),
    /// Entries of a `Map` or attributes of an `Object` typed node.
    Map(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    ty: Type,
    data: Data,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}: {message}", display_path(.path))]
pub struct ShapeError {
    pub path: Path,
    pub message: String,
}

impl Value {
    /// Unchecked constructor; callers are responsible for `data` matching `ty`.
    pub fn from_parts(ty: Type, data: Data) -> Self {
        Self { ty, data }
    }

    pub fn null(ty: Type) -> Self {
        Self { ty, data: Data::Null }
    }

    pub fn unknown(ty: Type) -> Self {
        Self { ty, data: Data::Unknown }
    }

    pub fn bool(b: bool) -> Self {
        Self { ty: Type::Bool, data: Data::Bool(b) }
    }

    pub fn number(n: impl Into<Number>) -> Self {
        Self { ty: Type::Number, data: Data::Number(n.into()) }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self { ty: Type::String, data: Data::String(s.into()) }
    }

    pub fn list(elem: Type, items: Vec<Value>) -> Self {
        Self { ty: Type::list(elem), data: Data::List(items) }
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        let ty = Type::Tuple(items.iter().map(|v| v.ty.clone()).collect());
        Self { ty, data: Data::List(items) }
    }

    pub fn map(elem: Type, entries: BTreeMap<String, Value>) -> Self {
        Self { ty: Type::map(elem), data: Data::Map(entries) }
    }

    /// Object whose attribute types are taken from the attribute values.
    pub fn object<K: Into<String>>(attrs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let attrs: BTreeMap<String, Value> = attrs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let ty = Type::Object(attrs.iter().map(|(k, v)| (k.clone(), v.ty.clone())).collect());
        Self { ty, data: Data::Map(attrs) }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn into_parts(self) -> (Type, Data) {
        (self.ty, self.data)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data, Data::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.data, Data::Unknown)
    }

    /// True when this node and everything below it is free of Unknown.
    pub fn is_wholly_known(&self) -> bool {
        match &self.data {
            Data::Unknown => false,
            Data::List(items) => items.iter().all(Value::is_wholly_known),
            Data::Map(entries) => entries.values().all(Value::is_wholly_known),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            Data::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.data {
            Data::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match &self.data {
            Data::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match &self.data {
            Data::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match &self.data {
            Data::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(name))
    }

    /// Replace (or add) an object attribute, keeping the object type in sync.
    /// Returns false when this value is not a concrete object.
    pub fn set_attr(&mut self, name: impl Into<String>, v: Value) -> bool {
        let name = name.into();
        match (&mut self.ty, &mut self.data) {
            (Type::Object(attrs), Data::Map(entries)) => {
                attrs.insert(name.clone(), v.ty.clone());
                entries.insert(name, v);
                true
            }
            _ => false,
        }
    }

    /// The child addressed by `step`. Attribute and key steps both select map
    /// entries so that paths built against one shape can probe another.
    pub fn get(&self, step: &Step) -> Option<&Value> {
        match (&self.data, step) {
            (Data::Map(m), Step::Attr(k)) | (Data::Map(m), Step::Key(k)) => m.get(k),
            (Data::List(items), Step::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    fn get_mut(&mut self, step: &Step) -> Option<&mut Value> {
        match (&mut self.data, step) {
            (Data::Map(m), Step::Attr(k)) | (Data::Map(m), Step::Key(k)) => m.get_mut(k),
            (Data::List(items), Step::Index(i)) => items.get_mut(*i),
            _ => None,
        }
    }

    /// Follow `path` through concrete containers. `None` when any step is absent or
    /// passes through a Null/Unknown node.
    pub fn walk(&self, path: &Path) -> Option<&Value> {
        path.steps().iter().try_fold(self, |cur, step| cur.get(step))
    }

    /// Turn the node at `path` into Unknown, keeping its type.
    pub fn mark_unknown(&mut self, path: &Path) -> bool {
        let mut cur = self;
        for step in path.steps() {
            match cur.get_mut(step) {
                Some(next) => cur = next,
                None => return false,
            }
        }
        cur.data = Data::Unknown;
        true
    }

    /// The step kind children of this node are addressed with.
    pub fn child_step(&self, key: &str) -> Step {
        match self.ty {
            Type::Object(_) => Step::Attr(key.to_string()),
            _ => Step::Key(key.to_string()),
        }
    }

    /// Post-order rewrite: children first, then the node itself, each visited with its
    /// path from this value.
    pub fn transform<E, F>(self, f: &mut F) -> Result<Value, E>
    where
        F: FnMut(&Path, Value) -> Result<Value, E>,
    {
        self.transform_at(&Path::root(), f)
    }

    fn transform_at<E, F>(self, at: &Path, f: &mut F) -> Result<Value, E>
    where
        F: FnMut(&Path, Value) -> Result<Value, E>,
    {
        let Value { ty, data } = self;
        let data = match data {
            Data::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    out.push(item.transform_at(&at.index(i), f)?);
                }
                Data::List(out)
            }
            Data::Map(entries) => {
                let is_object = matches!(ty, Type::Object(_));
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    let p = if is_object { at.attr(k.clone()) } else { at.key(k.clone()) };
                    out.insert(k, v.transform_at(&p, f)?);
                }
                Data::Map(out)
            }
            other => other,
        };
        f(at, Value { ty, data })
    }

    /// Check that every node's data agrees with its type.
    pub fn validate(&self) -> Result<(), ShapeError> {
        self.validate_at(&Path::root())
    }

    fn validate_at(&self, at: &Path) -> Result<(), ShapeError> {
        let bad = |message: String| ShapeError { path: at.clone(), message };
        match (&self.ty, &self.data) {
            (_, Data::Null) | (_, Data::Unknown) => Ok(()),
            (Type::Bool, Data::Bool(_)) | (Type::Number, Data::Number(_)) | (Type::String, Data::String(_)) => Ok(()),
            (Type::List(elem), Data::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if !conforms(item.ty(), elem) {
                        return Err(bad(format!("element {} has type {}, expected {}", i, item.ty, elem)));
                    }
                    item.validate_at(&at.index(i))?;
                }
                Ok(())
            }
            (Type::Tuple(elems), Data::List(items)) => {
                if elems.len() != items.len() {
                    return Err(bad(format!("tuple expects {} elements, found {}", elems.len(), items.len())));
                }
                for (i, (item, t)) in items.iter().zip(elems).enumerate() {
                    if !conforms(item.ty(), t) {
                        return Err(bad(format!("element {} has type {}, expected {}", i, item.ty, t)));
                    }
                    item.validate_at(&at.index(i))?;
                }
                Ok(())
            }
            (Type::Map(elem), Data::Map(entries)) => {
                for (k, v) in entries {
                    if !conforms(v.ty(), elem) {
                        return Err(bad(format!("entry {:?} has type {}, expected {}", k, v.ty, elem)));
                    }
                    v.validate_at(&at.key(k.clone()))?;
                }
                Ok(())
            }
            (Type::Object(attrs), Data::Map(entries)) => {
                for (k, v) in entries {
                    match attrs.get(k) {
                        Some(t) if conforms(v.ty(), t) => v.validate_at(&at.attr(k.clone()))?,
                        Some(t) => return Err(bad(format!("attribute {:?} has type {}, expected {}", k, v.ty, t))),
                        None => return Err(bad(format!("attribute {:?} is not part of the object type", k))),
                    }
                }
                // absent attributes are written as Null, never omitted
                match attrs.keys().find(|k| !entries.contains_key(*k)) {
                    Some(missing) => Err(ShapeError {
                        path: at.attr(missing.clone()),
                        message: format!("attribute {:?} is missing", missing),
                    }),
                    None => Ok(()),
                }
            }
            (ty, _) => Err(bad(format!("data does not match type {}", ty.name()))),
        }
    }
}

// A value typed `actual` may sit where `expected` is declared: equal types, or any
// concrete type under a Dynamic declaration.
fn conforms(actual: &Type, expected: &Type) -> bool {
    expected.is_dynamic() || actual == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::object([
            ("metadata", Value::object([
                ("name", Value::string("x")),
                ("labels", Value::unknown(Type::map(Type::String))),
            ])),
            ("spec", Value::object([
                ("ports", Value::list(Type::Number, vec![Value::number(80), Value::number(443)])),
            ])),
        ])
    }

    #[test]
    fn walk_follows_concrete_containers_only() {
        let v = sample();
        assert_eq!(v.walk(&Path::parse("metadata.name").unwrap()), Some(&Value::string("x")));
        assert_eq!(v.walk(&Path::parse("spec.ports[1]").unwrap()), Some(&Value::number(443)));
        assert!(v.walk(&Path::parse(r#"metadata.labels["a"]"#).unwrap()).is_none());
        assert!(v.walk(&Path::parse("spec.ports[2]").unwrap()).is_none());
        // key steps can probe objects
        assert!(v.walk(&Path::parse(r#"metadata["name"]"#).unwrap()).is_some());
    }

    #[test]
    fn transform_visits_children_before_parents() {
        let mut seen = Vec::new();
        sample()
            .transform(&mut |p: &Path, v: Value| -> Result<Value, ()> {
                seen.push(p.to_string());
                Ok(v)
            })
            .unwrap();
        assert_eq!(seen, vec!["metadata.labels", "metadata.name", "metadata", "spec.ports[0]", "spec.ports[1]", "spec.ports", "spec", ""]);
    }

    #[test]
    fn map_children_are_visited_with_key_steps() {
        let v = Value::map(Type::String, BTreeMap::from([("app".to_string(), Value::string("web"))]));
        let mut seen = Vec::new();
        v.transform(&mut |p: &Path, v: Value| -> Result<Value, ()> {
            seen.push(p.clone());
            Ok(v)
        })
        .unwrap();
        assert_eq!(seen[0], Path::root().key("app"));
    }

    #[test]
    fn set_attr_keeps_type_in_sync() {
        let mut v = sample();
        assert!(v.set_attr("status", Value::string("ok")));
        assert_eq!(v.ty().attribute("status"), Some(&Type::String));
        assert!(v.validate().is_ok());
        assert!(!Value::string("x").set_attr("a", Value::bool(true)));
    }

    #[test]
    fn mark_unknown_and_wholly_known() {
        let mut v = sample();
        assert!(!v.is_wholly_known());
        let mut w = Value::object([("a", Value::number(1))]);
        assert!(w.is_wholly_known());
        assert!(w.mark_unknown(&Path::parse("a").unwrap()));
        assert!(w.attr("a").unwrap().is_unknown());
        assert!(!v.mark_unknown(&Path::parse("nope.deeper").unwrap()));
    }

    #[test]
    fn validate_rejects_mismatched_data() {
        let bad = Value::from_parts(Type::String, Data::Bool(true));
        assert!(bad.validate().is_err());
        let bad_list = Value::list(Type::String, vec![Value::number(1)]);
        let err = bad_list.validate().unwrap_err();
        assert!(err.message.contains("element 0"), "{}", err);
        let bad_tuple = Value::from_parts(Type::Tuple(vec![Type::String]), Data::List(vec![]));
        assert!(bad_tuple.validate().is_err());
        let partial = Value::from_parts(
            Type::object([("a", Type::String), ("b", Type::list(Type::String))]),
            Data::Map(BTreeMap::from([("a".to_string(), Value::string("x"))])),
        );
        let err = partial.validate().unwrap_err();
        assert_eq!(err.path.to_string(), "b");
        assert!(err.message.contains("missing"), "{}", err);
        let dynamic_map = Value::map(Type::Dynamic, BTreeMap::from([("k".to_string(), Value::number(1))]));
        assert!(dynamic_map.validate().is_ok());
    }
}
