//! Conversion between the typed value tree and untyped JSON.
//!
//! This is the only place values cross between the two models. Scalars follow the
//! store's looser typing: a string position accepts numbers and booleans (int-or-string
//! fields), a number position accepts numeric strings, a bool position accepts
//! `"true"`/`"false"`.

use std::collections::BTreeMap;

use manifold_core::{ConversionError, Data, Path, Type, Value};
use serde_json::{Number, Value as Json};
use tracing::trace;

/// Typed → untyped. Unknown values have no untyped form and fail with their path.
pub fn to_untyped(v: &Value, at: &Path) -> Result<Json, ConversionError> {
    Ok(match v.data() {
        Data::Unknown => return Err(ConversionError::new(at, "cannot convert unknown value")),
        Data::Null => Json::Null,
        Data::Bool(b) => Json::Bool(*b),
        Data::Number(n) => Json::Number(n.clone()),
        Data::String(s) => Json::String(s.clone()),
        Data::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(to_untyped(item, &at.index(i))?);
            }
            Json::Array(out)
        }
        Data::Map(entries) => {
            let mut out = serde_json::Map::with_capacity(entries.len());
            for (k, item) in entries {
                let step = v.child_step(k);
                out.insert(k.clone(), to_untyped(item, &at.with(step))?);
            }
            Json::Object(out)
        }
    })
}

/// Untyped → typed, shaped by `ty`.
pub fn from_untyped(obj: &Json, ty: &Type, at: &Path) -> Result<Value, ConversionError> {
    match (obj, ty) {
        (Json::Null, _) => Ok(Value::null(ty.clone())),
        (_, Type::Dynamic) => infer(obj, at),
        (Json::Bool(_) | Json::Number(_) | Json::String(_), t) if t.is_primitive() => scalar(obj, t, at),
        (Json::Array(items), Type::List(elem)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(from_untyped(item, elem, &at.index(i))?);
            }
            Ok(Value::from_parts(ty.clone(), Data::List(out)))
        }
        (Json::Array(items), Type::Tuple(elems)) => {
            if items.len() != elems.len() {
                return Err(ConversionError::new(at, format!("tuple expects {} elements, found {}", elems.len(), items.len())));
            }
            let mut out = Vec::with_capacity(items.len());
            for (i, (item, t)) in items.iter().zip(elems).enumerate() {
                out.push(from_untyped(item, t, &at.index(i))?);
            }
            Ok(Value::from_parts(ty.clone(), Data::List(out)))
        }
        (Json::Object(entries), Type::Map(elem)) => {
            let mut out = BTreeMap::new();
            for (k, item) in entries {
                out.insert(k.clone(), from_untyped(item, elem, &at.key(k.clone()))?);
            }
            Ok(Value::from_parts(ty.clone(), Data::Map(out)))
        }
        (Json::Object(entries), Type::Object(attrs)) => {
            for k in entries.keys().filter(|k| !attrs.contains_key(*k)) {
                trace!(path = %at.attr(k.clone()), "skipping attribute not present in type");
            }
            let mut out = BTreeMap::new();
            for (name, t) in attrs {
                let p = at.attr(name.clone());
                let v = match entries.get(name) {
                    Some(item) => from_untyped(item, t, &p)?,
                    None => Value::null(t.clone()),
                };
                out.insert(name.clone(), v);
            }
            Ok(Value::from_parts(ty.clone(), Data::Map(out)))
        }
        (obj, ty) => Err(ConversionError::new(at, format!("cannot convert {} to {}", json_kind(obj), ty.name()))),
    }
}

/// Typed → typed: carry `v` into `ty`, keeping Null and Unknown states.
pub fn coerce(v: &Value, ty: &Type, at: &Path) -> Result<Value, ConversionError> {
    match (v.data(), ty) {
        (Data::Unknown, _) => Ok(Value::unknown(ty.clone())),
        (Data::Null, _) => Ok(Value::null(ty.clone())),
        (_, Type::Dynamic) => Ok(v.clone()),
        (Data::Bool(_) | Data::Number(_) | Data::String(_), t) if t.is_primitive() => scalar(&to_untyped(v, at)?, t, at),
        (Data::List(items), Type::List(elem)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(coerce(item, elem, &at.index(i))?);
            }
            Ok(Value::from_parts(ty.clone(), Data::List(out)))
        }
        (Data::List(items), Type::Tuple(elems)) => {
            if items.len() != elems.len() {
                return Err(ConversionError::new(at, format!("tuple expects {} elements, found {}", elems.len(), items.len())));
            }
            let mut out = Vec::with_capacity(items.len());
            for (i, (item, t)) in items.iter().zip(elems).enumerate() {
                out.push(coerce(item, t, &at.index(i))?);
            }
            Ok(Value::from_parts(ty.clone(), Data::List(out)))
        }
        (Data::Map(entries), Type::Map(elem)) => {
            let mut out = BTreeMap::new();
            for (k, item) in entries {
                out.insert(k.clone(), coerce(item, elem, &at.key(k.clone()))?);
            }
            Ok(Value::from_parts(ty.clone(), Data::Map(out)))
        }
        (Data::Map(entries), Type::Object(attrs)) => {
            let mut out = BTreeMap::new();
            for (name, t) in attrs {
                let p = at.attr(name.clone());
                let nv = match entries.get(name) {
                    Some(item) => coerce(item, t, &p)?,
                    None => Value::null(t.clone()),
                };
                out.insert(name.clone(), nv);
            }
            Ok(Value::from_parts(ty.clone(), Data::Map(out)))
        }
        (_, ty) => Err(ConversionError::new(at, format!("cannot convert {} to {}", v.ty().name(), ty.name()))),
    }
}

fn scalar(obj: &Json, ty: &Type, at: &Path) -> Result<Value, ConversionError> {
    match (ty, obj) {
        (Type::String, Json::String(s)) => Ok(Value::string(s.clone())),
        (Type::String, Json::Number(n)) => Ok(Value::string(n.to_string())),
        (Type::String, Json::Bool(b)) => Ok(Value::string(b.to_string())),
        (Type::Number, Json::Number(n)) => Ok(Value::number(n.clone())),
        (Type::Number, Json::String(s)) => parse_number(s)
            .map(Value::number)
            .ok_or_else(|| ConversionError::new(at, format!("cannot convert string {:?} to number", s))),
        (Type::Bool, Json::Bool(b)) => Ok(Value::bool(*b)),
        (Type::Bool, Json::String(s)) => match s.as_str() {
            "true" => Ok(Value::bool(true)),
            "false" => Ok(Value::bool(false)),
            _ => Err(ConversionError::new(at, format!("cannot convert string {:?} to bool", s))),
        },
        (ty, obj) => Err(ConversionError::new(at, format!("cannot convert {} to {}", json_kind(obj), ty.name()))),
    }
}

fn parse_number(s: &str) -> Option<Number> {
    if s.is_empty() || s.trim() != s {
        return None;
    }
    serde_json::from_str::<Number>(s).ok()
}

// Concrete type for a value placed under a Dynamic position.
fn infer(obj: &Json, at: &Path) -> Result<Value, ConversionError> {
    Ok(match obj {
        Json::Null => Value::null(Type::Dynamic),
        Json::Bool(b) => Value::bool(*b),
        Json::Number(n) => Value::number(n.clone()),
        Json::String(s) => Value::string(s.clone()),
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(infer(item, &at.index(i))?);
            }
            Value::tuple(out)
        }
        Json::Object(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (k, item) in entries {
                out.push((k.clone(), infer(item, &at.attr(k.clone()))?));
            }
            Value::object(out)
        }
    })
}

fn json_kind(obj: &Json) -> &'static str {
    match obj {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
