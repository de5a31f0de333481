//! Null/Unknown normalization over typed trees.

use std::collections::BTreeMap;

use manifold_core::{ConversionError, Data, Path, Type, Value};

/// Every Unknown node becomes Null of the same type. Total and idempotent.
pub fn collapse_unknown_to_null(v: Value) -> Value {
    let (ty, data) = v.into_parts();
    let data = match data {
        Data::Unknown => Data::Null,
        Data::List(items) => Data::List(items.into_iter().map(collapse_unknown_to_null).collect()),
        Data::Map(entries) => Data::Map(entries.into_iter().map(|(k, v)| (k, collapse_unknown_to_null(v))).collect()),
        other => other,
    };
    Value::from_parts(ty, data)
}

/// Reshape `v` to exactly `ty`, marking every position the source does not settle as
/// Unknown: absent attributes, Null or Unknown nodes, and scalars of the wrong kind.
/// Dynamic positions keep whatever the source holds.
pub fn expand_to_unknown(ty: &Type, v: &Value, at: &Path) -> Result<Value, ConversionError> {
    match (ty, v.data()) {
        (_, Data::Unknown) | (_, Data::Null) => Ok(Value::unknown(ty.clone())),
        (Type::Dynamic, _) => Ok(v.clone()),
        (t, d) if t.is_primitive() => match (t, d) {
            (Type::Bool, Data::Bool(_)) | (Type::Number, Data::Number(_)) | (Type::String, Data::String(_)) => {
                Ok(Value::from_parts(t.clone(), d.clone()))
            }
            (_, Data::List(_)) | (_, Data::Map(_)) => {
                Err(ConversionError::new(at, format!("expected {}, found a container", t.name())))
            }
            _ => Ok(Value::unknown(t.clone())),
        },
        (Type::Object(attrs), Data::Map(entries)) => {
            let mut out = BTreeMap::new();
            for (name, t) in attrs {
                let p = at.attr(name.clone());
                let nv = match entries.get(name) {
                    Some(child) => expand_to_unknown(t, child, &p)?,
                    None => Value::unknown(t.clone()),
                };
                out.insert(name.clone(), nv);
            }
            Ok(Value::from_parts(ty.clone(), Data::Map(out)))
        }
        (Type::Map(elem), Data::Map(entries)) => {
            let mut out = BTreeMap::new();
            for (k, child) in entries {
                out.insert(k.clone(), expand_to_unknown(elem, child, &at.key(k.clone()))?);
            }
            Ok(Value::from_parts(ty.clone(), Data::Map(out)))
        }
        (Type::List(elem), Data::List(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, child) in items.iter().enumerate() {
                out.push(expand_to_unknown(elem, child, &at.index(i))?);
            }
            Ok(Value::from_parts(ty.clone(), Data::List(out)))
        }
        (Type::Tuple(elems), Data::List(items)) => {
            if elems.len() != items.len() {
                return Err(ConversionError::new(at, format!("tuple expects {} elements, found {}", elems.len(), items.len())));
            }
            let mut out = Vec::with_capacity(items.len());
            for (i, (t, child)) in elems.iter().zip(items).enumerate() {
                out.push(expand_to_unknown(t, child, &at.index(i))?);
            }
            Ok(Value::from_parts(ty.clone(), Data::List(out)))
        }
        (t, _) => Err(ConversionError::new(at, format!("cannot reconcile {} with {}", v.ty().name(), t.name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc_type() -> Type {
        Type::object([
            ("metadata", Type::object([("name", Type::String), ("labels", Type::map(Type::String))])),
            ("spec", Type::object([
                ("clusterIP", Type::String),
                ("ports", Type::list(Type::object([("port", Type::Number), ("protocol", Type::String)]))),
            ])),
        ])
    }

    #[test]
    fn collapse_turns_every_unknown_into_null() {
        let v = Value::object([
            ("a", Value::unknown(Type::String)),
            ("b", Value::list(Type::Number, vec![Value::unknown(Type::Number), Value::number(1)])),
        ]);
        let c = collapse_unknown_to_null(v.clone());
        assert!(c.attr("a").unwrap().is_null());
        assert!(c.attr("b").unwrap().as_list().unwrap()[0].is_null());
        assert_eq!(c.attr("b").unwrap().as_list().unwrap()[1], Value::number(1));
        assert!(c.is_wholly_known());
        assert_eq!(collapse_unknown_to_null(c.clone()), c);
        assert_eq!(c.ty(), v.ty());
    }

    #[test]
    fn expand_fills_missing_positions_with_unknown() {
        let response = Value::object([
            ("metadata", Value::object([("name", Value::string("svc"))])),
            ("spec", Value::object([
                ("ports", Value::list(Type::Dynamic, vec![Value::object([("port", Value::number(80))])])),
            ])),
        ]);
        let out = expand_to_unknown(&svc_type(), &response, &Path::root()).unwrap();
        assert_eq!(out.ty(), &svc_type());
        assert_eq!(out.walk(&Path::parse("metadata.name").unwrap()), Some(&Value::string("svc")));
        assert!(out.walk(&Path::parse("metadata.labels").unwrap()).unwrap().is_unknown());
        assert!(out.walk(&Path::parse("spec.clusterIP").unwrap()).unwrap().is_unknown());
        assert!(out.walk(&Path::parse("spec.ports[0].protocol").unwrap()).unwrap().is_unknown());
        assert_eq!(out.walk(&Path::parse("spec.ports[0].port").unwrap()), Some(&Value::number(80)));
    }

    #[test]
    fn expand_marks_nulls_and_mismatched_scalars_unknown() {
        let v = Value::object([("metadata", Value::null(Type::Dynamic)), ("spec", Value::object([("clusterIP", Value::number(1))]))]);
        let out = expand_to_unknown(&svc_type(), &v, &Path::root()).unwrap();
        assert!(out.attr("metadata").unwrap().is_unknown());
        assert!(out.walk(&Path::parse("spec.clusterIP").unwrap()).unwrap().is_unknown());
    }

    #[test]
    fn expand_rejects_structural_mismatch() {
        let v = Value::object([("spec", Value::string("oops"))]);
        let err = expand_to_unknown(&svc_type(), &v, &Path::root()).unwrap_err();
        assert_eq!(err.path.to_string(), "spec");
        let v = Value::object([("metadata", Value::object([("name", Value::list(Type::String, vec![]))]))]);
        let err = expand_to_unknown(&svc_type(), &v, &Path::root()).unwrap_err();
        assert_eq!(err.path.to_string(), "metadata.name");
    }

    #[test]
    fn expand_then_collapse_is_null_filled() {
        let v = Value::object([("metadata", Value::object([("name", Value::string("svc"))]))]);
        let out = collapse_unknown_to_null(expand_to_unknown(&svc_type(), &v, &Path::root()).unwrap());
        assert!(out.is_wholly_known());
        assert!(out.attr("spec").unwrap().is_null());
        assert!(out.validate().is_ok());
    }
}
