//! Computed fields: positions whose final value the store decides, and the backfill
//! that fills them from the user manifest where the planner left them Unknown.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use manifold_core::{ConversionError, Path, Type, Value};
use manifold_morph::coerce;

use crate::diag::Diagnostic;

pub const DEFAULT_COMPUTED_FIELDS: [&str; 2] = ["metadata.annotations", "metadata.labels"];

/// Set of paths keyed by canonical string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputedFields {
    paths: BTreeMap<String, Path>,
}

impl ComputedFields {
    pub fn defaults() -> Self {
        DEFAULT_COMPUTED_FIELDS.iter().filter_map(|s| Path::parse(s).ok()).collect()
    }

    /// Parse a configured list; absent or empty selects the defaults. Every entry that
    /// fails to parse yields its own diagnostic.
    pub fn from_config(list: Option<&[String]>) -> Result<Self, Vec<Diagnostic>> {
        let list = match list {
            Some(l) if !l.is_empty() => l,
            _ => return Ok(Self::defaults()),
        };
        let mut out = Self::default();
        let mut errs = Vec::new();
        for raw in list {
            match Path::parse(raw) {
                Ok(p) => out.insert(p),
                Err(e) => errs.push(Diagnostic::error(format!("[computed_fields] cannot parse field path element: {}", raw), e.to_string())),
            }
        }
        if errs.is_empty() {
            Ok(out)
        } else {
            Err(errs)
        }
    }

    pub fn insert(&mut self, p: Path) {
        self.paths.insert(p.to_string(), p);
    }

    pub fn contains(&self, p: &Path) -> bool {
        self.paths.contains_key(&p.to_string())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.paths.iter().map(|(k, p)| (k.as_str(), p))
    }

    /// The subset that `schema` can address. The rest is logged and dropped.
    pub fn addressable_in(&self, schema: &Type) -> ComputedFields {
        let mut out = ComputedFields::default();
        for (key, p) in self.iter() {
            match schema.walk(p) {
                Ok(_) => out.insert(p.clone()),
                Err(e) => warn!(path = %key, error = %e, "computed field does not resolve in schema; ignored"),
            }
        }
        out
    }
}

impl FromIterator<Path> for ComputedFields {
    fn from_iter<I: IntoIterator<Item = Path>>(iter: I) -> Self {
        let mut out = ComputedFields::default();
        for p in iter {
            out.insert(p);
        }
        out
    }
}

/// Replace Unknown computed positions of `planned` with the manifest's value at the
/// same path, coerced to the planned position's type. Known, Null and non-computed
/// positions are left alone; a computed position absent from the manifest stays
/// Unknown.
pub fn backfill(planned: Value, manifest: &Value, computed: &ComputedFields, schema: &Type) -> Result<Value, ConversionError> {
    let live = computed.addressable_in(schema);
    if live.is_empty() {
        return Ok(planned);
    }
    planned.transform(&mut |at: &Path, v: Value| -> Result<Value, ConversionError> {
        if !v.is_unknown() || !live.contains(at) {
            return Ok(v);
        }
        match manifest.walk(at) {
            None => {
                trace!(path = %at, "computed field absent from manifest; stays unknown");
                Ok(v)
            }
            Some(src) => {
                let filled = coerce(src, v.ty(), at)?;
                debug!(path = %at, "backfilled computed field from manifest");
                Ok(filled)
            }
        }
    })
}
