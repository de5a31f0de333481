//! Addressable positions inside a value tree.
//!
//! A [`Path`] is relative to a schema root. Its canonical string form is the only
//! equality basis used when paths are stored as keys (see the computed-field set in
//! `manifold-apply`), so `Display` and [`Path::parse`] must stay in lockstep.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// Object attribute.
    Attr(String),
    /// Map entry.
    Key(String),
    /// List or tuple element.
    Index(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path {
    steps: SmallVec<[Step; 6]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid field path {input:?} at byte {offset}: {reason}")]
pub struct PathParseError {
    pub input: String,
    pub offset: usize,
    pub reason: &'static str,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Extend a copy of this path by one step.
    pub fn with(&self, step: Step) -> Path {
        let mut p = self.clone();
        p.push(step);
        p
    }

    pub fn attr(&self, name: impl Into<String>) -> Path {
        self.with(Step::Attr(name.into()))
    }

    pub fn key(&self, key: impl Into<String>) -> Path {
        self.with(Step::Key(key.into()))
    }

    pub fn index(&self, i: usize) -> Path {
        self.with(Step::Index(i))
    }

    pub fn parent(&self) -> Option<Path> {
        if self.steps.is_empty() {
            return None;
        }
        let mut p = self.clone();
        p.steps.pop();
        Some(p)
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.steps.len() >= prefix.steps.len() && self.steps[..prefix.steps.len()] == prefix.steps[..]
    }

    /// Parse a user-supplied field path such as `metadata.labels`,
    /// `metadata.annotations["app.kubernetes.io/name"]` or `spec.ports[0].port`.
    /// A single leading `.` is accepted and ignored. Attribute names that are not plain
    /// identifiers are written as JSON strings: `spec."app.kubernetes.io/name"`.
    pub fn parse(input: &str) -> Result<Path, PathParseError> {
        let err = |offset: usize, reason: &'static str| PathParseError { input: input.to_string(), offset, reason };
        let bytes = input.as_bytes();
        let mut pos = if input.starts_with('.') { 1 } else { 0 };
        if pos >= bytes.len() {
            return Err(err(pos, "empty path"));
        }
        let mut path = Path::root();
        let mut expect_attr = true;
        while pos < bytes.len() {
            match bytes[pos] {
                b'[' => {
                    let (step, next) = parse_bracket(input, pos).map_err(|(o, r)| err(o, r))?;
                    path.push(step);
                    pos = next;
                    expect_attr = false;
                }
                b'.' if !expect_attr => {
                    pos += 1;
                    if pos >= bytes.len() {
                        return Err(err(pos, "trailing '.'"));
                    }
                    expect_attr = true;
                    if bytes[pos] == b'[' || bytes[pos] == b'.' {
                        return Err(err(pos, "expected attribute name after '.'"));
                    }
                }
                b'"' if expect_attr => {
                    let (name, next) = scan_quoted(input, pos).map_err(|(o, r)| err(o, r))?;
                    path.push(Step::Attr(name));
                    pos = next;
                    expect_attr = false;
                }
                _ if expect_attr => {
                    let start = pos;
                    while pos < bytes.len() && is_ident_byte(bytes[pos]) {
                        pos += 1;
                    }
                    if start == pos {
                        return Err(err(pos, "expected attribute name"));
                    }
                    path.push(Step::Attr(input[start..pos].to_string()));
                    expect_attr = false;
                }
                _ => return Err(err(pos, "expected '.' or '['")),
            }
        }
        Ok(path)
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'$'
}

fn is_bare_attr(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_ident_byte)
}

// Reads a JSON string literal opening at `start`; returns it and the offset after the closing quote.
fn scan_quoted(input: &str, start: usize) -> Result<(String, usize), (usize, &'static str)> {
    let bytes = input.as_bytes();
    let mut pos = start + 1;
    let mut escaped = false;
    loop {
        match bytes.get(pos) {
            None => return Err((start, "unterminated string")),
            Some(b'\\') if !escaped => escaped = true,
            Some(b'"') if !escaped => break,
            Some(_) => escaped = false,
        }
        pos += 1;
    }
    let s: String = serde_json::from_str(&input[start..=pos]).map_err(|_| (start, "invalid string"))?;
    Ok((s, pos + 1))
}

// Parses `[123]` or `["key"]` starting at `open`; returns the step and the offset after `]`.
fn parse_bracket(input: &str, open: usize) -> Result<(Step, usize), (usize, &'static str)> {
    let bytes = input.as_bytes();
    let mut pos = open + 1;
    match bytes.get(pos) {
        Some(b'"') => {
            let (key, next) = scan_quoted(input, pos)?;
            pos = next;
            if bytes.get(pos) != Some(&b']') {
                return Err((pos, "expected ']' after key"));
            }
            Ok((Step::Key(key), pos + 1))
        }
        Some(b) if b.is_ascii_digit() => {
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            let idx: usize = input[start..pos].parse().map_err(|_| (start, "index out of range"))?;
            if bytes.get(pos) != Some(&b']') {
                return Err((pos, "expected ']' after index"));
            }
            Ok((Step::Index(idx), pos + 1))
        }
        _ => Err((pos, "expected index or quoted key after '['")),
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                Step::Attr(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    if is_bare_attr(name) {
                        f.write_str(name)?
                    } else {
                        // quoted so `."a.b"` stays distinct from `.a.b` and from `["a.b"]`
                        let quoted = serde_json::to_string(name).map_err(|_| fmt::Error)?;
                        f.write_str(&quoted)?
                    }
                }
                Step::Key(key) => {
                    let quoted = serde_json::to_string(key).map_err(|_| fmt::Error)?;
                    write!(f, "[{}]", quoted)?
                }
                Step::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl FromIterator<Step> for Path {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Path { steps: iter.into_iter().collect() }
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Path::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Render a path for error messages; the root has no canonical text of its own.
pub fn display_path(p: &Path) -> String {
    if p.is_empty() { "(root)".to_string() } else { p.to_string() }
}
