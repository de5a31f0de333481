//! Manifold core: the typed value tree, paths, and collaborator contracts.

#![forbid(unsafe_code)]

use thiserror::Error;

pub mod collab;
pub mod path;
pub mod types;
pub mod value;

pub use collab::{
    CompletionWaiter, Gvk, ResourceHandle, ResourceScope, SchemaSource, SchemaVariant, ScopeResolver, StatusCause,
    StoreError, StoreStatus, Transport,
};
pub use path::{display_path, Path, PathParseError, Step};
pub use types::{Type, TypeDecodeError, TypeWalkError};
pub use value::{Data, ShapeError, Value};

/// Raised when a value cannot be carried across a type or representation boundary.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}: {message}", display_path(.path))]
pub struct ConversionError {
    pub path: Path,
    pub message: String,
}

impl ConversionError {
    pub fn new(path: &Path, message: impl Into<String>) -> Self {
        Self { path: path.clone(), message: message.into() }
    }
}
