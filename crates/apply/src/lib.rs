//! Manifold apply: reconcile a planned resource state against the store.
//!
//! One call of [`ApplyEngine::apply_resource_change`] derives the operation from prior
//! and planned state, backfills computed fields, performs a server-side apply (or a
//! delete), optionally waits for completion and returns the new state shaped by the
//! kind's schema.

#![forbid(unsafe_code)]

pub mod computed;
pub mod diag;
pub mod engine;
pub mod error;
pub mod payload;

pub use computed::{backfill, ComputedFields, DEFAULT_COMPUTED_FIELDS};
pub use diag::{status_diagnostics, Diagnostic, Severity};
pub use engine::{ApplyConfig, ApplyEngine, ApplyRequest, ApplyResponse, Collaborators, Operation};
pub use error::ApplyError;
pub use payload::{remove_nulls, strip_server_side_fields, ResourceId};

/// Field manager recorded by the store for every write.
pub const FIELD_MANAGER: &str = "manifold";

/// The only resource type the engine manages.
pub const MANIFEST_RESOURCE_TYPE: &str = "manifold_manifest";
