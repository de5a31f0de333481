//! Manifold morph: the value bridge (typed ↔ untyped) and Null/Unknown normalization.

#![forbid(unsafe_code)]

pub mod bridge;
pub mod normalize;

pub use bridge::{coerce, from_untyped, to_untyped};
pub use normalize::{collapse_unknown_to_null, expand_to_unknown};
