//! Converge core types: resources, field paths, provenance and engine config.
//!
//! Everything the selector, builders and run engine share lives here. Types in
//! this crate are plain values; nothing here performs I/O.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod path;
pub mod provenance;
pub mod resource;

pub use config::{EngineConfig, IncludeInfo, InfoKind};
pub use error::{PathError, ResourceError};
pub use path::{render_scalar, FieldPath, Segment};
pub use provenance::{OwnerKind, OwnerRef, Provenance};
pub use resource::{Identity, Resource, ResourceId};

/// Arbitrary nested document (`spec`, `status`, templates, patches).
pub type Document = serde_json::Value;

pub mod prelude {
    pub use super::{
        Document, EngineConfig, FieldPath, Identity, IncludeInfo, InfoKind, OwnerKind, OwnerRef,
        PathError, Provenance, Resource, ResourceError, ResourceId,
    };
}
