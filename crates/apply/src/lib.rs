//! Converge apply: turn a task's intent into resource deltas.
//!
//! Builders never mutate their inputs. Observed resources are classified by
//! provenance: those created by the current watch are *desired* (the host
//! tracks them), everything else is *explicit* (the host must be told
//! exactly what to change or delete).

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use converge_core::{Resource, ResourceError, ResourceId};
use converge_select::SelectError;

mod create;
mod create_or_delete;
mod delete;
mod merge;
mod update;

pub use create::{build_create, CreateOutput, CreateReport, CreateRequest};
pub use create_or_delete::{build_create_or_delete, CreateOrDeleteOutput, CreateOrDeleteRequest};
pub use delete::{build_delete, DeleteOutput, DeleteReport, DeleteRequest};
pub use merge::{diff_summary, DiffSummary, Merger, ThreeWayMerge};
pub use update::{build_update, UpdateInfo, UpdateOutput, UpdateReport, UpdateRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildPhase {
    Online,
    Skipped,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("template is empty")]
    EmptyTemplate,
    #[error("template missing apiVersion")]
    MissingApiVersion,
    #[error("template missing kind")]
    MissingKind,
    #[error("template {kind} has neither metadata.name nor metadata.generateName")]
    MissingName { kind: String },
    #[error("create needs at least one replica")]
    ZeroReplicas,
    #[error("decoding template: {0}")]
    Template(#[source] ResourceError),
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error("merging {id}: {source:#}")]
    Merge {
        id: ResourceId,
        #[source]
        source: anyhow::Error,
    },
    #[error("merge changed identity of {id} to {merged}")]
    IdentityChanged { id: ResourceId, merged: ResourceId },
}

/// Decode and sanity-check a template: a non-empty object with apiVersion and kind.
pub(crate) fn parse_template(template: &Json) -> Result<Resource, BuildError> {
    match template {
        Json::Null => return Err(BuildError::EmptyTemplate),
        Json::Object(map) if map.is_empty() => return Err(BuildError::EmptyTemplate),
        _ => {}
    }
    let r = Resource::from_value(template.clone()).map_err(BuildError::Template)?;
    if r.api_version.is_empty() {
        return Err(BuildError::MissingApiVersion);
    }
    if r.kind.is_empty() {
        return Err(BuildError::MissingKind);
    }
    Ok(r)
}

/// Base name: `generateName` as given, else `name`.
pub(crate) fn base_name(r: &Resource) -> Option<String> {
    let meta = &r.metadata;
    meta.generate_name.clone().filter(|s| !s.is_empty()).or_else(|| meta.name.clone().filter(|s| !s.is_empty()))
}

/// Whether the template asks for deletion: `replicas: 0` or an explicit `spec: null`.
pub fn is_delete_intent(template: &Json, replicas: Option<u32>) -> bool {
    replicas == Some(0) || template.get("spec").map_or(false, Json::is_null)
}
