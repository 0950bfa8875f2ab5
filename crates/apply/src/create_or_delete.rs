use serde_json::Value as Json;

use converge_core::{EngineConfig, Provenance, Resource};

use crate::{build_create, build_delete, is_delete_intent, BuildError, CreateOutput, CreateRequest, DeleteOutput, DeleteRequest};

pub struct CreateOrDeleteRequest<'a> {
    pub template: &'a Json,
    /// `None` means one replica; `Some(0)` means delete.
    pub replicas: Option<u32>,
    pub observed: &'a [Resource],
    pub provenance: &'a Provenance,
    pub config: &'a EngineConfig,
}

#[derive(Debug, Clone)]
pub enum CreateOrDeleteOutput {
    Created(CreateOutput),
    Deleted(DeleteOutput),
}

pub fn build_create_or_delete(req: &CreateOrDeleteRequest<'_>) -> Result<CreateOrDeleteOutput, BuildError> {
    if is_delete_intent(req.template, req.replicas) {
        let out = build_delete(&DeleteRequest {
            template: req.template,
            observed: req.observed,
            watch: &req.provenance.watch,
            config: req.config,
        })?;
        return Ok(CreateOrDeleteOutput::Deleted(out));
    }
    let out = build_create(&CreateRequest {
        template: req.template,
        replicas: req.replicas.unwrap_or(1),
        provenance: req.provenance,
        config: req.config,
    })?;
    Ok(CreateOrDeleteOutput::Created(out))
}
