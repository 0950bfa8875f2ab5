use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use converge_core::{EngineConfig, InfoKind, Provenance, Resource};

use crate::{base_name, parse_template, BuildError, BuildPhase};

pub struct CreateRequest<'a> {
    pub template: &'a Json,
    pub replicas: u32,
    pub provenance: &'a Provenance,
    pub config: &'a EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReport {
    pub phase: BuildPhase,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CreateOutput {
    pub desired: Vec<Resource>,
    pub report: CreateReport,
}

/// Stamp out `replicas` copies of the template. One replica keeps the base
/// name; more get `base{sep}0..base{sep}N-1`.
pub fn build_create(req: &CreateRequest<'_>) -> Result<CreateOutput, BuildError> {
    if req.replicas == 0 {
        return Err(BuildError::ZeroReplicas);
    }
    let mut template = parse_template(req.template)?;
    let base = base_name(&template)
        .ok_or_else(|| BuildError::MissingName { kind: template.kind.clone() })?;
    template.metadata.generate_name = None;
    let stamped = template.with_provenance(req.provenance);

    let sep = req.config.name_separator.as_str();
    let desired: Vec<Resource> = if req.replicas == 1 {
        vec![stamped.with_name(&base)]
    } else {
        (0..req.replicas).map(|i| stamped.with_name(&format!("{base}{sep}{i}"))).collect()
    };

    let created = if req.config.include_info.contains(InfoKind::Create) {
        desired.iter().map(|r| r.id().to_string()).collect()
    } else {
        Vec::new()
    };
    counter!("converge_resources_emitted_total", desired.len() as u64, "kind" => "create");
    debug!(kind = %template.kind, base = %base, replicas = req.replicas, "built desired resources");

    let message = if desired.len() == 1 {
        format!("Create {} {}", template.kind, base)
    } else {
        format!("Create {} {}{}[0..{}]", template.kind, base, sep, desired.len() - 1)
    };
    Ok(CreateOutput { desired, report: CreateReport { phase: BuildPhase::Online, message, created } })
}
