use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, info};

use converge_core::{EngineConfig, InfoKind, OwnerRef, Resource};
use converge_select::{CompiledSelector, ResourceSelector};

use crate::merge::{diff_summary, DiffSummary, Merger};
use crate::{BuildError, BuildPhase};

pub struct UpdateRequest<'a> {
    pub patch: &'a Json,
    pub target: &'a ResourceSelector,
    pub observed: &'a [Resource],
    pub watch: &'a OwnerRef,
    pub merger: &'a dyn Merger,
    pub config: &'a EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub resource: String,
    pub diff: DiffSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub phase: BuildPhase,
    pub message: String,
    pub desired: usize,
    pub explicit: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub desired_info: Vec<UpdateInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub explicit_info: Vec<UpdateInfo>,
}

#[derive(Debug, Clone)]
pub struct UpdateOutput {
    /// Merged copies of resources this watch created.
    pub desired: Vec<Resource>,
    /// Merged copies of everything else the target selected.
    pub explicit: Vec<Resource>,
    pub report: UpdateReport,
}

/// Merge `patch` into every observed resource the target selects.
pub fn build_update(req: &UpdateRequest<'_>) -> Result<UpdateOutput, BuildError> {
    let selector = CompiledSelector::compile(req.target)?;
    let mut eligible = Vec::new();
    for r in req.observed {
        if selector.matches(r)? {
            eligible.push(r);
        }
    }
    if eligible.is_empty() {
        debug!(observed = req.observed.len(), "update target selected nothing");
        return Ok(UpdateOutput {
            desired: Vec::new(),
            explicit: Vec::new(),
            report: UpdateReport {
                phase: BuildPhase::Skipped,
                message: "no eligible resources".to_string(),
                desired: 0,
                explicit: 0,
                desired_info: Vec::new(),
                explicit_info: Vec::new(),
            },
        });
    }

    let info = &req.config.include_info;
    let mut out = UpdateOutput {
        desired: Vec::new(),
        explicit: Vec::new(),
        report: UpdateReport {
            phase: BuildPhase::Online,
            message: String::new(),
            desired: 0,
            explicit: 0,
            desired_info: Vec::new(),
            explicit_info: Vec::new(),
        },
    };
    for r in eligible {
        let id = r.id();
        let before = r.to_value().map_err(BuildError::Template)?;
        let merged = req
            .merger
            .merge(&before, req.patch, req.patch)
            .map_err(|source| BuildError::Merge { id: id.clone(), source })?;
        let diff = diff_summary(&merged, &before);
        let updated = Resource::from_value(merged).map_err(|e| BuildError::Merge { id: id.clone(), source: e.into() })?;
        let merged_id = updated.id();
        if merged_id != id {
            return Err(BuildError::IdentityChanged { id, merged: merged_id });
        }

        let entry = UpdateInfo { resource: id.to_string(), diff };
        if r.created_by(req.watch) {
            debug!(resource = %id, adds = diff.adds, updates = diff.updates, removes = diff.removes, "desired update");
            if info.contains(InfoKind::DesiredUpdate) {
                out.report.desired_info.push(entry);
            }
            out.desired.push(updated);
        } else {
            debug!(resource = %id, adds = diff.adds, updates = diff.updates, removes = diff.removes, "explicit update");
            if info.contains(InfoKind::ExplicitUpdate) {
                out.report.explicit_info.push(entry);
            }
            out.explicit.push(updated);
        }
    }
    out.report.desired = out.desired.len();
    out.report.explicit = out.explicit.len();
    out.report.message = format!("Update: {} desired, {} explicit", out.report.desired, out.report.explicit);
    counter!("converge_resources_emitted_total", out.explicit.len() as u64, "kind" => "explicit-update");
    counter!("converge_resources_emitted_total", out.desired.len() as u64, "kind" => "desired-update");
    info!(desired = out.report.desired, explicit = out.report.explicit, "update built");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ThreeWayMerge;
    use anyhow::anyhow;
    use converge_core::{IncludeInfo, Provenance};
    use converge_select::SelectorTerm;
    use serde_json::json;

    fn watch() -> OwnerRef {
        OwnerRef::watch("w-uid", "w")
    }

    fn deploy(name: &str, replicas: i64) -> Resource {
        Resource::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": name, "namespace": "ns", "labels": {"app": "web"}},
            "spec": {"replicas": replicas, "paused": false}
        }))
        .unwrap()
    }

    fn ours(name: &str, replicas: i64) -> Resource {
        deploy(name, replicas).with_provenance(&Provenance::new(watch(), OwnerRef::run("r", "r"), "t"))
    }

    fn update(patch: Json, observed: &[Resource], merger: &dyn Merger, cfg: &EngineConfig) -> Result<UpdateOutput, BuildError> {
        let w = watch();
        let target = ResourceSelector::kind("Deployment");
        build_update(&UpdateRequest { patch: &patch, target: &target, observed, watch: &w, merger, config: cfg })
    }

    #[test]
    fn partitions_and_merges() {
        let observed = [ours("a", 1), deploy("b", 1)];
        let cfg = EngineConfig::default().with_include_info(IncludeInfo::all());
        let out = update(json!({"spec": {"replicas": 3}}), &observed, &ThreeWayMerge, &cfg).unwrap();
        assert_eq!(out.report.phase, BuildPhase::Online);
        assert_eq!(out.desired.len(), 1);
        assert_eq!(out.explicit.len(), 1);
        assert_eq!(out.desired[0].spec(), Some(&json!({"replicas": 3, "paused": false})));
        assert_eq!(out.explicit[0].name(), "b");
        assert_eq!(out.report.explicit_info[0].diff, DiffSummary { adds: 0, updates: 1, removes: 0 });
        assert!(out.desired[0].created_by(&watch()));
    }

    #[test]
    fn observed_inputs_are_not_mutated() {
        let observed = [deploy("b", 1)];
        let before = observed.clone();
        update(json!({"spec": {"replicas": 5}}), &observed, &ThreeWayMerge, &EngineConfig::default()).unwrap();
        assert_eq!(observed, before);
    }

    #[test]
    fn nothing_selected_is_skipped() {
        let svc = Resource::from_value(json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "s"}})).unwrap();
        let out = update(json!({"spec": {}}), &[svc], &ThreeWayMerge, &EngineConfig::default()).unwrap();
        assert_eq!(out.report.phase, BuildPhase::Skipped);
        assert_eq!(out.report.message, "no eligible resources");
    }

    #[test]
    fn label_narrowed_target() {
        let mut other = deploy("c", 1);
        other.metadata.labels = None;
        let observed = [deploy("b", 1), other];
        let w = watch();
        let cfg = EngineConfig::default();
        let target = ResourceSelector::new([SelectorTerm::default().field("kind", "Deployment").label("app", "web")]);
        let patch = json!({"metadata": {"labels": {"tier": "fe"}}});
        let out = build_update(&UpdateRequest { patch: &patch, target: &target, observed: &observed, watch: &w, merger: &ThreeWayMerge, config: &cfg }).unwrap();
        assert_eq!(out.explicit.len(), 1);
        assert_eq!(out.explicit[0].label("tier"), Some("fe"));
        assert_eq!(out.explicit[0].label("app"), Some("web"));
    }

    struct Failing;

    impl Merger for Failing {
        fn merge(&self, _: &Json, _: &Json, _: &Json) -> anyhow::Result<Json> {
            Err(anyhow!("conflict"))
        }
    }

    #[test]
    fn merge_failure_names_the_resource() {
        let err = update(json!({"spec": {}}), &[deploy("b", 1)], &Failing, &EngineConfig::default()).unwrap_err();
        match err {
            BuildError::Merge { id, .. } => assert_eq!(id.name, "b"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn renaming_through_a_patch_is_rejected() {
        let err = update(json!({"metadata": {"name": "renamed"}}), &[deploy("b", 1)], &ThreeWayMerge, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, BuildError::IdentityChanged { .. }));
    }
}
