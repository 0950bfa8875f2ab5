use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use converge_core::{EngineConfig, InfoKind, OwnerRef, Resource};

use crate::{base_name, parse_template, BuildError, BuildPhase};

pub struct DeleteRequest<'a> {
    pub template: &'a Json,
    pub observed: &'a [Resource],
    pub watch: &'a OwnerRef,
    pub config: &'a EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub phase: BuildPhase,
    pub message: String,
    pub skipped: usize,
    pub desired: usize,
    pub explicit: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_info: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub desired_info: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub explicit_info: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeleteOutput {
    /// Observed resources not created by this watch that must be deleted.
    pub explicit: Vec<Resource>,
    pub report: DeleteReport,
}

struct Target {
    api_version: String,
    kind: String,
    namespace: Option<String>,
    name: Option<String>,
}

impl Target {
    fn matches(&self, r: &Resource, sep: &str) -> bool {
        if r.api_version != self.api_version || r.kind != self.kind {
            return false;
        }
        if let Some(ns) = &self.namespace {
            if r.namespace() != Some(ns.as_str()) {
                return false;
            }
        }
        match &self.name {
            None => true,
            Some(name) => {
                let n = r.name();
                n == name || n.strip_prefix(name.as_str()).map_or(false, |rest| rest.starts_with(sep))
            }
        }
    }
}

/// Classify observed resources against a delete template.
///
/// Matches created by `watch` are desired deletes: the host drops them by
/// leaving them out of its desired set. Other matches come back as explicit
/// deletes.
pub fn build_delete(req: &DeleteRequest<'_>) -> Result<DeleteOutput, BuildError> {
    let t = parse_template(req.template)?;
    let sep = req.config.name_separator.as_str();
    let target = Target {
        name: base_name(&t),
        namespace: t.namespace().map(str::to_string),
        api_version: t.api_version,
        kind: t.kind,
    };

    let info = &req.config.include_info;
    let mut report = DeleteReport {
        phase: BuildPhase::Skipped,
        message: String::new(),
        skipped: 0,
        desired: 0,
        explicit: 0,
        skipped_info: Vec::new(),
        desired_info: Vec::new(),
        explicit_info: Vec::new(),
    };
    let mut explicit = Vec::new();
    for r in req.observed {
        let id = r.id();
        if !target.matches(r, sep) {
            report.skipped += 1;
            if info.contains(InfoKind::Skip) {
                report.skipped_info.push(id.to_string());
            }
        } else if r.created_by(req.watch) {
            debug!(resource = %id, "desired delete");
            report.desired += 1;
            if info.contains(InfoKind::DesiredDelete) {
                report.desired_info.push(id.to_string());
            }
        } else {
            debug!(resource = %id, "explicit delete");
            report.explicit += 1;
            if info.contains(InfoKind::ExplicitDelete) {
                report.explicit_info.push(id.to_string());
            }
            explicit.push(r.clone());
        }
    }
    counter!("converge_resources_emitted_total", explicit.len() as u64, "kind" => "explicit-delete");

    if report.desired + report.explicit == 0 {
        report.message = format!("Delete {}: no matching resources", target.kind);
    } else {
        report.phase = BuildPhase::Online;
        report.message = format!("Delete {}: {} desired, {} explicit", target.kind, report.desired, report.explicit);
    }
    Ok(DeleteOutput { explicit, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{IncludeInfo, Provenance};
    use serde_json::json;

    fn watch() -> OwnerRef {
        OwnerRef::watch("w-uid", "w")
    }

    fn res(kind: &str, ns: &str, name: &str) -> Resource {
        Resource::from_value(json!({"apiVersion": "v1", "kind": kind, "metadata": {"name": name, "namespace": ns}})).unwrap()
    }

    fn ours(kind: &str, ns: &str, name: &str) -> Resource {
        let p = Provenance::new(watch(), OwnerRef::run("r", "r"), "t");
        res(kind, ns, name).with_provenance(&p)
    }

    fn run(template: Json, observed: &[Resource], cfg: &EngineConfig) -> DeleteOutput {
        let w = watch();
        build_delete(&DeleteRequest { template: &template, observed, watch: &w, config: cfg }).unwrap()
    }

    #[test]
    fn wildcard_template_partitions_by_provenance() {
        let observed = [ours("Pod", "a", "p1"), res("Pod", "a", "p2"), res("Service", "a", "s"), res("Pod", "b", "p3")];
        let out = run(json!({"apiVersion": "v1", "kind": "Pod", "spec": null}), &observed, &EngineConfig::default());
        assert_eq!(out.report.phase, BuildPhase::Online);
        assert_eq!((out.report.skipped, out.report.desired, out.report.explicit), (1, 1, 2));
        let names: Vec<_> = out.explicit.iter().map(|r| r.name()).collect();
        assert_eq!(names, ["p2", "p3"]);
        assert!(out.report.explicit_info.is_empty());
    }

    #[test]
    fn name_and_namespace_narrow_the_match() {
        let observed = [res("Pod", "a", "web"), res("Pod", "a", "web-0"), res("Pod", "a", "webby"), res("Pod", "b", "web-1")];
        let cfg = EngineConfig::default().with_include_info(IncludeInfo::all());
        let out = run(json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "web", "namespace": "a"}}), &observed, &cfg);
        let names: Vec<_> = out.explicit.iter().map(|r| r.name()).collect();
        assert_eq!(names, ["web", "web-0"]);
        assert_eq!(out.report.skipped_info, ["v1/Pod a/webby", "v1/Pod b/web-1"]);
        assert_eq!(out.report.explicit_info.len(), 2);
    }

    #[test]
    fn generate_name_matches_what_create_stamped() {
        let observed = [res("ConfigMap", "a", "cfg-"), res("ConfigMap", "a", "cfg--1"), res("ConfigMap", "a", "cfg")];
        let t = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"generateName": "cfg-"}, "spec": null});
        let out = run(t, &observed, &EngineConfig::default());
        let names: Vec<_> = out.explicit.iter().map(|r| r.name()).collect();
        assert_eq!(names, ["cfg-", "cfg--1"]);
        assert_eq!(out.report.skipped, 1);
    }

    #[test]
    fn api_version_must_match() {
        let mut other = res("Pod", "a", "p");
        other.api_version = "v2".into();
        let out = run(json!({"apiVersion": "v1", "kind": "Pod"}), &[other], &EngineConfig::default());
        assert_eq!(out.report.phase, BuildPhase::Skipped);
        assert_eq!(out.report.skipped, 1);
    }

    #[test]
    fn other_watch_resources_are_explicit() {
        let p = Provenance::new(OwnerRef::watch("other", "o"), OwnerRef::run("r", "r"), "t");
        let theirs = res("Pod", "a", "p").with_provenance(&p);
        let out = run(json!({"apiVersion": "v1", "kind": "Pod"}), &[theirs], &EngineConfig::default());
        assert_eq!(out.report.explicit, 1);
    }

    #[test]
    fn missing_kind_is_an_error() {
        let w = watch();
        let cfg = EngineConfig::default();
        let t = json!({"apiVersion": "v1"});
        let err = build_delete(&DeleteRequest { template: &t, observed: &[], watch: &w, config: &cfg }).unwrap_err();
        assert!(matches!(err, BuildError::MissingKind));
    }
}
