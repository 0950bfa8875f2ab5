//! Converge API: the host-facing reconcile call.
//!
//! The host hands over the watched resource and its current attachments and
//! gets back the desired attachments, explicit deltas and a status patch.
//! The watched resource's `spec` carries the run (`tasks`, `if`); it acts as
//! both the run and the watch owner.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use converge_core::{EngineConfig, OwnerRef, Resource, ResourceId};
use converge_run::{Completion, Engine, RunOutcome, RunPhase, RunRequest, RunSpec, TaskPhase, TaskResult};

#[derive(Debug, Clone, Default)]
pub struct ReconcileRequest {
    pub watch: Resource,
    pub attachments: BTreeMap<ResourceId, Resource>,
}

impl ReconcileRequest {
    pub fn new(watch: Resource, attachments: impl IntoIterator<Item = Resource>) -> Self {
        let attachments = attachments.into_iter().map(|r| (r.id(), r)).collect();
        Self { watch, attachments }
    }

    /// Decode raw documents; errors name the offending document.
    pub fn from_values(watch: Json, attachments: Vec<Json>) -> Result<Self> {
        let watch = Resource::from_value(watch).context("decoding watched resource")?;
        let mut out = Self { watch, attachments: BTreeMap::new() };
        for (i, doc) in attachments.into_iter().enumerate() {
            let r = Resource::from_value(doc).with_context(|| format!("decoding attachment #{i}"))?;
            let id = r.id();
            if out.attachments.insert(id.clone(), r).is_some() {
                warn!(attachment = %id, "duplicate attachment; keeping the last one");
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusPhase {
    Online,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPatch {
    pub phase: StatusPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn: Option<String>,
    pub completion: Completion,
    #[serde(rename = "taskResults", skip_serializing_if = "Vec::is_empty")]
    pub task_results: Vec<TaskResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub attachments: Vec<Resource>,
    pub explicit_updates: Vec<Resource>,
    pub explicit_deletes: Vec<Resource>,
    pub status: StatusPatch,
}

/// One reconciliation pass. Never fails: fatal problems come back as an
/// `Error` status with no attachments.
pub fn reconcile(request: &ReconcileRequest, config: &EngineConfig) -> ReconcileResponse {
    reconcile_with(&Engine::new(config.clone()), request)
}

/// Like [`reconcile`] but with a caller-built engine (e.g. a custom merger).
pub fn reconcile_with(engine: &Engine, request: &ReconcileRequest) -> ReconcileResponse {
    let id = request.watch.id();
    match plan(engine, request) {
        Ok(outcome) => {
            let resp = from_outcome(outcome);
            info!(watch = %id, phase = ?resp.status.phase, attachments = resp.attachments.len(), "reconciled");
            resp
        }
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(watch = %id, error = %reason, "reconcile failed");
            ReconcileResponse {
                attachments: Vec::new(),
                explicit_updates: Vec::new(),
                explicit_deletes: Vec::new(),
                status: StatusPatch {
                    phase: StatusPhase::Error,
                    reason: Some(reason),
                    warn: None,
                    completion: Completion::default(),
                    task_results: Vec::new(),
                },
            }
        }
    }
}

fn plan(engine: &Engine, request: &ReconcileRequest) -> Result<RunOutcome> {
    let w = &request.watch;
    let spec: RunSpec = match w.spec() {
        Some(v) => serde_json::from_value(v.clone()).with_context(|| format!("decoding run spec of {}", w.id()))?,
        None => RunSpec::default(),
    };
    let uid = w.uid().unwrap_or_default();
    let run = OwnerRef::run(uid, w.name());
    let watch = OwnerRef::watch(uid, w.name());
    let observed: Vec<Resource> = request.attachments.values().cloned().collect();
    debug!(watch = %w.id(), tasks = spec.tasks.len(), observed = observed.len(), "planning run");
    let outcome = engine
        .run(RunRequest { run: &run, watch: &watch, spec: &spec, observed: &observed })
        .with_context(|| format!("running {}", w.id()))?;
    Ok(outcome)
}

fn from_outcome(outcome: RunOutcome) -> ReconcileResponse {
    let st = outcome.status;
    let failed: Vec<&str> =
        st.task_results.iter().filter(|r| r.phase == TaskPhase::Failed).map(|r| r.key.as_str()).collect();
    let failed_warn = (!failed.is_empty()).then(|| format!("assert failed: {}", failed.join(", ")));
    let (phase, reason, warn) = match st.phase {
        RunPhase::Online => (StatusPhase::Online, None, failed_warn),
        RunPhase::Skipped => (StatusPhase::Online, None, st.reason.clone()),
        RunPhase::Error => (StatusPhase::Error, st.message.clone().or_else(|| st.reason.clone()), failed_warn),
    };
    ReconcileResponse {
        attachments: outcome.desired,
        explicit_updates: outcome.explicit_updates,
        explicit_deletes: outcome.explicit_deletes,
        status: StatusPatch { phase, reason, warn, completion: st.completion, task_results: st.task_results },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn watch(spec: Json) -> Json {
        json!({
            "apiVersion": "dev.converge/v1",
            "kind": "Recipe",
            "metadata": {"name": "w", "namespace": "default", "uid": "w-uid"},
            "spec": spec
        })
    }

    #[test]
    fn response_types_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReconcileRequest>();
        assert_send_sync::<ReconcileResponse>();
        assert_send_sync::<Engine>();
    }

    #[test]
    fn attachments_are_keyed_by_id() {
        let req = ReconcileRequest::from_values(
            watch(json!({})),
            vec![
                json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "a", "namespace": "default"}}),
                json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "a", "namespace": "default"}}),
                json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "a", "namespace": "default"}}),
            ],
        )
        .unwrap();
        assert_eq!(req.attachments.len(), 2);
        assert!(req.attachments.contains_key(&ResourceId::new("v1", "Service", Some("default"), "a")));
    }

    #[test]
    fn bad_attachment_names_its_position() {
        let err = ReconcileRequest::from_values(watch(json!({})), vec![json!([1])]).unwrap_err();
        assert!(format!("{err:#}").contains("attachment #0"));
    }

    #[test]
    fn fatal_errors_become_error_status() {
        let req = ReconcileRequest::from_values(watch(json!({"tasks": []})), vec![]).unwrap();
        let resp = reconcile(&req, &EngineConfig::default());
        assert_eq!(resp.status.phase, StatusPhase::Error);
        assert!(resp.status.reason.as_deref().unwrap().contains("run has no tasks"));
        assert!(resp.attachments.is_empty());

        let req = ReconcileRequest::from_values(watch(json!({"tasks": "nope"})), vec![]).unwrap();
        let resp = reconcile(&req, &EngineConfig::default());
        assert!(resp.status.reason.unwrap().contains("decoding run spec"));
    }

    #[test]
    fn online_status_with_assert_warning() {
        let spec = json!({
            "tasks": [
                {"key": "cm", "apply": {"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cm"}}},
                {"key": "no-pods", "assert": {"conditions": [{
                    "resourceSelector": {"selectorTerms": [{"matchFields": {"kind": "Pod"}}]},
                    "operator": "NotExist"
                }]}}
            ]
        });
        let pod = json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "p", "namespace": "default"}});
        let req = ReconcileRequest::from_values(watch(spec), vec![pod]).unwrap();
        let resp = reconcile(&req, &EngineConfig::default());
        assert_eq!(resp.status.phase, StatusPhase::Online);
        assert_eq!(resp.status.warn.as_deref(), Some("assert failed: no-pods"));
        assert_eq!(resp.status.completion, Completion { state: true, observed: 2, desired: 2 });
        assert_eq!(resp.attachments.len(), 1);
        let p = resp.attachments[0].provenance().unwrap();
        assert_eq!(p.watch.uid, "w-uid");
        assert_eq!(p.run.unwrap().name, "w");

        let body = serde_json::to_value(&resp).unwrap();
        assert_eq!(body["status"]["phase"], "Online");
        assert_eq!(body["status"]["completion"]["desired"], 2);
        assert!(body.get("explicitDeletes").is_some());
    }

    #[test]
    fn skipped_run_is_online_with_warning() {
        let spec = json!({
            "if": {"conditions": [{"resourceSelector": {"selectorTerms": [{"matchFields": {"kind": "Service"}}]}}]},
            "tasks": [{"key": "cm", "apply": {"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cm"}}}]
        });
        let pod = json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "p"}});
        let req = ReconcileRequest::from_values(watch(spec), vec![pod]).unwrap();
        let resp = reconcile(&req, &EngineConfig::default());
        assert_eq!(resp.status.phase, StatusPhase::Online);
        assert_eq!(resp.status.warn.as_deref(), Some(converge_run::RUN_GUARD_SKIPPED));
        assert!(resp.attachments.is_empty());
    }
}
