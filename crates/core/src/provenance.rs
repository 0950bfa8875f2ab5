//! Which watch/run caused a resource to exist.
//!
//! Internally provenance is typed; it only becomes annotation strings when a
//! resource is written out ([`Provenance::annotations`]) or read back
//! ([`Provenance::from_annotations`]). The keys are part of the wire contract
//! and must stay bit-exact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Provenance marker: value is the uid of the watch that created the resource.
pub const CREATED_DUE_TO_WATCH: &str = "converge.dev/created-due-to-watch";
pub const WATCH_NAME: &str = "converge.dev/watch-name";
pub const RUN_UID: &str = "converge.dev/run-uid";
pub const RUN_NAME: &str = "converge.dev/run-name";
pub const TASK_KEY: &str = "converge.dev/task-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    Run,
    Watch,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub uid: String,
    pub name: String,
}

impl OwnerRef {
    pub fn watch(uid: &str, name: &str) -> Self {
        Self { kind: OwnerKind::Watch, uid: uid.to_string(), name: name.to_string() }
    }

    pub fn run(uid: &str, name: &str) -> Self {
        Self { kind: OwnerKind::Run, uid: uid.to_string(), name: name.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub watch: OwnerRef,
    pub run: Option<OwnerRef>,
    pub task_key: Option<String>,
}

impl Provenance {
    pub fn new(watch: OwnerRef, run: OwnerRef, task_key: &str) -> Self {
        Self { watch, run: Some(run), task_key: Some(task_key.to_string()) }
    }

    /// Annotation pairs in a stable order.
    pub fn annotations(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            (CREATED_DUE_TO_WATCH, self.watch.uid.clone()),
            (WATCH_NAME, self.watch.name.clone()),
        ];
        if let Some(run) = &self.run {
            out.push((RUN_UID, run.uid.clone()));
            out.push((RUN_NAME, run.name.clone()));
        }
        if let Some(key) = &self.task_key {
            out.push((TASK_KEY, key.clone()));
        }
        out
    }

    /// Parse provenance back. The marker annotation is mandatory; the rest
    /// are optional so resources written by older hosts still classify.
    pub fn from_annotations(annos: &BTreeMap<String, String>) -> Option<Self> {
        let watch_uid = annos.get(CREATED_DUE_TO_WATCH).filter(|s| !s.is_empty())?;
        let watch_name = annos.get(WATCH_NAME).map(|s| s.as_str()).unwrap_or("");
        let run = annos
            .get(RUN_UID)
            .map(|uid| OwnerRef::run(uid, annos.get(RUN_NAME).map(|s| s.as_str()).unwrap_or("")));
        Some(Self {
            watch: OwnerRef::watch(watch_uid, watch_name),
            run,
            task_key: annos.get(TASK_KEY).cloned(),
        })
    }
}
