use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use converge_core::EngineConfig;
use converge_select::{Assert, Condition, ResourceSelector};

use crate::TaskError;

/// One unit of work in a run.
///
/// Exactly one of `assert` and `apply` is set. `apply` with `target` is an
/// update; `apply` alone creates (or deletes, for `replicas: 0` or a null
/// `spec`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_cond: Option<Assert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assert: Option<Assert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ResourceSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_cond: Option<Assert>,
}

impl Task {
    /// Check the task's shape and return its replica count as unsigned.
    pub fn validate(&self, config: &EngineConfig) -> Result<Option<u32>, TaskError> {
        if self.key.trim().is_empty() {
            return Err(TaskError::EmptyKey);
        }
        if self.assert.is_some() && self.target.is_some() {
            return Err(TaskError::AssertWithTarget);
        }
        if self.target.is_some() && self.apply.is_none() {
            return Err(TaskError::TargetWithoutApply);
        }
        if self.assert.is_some() == self.apply.is_some() {
            return Err(TaskError::AssertXorApply);
        }
        if self.target.is_some() && self.replicas.is_some() {
            return Err(TaskError::ReplicasWithTarget);
        }
        if self.assert.is_some() && self.replicas.is_some() {
            return Err(TaskError::ReplicasWithAssert);
        }

        for cond in [&self.if_cond, &self.assert].into_iter().flatten() {
            cond.validate().map_err(TaskError::Condition)?;
        }
        if let Some(t) = &self.target {
            Condition::exists(t.clone()).validate().map_err(TaskError::Condition)?;
        }

        match self.replicas {
            None => Ok(None),
            Some(n) if n < 0 => Err(TaskError::NegativeReplicas(n)),
            Some(n) if n as u32 > config.max_replicas => {
                Err(TaskError::TooManyReplicas { replicas: n as u32, max: config.max_replicas })
            }
            Some(n) => Ok(Some(n as u32)),
        }
    }
}
