//! Converge run: task execution and run orchestration.
//!
//! A run is an ordered list of tasks evaluated against one observed snapshot.
//! Each task goes through validate → guard → dispatch; the run aggregates the
//! resources every task contributes and reports a status.

#![forbid(unsafe_code)]

use thiserror::Error;

use converge_apply::BuildError;
use converge_select::SelectError;

mod executor;
mod orchestrator;
pub mod pipeline;
mod status;
mod task;

pub use executor::{execute_task, TaskContext, TaskExecution, GUARD_SKIPPED};
pub use orchestrator::{Engine, RunOutcome, RunRequest, RUN_GUARD_SKIPPED};
pub use status::{AssertReport, Completion, ResultKind, RunPhase, RunStatus, TaskOutcome, TaskPhase, TaskResult};
pub use task::{RunSpec, Task};

/// Why a single task could not produce a result. Never aborts the run.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task key is empty")]
    EmptyKey,
    #[error("task must set exactly one of assert or apply")]
    AssertXorApply,
    #[error("target requires apply")]
    TargetWithoutApply,
    #[error("assert cannot be combined with target")]
    AssertWithTarget,
    #[error("replicas cannot be combined with target")]
    ReplicasWithTarget,
    #[error("replicas cannot be combined with assert")]
    ReplicasWithAssert,
    #[error("replicas must not be negative, got {0}")]
    NegativeReplicas(i32),
    #[error("replicas {replicas} exceeds the limit of {max}")]
    TooManyReplicas { replicas: u32, max: u32 },
    #[error("invalid condition: {0}")]
    Condition(#[source] SelectError),
    #[error("evaluating if: {0}")]
    Guard(#[source] SelectError),
    #[error("evaluating assert: {0}")]
    Assert(#[source] SelectError),
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Fatal for the whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid run: {0}")]
    Validation(&'static str),
    #[error("evaluating run if: {0}")]
    Guard(#[source] SelectError),
}
