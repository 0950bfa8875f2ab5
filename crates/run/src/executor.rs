use metrics::counter;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use converge_apply::{
    build_create_or_delete, build_update, CreateOrDeleteOutput, CreateOrDeleteRequest, Merger, UpdateRequest,
};
use converge_core::{EngineConfig, OwnerRef, Provenance, Resource};
use converge_select::{evaluate_assert, ResourceSelector};

use crate::pipeline::{Flow, Pipeline};
use crate::status::{AssertReport, ResultKind, TaskOutcome, TaskPhase, TaskResult};
use crate::{Task, TaskError};

pub const GUARD_SKIPPED: &str = "Task didn't run: If cond failed";

/// Everything a task reads. Shared by all tasks of one run.
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    pub observed: &'a [Resource],
    pub watch: &'a OwnerRef,
    pub run: &'a OwnerRef,
    pub merger: &'a dyn Merger,
    pub config: &'a EngineConfig,
}

/// A task's result plus the resources it contributes to the run.
#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub result: TaskResult,
    pub desired: Vec<Resource>,
    pub explicit_updates: Vec<Resource>,
    pub explicit_deletes: Vec<Resource>,
}

impl TaskExecution {
    fn pending(task: &Task) -> Self {
        Self {
            result: TaskResult {
                key: task.key.clone(),
                desc: task.desc.clone(),
                phase: TaskPhase::Online,
                message: String::new(),
                kind: None,
                outcome: None,
            },
            desired: Vec::new(),
            explicit_updates: Vec::new(),
            explicit_deletes: Vec::new(),
        }
    }

    fn finish(&mut self, phase: TaskPhase, message: String, kind: ResultKind, outcome: TaskOutcome) {
        self.result.phase = phase;
        self.result.message = message;
        self.result.kind = Some(kind);
        self.result.outcome = Some(outcome);
    }

    fn fail(&mut self, err: &TaskError) {
        self.result.phase = TaskPhase::Error;
        self.result.message = err.to_string();
        self.result.outcome = None;
        self.desired.clear();
        self.explicit_updates.clear();
        self.explicit_deletes.clear();
    }
}

struct TaskState<'a> {
    task: &'a Task,
    ctx: TaskContext<'a>,
    replicas: Option<u32>,
    exec: TaskExecution,
}

/// Run one task: validate, evaluate its guard, dispatch to a builder.
///
/// Errors never escape; they become a result with phase `Error`.
pub fn execute_task(task: &Task, ctx: TaskContext<'_>) -> TaskExecution {
    let pipeline: Pipeline<TaskState<'_>, TaskError> =
        Pipeline::new("task").stage("validate", validate).stage("guard", guard).stage("dispatch", dispatch);
    let mut state = TaskState { task, ctx, replicas: None, exec: TaskExecution::pending(task) };
    if let Err(err) = pipeline.run(&mut state) {
        warn!(task = %task.key, error = %err, "task failed");
        state.exec.fail(&err);
    }
    let r = &state.exec.result;
    counter!("converge_tasks_total", 1u64, "phase" => r.phase.as_str());
    info!(task = %r.key, phase = ?r.phase, kind = ?r.kind.map(|k| k.as_str()), "task finished");
    state.exec
}

fn validate(s: &mut TaskState<'_>) -> Result<Flow, TaskError> {
    s.replicas = s.task.validate(s.ctx.config)?;
    Ok(Flow::Continue)
}

fn guard(s: &mut TaskState<'_>) -> Result<Flow, TaskError> {
    let Some(cond) = &s.task.if_cond else {
        return Ok(Flow::Continue);
    };
    let out = evaluate_assert(cond, s.ctx.observed).map_err(TaskError::Guard)?;
    if out.success {
        return Ok(Flow::Continue);
    }
    debug!(task = %s.task.key, "guard failed");
    s.exec.result.phase = TaskPhase::Skipped;
    s.exec.result.message = GUARD_SKIPPED.to_string();
    Ok(Flow::Stop)
}

fn dispatch(s: &mut TaskState<'_>) -> Result<Flow, TaskError> {
    let task = s.task;
    if let Some(assert) = &task.assert {
        let out = evaluate_assert(assert, s.ctx.observed).map_err(TaskError::Assert)?;
        let (phase, message) = if out.success {
            (TaskPhase::Passed, "Assert passed")
        } else {
            (TaskPhase::Failed, "Assert failed")
        };
        let report = AssertReport { success: out.success, conditions_evaluated: out.conditions_evaluated };
        s.exec.finish(phase, message.to_string(), ResultKind::Assert, TaskOutcome::Assert(report));
        return Ok(Flow::Continue);
    }
    let Some(apply) = &task.apply else {
        return Err(TaskError::AssertXorApply);
    };
    match &task.target {
        Some(target) => update(s, apply, target)?,
        None => create_or_delete(s, apply)?,
    }
    Ok(Flow::Continue)
}

fn update(s: &mut TaskState<'_>, patch: &Json, target: &ResourceSelector) -> Result<(), TaskError> {
    let out = build_update(&UpdateRequest {
        patch,
        target,
        observed: s.ctx.observed,
        watch: s.ctx.watch,
        merger: s.ctx.merger,
        config: s.ctx.config,
    })?;
    s.exec.desired = out.desired;
    s.exec.explicit_updates = out.explicit;
    s.exec.finish(out.report.phase.into(), out.report.message.clone(), ResultKind::Update, TaskOutcome::Update(out.report));
    Ok(())
}

fn create_or_delete(s: &mut TaskState<'_>, template: &Json) -> Result<(), TaskError> {
    let provenance = Provenance::new(s.ctx.watch.clone(), s.ctx.run.clone(), &s.task.key);
    let out = build_create_or_delete(&CreateOrDeleteRequest {
        template,
        replicas: s.replicas,
        observed: s.ctx.observed,
        provenance: &provenance,
        config: s.ctx.config,
    })?;
    match out {
        CreateOrDeleteOutput::Created(c) => {
            s.exec.desired = c.desired;
            let (phase, message) = (c.report.phase.into(), c.report.message.clone());
            s.exec.finish(phase, message, ResultKind::CreateOrDelete, TaskOutcome::Create(c.report));
        }
        CreateOrDeleteOutput::Deleted(d) => {
            s.exec.explicit_deletes = d.explicit;
            let (phase, message) = (d.report.phase.into(), d.report.message.clone());
            s.exec.finish(phase, message, ResultKind::CreateOrDelete, TaskOutcome::Delete(d.report));
        }
    }
    Ok(())
}
