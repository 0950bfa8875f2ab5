use std::time::Instant;

use metrics::{counter, histogram};
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use converge_apply::{Merger, ThreeWayMerge};
use converge_core::{EngineConfig, OwnerRef, Resource};
use converge_select::evaluate_assert;

use crate::executor::{execute_task, TaskContext};
use crate::pipeline::{Flow, Pipeline};
use crate::status::{Completion, RunPhase, RunStatus};
use crate::{RunError, RunSpec};

pub const RUN_GUARD_SKIPPED: &str = "Run didn't execute: If cond failed";

#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub run: &'a OwnerRef,
    pub watch: &'a OwnerRef,
    pub spec: &'a RunSpec,
    pub observed: &'a [Resource],
}

/// Everything one reconciliation pass produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Resources the host should keep (or start) tracking for the watch.
    pub desired: Vec<Resource>,
    pub explicit_updates: Vec<Resource>,
    pub explicit_deletes: Vec<Resource>,
    pub status: RunStatus,
}

/// Stateless between calls; holds only configuration and the merge strategy.
pub struct Engine {
    config: EngineConfig,
    merger: Box<dyn Merger>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, merger: Box::new(ThreeWayMerge) }
    }

    pub fn with_merger(mut self, merger: impl Merger + 'static) -> Self {
        self.merger = Box::new(merger);
        self
    }

    /// Execute a run. Only invalid input or a failing run-level guard
    /// evaluation is fatal; task problems land in the returned status.
    pub fn run(&self, req: RunRequest<'_>) -> Result<RunOutcome, RunError> {
        let t0 = Instant::now();
        let pipeline: Pipeline<RunState<'_>, RunError> = Pipeline::new("run")
            .stage("validate", validate)
            .stage("guard", guard)
            .stage("tasks", run_tasks)
            .stage("summarize", summarize);
        let mut state = RunState { engine: self, req, outcome: RunOutcome::empty(req.spec.tasks.len()) };
        let res = pipeline.run(&mut state);
        histogram!("converge_run_eval_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match res {
            Ok(_) => {
                let st = &state.outcome.status;
                counter!("converge_runs_total", 1u64, "phase" => st.phase.as_str());
                info!(
                    run = %req.run.name,
                    phase = ?st.phase,
                    observed = st.completion.observed,
                    desired = st.completion.desired,
                    errors = st.errors.len(),
                    "run finished"
                );
                Ok(state.outcome)
            }
            Err(e) => {
                counter!("converge_runs_total", 1u64, "phase" => "Fatal");
                warn!(run = %req.run.name, error = %e, "run aborted");
                Err(e)
            }
        }
    }
}

impl RunOutcome {
    fn empty(tasks: usize) -> Self {
        Self {
            desired: Vec::new(),
            explicit_updates: Vec::new(),
            explicit_deletes: Vec::new(),
            status: RunStatus {
                phase: RunPhase::Online,
                reason: None,
                message: None,
                completion: Completion { state: false, observed: 0, desired: tasks },
                task_results: Vec::with_capacity(tasks),
                errors: Vec::new(),
            },
        }
    }
}

struct RunState<'a> {
    engine: &'a Engine,
    req: RunRequest<'a>,
    outcome: RunOutcome,
}

fn validate(s: &mut RunState<'_>) -> Result<Flow, RunError> {
    let r = &s.req;
    if r.run.uid.is_empty() {
        return Err(RunError::Validation("run uid is empty"));
    }
    if r.run.name.is_empty() {
        return Err(RunError::Validation("run name is empty"));
    }
    if r.watch.uid.is_empty() {
        return Err(RunError::Validation("watch uid is empty"));
    }
    if r.spec.tasks.is_empty() {
        return Err(RunError::Validation("run has no tasks"));
    }
    Ok(Flow::Continue)
}

fn guard(s: &mut RunState<'_>) -> Result<Flow, RunError> {
    let Some(cond) = &s.req.spec.if_cond else {
        return Ok(Flow::Continue);
    };
    if evaluate_assert(cond, s.req.observed).map_err(RunError::Guard)?.success {
        return Ok(Flow::Continue);
    }
    debug!(run = %s.req.run.name, "run guard failed");
    let st = &mut s.outcome.status;
    st.phase = RunPhase::Skipped;
    st.reason = Some(RUN_GUARD_SKIPPED.to_string());
    Ok(Flow::Stop)
}

fn run_tasks(s: &mut RunState<'_>) -> Result<Flow, RunError> {
    let (engine, req) = (s.engine, s.req);
    let ctx = TaskContext {
        observed: req.observed,
        watch: req.watch,
        run: req.run,
        merger: engine.merger.as_ref(),
        config: &engine.config,
    };
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let out = &mut s.outcome;
    for task in &req.spec.tasks {
        // Blank keys are left to validation, which reports them per task.
        if !task.key.trim().is_empty() && !seen.insert(task.key.as_str()) {
            warn!(task = %task.key, "duplicate task key; not executed");
            out.status.errors.push(format!("task {}: duplicate key, not executed", task.key));
            continue;
        }
        let exec = execute_task(task, ctx);
        if !exec.result.completed() {
            out.status.errors.push(format!("task {}: {}", task.key, exec.result.message));
        }
        out.desired.extend(exec.desired);
        out.explicit_updates.extend(exec.explicit_updates);
        out.explicit_deletes.extend(exec.explicit_deletes);
        out.status.task_results.push(exec.result);
    }
    Ok(Flow::Continue)
}

fn summarize(s: &mut RunState<'_>) -> Result<Flow, RunError> {
    let st = &mut s.outcome.status;
    let observed = st.task_results.iter().filter(|r| r.completed()).count();
    st.completion.observed = observed;
    st.completion.state = observed == st.completion.desired;
    if st.errors.is_empty() {
        st.phase = RunPhase::Online;
        st.message = Some(format!("{}/{} tasks completed", observed, st.completion.desired));
    } else {
        st.phase = RunPhase::Error;
        st.reason = Some(format!("{} error(s) in run", st.errors.len()));
        st.message = Some(st.errors.join("; "));
    }
    Ok(Flow::Continue)
}
