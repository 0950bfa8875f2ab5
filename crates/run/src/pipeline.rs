//! Ordered, named stages over a mutable state.
//!
//! A stage either lets the pipeline continue, stops it early (a normal
//! outcome, e.g. a guard that skipped), or fails. Non-fatal problems belong
//! in the state, not in `Err`.

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub type Stage<S, E> = fn(&mut S) -> Result<Flow, E>;

pub struct Pipeline<S, E> {
    name: &'static str,
    stages: Vec<(&'static str, Stage<S, E>)>,
}

impl<S, E> Pipeline<S, E> {
    pub fn new(name: &'static str) -> Self {
        Self { name, stages: Vec::new() }
    }

    pub fn stage(mut self, name: &'static str, f: Stage<S, E>) -> Self {
        self.stages.push((name, f));
        self
    }

    /// Run every stage in order. Returns `Stop` when a stage stopped early.
    pub fn run(&self, state: &mut S) -> Result<Flow, E> {
        for (stage, f) in &self.stages {
            trace!(pipeline = self.name, stage, "enter");
            match f(state)? {
                Flow::Continue => {}
                Flow::Stop => {
                    trace!(pipeline = self.name, stage, "stopped");
                    return Ok(Flow::Stop);
                }
            }
        }
        Ok(Flow::Continue)
    }
}
