use serde::Serialize;

use converge_apply::{BuildPhase, CreateReport, DeleteReport, UpdateReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskPhase {
    Online,
    Skipped,
    Error,
    Passed,
    Failed,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Online => "Online",
            TaskPhase::Skipped => "Skipped",
            TaskPhase::Error => "Error",
            TaskPhase::Passed => "Passed",
            TaskPhase::Failed => "Failed",
        }
    }
}

impl From<BuildPhase> for TaskPhase {
    fn from(p: BuildPhase) -> Self {
        match p {
            BuildPhase::Online => TaskPhase::Online,
            BuildPhase::Skipped => TaskPhase::Skipped,
        }
    }
}

/// Which builder produced a task's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultKind {
    CreateOrDelete,
    Update,
    Assert,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::CreateOrDelete => "createOrDelete",
            ResultKind::Update => "update",
            ResultKind::Assert => "assert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertReport {
    pub success: bool,
    pub conditions_evaluated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskOutcome {
    Create(CreateReport),
    Delete(DeleteReport),
    Update(UpdateReport),
    Assert(AssertReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    pub phase: TaskPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResultKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TaskOutcome>,
}

impl TaskResult {
    /// Did the task finish without an error? Guard skips and failed asserts count.
    pub fn completed(&self) -> bool {
        self.phase != TaskPhase::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RunPhase {
    Online,
    Skipped,
    Error,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Online => "Online",
            RunPhase::Skipped => "Skipped",
            RunPhase::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub state: bool,
    pub observed: usize,
    pub desired: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub phase: RunPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub completion: Completion,
    pub task_results: Vec<TaskResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl RunStatus {
    pub fn task(&self, key: &str) -> Option<&TaskResult> {
        self.task_results.iter().find(|r| r.key == key)
    }
}
