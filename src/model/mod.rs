// src/model/mod.rs

use crate::context::{Context, StepEntry};
use std::fmt;
use std::time::{Duration, Instant};

/// Controller lifecycle. Every terminal state hands back to `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Done,
    TimedOut,
    MaxStepsReached,
    Cancelled,
    Failed,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopState::Idle | LoopState::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::Done => "completed",
            LoopState::TimedOut => "timed out",
            LoopState::MaxStepsReached => "max steps reached",
            LoopState::Cancelled => "cancelled",
            LoopState::Failed => "failed",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transient state for one task. Dropped when the task ends.
#[derive(Debug)]
pub struct TaskRun {
    pub task: String,
    pub step_count: u32,
    pub started: Instant,
    pub context: Context,
    pub message: Option<String>,
    pub failure: Option<String>,
}

impl TaskRun {
    pub fn start(task: &str) -> Self {
        Self {
            task: task.to_string(),
            step_count: 0,
            started: Instant::now(),
            context: Context::new(),
            message: None,
            failure: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.context.log(self.step_count, "fatal", &reason);
        self.failure = Some(reason);
    }

    pub fn complete(&mut self, message: Option<String>) {
        let message = message.unwrap_or_else(|| "Task completed".to_string());
        self.context.log(self.step_count, "done", &message);
        self.message = Some(message);
    }
}

/// What a finished task reports back. Purely observational.
#[derive(Clone, Debug)]
pub struct TaskReport {
    pub task: String,
    pub state: LoopState,
    pub steps: u32,
    pub elapsed: Duration,
    pub total_actions: u64,
    pub failed_actions: u64,
    pub requests: u64,
    pub message: Option<String>,
    pub failure: Option<String>,
    pub history: Vec<StepEntry>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.state == LoopState::Done
    }

    pub fn average_step(&self) -> Duration {
        self.elapsed / self.steps.max(1)
    }
}
