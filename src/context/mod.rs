// src/context/mod.rs

use crate::protocol::ActionKind;

pub const INITIAL_CONTEXT: &str = "Step 1 - initialization";
pub const INVALID_CONTEXT: &str = "Last action was invalid. Try a different approach.";

/// One labelled line in the step log.
#[derive(Clone, Debug, PartialEq)]
pub struct StepEntry {
    pub step: u32,
    pub label: String,
    pub content: String,
}

/// Outcome text threaded from one step into the next model request, plus an
/// append-only log of what each step did.
#[derive(Clone, Debug)]
pub struct Context {
    current: String,
    entries: Vec<StepEntry>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            current: INITIAL_CONTEXT.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn entries(&self) -> &[StepEntry] {
        &self.entries
    }

    pub fn log(&mut self, step: u32, label: &str, content: &str) {
        self.entries.push(StepEntry {
            step,
            label: label.to_string(),
            content: content.to_string(),
        });
    }

    pub fn mark_invalid(&mut self, step: u32, reason: &str, hint: &str) {
        self.current = if hint.is_empty() {
            INVALID_CONTEXT.to_string()
        } else {
            format!("{} {}", INVALID_CONTEXT, hint)
        };
        self.log(step, "invalid", reason);
    }

    pub fn mark_outcome(&mut self, step: u32, kind: ActionKind, success: bool) {
        self.current = if success {
            format!("Last action ({}) succeeded", kind)
        } else {
            format!("Last action ({}) failed", kind)
        };
        let label = if success { "executed" } else { "failed" };
        self.log(step, label, kind.as_str());
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
