// src/agent/mod.rs

use crate::capture::ScreenCapture;
use crate::config::{Config, secs};
use crate::executor::ActionExecutor;
use crate::model::{LoopState, TaskReport, TaskRun};
use crate::protocol::ActionKind;
use crate::protocol::suggester::VisionSuggester;
use crate::validation::{ValidationError, ValidationPolicy, validate};
use colored::Colorize;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub mod cancel;
pub mod report;

pub use cancel::CancelToken;

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub max_steps: u32,
    pub timeout: Duration,
    pub step_pause: Duration,
    pub max_retries: u32,
    pub save_debug_screenshots: bool,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_steps: config.task.max_steps,
            timeout: Duration::from_secs(config.task.timeout_secs),
            step_pause: secs(config.task.step_pause_secs),
            max_retries: config.api.max_retries,
            save_debug_screenshots: config.screenshot.save_debug,
        }
    }
}

/// Drives screenshot → suggestion → validation → execution until a terminal state.
pub struct TaskController {
    capture: Box<dyn ScreenCapture>,
    suggester: Box<dyn VisionSuggester>,
    executor: ActionExecutor,
    policy: ValidationPolicy,
    settings: LoopSettings,
    cancel: CancelToken,
    state: LoopState,
}

impl TaskController {
    pub fn new(
        capture: Box<dyn ScreenCapture>,
        suggester: Box<dyn VisionSuggester>,
        mut executor: ActionExecutor,
        policy: ValidationPolicy,
        settings: LoopSettings,
        cancel: CancelToken,
    ) -> Self {
        executor.set_cancel(cancel.clone());
        info!("task controller ready");
        Self {
            capture,
            suggester,
            executor,
            policy,
            settings,
            cancel,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Runs one task to a terminal state, prints the summary and returns to `Idle`.
    pub fn run_task(&mut self, task: &str) -> TaskReport {
        self.cancel.reset();
        let mut run = TaskRun::start(task);
        self.executor
            .set_deadline(run.started.checked_add(self.settings.timeout));

        info!("starting task: {}", task);
        println!("\n{}", "=".repeat(70));
        println!("{} {}", "📋 TASK:".bold(), task);
        println!("{}", "=".repeat(70));

        self.state = LoopState::Running;
        while self.state == LoopState::Running {
            self.state = self.step(&mut run);
        }

        self.executor.set_deadline(None);
        let report = self.report(run);
        report::print_summary(&report);
        info!(
            state = %report.state,
            steps = report.steps,
            "task finished"
        );
        self.state = LoopState::Idle;
        report
    }

    fn step(&mut self, run: &mut TaskRun) -> LoopState {
        if self.cancel.is_cancelled() {
            warn!("task cancelled by user");
            println!("\n{}", "⏸️  Task cancelled by user".yellow());
            return LoopState::Cancelled;
        }

        let elapsed = run.elapsed();
        if elapsed > self.settings.timeout {
            error!("task timed out after {:.1}s", elapsed.as_secs_f64());
            println!(
                "\n{}",
                format!("⏱️  Timeout: task aborted after {:.1}s", elapsed.as_secs_f64()).yellow()
            );
            return LoopState::TimedOut;
        }

        if run.step_count >= self.settings.max_steps {
            warn!("maximum step count reached: {}", self.settings.max_steps);
            println!(
                "\n{}",
                format!("⚠️  Maximum steps ({}) reached", self.settings.max_steps).yellow()
            );
            return LoopState::MaxStepsReached;
        }

        run.step_count += 1;
        let step = run.step_count;
        println!("\n{}", "─".repeat(70));
        println!("🔄 Step {}/{}", step, self.settings.max_steps);
        println!("{}", "─".repeat(70));

        println!("📸 Capturing screenshot...");
        let image = match self.capture.capture_and_encode() {
            Ok(image) => image,
            Err(e) => {
                error!("screenshot failed: {}", e);
                println!("{} {}", "❌ Screenshot error:".red(), e);
                run.fail(format!("screenshot failed: {}", e));
                return LoopState::Failed;
            }
        };
        println!("✓ Screenshot: {} bytes", image.len());

        println!("🤖 Asking the vision model...");
        let Some(raw) = self.suggester.next_action(
            &image,
            &run.task,
            run.context.current(),
            self.settings.max_retries,
        ) else {
            error!("no action received from the vision model");
            println!("{}", "❌ Vision model gave no usable answer".red());
            run.fail("no suggestion available");
            return LoopState::Failed;
        };

        println!("\n💭 Reasoning: {}", raw.reasoning.as_deref().unwrap_or("-"));
        println!("🎯 Action: {}", raw.action.as_deref().unwrap_or("-"));
        println!("📊 Confidence: {:.0}%", raw.confidence.unwrap_or_default() * 100.0);

        if raw.kind() == ActionKind::Done {
            self.save_debug_frame(step, None);
            run.complete(raw.done_message());
            println!(
                "\n{} {}",
                "✅".green(),
                run.message.as_deref().unwrap_or_default()
            );
            return LoopState::Done;
        }

        let checked = validate(&raw, &self.policy);
        self.save_debug_frame(
            step,
            checked.as_ref().ok().and_then(|a| a.command().coordinates()),
        );

        let action = match checked {
            Ok(action) => action,
            Err(e) => {
                match &e {
                    ValidationError::UnknownAction(name) => warn!("unknown action: {}", name),
                    other => warn!("action validation failed: {}", other),
                }
                println!("{} {}", "⚠️  Invalid action, skipping:".yellow(), e);
                run.context.mark_invalid(step, &e.to_string(), &e.hint());
                return LoopState::Running;
            }
        };

        let kind = action.kind();
        println!("⚙️  Executing: {}", action.command());
        match self.executor.execute(&action) {
            Ok(()) => {
                println!("{}", "✓ Action succeeded".green());
                run.context.mark_outcome(step, kind, true);
            }
            Err(e) if e.is_failsafe() => {
                error!("fail-safe triggered, aborting task");
                println!("{} {}", "❌ Emergency stop:".red().bold(), e);
                run.fail(e.to_string());
                return LoopState::Failed;
            }
            Err(e) => {
                println!("{} {}", "✗ Action failed:".red(), e);
                run.context.mark_outcome(step, kind, false);
            }
        }

        if !self.settings.step_pause.is_zero() {
            thread::sleep(self.settings.step_pause);
        }
        LoopState::Running
    }

    /// `debug_step_<n>.jpg`, with the click target marked when there is one.
    fn save_debug_frame(&self, step: u32, target: Option<(i64, i64)>) {
        if !self.settings.save_debug_screenshots {
            return;
        }
        let path = PathBuf::from(format!("debug_step_{}.jpg", step));
        let saved = match target {
            Some(target) => self.capture.save_annotated(&path, target),
            None => self.capture.save_last(&path),
        };
        if let Err(e) = saved {
            debug!("could not save {}: {}", path.display(), e);
        }
    }

    fn report(&self, run: TaskRun) -> TaskReport {
        let stats = self.executor.stats();
        let elapsed = run.elapsed();
        TaskReport {
            task: run.task,
            state: self.state,
            steps: run.step_count,
            elapsed,
            total_actions: stats.action_count,
            failed_actions: stats.failed_actions,
            requests: self.suggester.request_count(),
            message: run.message,
            failure: run.failure,
            history: run.context.entries().to_vec(),
        }
    }
}
