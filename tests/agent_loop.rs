use serde_json::{Value, json};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::Duration;
use vision_pilot::agent::{CancelToken, LoopSettings, TaskController};
use vision_pilot::capture::{CaptureError, EncodedImage, ScreenCapture};
use vision_pilot::context::INVALID_CONTEXT;
use vision_pilot::executor::{ActionExecutor, Confirmer, ExecutorSettings};
use vision_pilot::input::{DriverError, InputDriver, MouseButton};
use vision_pilot::model::LoopState;
use vision_pilot::protocol::suggester::VisionSuggester;
use vision_pilot::protocol::{Action, HotkeyAllowList, RawAction};
use vision_pilot::validation::ValidationPolicy;

struct StubCapture {
    fail: bool,
    delay: Duration,
    shots: Rc<Cell<u32>>,
    saved: Rc<RefCell<Vec<(String, Option<(i64, i64)>)>>>,
}

impl StubCapture {
    fn record(&self, path: &Path, target: Option<(i64, i64)>) -> Result<(), CaptureError> {
        self.saved
            .borrow_mut()
            .push((path.display().to_string(), target));
        Ok(())
    }
}

impl ScreenCapture for StubCapture {
    fn capture_and_encode(&mut self) -> Result<EncodedImage, CaptureError> {
        if self.fail {
            return Err(CaptureError::NoMonitor);
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.shots.set(self.shots.get() + 1);
        Ok(EncodedImage {
            base64: "aGVsbG8=".into(),
            width: 1280,
            height: 720,
        })
    }

    fn screen_size(&self) -> Result<(u32, u32), CaptureError> {
        Ok((1920, 1080))
    }

    fn save_last(&self, path: &Path) -> Result<(), CaptureError> {
        self.record(path, None)
    }

    fn save_annotated(&self, path: &Path, target: (i64, i64)) -> Result<(), CaptureError> {
        self.record(path, Some(target))
    }
}

/// Replays scripted replies, then repeats `fallback` forever.
struct StubSuggester {
    replies: VecDeque<Option<RawAction>>,
    fallback: Option<RawAction>,
    contexts: Rc<RefCell<Vec<String>>>,
    requests: u64,
    cancel_on_call: Option<CancelToken>,
}

impl VisionSuggester for StubSuggester {
    fn next_action(&mut self, _: &EncodedImage, _: &str, context: &str, _: u32) -> Option<RawAction> {
        self.contexts.borrow_mut().push(context.to_string());
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        let reply = self
            .replies
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        if reply.is_some() {
            self.requests += 1;
        }
        reply
    }

    fn request_count(&self) -> u64 {
        self.requests
    }
}

#[derive(Clone, Default)]
struct StubDriver {
    calls: Rc<RefCell<Vec<String>>>,
    failsafe: bool,
}

impl StubDriver {
    fn record(&self, call: String) -> Result<(), DriverError> {
        if self.failsafe {
            return Err(DriverError::FailSafe);
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl InputDriver for StubDriver {
    fn screen_size(&self) -> Result<(u32, u32), DriverError> {
        Ok((1920, 1080))
    }
    fn mouse_position(&self) -> Result<(i32, i32), DriverError> {
        Ok((100, 100))
    }
    fn move_to(&mut self, x: i32, y: i32, _: Duration) -> Result<(), DriverError> {
        self.record(format!("move {x} {y}"))
    }
    fn click(&mut self, x: i32, y: i32, _: MouseButton, n: u8, _: Duration) -> Result<(), DriverError> {
        self.record(format!("click {x} {y} x{n}"))
    }
    fn press_key(&mut self, key: &str) -> Result<(), DriverError> {
        self.record(format!("key {key}"))
    }
    fn type_text(&mut self, text: &str, _: Duration) -> Result<(), DriverError> {
        self.record(format!("type {text}"))
    }
    fn scroll(&mut self, clicks: i32) -> Result<(), DriverError> {
        self.record(format!("scroll {clicks}"))
    }
    fn hotkey(&mut self, keys: &[String]) -> Result<(), DriverError> {
        self.record(format!("hotkey {}", keys.join("+")))
    }
    fn failsafe_enabled(&self) -> bool {
        true
    }
}

struct Deny;

impl Confirmer for Deny {
    fn confirm(&mut self, _: &Action) -> bool {
        false
    }
}

fn raw(action: &str, parameters: Value, confidence: f64) -> RawAction {
    RawAction {
        action: Some(action.into()),
        parameters: Some(parameters),
        reasoning: Some("because".into()),
        confidence: Some(confidence),
        is_critical: Some(false),
    }
}

fn click(x: i64, y: i64) -> RawAction {
    raw("click", json!({"x": x, "y": y}), 0.9)
}

fn done(message: &str, confidence: f64) -> RawAction {
    raw("done", json!({"message": message}), confidence)
}

fn policy() -> ValidationPolicy {
    ValidationPolicy {
        confidence_threshold: 0.7,
        allowed_actions: ["click", "type_text", "press_key", "hotkey", "scroll", "wait", "done"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        allowed_hotkeys: HotkeyAllowList::new(vec![vec!["ctrl".into(), "c".into()]]),
    }
}

fn settings(max_steps: u32) -> LoopSettings {
    LoopSettings {
        max_steps,
        timeout: Duration::from_secs(60),
        step_pause: Duration::ZERO,
        max_retries: 1,
        save_debug_screenshots: false,
    }
}

struct Harness {
    controller: TaskController,
    contexts: Rc<RefCell<Vec<String>>>,
    calls: Rc<RefCell<Vec<String>>>,
    shots: Rc<Cell<u32>>,
    saved: Rc<RefCell<Vec<(String, Option<(i64, i64)>)>>>,
}

struct Setup {
    replies: Vec<Option<RawAction>>,
    fallback: Option<RawAction>,
    settings: LoopSettings,
    capture_fails: bool,
    capture_delay: Duration,
    failsafe: bool,
    cancel_during_request: bool,
}

impl Setup {
    fn new(replies: Vec<Option<RawAction>>) -> Self {
        Self {
            replies,
            fallback: None,
            settings: settings(10),
            capture_fails: false,
            capture_delay: Duration::ZERO,
            failsafe: false,
            cancel_during_request: false,
        }
    }

    fn build(self) -> Harness {
        let cancel = CancelToken::new();
        let contexts = Rc::new(RefCell::new(Vec::new()));
        let shots = Rc::new(Cell::new(0));
        let saved = Rc::new(RefCell::new(Vec::new()));
        let driver = StubDriver {
            failsafe: self.failsafe,
            ..StubDriver::default()
        };
        let calls = driver.calls.clone();

        let executor = ActionExecutor::new(
            Box::new(driver),
            Box::new(Deny),
            ExecutorSettings {
                safety_check: true,
                mouse_move: Duration::ZERO,
                typing_interval: Duration::ZERO,
                allowed_hotkeys: HotkeyAllowList::new(vec![vec!["ctrl".into(), "c".into()]]),
            },
        )
        .unwrap();

        let suggester = StubSuggester {
            replies: self.replies.into(),
            fallback: self.fallback,
            contexts: contexts.clone(),
            requests: 0,
            cancel_on_call: self.cancel_during_request.then(|| cancel.clone()),
        };
        let capture = StubCapture {
            fail: self.capture_fails,
            delay: self.capture_delay,
            shots: shots.clone(),
            saved: saved.clone(),
        };

        let controller = TaskController::new(
            Box::new(capture),
            Box::new(suggester),
            executor,
            policy(),
            self.settings,
            cancel,
        );
        Harness {
            controller,
            contexts,
            calls,
            shots,
            saved,
        }
    }
}

#[test]
fn done_ends_the_run_whatever_the_confidence() {
    let mut h = Setup::new(vec![Some(click(10, 10)), Some(done("Editor is open", 0.1))]).build();
    let report = h.controller.run_task("open the editor");

    assert_eq!(report.state, LoopState::Done);
    assert!(report.succeeded());
    assert_eq!(report.steps, 2);
    assert_eq!(report.message.as_deref(), Some("Editor is open"));
    assert_eq!(report.total_actions, 1);
    assert_eq!(report.requests, 2);
    assert_eq!(*h.calls.borrow(), vec!["click 10 10 x1"]);
    assert_eq!(h.controller.state(), LoopState::Idle);
}

#[test]
fn done_without_message_uses_default() {
    let mut h = Setup::new(vec![Some(raw("done", json!({}), 0.9))]).build();
    let report = h.controller.run_task("nothing to do");
    assert_eq!(report.state, LoopState::Done);
    assert_eq!(report.message.as_deref(), Some("Task completed"));
    assert_eq!(report.total_actions, 0);
}

#[test]
fn step_budget_is_exact() {
    let mut setup = Setup::new(Vec::new());
    setup.fallback = Some(raw("wait", json!({"seconds": 0}), 0.9));
    setup.settings = settings(3);
    let mut h = setup.build();

    let report = h.controller.run_task("never finishes");
    assert_eq!(report.state, LoopState::MaxStepsReached);
    assert_eq!(report.steps, 3);
    assert_eq!(h.shots.get(), 3);
    assert_eq!(report.requests, 3);
    assert!(!report.succeeded());
}

#[test]
fn outcome_of_each_step_reaches_the_next_request() {
    let mut h = Setup::new(vec![
        Some(click(50, 60)),
        Some(click(3000, 10)),
        Some(raw("shutdown", json!({}), 0.99)),
        Some(done("ok", 0.9)),
    ])
    .build();
    let report = h.controller.run_task("click around");

    let contexts = h.contexts.borrow();
    assert_eq!(contexts[0], "Step 1 - initialization");
    assert_eq!(contexts[1], "Last action (click) succeeded");
    assert_eq!(contexts[2], "Last action (click) failed");
    assert!(contexts[3].starts_with(INVALID_CONTEXT));

    assert_eq!(report.total_actions, 1);
    assert_eq!(report.failed_actions, 1);
    assert_eq!(*h.calls.borrow(), vec!["click 50 60 x1"]);

    let labels: Vec<_> = report.history.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["executed", "failed", "invalid", "done"]);
}

#[test]
fn low_confidence_is_skipped_without_input() {
    let mut h = Setup::new(vec![Some(raw("type_text", json!({"text": "hi"}), 0.3)), Some(done("ok", 0.9))]).build();
    let report = h.controller.run_task("type");

    assert_eq!(report.state, LoopState::Done);
    assert!(h.calls.borrow().is_empty());
    assert_eq!(report.failed_actions, 0);
    assert!(h.contexts.borrow()[1].starts_with(INVALID_CONTEXT));
}

#[test]
fn rejected_critical_action_counts_as_failure() {
    let mut critical = raw("press_key", json!({"key": "enter"}), 0.95);
    critical.is_critical = Some(true);
    let mut h = Setup::new(vec![Some(critical), Some(done("stopped", 0.9))]).build();
    let report = h.controller.run_task("submit the form");

    assert!(h.calls.borrow().is_empty());
    assert_eq!(report.failed_actions, 1);
    assert_eq!(h.contexts.borrow()[1], "Last action (press_key) failed");
}

#[test]
fn missing_suggestion_fails_the_run() {
    let mut h = Setup::new(vec![Some(click(1, 1)), None]).build();
    let report = h.controller.run_task("anything");

    assert_eq!(report.state, LoopState::Failed);
    assert_eq!(report.steps, 2);
    assert_eq!(report.requests, 1);
    assert!(report.failure.is_some());
}

#[test]
fn capture_error_fails_the_run() {
    let mut setup = Setup::new(vec![Some(click(1, 1))]);
    setup.capture_fails = true;
    let mut h = setup.build();
    let report = h.controller.run_task("anything");

    assert_eq!(report.state, LoopState::Failed);
    assert_eq!(report.steps, 1);
    assert!(h.contexts.borrow().is_empty());
    assert!(report.failure.unwrap().contains("screenshot"));
}

#[test]
fn failsafe_stops_everything() {
    let mut setup = Setup::new(Vec::new());
    setup.fallback = Some(click(10, 10));
    setup.failsafe = true;
    let mut h = setup.build();
    let report = h.controller.run_task("click forever");

    assert_eq!(report.state, LoopState::Failed);
    assert_eq!(report.steps, 1);
    assert_eq!(report.failed_actions, 1);
    assert!(report.failure.unwrap().contains("fail-safe"));
}

#[test]
fn zero_timeout_ends_before_the_first_step() {
    let mut setup = Setup::new(vec![Some(click(1, 1))]);
    setup.settings.timeout = Duration::ZERO;
    let mut h = setup.build();
    let report = h.controller.run_task("too late");

    assert_eq!(report.state, LoopState::TimedOut);
    assert_eq!(report.steps, 0);
    assert_eq!(h.shots.get(), 0);
    assert!(h.contexts.borrow().is_empty());
}

#[test]
fn timeout_is_checked_before_each_step() {
    let mut setup = Setup::new(Vec::new());
    setup.fallback = Some(raw("wait", json!({"seconds": 0}), 0.9));
    setup.settings.timeout = Duration::from_millis(5);
    setup.capture_delay = Duration::from_millis(20);
    let mut h = setup.build();
    let report = h.controller.run_task("slow");

    assert_eq!(report.state, LoopState::TimedOut);
    assert_eq!(report.steps, 1);
}

#[test]
fn long_wait_is_cut_at_the_timeout() {
    let mut setup = Setup::new(Vec::new());
    setup.fallback = Some(raw("wait", json!({"seconds": 3}), 0.9));
    setup.settings.timeout = Duration::from_millis(200);
    let mut h = setup.build();
    let report = h.controller.run_task("wait forever");

    assert_eq!(report.state, LoopState::TimedOut);
    assert_eq!(report.steps, 1);
    assert!(report.elapsed < Duration::from_secs(2), "run took {:?}", report.elapsed);
}

#[test]
fn cancellation_is_seen_at_the_next_step() {
    let mut setup = Setup::new(Vec::new());
    setup.fallback = Some(click(5, 5));
    setup.cancel_during_request = true;
    let mut h = setup.build();
    let report = h.controller.run_task("interrupted");

    assert_eq!(report.state, LoopState::Cancelled);
    assert_eq!(report.steps, 1);
    assert_eq!(*h.calls.borrow(), vec!["click 5 5 x1"]);
    assert_eq!(h.controller.state(), LoopState::Idle);
}

#[test]
fn controller_is_reusable_across_tasks() {
    let mut h = Setup::new(vec![Some(done("first", 0.9)), Some(click(2, 2)), Some(done("second", 0.9))]).build();

    let first = h.controller.run_task("one");
    let second = h.controller.run_task("two");

    assert_eq!(first.message.as_deref(), Some("first"));
    assert_eq!(second.message.as_deref(), Some("second"));
    assert_eq!(second.steps, 2);
    assert_eq!(h.contexts.borrow()[1], "Step 1 - initialization");
    assert_eq!(h.controller.executor().stats().action_count, 1);
}

#[test]
fn debug_frames_mark_the_click_target() {
    let mut setup = Setup::new(vec![
        Some(click(10, 20)),
        Some(raw("wait", json!({"seconds": 0}), 0.9)),
        Some(done("ok", 0.9)),
    ]);
    setup.settings.save_debug_screenshots = true;
    let mut h = setup.build();
    h.controller.run_task("click then stop");

    assert_eq!(
        *h.saved.borrow(),
        vec![
            ("debug_step_1.jpg".to_string(), Some((10, 20))),
            ("debug_step_2.jpg".to_string(), None),
            ("debug_step_3.jpg".to_string(), None),
        ]
    );
}

#[test]
fn debug_frames_are_off_by_default() {
    let mut h = Setup::new(vec![Some(click(10, 20)), Some(done("ok", 0.9))]).build();
    h.controller.run_task("quiet");
    assert!(h.saved.borrow().is_empty());
}
