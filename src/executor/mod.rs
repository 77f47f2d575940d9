// src/executor/mod.rs

use crate::agent::CancelToken;
use crate::config::Config;
use crate::input::{DriverError, InputDriver, MouseButton};
use crate::protocol::{Action, ActionKind, Command, ExecutionStats, HotkeyAllowList};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

pub mod confirm;
pub use confirm::{Confirmer, PromptConfirmer};

/// Slice length for `wait`, so the deadline and Ctrl-C are seen promptly.
const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("critical action {0} rejected by user")]
    Rejected(ActionKind),
    #[error("invalid coordinates ({x}, {y}) for {width}x{height} screen")]
    InvalidCoordinates {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },
    #[error("hotkey {0:?} is not allowed")]
    HotkeyNotAllowed(Vec<String>),
    #[error("{kind} failed: {source}")]
    Primitive {
        kind: ActionKind,
        #[source]
        source: DriverError,
    },
}

impl ExecutionError {
    /// The operator tripped the corner fail-safe; automation must stop.
    pub fn is_failsafe(&self) -> bool {
        matches!(
            self,
            ExecutionError::Primitive {
                source: DriverError::FailSafe,
                ..
            }
        )
    }
}

#[derive(Clone, Debug)]
pub struct ExecutorSettings {
    pub safety_check: bool,
    pub mouse_move: Duration,
    pub typing_interval: Duration,
    pub allowed_hotkeys: HotkeyAllowList,
}

impl ExecutorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            safety_check: config.safety.check_enabled,
            mouse_move: config.input.mouse_move(),
            typing_interval: config.input.typing_interval(),
            allowed_hotkeys: config.hotkey_allow_list(),
        }
    }
}

/// Runs validated actions against an [`InputDriver`]. Owns the action counters.
pub struct ActionExecutor {
    driver: Box<dyn InputDriver>,
    confirmer: Box<dyn Confirmer>,
    settings: ExecutorSettings,
    screen: (u32, u32),
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
    action_count: u64,
    failed_actions: u64,
}

impl ActionExecutor {
    /// Captures the screen size once; bounds checks use it for the executor's lifetime.
    pub fn new(
        driver: Box<dyn InputDriver>,
        confirmer: Box<dyn Confirmer>,
        settings: ExecutorSettings,
    ) -> Result<Self, DriverError> {
        let screen = driver.screen_size()?;
        info!("action executor ready (screen: {}x{})", screen.0, screen.1);
        Ok(Self {
            driver,
            confirmer,
            settings,
            screen,
            deadline: None,
            cancel: None,
            action_count: 0,
            failed_actions: 0,
        })
    }

    /// `wait` stops early once this token is cancelled.
    pub fn set_cancel(&mut self, cancel: CancelToken) {
        self.cancel = Some(cancel);
    }

    /// `wait` never sleeps past `deadline`. `None` lifts the bound.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Boolean convenience over [`ActionExecutor::execute`].
    pub fn execute_action(&mut self, action: &Action) -> bool {
        self.execute(action).is_ok()
    }

    pub fn execute(&mut self, action: &Action) -> Result<(), ExecutionError> {
        let kind = action.kind();
        info!("executing {}", action.command());

        let outcome = self.check(action).and_then(|_| self.dispatch(action));
        match &outcome {
            Ok(()) => {
                self.action_count += 1;
                info!("✓ {} succeeded", kind);
            }
            Err(e) => {
                self.failed_actions += 1;
                error!("✗ {}", e);
            }
        }
        outcome
    }

    fn check(&mut self, action: &Action) -> Result<(), ExecutionError> {
        let kind = action.kind();

        if action.is_critical() && self.settings.safety_check && !self.confirmer.confirm(action) {
            warn!("critical action rejected by user");
            return Err(ExecutionError::Rejected(kind));
        }

        if let Some((x, y)) = action.command().coordinates() {
            self.point(x, y)?;
        }

        if let Command::Hotkey { keys } = action.command() {
            if !self.settings.allowed_hotkeys.permits(keys) {
                warn!("hotkey {:?} not in allow-list", keys);
                return Err(ExecutionError::HotkeyNotAllowed(keys.clone()));
            }
        }

        Ok(())
    }

    fn point(&self, x: i64, y: i64) -> Result<(i32, i32), ExecutionError> {
        let (width, height) = self.screen;
        let invalid = ExecutionError::InvalidCoordinates {
            x,
            y,
            width,
            height,
        };
        if !(0..i64::from(width)).contains(&x) || !(0..i64::from(height)).contains(&y) {
            return Err(invalid);
        }
        match (i32::try_from(x), i32::try_from(y)) {
            (Ok(x), Ok(y)) => Ok((x, y)),
            _ => Err(invalid),
        }
    }

    fn dispatch(&mut self, action: &Action) -> Result<(), ExecutionError> {
        let kind = action.kind();
        let wrap = |source: DriverError| ExecutionError::Primitive { kind, source };
        let glide = self.settings.mouse_move;

        match action.command() {
            Command::Click { x, y } => {
                let (x, y) = self.point(*x, *y)?;
                self.driver.click(x, y, MouseButton::Left, 1, glide).map_err(wrap)
            }
            Command::DoubleClick { x, y } => {
                let (x, y) = self.point(*x, *y)?;
                self.driver.click(x, y, MouseButton::Left, 2, glide).map_err(wrap)
            }
            Command::RightClick { x, y } => {
                let (x, y) = self.point(*x, *y)?;
                self.driver.click(x, y, MouseButton::Right, 1, glide).map_err(wrap)
            }
            Command::MoveMouse { x, y } => {
                let (x, y) = self.point(*x, *y)?;
                self.driver.move_to(x, y, glide).map_err(wrap)
            }
            Command::TypeText { text } => self
                .driver
                .type_text(text, self.settings.typing_interval)
                .map_err(wrap),
            Command::PressKey { key } => self.driver.press_key(key).map_err(wrap),
            // positive means down here, up for the driver
            Command::Scroll { amount } => self.driver.scroll(amount.saturating_neg()).map_err(wrap),
            Command::Hotkey { keys } => self.driver.hotkey(keys).map_err(wrap),
            Command::Wait { seconds } => {
                let pause = Duration::try_from_secs_f64(*seconds)
                    .map_err(|e| wrap(DriverError::InvalidArgument(e.to_string())))?;
                self.pause_for(pause);
                Ok(())
            }
            Command::Done { .. } => {
                info!("task marked as done");
                Ok(())
            }
        }
    }

    /// Sleeps in slices until `pause` is over, the deadline passes or the run is cancelled.
    fn pause_for(&self, pause: Duration) {
        let started = Instant::now();
        let until = match (started.checked_add(pause), self.deadline) {
            (Some(end), Some(deadline)) if deadline < end => {
                warn!("wait of {:.1}s cut to the task deadline", pause.as_secs_f64());
                deadline
            }
            (Some(end), _) => end,
            (None, Some(deadline)) => deadline,
            (None, None) => started,
        };

        loop {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                info!("wait interrupted by cancellation");
                return;
            }
            let now = Instant::now();
            if now >= until {
                return;
            }
            thread::sleep(WAIT_SLICE.min(until - now));
        }
    }

    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats {
            action_count: self.action_count,
            failed_actions: self.failed_actions,
            screen_size: self.screen,
            failsafe_enabled: self.driver.failsafe_enabled(),
        }
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    pub fn mouse_position(&self) -> Result<(i32, i32), DriverError> {
        self.driver.mouse_position()
    }
}
