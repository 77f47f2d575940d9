// src/protocol/mod.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod prompt;
pub mod suggester;

/// Tag for every action kind the model may propose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Click,
    DoubleClick,
    RightClick,
    MoveMouse,
    TypeText,
    PressKey,
    Scroll,
    Hotkey,
    Wait,
    Done,
    Unknown,
}

impl ActionKind {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "click" => Self::Click,
            "double_click" => Self::DoubleClick,
            "right_click" => Self::RightClick,
            "move_mouse" => Self::MoveMouse,
            "type_text" => Self::TypeText,
            "press_key" => Self::PressKey,
            "scroll" => Self::Scroll,
            "hotkey" => Self::Hotkey,
            "wait" => Self::Wait,
            "done" => Self::Done,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::DoubleClick => "double_click",
            Self::RightClick => "right_click",
            Self::MoveMouse => "move_mouse",
            Self::TypeText => "type_text",
            Self::PressKey => "press_key",
            Self::Scroll => "scroll",
            Self::Hotkey => "hotkey",
            Self::Wait => "wait",
            Self::Done => "done",
            Self::Unknown => "unknown",
        }
    }

    pub fn needs_coordinates(&self) -> bool {
        matches!(
            self,
            Self::Click | Self::DoubleClick | Self::RightClick | Self::MoveMouse
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated action with its typed parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Click { x: i64, y: i64 },
    DoubleClick { x: i64, y: i64 },
    RightClick { x: i64, y: i64 },
    MoveMouse { x: i64, y: i64 },
    TypeText { text: String },
    PressKey { key: String },
    /// Positive scrolls down, negative scrolls up.
    Scroll { amount: i32 },
    Hotkey { keys: Vec<String> },
    Wait { seconds: f64 },
    Done { message: Option<String> },
}

impl Command {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Click { .. } => ActionKind::Click,
            Self::DoubleClick { .. } => ActionKind::DoubleClick,
            Self::RightClick { .. } => ActionKind::RightClick,
            Self::MoveMouse { .. } => ActionKind::MoveMouse,
            Self::TypeText { .. } => ActionKind::TypeText,
            Self::PressKey { .. } => ActionKind::PressKey,
            Self::Scroll { .. } => ActionKind::Scroll,
            Self::Hotkey { .. } => ActionKind::Hotkey,
            Self::Wait { .. } => ActionKind::Wait,
            Self::Done { .. } => ActionKind::Done,
        }
    }

    pub fn coordinates(&self) -> Option<(i64, i64)> {
        match *self {
            Self::Click { x, y }
            | Self::DoubleClick { x, y }
            | Self::RightClick { x, y }
            | Self::MoveMouse { x, y } => Some((x, y)),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click { x, y }
            | Self::DoubleClick { x, y }
            | Self::RightClick { x, y }
            | Self::MoveMouse { x, y } => write!(f, "{} ({}, {})", self.kind(), x, y),
            Self::TypeText { text } => write!(f, "type_text {:?}", text),
            Self::PressKey { key } => write!(f, "press_key {}", key),
            Self::Scroll { amount } => write!(f, "scroll {}", amount),
            Self::Hotkey { keys } => write!(f, "hotkey {}", keys.join("+")),
            Self::Wait { seconds } => write!(f, "wait {:.1}s", seconds),
            Self::Done { message } => match message {
                Some(msg) => write!(f, "done: {}", msg),
                None => f.write_str("done"),
            },
        }
    }
}

/// One proposed desktop operation. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    command: Command,
    reasoning: String,
    confidence: f64,
    is_critical: bool,
}

impl Action {
    pub fn new(command: Command, reasoning: &str, confidence: f64, is_critical: bool) -> Self {
        Self {
            command,
            reasoning: reasoning.to_string(),
            confidence,
            is_critical,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn kind(&self) -> ActionKind {
        self.command.kind()
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn is_critical(&self) -> bool {
        self.is_critical
    }
}

/// Action candidate exactly as the model returned it. Fields stay optional so the
/// validator, not serde, reports what is missing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub is_critical: Option<bool>,
}

impl RawAction {
    pub fn kind(&self) -> ActionKind {
        self.action
            .as_deref()
            .map(ActionKind::parse)
            .unwrap_or(ActionKind::Unknown)
    }

    /// `parameters.message` of a `done` reply, if the model sent one.
    pub fn done_message(&self) -> Option<String> {
        self.parameters
            .as_ref()
            .and_then(|p| p.get("message"))
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
    }
}

/// The fixed set of permitted hotkey chords.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HotkeyAllowList {
    chords: Vec<Vec<String>>,
}

impl HotkeyAllowList {
    pub fn new(chords: Vec<Vec<String>>) -> Self {
        Self { chords }
    }

    /// Exact, ordered, case-insensitive match against one entry.
    pub fn permits(&self, keys: &[String]) -> bool {
        self.chords.iter().any(|chord| {
            chord.len() == keys.len()
                && chord
                    .iter()
                    .zip(keys)
                    .all(|(allowed, key)| allowed.eq_ignore_ascii_case(key))
        })
    }

    pub fn chords(&self) -> &[Vec<String>] {
        &self.chords
    }
}

/// Cumulative executor counters.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionStats {
    pub action_count: u64,
    pub failed_actions: u64,
    pub screen_size: (u32, u32),
    pub failsafe_enabled: bool,
}

impl ExecutionStats {
    pub fn success_rate(&self) -> f64 {
        let total = self.action_count + self.failed_actions;
        if total == 0 {
            0.0
        } else {
            self.action_count as f64 / total as f64
        }
    }
}
