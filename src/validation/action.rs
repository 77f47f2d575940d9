// src/validation/action.rs

use crate::protocol::{Action, ActionKind, Command, HotkeyAllowList, RawAction};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("confidence {confidence:.2} is below threshold {threshold:.2}")]
    LowConfidence { confidence: f64, threshold: f64 },
    #[error("{kind}: parameter '{name}' {reason}")]
    InvalidParameter {
        kind: ActionKind,
        name: &'static str,
        reason: String,
    },
    #[error("hotkey {0:?} is not in the allow-list")]
    HotkeyNotAllowed(Vec<String>),
}

impl ValidationError {
    /// Short hint threaded back to the model as context.
    pub fn hint(&self) -> String {
        match self {
            ValidationError::MissingField(field) => {
                format!("Reply must contain the '{}' field.", field)
            }
            ValidationError::UnknownAction(name) => {
                format!("'{}' is not an available action.", name)
            }
            ValidationError::LowConfidence { .. } => {
                "Confidence was too low; pick an action you are sure about.".to_string()
            }
            ValidationError::InvalidParameter { kind, name, .. } => {
                format!("{} needs a valid '{}' parameter.", kind, name)
            }
            ValidationError::HotkeyNotAllowed(_) => {
                "That key combination is not permitted.".to_string()
            }
        }
    }
}

/// Knobs the validator reads; built from config.
#[derive(Clone, Debug)]
pub struct ValidationPolicy {
    pub confidence_threshold: f64,
    pub allowed_actions: Vec<String>,
    pub allowed_hotkeys: HotkeyAllowList,
}

impl ValidationPolicy {
    fn allows(&self, kind: ActionKind) -> bool {
        kind != ActionKind::Unknown
            && self
                .allowed_actions
                .iter()
                .any(|name| name.eq_ignore_ascii_case(kind.as_str()))
    }
}

/// Turns a raw model reply into a typed [`Action`]. Pure: no I/O, no state.
pub fn validate(raw: &RawAction, policy: &ValidationPolicy) -> Result<Action, ValidationError> {
    let name = raw
        .action
        .as_deref()
        .ok_or(ValidationError::MissingField("action"))?;
    let parameters = raw
        .parameters
        .as_ref()
        .ok_or(ValidationError::MissingField("parameters"))?;
    let reasoning = raw
        .reasoning
        .as_deref()
        .ok_or(ValidationError::MissingField("reasoning"))?;
    let confidence = raw
        .confidence
        .ok_or(ValidationError::MissingField("confidence"))?;
    let is_critical = raw.is_critical.unwrap_or(false);

    let kind = ActionKind::parse(name);

    if kind == ActionKind::Done {
        let message = parameters
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string());
        return Ok(Action::new(
            Command::Done { message },
            reasoning,
            confidence,
            is_critical,
        ));
    }

    if !policy.allows(kind) {
        return Err(ValidationError::UnknownAction(name.to_string()));
    }

    if confidence < policy.confidence_threshold {
        return Err(ValidationError::LowConfidence {
            confidence,
            threshold: policy.confidence_threshold,
        });
    }

    let Some(params) = parameters.as_object() else {
        return Err(invalid(kind, "parameters", "must be an object"));
    };

    let command = match kind {
        ActionKind::Click => {
            let (x, y) = point(params, kind)?;
            Command::Click { x, y }
        }
        ActionKind::DoubleClick => {
            let (x, y) = point(params, kind)?;
            Command::DoubleClick { x, y }
        }
        ActionKind::RightClick => {
            let (x, y) = point(params, kind)?;
            Command::RightClick { x, y }
        }
        ActionKind::MoveMouse => {
            let (x, y) = point(params, kind)?;
            Command::MoveMouse { x, y }
        }
        ActionKind::TypeText => match params.get("text") {
            Some(Value::String(text)) => Command::TypeText { text: text.clone() },
            Some(_) => return Err(invalid(kind, "text", "must be a string")),
            None => return Err(invalid(kind, "text", "is required")),
        },
        ActionKind::PressKey => match params.get("key") {
            Some(Value::String(key)) if !key.trim().is_empty() => Command::PressKey {
                key: key.trim().to_string(),
            },
            Some(_) => return Err(invalid(kind, "key", "must be a non-empty string")),
            None => return Err(invalid(kind, "key", "is required")),
        },
        ActionKind::Scroll => {
            let amount = match params.get("amount") {
                None | Some(Value::Null) => 0,
                Some(value) => integer(value)
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(|| invalid(kind, "amount", "must be an integer"))?,
            };
            Command::Scroll { amount }
        }
        ActionKind::Hotkey => {
            let keys = hotkey_keys(params, kind)?;
            if !policy.allowed_hotkeys.permits(&keys) {
                return Err(ValidationError::HotkeyNotAllowed(keys));
            }
            Command::Hotkey { keys }
        }
        ActionKind::Wait => {
            let seconds = match params.get("seconds") {
                None | Some(Value::Null) => 1.0,
                Some(value) => value
                    .as_f64()
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .ok_or_else(|| invalid(kind, "seconds", "must be a non-negative number"))?,
            };
            Command::Wait { seconds }
        }
        ActionKind::Done | ActionKind::Unknown => {
            return Err(ValidationError::UnknownAction(name.to_string()));
        }
    };

    Ok(Action::new(command, reasoning, confidence, is_critical))
}

fn invalid(kind: ActionKind, name: &'static str, reason: &str) -> ValidationError {
    ValidationError::InvalidParameter {
        kind,
        name,
        reason: reason.to_string(),
    }
}

/// Accepts JSON integers, integral floats and numeric strings.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn point(params: &Map<String, Value>, kind: ActionKind) -> Result<(i64, i64), ValidationError> {
    let x = params
        .get("x")
        .ok_or_else(|| invalid(kind, "x", "is required"))?;
    let y = params
        .get("y")
        .ok_or_else(|| invalid(kind, "y", "is required"))?;
    let x = integer(x).ok_or_else(|| invalid(kind, "x", "must be an integer"))?;
    let y = integer(y).ok_or_else(|| invalid(kind, "y", "must be an integer"))?;
    Ok((x, y))
}

fn hotkey_keys(params: &Map<String, Value>, kind: ActionKind) -> Result<Vec<String>, ValidationError> {
    let keys = match params.get("keys") {
        Some(Value::String(key)) => vec![key.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(|s| s.to_string()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid(kind, "keys", "must contain only strings"))?,
        Some(_) => return Err(invalid(kind, "keys", "must be a string or a list of strings")),
        None => return Err(invalid(kind, "keys", "is required")),
    };
    if keys.is_empty() {
        return Err(invalid(kind, "keys", "must not be empty"));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> ValidationPolicy {
        ValidationPolicy {
            confidence_threshold: 0.7,
            allowed_actions: [
                "click", "double_click", "right_click", "type_text", "press_key", "scroll",
                "move_mouse", "hotkey", "wait", "screenshot",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            allowed_hotkeys: HotkeyAllowList::new(vec![
                vec!["ctrl".into(), "c".into()],
                vec!["alt".into(), "tab".into()],
                vec!["win".into()],
            ]),
        }
    }

    fn raw(action: &str, parameters: Value, confidence: f64) -> RawAction {
        RawAction {
            action: Some(action.to_string()),
            parameters: Some(parameters),
            reasoning: Some("because".into()),
            confidence: Some(confidence),
            is_critical: None,
        }
    }

    #[test]
    fn each_required_field_is_reported() {
        let full = raw("click", json!({"x": 1, "y": 2}), 0.9);

        let mut missing = full.clone();
        missing.action = None;
        assert_eq!(validate(&missing, &policy()), Err(ValidationError::MissingField("action")));

        let mut missing = full.clone();
        missing.parameters = None;
        assert_eq!(validate(&missing, &policy()), Err(ValidationError::MissingField("parameters")));

        let mut missing = full.clone();
        missing.reasoning = None;
        assert_eq!(validate(&missing, &policy()), Err(ValidationError::MissingField("reasoning")));

        let mut missing = full;
        missing.confidence = None;
        assert_eq!(validate(&missing, &policy()), Err(ValidationError::MissingField("confidence")));
    }

    #[test]
    fn click_produces_typed_command() {
        let action = validate(&raw("click", json!({"x": 100, "y": 200.0}), 0.9), &policy()).unwrap();
        assert_eq!(action.command(), &Command::Click { x: 100, y: 200 });
        assert!(!action.is_critical());
        assert_eq!(action.reasoning(), "because");
    }

    #[test]
    fn numeric_string_coordinates_are_accepted_but_words_are_not() {
        let action = validate(&raw("move_mouse", json!({"x": "15", "y": 7}), 0.9), &policy()).unwrap();
        assert_eq!(action.command(), &Command::MoveMouse { x: 15, y: 7 });

        let err = validate(&raw("click", json!({"x": "left", "y": 7}), 0.9), &policy()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter { name: "x", .. }));

        let err = validate(&raw("click", json!({"x": 1.5, "y": 7}), 0.9), &policy()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter { name: "x", .. }));

        let err = validate(&raw("right_click", json!({"x": 3}), 0.9), &policy()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter { name: "y", .. }));
    }

    #[test]
    fn confidence_below_threshold_is_rejected() {
        let err = validate(&raw("click", json!({"x": 1, "y": 1}), 0.69), &policy()).unwrap_err();
        assert!(matches!(err, ValidationError::LowConfidence { .. }));

        assert!(validate(&raw("click", json!({"x": 1, "y": 1}), 0.7), &policy()).is_ok());
    }

    #[test]
    fn done_passes_at_any_confidence() {
        let action = validate(&raw("done", json!({"message": "finished"}), 0.0), &policy()).unwrap();
        assert_eq!(
            action.command(),
            &Command::Done {
                message: Some("finished".into())
            }
        );

        let action = validate(&raw("done", json!(null), -1.0), &policy()).unwrap();
        assert_eq!(action.command(), &Command::Done { message: None });
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        let err = validate(&raw("shutdown", json!({}), 0.99), &policy()).unwrap_err();
        assert_eq!(err, ValidationError::UnknownAction("shutdown".into()));

        // listed in the allow-list but not an executable kind
        let err = validate(&raw("screenshot", json!({}), 0.99), &policy()).unwrap_err();
        assert_eq!(err, ValidationError::UnknownAction("screenshot".into()));
    }

    #[test]
    fn kind_missing_from_allowed_actions_is_rejected() {
        let mut narrow = policy();
        narrow.allowed_actions.retain(|a| a != "type_text");
        let err = validate(&raw("type_text", json!({"text": "hi"}), 0.9), &narrow).unwrap_err();
        assert_eq!(err, ValidationError::UnknownAction("type_text".into()));
    }

    #[test]
    fn hotkey_accepts_string_or_list_and_checks_allow_list() {
        let action = validate(&raw("hotkey", json!({"keys": "win"}), 0.9), &policy()).unwrap();
        assert_eq!(action.command(), &Command::Hotkey { keys: vec!["win".into()] });

        let action = validate(&raw("hotkey", json!({"keys": ["Ctrl", "C"]}), 0.9), &policy()).unwrap();
        assert_eq!(
            action.command(),
            &Command::Hotkey {
                keys: vec!["Ctrl".into(), "C".into()]
            }
        );

        let err = validate(&raw("hotkey", json!({"keys": ["c", "ctrl"]}), 0.9), &policy()).unwrap_err();
        assert_eq!(err, ValidationError::HotkeyNotAllowed(vec!["c".into(), "ctrl".into()]));

        let err = validate(&raw("hotkey", json!({"keys": []}), 0.9), &policy()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter { name: "keys", .. }));
    }

    #[test]
    fn defaults_for_scroll_and_wait() {
        let action = validate(&raw("scroll", json!({}), 0.9), &policy()).unwrap();
        assert_eq!(action.command(), &Command::Scroll { amount: 0 });

        let action = validate(&raw("wait", json!({}), 0.9), &policy()).unwrap();
        assert_eq!(action.command(), &Command::Wait { seconds: 1.0 });

        let err = validate(&raw("wait", json!({"seconds": -2}), 0.9), &policy()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter { name: "seconds", .. }));
    }

    #[test]
    fn type_text_and_press_key_require_strings() {
        let err = validate(&raw("type_text", json!({}), 0.9), &policy()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter { name: "text", .. }));

        let err = validate(&raw("press_key", json!({"key": 13}), 0.9), &policy()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter { name: "key", .. }));

        let err = validate(&raw("click", json!([1, 2]), 0.9), &policy()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter { name: "parameters", .. }));
    }

    #[test]
    fn critical_flag_is_carried_through() {
        let mut candidate = raw("press_key", json!({"key": "enter"}), 0.95);
        candidate.is_critical = Some(true);
        let action = validate(&candidate, &policy()).unwrap();
        assert!(action.is_critical());
        assert_eq!(action.command(), &Command::PressKey { key: "enter".into() });
    }
}
