// src/input/enigo_driver.rs

use crate::config::InputConfig;
use crate::input::{DriverError, InputDriver, MouseButton};
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Interpolation steps for a timed pointer move.
const MOVE_STEPS: u32 = 12;

/// Real desktop input via `enigo`.
pub struct EnigoDriver {
    enigo: Enigo,
    pause: Duration,
    failsafe: bool,
}

impl EnigoDriver {
    pub fn new(config: &InputConfig) -> Result<Self, DriverError> {
        let enigo = Enigo::new(&Settings::default()).map_err(backend)?;
        if !config.failsafe {
            warn!("fail-safe corner is disabled; only Ctrl-C can stop automation");
        }
        Ok(Self {
            enigo,
            pause: config.pause(),
            failsafe: config.failsafe,
        })
    }

    fn guard(&self) -> Result<(), DriverError> {
        guard(&self.enigo, self.failsafe)
    }

    fn settle(&self) {
        if !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
    }
}

/// The slice of the backend that the paced loops need.
trait Backend {
    fn pointer(&self) -> Result<(i32, i32), DriverError>;
    fn move_abs(&mut self, x: i32, y: i32) -> Result<(), DriverError>;
    fn type_str(&mut self, text: &str) -> Result<(), DriverError>;
}

impl Backend for Enigo {
    fn pointer(&self) -> Result<(i32, i32), DriverError> {
        self.location().map_err(backend)
    }

    fn move_abs(&mut self, x: i32, y: i32) -> Result<(), DriverError> {
        self.move_mouse(x, y, Coordinate::Abs).map_err(backend)
    }

    fn type_str(&mut self, text: &str) -> Result<(), DriverError> {
        self.text(text).map_err(backend)
    }
}

fn guard<B: Backend>(b: &B, failsafe: bool) -> Result<(), DriverError> {
    if failsafe && b.pointer()? == (0, 0) {
        return Err(DriverError::FailSafe);
    }
    Ok(())
}

/// Timed pointer move. The corner is re-checked before every interpolated step,
/// unless the glide itself just put the pointer there.
fn glide<B: Backend>(
    b: &mut B,
    failsafe: bool,
    x: i32,
    y: i32,
    duration: Duration,
) -> Result<(), DriverError> {
    if !duration.is_zero() {
        let (sx, sy) = b.pointer()?;
        let tick = duration / MOVE_STEPS;
        let mut placed = (sx, sy);
        for step in 1..MOVE_STEPS {
            if placed != (0, 0) {
                guard(b, failsafe)?;
            }
            let t = step as f64 / MOVE_STEPS as f64;
            placed = (
                sx + ((x - sx) as f64 * t).round() as i32,
                sy + ((y - sy) as f64 * t).round() as i32,
            );
            b.move_abs(placed.0, placed.1)?;
            thread::sleep(tick);
        }
        if placed != (0, 0) {
            guard(b, failsafe)?;
        }
    }
    b.move_abs(x, y)
}

/// Types one character per `interval`, re-checking the corner before each.
fn type_paced<B: Backend>(
    b: &mut B,
    failsafe: bool,
    text: &str,
    interval: Duration,
) -> Result<(), DriverError> {
    if interval.is_zero() {
        return b.type_str(text);
    }
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        guard(b, failsafe)?;
        b.type_str(ch.encode_utf8(&mut buf))?;
        thread::sleep(interval);
    }
    Ok(())
}

impl InputDriver for EnigoDriver {
    fn screen_size(&self) -> Result<(u32, u32), DriverError> {
        let (w, h) = self.enigo.main_display().map_err(backend)?;
        let w = u32::try_from(w).map_err(|_| DriverError::Backend(format!("bad width {w}")))?;
        let h = u32::try_from(h).map_err(|_| DriverError::Backend(format!("bad height {h}")))?;
        Ok((w, h))
    }

    fn mouse_position(&self) -> Result<(i32, i32), DriverError> {
        self.enigo.location().map_err(backend)
    }

    fn move_to(&mut self, x: i32, y: i32, duration: Duration) -> Result<(), DriverError> {
        self.guard()?;
        glide(&mut self.enigo, self.failsafe, x, y, duration)?;
        self.settle();
        Ok(())
    }

    fn click(
        &mut self,
        x: i32,
        y: i32,
        button: MouseButton,
        clicks: u8,
        duration: Duration,
    ) -> Result<(), DriverError> {
        self.guard()?;
        glide(&mut self.enigo, self.failsafe, x, y, duration)?;
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        };
        for _ in 0..clicks.max(1) {
            self.enigo
                .button(button, Direction::Click)
                .map_err(backend)?;
        }
        self.settle();
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<(), DriverError> {
        self.guard()?;
        let key = parse_key(key)?;
        self.enigo.key(key, Direction::Click).map_err(backend)?;
        self.settle();
        Ok(())
    }

    fn type_text(&mut self, text: &str, interval: Duration) -> Result<(), DriverError> {
        self.guard()?;
        type_paced(&mut self.enigo, self.failsafe, text, interval)?;
        self.settle();
        Ok(())
    }

    fn scroll(&mut self, clicks: i32) -> Result<(), DriverError> {
        self.guard()?;
        // enigo scrolls down for positive lengths
        self.enigo
            .scroll(clicks.saturating_neg(), Axis::Vertical)
            .map_err(backend)?;
        self.settle();
        Ok(())
    }

    fn hotkey(&mut self, keys: &[String]) -> Result<(), DriverError> {
        self.guard()?;
        let parsed = keys
            .iter()
            .map(|k| parse_key(k))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(?keys, "pressing chord");

        let mut pressed = Vec::with_capacity(parsed.len());
        let mut outcome = Ok(());
        for key in &parsed {
            if let Err(e) = self.enigo.key(*key, Direction::Press) {
                outcome = Err(backend(e));
                break;
            }
            pressed.push(*key);
        }
        for key in pressed.iter().rev() {
            if let Err(e) = self.enigo.key(*key, Direction::Release) {
                warn!("failed to release {:?}: {}", key, e);
            }
        }
        outcome?;
        self.settle();
        Ok(())
    }

    fn failsafe_enabled(&self) -> bool {
        self.failsafe
    }
}

fn backend(err: impl std::fmt::Display) -> DriverError {
    DriverError::Backend(err.to_string())
}

/// Maps the key names the model uses onto `enigo` keys.
pub fn parse_key(name: &str) -> Result<Key, DriverError> {
    let lower = name.trim().to_ascii_lowercase();
    let key = match lower.as_str() {
        "enter" | "return" => Key::Return,
        "esc" | "escape" => Key::Escape,
        "tab" => Key::Tab,
        "space" | "spacebar" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page_up" | "pgup" => Key::PageUp,
        "pagedown" | "page_down" | "pgdn" => Key::PageDown,
        "ctrl" | "control" => Key::Control,
        "alt" | "option" => Key::Alt,
        "shift" => Key::Shift,
        "win" | "super" | "meta" | "cmd" | "command" => Key::Meta,
        "capslock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => {
            let mut chars = lower.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Key::Unicode(ch),
                _ => return Err(DriverError::UnknownKey(name.to_string())),
            }
        }
    };
    Ok(key)
}
