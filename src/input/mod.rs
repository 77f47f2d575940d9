// src/input/mod.rs

use std::time::Duration;
use thiserror::Error;

pub mod enigo_driver;
pub use enigo_driver::EnigoDriver;

#[derive(Debug, Error)]
pub enum DriverError {
    /// Pointer parked in the top-left corner: the operator pulled the emergency stop.
    #[error("fail-safe triggered: pointer moved to a screen corner")]
    FailSafe,
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("input backend error: {0}")]
    Backend(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// Primitive input simulation. One implementation per backend; tests use a
/// recording stub.
pub trait InputDriver {
    fn screen_size(&self) -> Result<(u32, u32), DriverError>;
    fn mouse_position(&self) -> Result<(i32, i32), DriverError>;
    fn move_to(&mut self, x: i32, y: i32, duration: Duration) -> Result<(), DriverError>;
    fn click(
        &mut self,
        x: i32,
        y: i32,
        button: MouseButton,
        clicks: u8,
        duration: Duration,
    ) -> Result<(), DriverError>;
    fn press_key(&mut self, key: &str) -> Result<(), DriverError>;
    fn type_text(&mut self, text: &str, interval: Duration) -> Result<(), DriverError>;
    /// Native wheel convention: positive scrolls up, negative scrolls down.
    fn scroll(&mut self, clicks: i32) -> Result<(), DriverError>;
    fn hotkey(&mut self, keys: &[String]) -> Result<(), DriverError>;
    fn failsafe_enabled(&self) -> bool;
}
