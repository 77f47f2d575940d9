//! # Configuration
//!
//! Defaults mirror the stock desktop-controller settings. An optional YAML file
//! overrides any subset of them; the API key always comes from the environment
//! (a `.env` file is honoured by the binary).

use crate::protocol::HotkeyAllowList;
use crate::validation::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{0} is not set; export it or add it to a .env file")]
    MissingApiKey(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub screenshot: ScreenshotConfig,
    pub input: InputConfig,
    pub safety: SafetyConfig,
    pub task: TaskConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub model: String,
    pub endpoint: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    #[serde(skip)]
    pub api_key: String,
    pub request_timeout_secs: u64,
    pub temperature: f64,
    pub max_tokens: u32,
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.2-90b-vision-preview".into(),
            endpoint: "https://api.groq.com/openai/v1/chat/completions".into(),
            api_key_env: "GROQ_API_KEY".into(),
            api_key: String::new(),
            request_timeout_secs: 30,
            temperature: 0.3,
            max_tokens: 1024,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    pub interval_secs: f64,
    pub quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    /// Write `debug_step_<n>.jpg` for each step.
    pub save_debug: bool,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2.0,
            quality: 85,
            max_width: 1920,
            max_height: 1080,
            save_debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Pause after every primitive input call.
    pub pause_secs: f64,
    /// Pointer in the top-left corner aborts automation.
    pub failsafe: bool,
    pub mouse_move_secs: f64,
    pub typing_interval_secs: f64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            pause_secs: 0.5,
            failsafe: true,
            mouse_move_secs: 0.3,
            typing_interval_secs: 0.05,
        }
    }
}

impl InputConfig {
    pub fn pause(&self) -> Duration {
        secs(self.pause_secs)
    }

    pub fn mouse_move(&self) -> Duration {
        secs(self.mouse_move_secs)
    }

    pub fn typing_interval(&self) -> Duration {
        secs(self.typing_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub check_enabled: bool,
    pub allowed_actions: Vec<String>,
    pub allowed_hotkeys: Vec<Vec<String>>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        let actions = [
            "click",
            "double_click",
            "right_click",
            "type_text",
            "press_key",
            "scroll",
            "move_mouse",
            "hotkey",
            "wait",
            "screenshot",
        ];
        let hotkeys: [&[&str]; 8] = [
            &["ctrl", "c"],
            &["ctrl", "v"],
            &["ctrl", "a"],
            &["ctrl", "f"],
            &["ctrl", "t"],
            &["ctrl", "w"],
            &["alt", "tab"],
            &["win"],
        ];
        Self {
            check_enabled: true,
            allowed_actions: actions.iter().map(|a| a.to_string()).collect(),
            allowed_hotkeys: hotkeys
                .iter()
                .map(|chord| chord.iter().map(|k| k.to_string()).collect())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub max_steps: u32,
    pub timeout_secs: u64,
    pub confidence_threshold: f64,
    pub step_pause_secs: f64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            timeout_secs: 300,
            confidence_threshold: 0.7,
            step_pause_secs: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: PathBuf::from("desktop_controller.log"),
        }
    }
}

/// Banner / self-check digest.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSummary {
    pub model: String,
    pub safety_enabled: bool,
    pub max_steps: u32,
    pub screenshot_interval_secs: f64,
}

impl Config {
    /// Reads `path` when given, then picks up the API key from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };
        config.api.api_key = std::env::var(&config.api.api_key_env).unwrap_or_default();
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey(self.api.api_key_env.clone()));
        }
        if !(0.0..=1.0).contains(&self.task.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within 0.0..=1.0, got {}",
                self.task.confidence_threshold
            )));
        }
        if self.task.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be at least 1".into()));
        }
        if self.screenshot.quality == 0 || self.screenshot.quality > 100 {
            return Err(ConfigError::Invalid("screenshot quality must be 1..=100".into()));
        }
        Ok(())
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            model: self.api.model.clone(),
            safety_enabled: self.safety.check_enabled,
            max_steps: self.task.max_steps,
            screenshot_interval_secs: self.screenshot.interval_secs,
        }
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            confidence_threshold: self.task.confidence_threshold,
            allowed_actions: self.safety.allowed_actions.clone(),
            allowed_hotkeys: self.hotkey_allow_list(),
        }
    }

    pub fn hotkey_allow_list(&self) -> HotkeyAllowList {
        HotkeyAllowList::new(self.safety.allowed_hotkeys.clone())
    }
}

/// Negative or non-finite values collapse to zero.
pub(crate) fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
