//! Application configuration.
//!
//! Configuration is a plain value: the coordinator receives a `WallConfig`
//! at construction and a whole new one on reconfigure. Nothing here writes
//! settings back to disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::action::{KeyAction, ResetMode};
use crate::backoff::RetryPolicy;
use crate::error::{WallError, WallResult};

/// Smallest accepted pointer scale factor.
pub const MIN_SENSITIVITY: f64 = 0.05;
/// Largest accepted pointer scale factor.
pub const MAX_SENSITIVITY: f64 = 100.0;

/// Global application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallConfig {
    /// How hotkeys are interpreted.
    pub reset_mode: ResetMode,

    /// Grid sectioning and layout animation timing.
    pub layout: LayoutConfig,

    /// Capture stream behaviour.
    pub capture: CaptureConfig,

    /// Pointer sensitivity scaling.
    pub sensitivity: SensitivityConfig,

    /// Hotkey chord (for example `"ctrl+u"`) to action.
    pub keybindings: BTreeMap<String, KeyAction>,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Grid layout parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Number of grid sections the wall is split into.
    pub sections: usize,

    /// Per-instance share of the layout animation (`k`).
    pub animation_step_ms: u64,

    /// Fixed part of the layout animation (`k0`).
    pub animation_base_ms: u64,
}

/// Capture stream parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Automatic retries for transient stream failures.
    pub max_retries: u32,

    /// First retry delay; doubles per attempt.
    pub retry_base_delay_ms: u64,

    /// Upper bound on the retry delay.
    pub retry_max_delay_ms: u64,

    /// Stop every other stream while an instance is being played.
    pub pause_unfocused: bool,

    /// Stop all streams when the wall application loses focus.
    pub stop_on_focus_loss: bool,
}

/// Pointer sensitivity parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    pub enabled: bool,

    /// Scale applied to raw pointer deltas, clamped to
    /// `[MIN_SENSITIVITY, MAX_SENSITIVITY]` when applied.
    pub factor: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "multiwall_capture_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path; logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            reset_mode: ResetMode::default(),
            layout: LayoutConfig::default(),
            capture: CaptureConfig::default(),
            sensitivity: SensitivityConfig::default(),
            keybindings: default_keybindings(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            sections: 1,
            animation_step_ms: 40,
            animation_base_ms: 200,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 4000,
            pause_unfocused: false,
            stop_on_focus_loss: false,
        }
    }
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            factor: 1.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl CaptureConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

/// Clamp a scale factor into `[MIN_SENSITIVITY, MAX_SENSITIVITY]`.
/// NaN maps to 1.0 (no scaling).
pub fn clamp_sensitivity(factor: f64) -> f64 {
    if factor.is_nan() {
        return 1.0;
    }
    factor.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY)
}

impl WallConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::from_path(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load and validate config from an explicit file.
    pub fn from_path(path: &Path) -> WallResult<Self> {
        if !path.exists() {
            return Err(WallError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the core cannot operate with.
    pub fn validate(&self) -> WallResult<()> {
        if self.layout.sections == 0 {
            return Err(WallError::contract("layout.sections must be at least 1"));
        }
        if !self.sensitivity.factor.is_finite() {
            return Err(WallError::config("sensitivity.factor must be a finite number"));
        }
        Ok(())
    }
}

/// Bindings used when the config file does not name any.
pub fn default_keybindings() -> BTreeMap<String, KeyAction> {
    [
        ("r", KeyAction::Run),
        ("e", KeyAction::ResetOne),
        ("f", KeyAction::ResetOthers),
        ("ctrl+u", KeyAction::ResetGlobal),
        ("t", KeyAction::ResetAll),
        ("l", KeyAction::Lock),
        ("ctrl+s", KeyAction::ToggleSensitivityScaling),
    ]
    .into_iter()
    .map(|(chord, action)| (chord.to_string(), action))
    .collect()
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("multiwall").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: WallConfig =
            serde_json::from_str(r#"{"reset_mode":"lock","layout":{"sections":3}}"#).unwrap();
        assert_eq!(config.reset_mode, ResetMode::Lock);
        assert_eq!(config.layout.sections, 3);
        assert_eq!(config.layout.animation_base_ms, 200);
        assert_eq!(config.capture.max_retries, 3);
        assert_eq!(config.keybindings.get("ctrl+u"), Some(&KeyAction::ResetGlobal));
    }

    #[test]
    fn test_zero_sections_rejected() {
        let mut config = WallConfig::default();
        config.layout.sections = 0;
        assert!(matches!(
            config.validate(),
            Err(WallError::InputContractViolation { .. })
        ));
    }

    #[test]
    fn test_sensitivity_clamp() {
        assert_eq!(clamp_sensitivity(0.0), MIN_SENSITIVITY);
        assert_eq!(clamp_sensitivity(500.0), MAX_SENSITIVITY);
        assert_eq!(clamp_sensitivity(2.5), 2.5);
    }

    #[test]
    fn test_sensitivity_clamp_handles_non_finite() {
        assert_eq!(clamp_sensitivity(f64::NAN), 1.0);
        assert_eq!(clamp_sensitivity(f64::INFINITY), MAX_SENSITIVITY);
        assert_eq!(clamp_sensitivity(f64::NEG_INFINITY), MIN_SENSITIVITY);
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = WallConfig::from_path(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, WallError::FileNotFound { .. }));
    }
}
