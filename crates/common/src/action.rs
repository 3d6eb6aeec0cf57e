//! Reset modes and key actions.
//!
//! These live here rather than in the controller because configuration
//! (keybindings, the active mode) names them too.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WallError;

/// How hotkeys are interpreted against the set of instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResetMode {
    /// All instances on one wall; play one at a time and return to the wall.
    #[default]
    Wall,
    /// Wall plus a locked set that `ResetOne` cycles through.
    Lock,
    /// No wall; cycle directly between all instances.
    Multi,
}

/// A resolved hotkey action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAction {
    Run,
    ResetOne,
    ResetOthers,
    ResetGlobal,
    ResetAll,
    Lock,
    ToggleSensitivityScaling,
}

impl KeyAction {
    pub const ALL: [KeyAction; 7] = [
        KeyAction::Run,
        KeyAction::ResetOne,
        KeyAction::ResetOthers,
        KeyAction::ResetGlobal,
        KeyAction::ResetAll,
        KeyAction::Lock,
        KeyAction::ToggleSensitivityScaling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAction::Run => "run",
            KeyAction::ResetOne => "reset-one",
            KeyAction::ResetOthers => "reset-others",
            KeyAction::ResetGlobal => "reset-global",
            KeyAction::ResetAll => "reset-all",
            KeyAction::Lock => "lock",
            KeyAction::ToggleSensitivityScaling => "toggle-sensitivity-scaling",
        }
    }
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAction {
    type Err = WallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        KeyAction::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| WallError::config(format!("Unknown key action '{s}'")))
    }
}

impl fmt::Display for ResetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResetMode::Wall => "wall",
            ResetMode::Lock => "lock",
            ResetMode::Multi => "multi",
        })
    }
}

impl FromStr for ResetMode {
    type Err = WallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wall" => Ok(ResetMode::Wall),
            "lock" => Ok(ResetMode::Lock),
            "multi" => Ok(ResetMode::Multi),
            other => Err(WallError::config(format!("Unknown reset mode '{other}'"))),
        }
    }
}
