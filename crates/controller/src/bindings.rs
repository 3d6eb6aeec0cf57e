//! Hotkey chord resolution.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use multiwall_common::action::KeyAction;
use multiwall_common::error::{WallError, WallResult};

/// A key plus modifiers, e.g. `ctrl+shift+r`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub key: String,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl KeyChord {
    /// A bare key with no modifiers.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into().to_ascii_lowercase(),
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }
}

impl FromStr for KeyChord {
    type Err = WallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chord = KeyChord::key("");
        let mut key = None;
        for part in s.split('+').map(|p| p.trim().to_ascii_lowercase()) {
            match part.as_str() {
                "ctrl" | "control" => chord.ctrl = true,
                "alt" | "option" => chord.alt = true,
                "shift" => chord.shift = true,
                "meta" | "cmd" | "command" | "super" => chord.meta = true,
                "" => return Err(WallError::config(format!("Empty key in chord '{s}'"))),
                _ if key.is_some() => {
                    return Err(WallError::config(format!("Chord '{s}' names two keys")))
                }
                _ => key = Some(part),
            }
        }
        chord.key = key.ok_or_else(|| WallError::config(format!("Chord '{s}' has no key")))?;
        Ok(chord)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (on, name) in [
            (self.ctrl, "ctrl+"),
            (self.alt, "alt+"),
            (self.shift, "shift+"),
            (self.meta, "meta+"),
        ] {
            if on {
                f.write_str(name)?;
            }
        }
        f.write_str(&self.key)
    }
}

/// Maps a raw key event to at most one action.
pub trait KeyBindingResolver: Send + Sync {
    fn resolve(&self, chord: &KeyChord) -> Option<KeyAction>;
}

/// Resolver backed by the configured chord table.
#[derive(Debug, Clone, Default)]
pub struct KeyBindingTable {
    bindings: HashMap<KeyChord, KeyAction>,
}

impl KeyBindingTable {
    /// Build from the `keybindings` section of the configuration.
    ///
    /// Two spellings of the same chord bound to different actions are
    /// rejected.
    pub fn from_config(config: &BTreeMap<String, KeyAction>) -> WallResult<Self> {
        let mut table = Self::default();
        for (text, action) in config {
            let chord: KeyChord = text.parse()?;
            if let Some(existing) = table.bind(chord.clone(), *action) {
                if existing != *action {
                    return Err(WallError::config(format!(
                        "Chord '{chord}' bound to both {existing} and {action}"
                    )));
                }
            }
        }
        Ok(table)
    }

    pub fn bind(&mut self, chord: KeyChord, action: KeyAction) -> Option<KeyAction> {
        self.bindings.insert(chord, action)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl KeyBindingResolver for KeyBindingTable {
    fn resolve(&self, chord: &KeyChord) -> Option<KeyAction> {
        self.bindings.get(chord).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiwall_common::config::default_keybindings;

    #[test]
    fn test_chord_parsing_normalizes() {
        let chord: KeyChord = "Shift + Ctrl + R".parse().unwrap();
        assert_eq!(chord.to_string(), "ctrl+shift+r");
        assert!("ctrl+".parse::<KeyChord>().is_err());
        assert!("ctrl".parse::<KeyChord>().is_err());
        assert!("a+b".parse::<KeyChord>().is_err());
    }

    #[test]
    fn test_default_table_resolves() {
        let table = KeyBindingTable::from_config(&default_keybindings()).unwrap();
        assert_eq!(
            table.resolve(&KeyChord::key("u").with_ctrl()),
            Some(KeyAction::ResetGlobal)
        );
        assert_eq!(table.resolve(&KeyChord::key("U")), None);
        assert_eq!(table.resolve(&KeyChord::key("e")), Some(KeyAction::ResetOne));
    }

    #[test]
    fn test_conflicting_spellings_rejected() {
        let mut config = BTreeMap::new();
        config.insert("ctrl+r".to_string(), KeyAction::Run);
        config.insert("control+R".to_string(), KeyAction::ResetAll);
        assert!(KeyBindingTable::from_config(&config).is_err());
    }
}
