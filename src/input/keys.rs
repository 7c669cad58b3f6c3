//! Keyboard shortcut matching.
//!
//! `disable_keys` names entries of a fixed table of developer shortcuts.
//! Names are parsed case-insensitively and accept the usual modifier aliases
//! (`Control`, `Cmd`, `Command`, `Option`), so `"ctrl+shift+i"` and
//! `"Control+Shift+I"` both resolve to [`KeyCombination::CtrlShiftI`].
//!
//! # Example
//!
//! ```rust
//! use guardify::host::{InteractionEvent, KeyInfo};
//! use guardify::input::keys::{KeyCombination, KeyMatcher, KeyMatch};
//!
//! let combo: KeyCombination = "Ctrl+U".parse().unwrap();
//! let matcher = KeyMatcher::new(vec![combo], Vec::new());
//!
//! let event = InteractionEvent::key_down(KeyInfo::new("u").ctrl());
//! assert_eq!(matcher.find_match(&event), Some(KeyMatch::Builtin(KeyCombination::CtrlU)));
//! ```

use crate::config::{invoke_guarded, KeyPredicate};
use crate::host::{InteractionEvent, KeyInfo};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Modifier keys that can be part of a combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    /// Control key (Ctrl)
    Ctrl,
    /// Meta key (Windows key / Command on Mac)
    Meta,
    /// Alt key (Option on Mac)
    Alt,
    /// Shift key
    Shift,
}

impl Modifier {
    /// Name used when printing combinations.
    pub fn label(&self) -> &'static str {
        match self {
            Modifier::Ctrl => "Ctrl",
            Modifier::Meta => "Cmd",
            Modifier::Alt => "Alt",
            Modifier::Shift => "Shift",
        }
    }

    /// Parses a modifier token, accepting common aliases.
    pub fn parse(token: &str) -> Option<Modifier> {
        match token.to_lowercase().as_str() {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "meta" | "cmd" | "command" | "win" | "windows" => Some(Modifier::Meta),
            "alt" | "option" | "opt" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            _ => None,
        }
    }

    fn is_held(&self, key: &KeyInfo) -> bool {
        match self {
            Modifier::Ctrl => key.ctrl,
            Modifier::Meta => key.meta,
            Modifier::Alt => key.alt,
            Modifier::Shift => key.shift,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shortcuts that can be listed in `disable_keys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeyCombination {
    /// Toggle developer tools.
    F12,
    /// Inspector.
    CtrlShiftI,
    /// Console.
    CtrlShiftJ,
    /// Element picker.
    CtrlShiftC,
    /// View source.
    CtrlU,
    /// Save page.
    CtrlS,
    /// Print page.
    CtrlP,
    /// Inspector on macOS.
    CmdAltI,
    /// Console on macOS.
    CmdAltJ,
    /// View source on macOS.
    CmdAltU,
}

impl KeyCombination {
    /// Every known combination.
    pub const ALL: [KeyCombination; 10] = [
        KeyCombination::F12,
        KeyCombination::CtrlShiftI,
        KeyCombination::CtrlShiftJ,
        KeyCombination::CtrlShiftC,
        KeyCombination::CtrlU,
        KeyCombination::CtrlS,
        KeyCombination::CtrlP,
        KeyCombination::CmdAltI,
        KeyCombination::CmdAltJ,
        KeyCombination::CmdAltU,
    ];

    /// Canonical configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            KeyCombination::F12 => "F12",
            KeyCombination::CtrlShiftI => "Ctrl+Shift+I",
            KeyCombination::CtrlShiftJ => "Ctrl+Shift+J",
            KeyCombination::CtrlShiftC => "Ctrl+Shift+C",
            KeyCombination::CtrlU => "Ctrl+U",
            KeyCombination::CtrlS => "Ctrl+S",
            KeyCombination::CtrlP => "Ctrl+P",
            KeyCombination::CmdAltI => "Cmd+Alt+I",
            KeyCombination::CmdAltJ => "Cmd+Alt+J",
            KeyCombination::CmdAltU => "Cmd+Alt+U",
        }
    }

    /// Modifiers that must be held. Extra modifiers do not prevent a match.
    pub fn modifiers(&self) -> &'static [Modifier] {
        match self {
            KeyCombination::F12 => &[],
            KeyCombination::CtrlShiftI | KeyCombination::CtrlShiftJ | KeyCombination::CtrlShiftC => {
                &[Modifier::Ctrl, Modifier::Shift]
            }
            KeyCombination::CtrlU | KeyCombination::CtrlS | KeyCombination::CtrlP => {
                &[Modifier::Ctrl]
            }
            KeyCombination::CmdAltI | KeyCombination::CmdAltJ | KeyCombination::CmdAltU => {
                &[Modifier::Meta, Modifier::Alt]
            }
        }
    }

    /// `key` values that count as the main key.
    ///
    /// Letter keys include both cases and, for `I`, the Turkish dotless and
    /// dotted forms some layouts report while Shift is held.
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            KeyCombination::F12 => &["F12"],
            KeyCombination::CtrlShiftI | KeyCombination::CmdAltI => &["I", "i", "ı", "İ"],
            KeyCombination::CtrlShiftJ | KeyCombination::CmdAltJ => &["J", "j"],
            KeyCombination::CtrlShiftC => &["C", "c"],
            KeyCombination::CtrlU | KeyCombination::CmdAltU => &["U", "u"],
            KeyCombination::CtrlS => &["S", "s"],
            KeyCombination::CtrlP => &["P", "p"],
        }
    }

    /// True if `key` triggers this combination.
    pub fn matches(&self, key: &KeyInfo) -> bool {
        self.keys().contains(&key.key.as_str()) && self.modifiers().iter().all(|m| m.is_held(key))
    }

    /// Canonical lookup key: sorted modifiers plus the uppercased main key.
    fn signature(&self) -> String {
        let mods: BTreeSet<Modifier> = self.modifiers().iter().copied().collect();
        signature_of(&mods, &self.keys()[0].to_uppercase())
    }
}

fn signature_of(mods: &BTreeSet<Modifier>, key: &str) -> String {
    let mut out: Vec<String> = mods.iter().map(|m| m.label().to_string()).collect();
    out.push(key.to_string());
    out.join("+")
}

static BY_SIGNATURE: Lazy<HashMap<String, KeyCombination>> = Lazy::new(|| {
    KeyCombination::ALL
        .iter()
        .map(|combo| (combo.signature(), *combo))
        .collect()
});

/// Error for names that are not in the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown key combination: '{0}'. Valid combinations are: {valid}", valid = valid_names())]
pub struct UnknownKeyCombination(pub String);

fn valid_names() -> String {
    KeyCombination::ALL
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl std::str::FromStr for KeyCombination {
    type Err = UnknownKeyCombination;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split('+').map(str::trim).collect();
        let Some((key, modifier_tokens)) = tokens.split_last() else {
            return Err(UnknownKeyCombination(s.to_string()));
        };
        if key.is_empty() {
            return Err(UnknownKeyCombination(s.to_string()));
        }

        let mut mods = BTreeSet::new();
        for token in modifier_tokens {
            match Modifier::parse(token) {
                Some(m) => {
                    mods.insert(m);
                }
                None => return Err(UnknownKeyCombination(s.to_string())),
            }
        }

        BY_SIGNATURE
            .get(&signature_of(&mods, &key.to_uppercase()))
            .copied()
            .ok_or_else(|| UnknownKeyCombination(s.to_string()))
    }
}

impl TryFrom<String> for KeyCombination {
    type Error = UnknownKeyCombination;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyCombination> for String {
    fn from(combo: KeyCombination) -> Self {
        combo.name().to_string()
    }
}

impl fmt::Display for KeyCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which rule matched a keydown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    Builtin(KeyCombination),
    /// Index into the custom predicate list.
    Custom(usize),
}

impl fmt::Display for KeyMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMatch::Builtin(combo) => write!(f, "{}", combo),
            KeyMatch::Custom(index) => write!(f, "custom#{}", index),
        }
    }
}

/// Checks keydown events against configured combinations, then custom
/// predicates, stopping at the first match.
#[derive(Clone)]
pub struct KeyMatcher {
    combinations: Vec<KeyCombination>,
    custom: Vec<KeyPredicate>,
}

impl KeyMatcher {
    pub fn new(combinations: Vec<KeyCombination>, custom: Vec<KeyPredicate>) -> Self {
        Self {
            combinations,
            custom,
        }
    }

    /// True if there is nothing to match.
    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty() && self.custom.is_empty()
    }

    /// First rule matching `event`, if any.
    ///
    /// A custom predicate that panics counts as "no match".
    pub fn find_match(&self, event: &InteractionEvent) -> Option<KeyMatch> {
        if let Some(key) = event.key() {
            if let Some(combo) = self.combinations.iter().find(|c| c.matches(key)) {
                return Some(KeyMatch::Builtin(*combo));
            }
        }

        self.custom.iter().enumerate().find_map(|(index, predicate)| {
            invoke_guarded("custom key predicate", || predicate(event))
                .unwrap_or(false)
                .then_some(KeyMatch::Custom(index))
        })
    }
}

impl fmt::Debug for KeyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMatcher")
            .field("combinations", &self.combinations)
            .field("custom", &self.custom.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_parse_canonical_names() {
        for combo in KeyCombination::ALL {
            assert_eq!(combo.name().parse::<KeyCombination>().unwrap(), combo);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("ctrl+shift+i".parse::<KeyCombination>().unwrap(), KeyCombination::CtrlShiftI);
        assert_eq!("Shift+Control+I".parse::<KeyCombination>().unwrap(), KeyCombination::CtrlShiftI);
        assert_eq!("Command+Option+J".parse::<KeyCombination>().unwrap(), KeyCombination::CmdAltJ);
        assert_eq!(" f12 ".parse::<KeyCombination>().unwrap(), KeyCombination::F12);
    }

    #[test]
    fn test_parse_unknown() {
        assert!("Ctrl+Q".parse::<KeyCombination>().is_err());
        assert!("Hyper+U".parse::<KeyCombination>().is_err());
        assert!("Ctrl+".parse::<KeyCombination>().is_err());
        assert!("".parse::<KeyCombination>().is_err());

        let err = "F13".parse::<KeyCombination>().unwrap_err();
        assert!(err.to_string().contains("F13"));
        assert!(err.to_string().contains("Ctrl+Shift+I"));
    }

    #[test]
    fn test_combination_matching() {
        assert!(KeyCombination::F12.matches(&KeyInfo::new("F12")));
        assert!(KeyCombination::CtrlShiftI.matches(&KeyInfo::new("I").ctrl().shift()));
        assert!(KeyCombination::CtrlShiftI.matches(&KeyInfo::new("ı").ctrl().shift()));
        assert!(!KeyCombination::CtrlShiftI.matches(&KeyInfo::new("I").ctrl()));
        assert!(KeyCombination::CtrlU.matches(&KeyInfo::new("u").ctrl()));
        assert!(!KeyCombination::CtrlU.matches(&KeyInfo::new("u")));
        assert!(KeyCombination::CmdAltI.matches(&KeyInfo::new("i").meta().alt()));
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&vec![KeyCombination::F12, KeyCombination::CtrlU]).unwrap();
        assert_eq!(json, r#"["F12","Ctrl+U"]"#);

        let parsed: Vec<KeyCombination> = serde_json::from_str(r#"["ctrl+shift+j"]"#).unwrap();
        assert_eq!(parsed, vec![KeyCombination::CtrlShiftJ]);

        assert!(serde_json::from_str::<Vec<KeyCombination>>(r#"["Ctrl+Q"]"#).is_err());
    }

    #[test]
    fn test_matcher_order_and_custom_predicates() {
        let custom: KeyPredicate = Arc::new(|e: &InteractionEvent| {
            e.key().map_or(false, |k| k.key == "F5")
        });
        let panicking: KeyPredicate = Arc::new(|_e: &InteractionEvent| -> bool { panic!("bad predicate") });
        let matcher = KeyMatcher::new(vec![KeyCombination::F12], vec![panicking, custom]);

        let f12 = InteractionEvent::key_down(KeyInfo::new("F12"));
        assert_eq!(matcher.find_match(&f12), Some(KeyMatch::Builtin(KeyCombination::F12)));

        let f5 = InteractionEvent::key_down(KeyInfo::new("F5"));
        assert_eq!(matcher.find_match(&f5), Some(KeyMatch::Custom(1)));

        let a = InteractionEvent::key_down(KeyInfo::new("a"));
        assert_eq!(matcher.find_match(&a), None);
    }
}
