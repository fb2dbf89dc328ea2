//! Keycode mapping table
//!
//! Bidirectional lookup between QMK keycodes, the human readable legends used
//! on KLE key caps, and VIA codes (VIA reuses the QMK names). The table is
//! built once, never mutated afterwards, and shared by reference between
//! parsers and generators.

use lazy_static::lazy_static;
use std::collections::{BTreeSet, HashMap};

/// Keycode meaning "fall through to the layer below"
pub const TRANSPARENT: &str = "KC_TRNS";

/// Keycode meaning "no key at this position"
pub const NO_KEY: &str = "KC_NO";

/// Upper bound QMK reserves for built-in keycodes; custom codes start here
pub const SAFE_RANGE: &str = "SAFE_RANGE";

lazy_static! {
    /// Process-wide standard table
    pub static ref KEYCODES: KeycodeTable = KeycodeTable::standard();
}

/// Keycode category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeycodeCategory {
    Basic,
    Punctuation,
    Function,
    Modifier,
    Navigation,
    Media,
    Special,
    Meta,
}

impl KeycodeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeycodeCategory::Basic => "basic",
            KeycodeCategory::Punctuation => "punctuation",
            KeycodeCategory::Function => "function",
            KeycodeCategory::Modifier => "modifier",
            KeycodeCategory::Navigation => "navigation",
            KeycodeCategory::Media => "media",
            KeycodeCategory::Special => "special",
            KeycodeCategory::Meta => "meta",
        }
    }
}

/// One row of the table
#[derive(Debug, Clone, PartialEq)]
pub struct KeycodeMapping {
    /// QMK keycode, e.g. `KC_A`
    pub qmk_code: String,
    /// Legend printed on the cap; `None` for codes without a visible legend
    pub label: Option<String>,
    /// VIA keycode (identical to the QMK name)
    pub via_code: String,
    pub description: String,
    pub category: KeycodeCategory,
}

/// Legends that are not the canonical label of any code but still resolve
const LABEL_ALIASES: &[(&str, &str)] = &[
    ("Space", "KC_SPC"),
    (" ", "KC_SPC"),
    ("Spacebar", "KC_SPC"),
    ("Backspace", "KC_BSPC"),
    ("Bksp", "KC_BSPC"),
    ("Delete", "KC_DEL"),
    ("Return", "KC_ENT"),
    ("Enter", "KC_ENT"),
    ("Escape", "KC_ESC"),
    ("Caps", "KC_CAPS"),
    ("Page Up", "KC_PGUP"),
    ("Page Down", "KC_PGDN"),
    ("Insert", "KC_INS"),
    ("Control", "KC_LCTL"),
    ("Cmd", "KC_LGUI"),
    ("Super", "KC_LGUI"),
];

/// Immutable keycode table
#[derive(Debug, Clone)]
pub struct KeycodeTable {
    /// Entries in insertion order
    entries: Vec<KeycodeMapping>,
    by_code: HashMap<String, usize>,
}

impl KeycodeTable {
    /// Build the standard QMK table
    pub fn standard() -> Self {
        let mut builder = TableBuilder::default();

        for letter in 'A'..='Z' {
            builder.add(
                &format!("KC_{}", letter),
                Some(&letter.to_string()),
                &format!("Letter {}", letter),
                KeycodeCategory::Basic,
            );
        }

        for digit in "1234567890".chars() {
            builder.add(
                &format!("KC_{}", digit),
                Some(&digit.to_string()),
                &format!("Number {}", digit),
                KeycodeCategory::Basic,
            );
        }

        let punctuation = [
            ("KC_GRV", "`", "Grave/Tilde"),
            ("KC_MINS", "-", "Minus/Underscore"),
            ("KC_EQL", "=", "Equal/Plus"),
            ("KC_LBRC", "[", "Left Bracket"),
            ("KC_RBRC", "]", "Right Bracket"),
            ("KC_BSLS", "\\", "Backslash/Pipe"),
            ("KC_SCLN", ";", "Semicolon/Colon"),
            ("KC_QUOT", "'", "Quote/Double Quote"),
            ("KC_COMM", ",", "Comma/Less Than"),
            ("KC_DOT", ".", "Period/Greater Than"),
            ("KC_SLSH", "/", "Slash/Question Mark"),
        ];
        for (code, label, description) in punctuation {
            builder.add(code, Some(label), description, KeycodeCategory::Punctuation);
        }

        for n in 1..=24 {
            builder.add(
                &format!("KC_F{}", n),
                Some(&format!("F{}", n)),
                &format!("Function Key {}", n),
                KeycodeCategory::Function,
            );
        }

        let modifiers = [
            ("KC_LCTL", "Ctrl", "Left Control"),
            ("KC_LSFT", "Shift", "Left Shift"),
            ("KC_LALT", "Alt", "Left Alt"),
            ("KC_LGUI", "Win", "Left GUI/Windows"),
            ("KC_RCTL", "RCtrl", "Right Control"),
            ("KC_RSFT", "RShift", "Right Shift"),
            ("KC_RALT", "RAlt", "Right Alt"),
            ("KC_RGUI", "RWin", "Right GUI/Windows"),
        ];
        for (code, label, description) in modifiers {
            builder.add(code, Some(label), description, KeycodeCategory::Modifier);
        }

        let navigation = [
            ("KC_HOME", "Home", "Home"),
            ("KC_END", "End", "End"),
            ("KC_PGUP", "PgUp", "Page Up"),
            ("KC_PGDN", "PgDn", "Page Down"),
            ("KC_UP", "↑", "Up Arrow"),
            ("KC_DOWN", "↓", "Down Arrow"),
            ("KC_LEFT", "←", "Left Arrow"),
            ("KC_RGHT", "→", "Right Arrow"),
        ];
        for (code, label, description) in navigation {
            builder.add(code, Some(label), description, KeycodeCategory::Navigation);
        }

        let special = [
            ("KC_SPC", "Space", "Space Bar"),
            ("KC_ENT", "Enter", "Enter/Return"),
            ("KC_ESC", "Esc", "Escape"),
            ("KC_BSPC", "Backspace", "Backspace"),
            ("KC_TAB", "Tab", "Tab"),
            ("KC_CAPS", "Caps Lock", "Caps Lock"),
            ("KC_DEL", "Del", "Delete"),
            ("KC_INS", "Ins", "Insert"),
            ("KC_PSCR", "PrtSc", "Print Screen"),
            ("KC_SCRL", "ScrLk", "Scroll Lock"),
            ("KC_PAUS", "Pause", "Pause/Break"),
            ("KC_APP", "Menu", "Application/Menu"),
        ];
        for (code, label, description) in special {
            builder.add(code, Some(label), description, KeycodeCategory::Special);
        }

        let media = [
            ("KC_MUTE", "Mute", "Audio Mute"),
            ("KC_VOLU", "Vol+", "Volume Up"),
            ("KC_VOLD", "Vol-", "Volume Down"),
        ];
        for (code, label, description) in media {
            builder.add(code, Some(label), description, KeycodeCategory::Media);
        }

        builder.add(
            TRANSPARENT,
            None,
            "Transparent (use lower layer)",
            KeycodeCategory::Meta,
        );
        builder.add(NO_KEY, None, "No operation", KeycodeCategory::Meta);
        builder.add("_______", None, "Transparent (shorthand)", KeycodeCategory::Meta);
        builder.add("XXXXXXX", None, "No operation (shorthand)", KeycodeCategory::Meta);

        builder.build()
    }

    /// QMK code to display label
    pub fn to_display_label(&self, qmk_code: &str) -> Option<&str> {
        self.get(qmk_code).and_then(|m| m.label.as_deref())
    }

    /// Display label to QMK code, first match by exact label equality
    pub fn from_display_label(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|m| m.label.as_deref() == Some(label))
            .map(|m| m.qmk_code.as_str())
    }

    /// Resolve a raw (possibly multi-line) cap legend to a QMK code.
    ///
    /// The last line is the unshifted legend. A blank cap resolves to
    /// [`NO_KEY`] and an unrecognized legend to [`TRANSPARENT`]; this never
    /// fails.
    pub fn parse_display_label(&self, raw_label: &str) -> String {
        let primary = raw_label.split('\n').last().unwrap_or_default();

        // A lone space is a legend in its own right
        let primary = if primary.trim().is_empty() && !primary.is_empty() {
            " "
        } else {
            primary.trim()
        };

        if primary.is_empty() {
            return NO_KEY.to_string();
        }

        if let Some(code) = self.from_display_label(primary) {
            return code.to_string();
        }

        LABEL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == primary)
            .map(|(_, code)| code.to_string())
            .unwrap_or_else(|| TRANSPARENT.to_string())
    }

    /// QMK code to VIA code; VIA reuses QMK names so unknown codes pass through
    pub fn to_via_code<'a>(&'a self, qmk_code: &'a str) -> &'a str {
        self.get(qmk_code)
            .map(|m| m.via_code.as_str())
            .unwrap_or(qmk_code)
    }

    pub fn get(&self, qmk_code: &str) -> Option<&KeycodeMapping> {
        self.by_code.get(qmk_code).map(|&i| &self.entries[i])
    }

    pub fn is_known(&self, qmk_code: &str) -> bool {
        self.by_code.contains_key(qmk_code)
    }

    pub fn by_category(&self, category: KeycodeCategory) -> Vec<&KeycodeMapping> {
        self.entries
            .iter()
            .filter(|m| m.category == category)
            .collect()
    }

    pub fn categories(&self) -> BTreeSet<KeycodeCategory> {
        self.entries.iter().map(|m| m.category).collect()
    }

    /// Codes containing `partial` (case-insensitive), sorted
    pub fn suggest(&self, partial: &str) -> Vec<&str> {
        let needle = partial.to_uppercase();
        let mut found: Vec<&str> = self
            .entries
            .iter()
            .map(|m| m.qmk_code.as_str())
            .filter(|code| code.contains(&needle))
            .collect();
        found.sort_unstable();
        found
    }

    /// Label for a key showing `keycode`: table label, else the code itself
    pub fn label_or_code(&self, keycode: &str) -> String {
        self.to_display_label(keycode)
            .map(str::to_string)
            .unwrap_or_else(|| keycode.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for KeycodeTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Default)]
struct TableBuilder {
    entries: Vec<KeycodeMapping>,
}

impl TableBuilder {
    fn add(
        &mut self,
        code: &str,
        label: Option<&str>,
        description: &str,
        category: KeycodeCategory,
    ) {
        self.entries.push(KeycodeMapping {
            qmk_code: code.to_string(),
            label: label.map(str::to_string),
            via_code: code.to_string(),
            description: description.to_string(),
            category,
        });
    }

    fn build(self) -> KeycodeTable {
        let by_code = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, m)| (m.qmk_code.clone(), i))
            .collect();
        KeycodeTable {
            entries: self.entries,
            by_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_labels_are_unique() {
        let table = KeycodeTable::standard();
        let mut seen = HashSet::new();
        for entry in &table.entries {
            if let Some(label) = &entry.label {
                assert!(seen.insert(label.clone()), "duplicate label {}", label);
            }
        }
    }

    #[test]
    fn test_bidirectional_lookup() {
        let table = KeycodeTable::standard();
        assert_eq!(table.to_display_label("KC_Q"), Some("Q"));
        assert_eq!(table.from_display_label("Q"), Some("KC_Q"));
        assert_eq!(table.from_display_label("PgUp"), Some("KC_PGUP"));
        assert_eq!(table.to_display_label(TRANSPARENT), None);
        assert_eq!(table.to_display_label("MO(1)"), None);
    }

    #[test]
    fn test_parse_display_label_uses_last_line() {
        let table = KeycodeTable::standard();
        assert_eq!(table.parse_display_label("!\n1"), "KC_1");
        assert_eq!(table.parse_display_label("<\n,"), "KC_COMM");
    }

    #[test]
    fn test_parse_display_label_aliases_and_fallback() {
        let table = KeycodeTable::standard();
        assert_eq!(table.parse_display_label("Return"), "KC_ENT");
        assert_eq!(table.parse_display_label(" "), "KC_SPC");
        assert_eq!(table.parse_display_label("Hyper Turbo"), TRANSPARENT);
    }

    #[test]
    fn test_blank_legend_is_no_key() {
        let table = KeycodeTable::standard();
        assert_eq!(table.parse_display_label(""), NO_KEY);
        assert_eq!(table.parse_display_label("!\n"), NO_KEY);
        assert_eq!(table.parse_display_label("Hyper Turbo"), TRANSPARENT);
        assert_eq!(table.parse_display_label(" "), "KC_SPC");
    }

    #[test]
    fn test_suggest_and_categories() {
        let table = KeycodeTable::standard();
        let suggestions = table.suggest("pg");
        assert_eq!(suggestions, vec!["KC_PGDN", "KC_PGUP"]);
        assert!(table.categories().contains(&KeycodeCategory::Modifier));
        assert_eq!(table.by_category(KeycodeCategory::Function).len(), 24);
    }

    #[test]
    fn test_shorthand_aliases_are_known() {
        assert!(KEYCODES.is_known("_______"));
        assert!(KEYCODES.is_known("XXXXXXX"));
        assert_eq!(KEYCODES.to_via_code("KC_A"), "KC_A");
        assert_eq!(KEYCODES.to_via_code("MO(1)"), "MO(1)");
    }
}
