//! QMK Configurator JSON export
//!
//! The export is flat: a keyboard identifier, a layout macro and one keycode
//! array per layer. There is no physical data, so keys are placed on an
//! estimated grid.

use super::{LayoutFormat, LayoutGenerator, LayoutParser};
use crate::error::{ConvertError, ConvertResult};
use crate::keycodes::KeycodeTable;
use crate::layout::{estimate, KeyDefinition, LayerDefinition, UniversalLayout, DEFAULT_LAYOUT_MACRO};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

const FORMAT: LayoutFormat = LayoutFormat::QmkConfigurator;

const DEFAULT_DOCUMENTATION: &str = "This file is a QMK Configurator export. You can import it at \
<https://config.qmk.fm> or use it directly with QMK's source code.\n\n\
Convert it to a keymap.c with `qmk json2c`, then build it with `qmk compile`.\n";

/// Passthrough fields, in output order
const PASSTHROUGH_FIELDS: [&str; 7] = [
    "version",
    "notes",
    "documentation",
    "author",
    "keyboard",
    "keymap",
    "layout",
];

/// Keyboards with a known display name and layout macro
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownKeyboard {
    pub id: &'static str,
    pub key_count: usize,
    pub name: &'static str,
    pub layout: &'static str,
}

pub const KNOWN_KEYBOARDS: &[KnownKeyboard] = &[
    KnownKeyboard {
        id: "lily58/rev1",
        key_count: 58,
        name: "Lily58 Rev1",
        layout: "LAYOUT",
    },
    KnownKeyboard {
        id: "lily58",
        key_count: 58,
        name: "Lily58",
        layout: "LAYOUT",
    },
    KnownKeyboard {
        id: "corne",
        key_count: 42,
        name: "Corne",
        layout: "LAYOUT_split_3x6_3",
    },
    KnownKeyboard {
        id: "planck/rev6",
        key_count: 47,
        name: "Planck Rev6",
        layout: "LAYOUT_planck_grid",
    },
];

pub fn known_keyboard(id: &str) -> Option<&'static KnownKeyboard> {
    KNOWN_KEYBOARDS.iter().find(|k| k.id == id)
}

#[derive(Debug, Deserialize)]
struct ConfiguratorDocument {
    keyboard: String,
    keymap: Option<String>,
    layout: Option<String>,
    layers: Vec<Vec<String>>,
    author: Option<String>,
    notes: Option<String>,
}

/// Check a raw export, returning every problem found
pub fn validate_document(data: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(object) = data.as_object() else {
        errors.push("QMK Configurator data must be an object".to_string());
        return errors;
    };

    for field in ["keyboard", "layers"] {
        if !object.contains_key(field) {
            errors.push(format!("Missing required field: '{}'", field));
        }
    }

    if let Some(layers) = object.get("layers") {
        match layers.as_array() {
            None => errors.push("'layers' must be an array".to_string()),
            Some(layers) if layers.is_empty() => {
                errors.push("'layers' array cannot be empty".to_string())
            }
            Some(layers) => {
                let expected = layers[0].as_array().map_or(0, Vec::len);
                for (i, layer) in layers.iter().enumerate() {
                    let Some(codes) = layer.as_array() else {
                        errors.push(format!("Layer {} must be an array", i));
                        continue;
                    };
                    if codes.len() != expected {
                        errors.push(format!(
                            "Layer {} has {} keycodes, expected {}",
                            i,
                            codes.len(),
                            expected
                        ));
                    }
                    for (j, code) in codes.iter().enumerate() {
                        if !code.is_string() {
                            errors.push(format!(
                                "Layer {}, key {}: keycode must be a string, found {}",
                                i,
                                j,
                                super::rows::json_kind(code)
                            ));
                        }
                    }
                }
            }
        }
    }

    if object.get("version").is_some_and(|v| !v.is_i64() && !v.is_u64()) {
        errors.push("'version' must be an integer".to_string());
    }
    for field in ["keyboard", "keymap", "layout"] {
        if object.get(field).is_some_and(|v| !v.is_string()) {
            errors.push(format!("'{}' must be a string", field));
        }
    }

    errors
}

/// Parser for QMK Configurator exports
pub struct ConfiguratorParser<'a> {
    keycodes: &'a KeycodeTable,
}

impl<'a> ConfiguratorParser<'a> {
    pub fn new(keycodes: &'a KeycodeTable) -> Self {
        Self { keycodes }
    }

    pub fn parse_value(&self, data: &Value) -> ConvertResult<UniversalLayout> {
        let errors = validate_document(data);
        if !errors.is_empty() {
            return Err(ConvertError::parse(
                FORMAT,
                format!("invalid QMK Configurator format: {}", errors.join("; ")),
            ));
        }

        let document: ConfiguratorDocument = serde_json::from_value(data.clone())
            .map_err(|e| ConvertError::parse(FORMAT, e.to_string()))?;
        let known = known_keyboard(&document.keyboard);

        let mut layout = UniversalLayout::new();
        layout.keyboard = document.keyboard.clone();
        layout.layout_name = document
            .layout
            .clone()
            .or_else(|| known.map(|k| k.layout.to_string()))
            .unwrap_or_else(|| DEFAULT_LAYOUT_MACRO.to_string());
        layout.name = document
            .keymap
            .clone()
            .or_else(|| known.map(|k| k.name.to_string()))
            .unwrap_or_else(|| document.keyboard.clone());
        if let Some(author) = &document.author {
            layout.author = author.clone();
        }
        if let Some(notes) = &document.notes {
            layout.description = notes.clone();
        }

        if let Some(object) = data.as_object() {
            for field in PASSTHROUGH_FIELDS {
                if let Some(value) = object.get(field) {
                    layout.metadata.configurator.insert(field.to_string(), value.clone());
                }
            }
        }

        let base = &document.layers[0];
        let columns = estimate::configurator_columns(base.len());
        debug!(
            "Placing {} configurator keys on a grid of {} columns",
            base.len(),
            columns
        );
        for ((row, col), keycode) in estimate::grid_positions(base.len(), columns)
            .into_iter()
            .zip(base)
        {
            let key = KeyDefinition::at(col as f64, row as f64)
                .with_matrix(row, col)
                .with_keycode(keycode.clone())
                .with_label(self.keycodes.label_or_code(keycode));
            layout.add_key(key);
        }
        layout.set_matrix_dimensions(base.len().div_ceil(columns).max(1), columns);

        let layers = document
            .layers
            .iter()
            .enumerate()
            .map(|(i, codes)| {
                let name = if i == 0 {
                    "Default".to_string()
                } else {
                    format!("Layer_{}", i)
                };
                LayerDefinition::new(name, i, codes.clone())
            })
            .collect();
        layout.replace_layers(layers);

        Ok(layout)
    }
}

impl LayoutParser for ConfiguratorParser<'_> {
    fn format(&self) -> LayoutFormat {
        FORMAT
    }

    fn parse_str(&self, content: &str) -> ConvertResult<UniversalLayout> {
        let data = super::from_json(FORMAT, content)?;
        self.parse_value(&data)
    }
}

/// Generator for QMK Configurator exports
pub struct ConfiguratorGenerator<'a> {
    keycodes: &'a KeycodeTable,
}

impl<'a> ConfiguratorGenerator<'a> {
    pub fn new(keycodes: &'a KeycodeTable) -> Self {
        Self { keycodes }
    }

    pub fn generate_value(&self, layout: &UniversalLayout) -> ConvertResult<Value> {
        if layout.keys().is_empty() {
            return Err(ConvertError::generate(FORMAT, "layout must have at least one key"));
        }

        let bag = &layout.metadata.configurator;
        let text = |field: &str| bag.get(field).and_then(Value::as_str).map(String::from);

        let keyboard = non_empty(&layout.keyboard)
            .or_else(|| text("keyboard"))
            .unwrap_or_else(|| "unknown".to_string());
        let keymap = text("keymap")
            .or_else(|| non_empty(&layout.name))
            .unwrap_or_else(|| "default_keymap".to_string());
        let author = non_empty(&layout.author)
            .or_else(|| text("author"))
            .unwrap_or_default();
        let notes = text("notes")
            .or_else(|| non_empty(&layout.description))
            .unwrap_or_default();
        let documentation = text("documentation").unwrap_or_else(|| DEFAULT_DOCUMENTATION.to_string());
        let layout_macro =
            non_empty(&layout.layout_name).unwrap_or_else(|| DEFAULT_LAYOUT_MACRO.to_string());

        let layers: Vec<Vec<&str>> = layout
            .layers()
            .iter()
            .map(|layer| layer.keycodes.iter().map(|c| self.keycodes.to_via_code(c)).collect())
            .collect();

        let mut document = Map::new();
        document.insert(
            "version".into(),
            bag.get("version").cloned().unwrap_or_else(|| json!(1)),
        );
        document.insert("notes".into(), json!(notes));
        document.insert("documentation".into(), json!(documentation));
        document.insert("author".into(), json!(author));
        document.insert("keyboard".into(), json!(keyboard));
        document.insert("keymap".into(), json!(keymap));
        document.insert("layout".into(), json!(layout_macro));
        document.insert("layers".into(), json!(layers));

        Ok(Value::Object(document))
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl LayoutGenerator for ConfiguratorGenerator<'_> {
    fn format(&self) -> LayoutFormat {
        FORMAT
    }

    fn generate_string(&self, layout: &UniversalLayout) -> ConvertResult<String> {
        let value = self.generate_value(layout)?;
        super::to_pretty_json(FORMAT, &value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycodes::KEYCODES;

    fn parse(value: Value) -> ConvertResult<UniversalLayout> {
        ConfiguratorParser::new(&KEYCODES).parse_value(&value)
    }

    #[test]
    fn test_parse_export() {
        let layout = parse(json!({
            "version": 1,
            "notes": "my notes",
            "keyboard": "planck/rev6",
            "keymap": "mine",
            "layout": "LAYOUT_planck_grid",
            "layers": [
                ["KC_Q", "KC_W", "KC_E", "KC_R"],
                ["KC_1", "KC_2", "KC_TRNS", "KC_TRNS"]
            ],
            "author": "someone"
        }))
        .unwrap();

        assert_eq!(layout.keyboard, "planck/rev6");
        assert_eq!(layout.name, "mine");
        assert_eq!(layout.author, "someone");
        assert_eq!(layout.layout_name, "LAYOUT_planck_grid");
        assert_eq!(layout.layers()[0].name, "Default");
        assert_eq!(layout.layers()[1].name, "Layer_1");

        let positions: Vec<(f64, f64)> = layout.keys().iter().map(|k| (k.x, k.y)).collect();
        assert_eq!(positions, vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 1.0)]);
        assert_eq!(layout.keys()[0].primary_label, "Q");
        assert_eq!(layout.metadata.configurator.get("notes"), Some(&json!("my notes")));
    }

    #[test]
    fn test_known_keyboard_fills_name() {
        let layout = parse(json!({"keyboard": "corne", "layers": [["KC_A"]]})).unwrap();
        assert_eq!(layout.name, "Corne");
        assert_eq!(layout.layout_name, "LAYOUT_split_3x6_3");
    }

    #[test]
    fn test_validation_aggregates_messages() {
        let err = parse(json!({
            "version": "one",
            "layers": [["KC_A", "KC_B"], ["KC_A"], ["KC_A", 5]]
        }))
        .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ConvertError::ConfiguratorParse { .. }));
        assert!(message.contains("Missing required field: 'keyboard'"));
        assert!(message.contains("Layer 1 has 1 keycodes, expected 2"));
        assert!(message.contains("Layer 2, key 1"));
        assert!(message.contains("'version' must be an integer"));
        assert_eq!(message.matches("; ").count(), 3);
    }

    #[test]
    fn test_short_layer_still_checks_keycode_types() {
        let errors = validate_document(&json!({
            "keyboard": "x",
            "layers": [["KC_A", "KC_B", "KC_C"], [null, "KC_B"]]
        }));
        assert_eq!(
            errors,
            vec![
                "Layer 1 has 2 keycodes, expected 3",
                "Layer 1, key 0: keycode must be a string, found null",
            ]
        );
    }

    #[test]
    fn test_validate_rejects_empty_layers() {
        let errors = validate_document(&json!({"keyboard": "x", "layers": []}));
        assert_eq!(errors, vec!["'layers' array cannot be empty"]);
    }

    #[test]
    fn test_generate_field_order() {
        let layout = parse(json!({
            "keyboard": "lily58/rev1",
            "keymap": "default",
            "layout": "LAYOUT",
            "layers": [["KC_A", "KC_B"]],
            "version": 1
        }))
        .unwrap();
        let value = ConfiguratorGenerator::new(&KEYCODES).generate_value(&layout).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["version", "notes", "documentation", "author", "keyboard", "keymap", "layout", "layers"]
        );
        assert_eq!(value["layers"], json!([["KC_A", "KC_B"]]));
    }

    #[test]
    fn test_round_trip_keeps_layers() {
        let source = json!({
            "version": 1,
            "notes": "",
            "documentation": "docs",
            "keyboard": "corne",
            "keymap": "via",
            "layout": "LAYOUT_split_3x6_3",
            "layers": [["KC_A", "LT(1,KC_SPC)"], ["KC_TRNS", "KC_B"]],
            "author": ""
        });
        let layout = parse(source.clone()).unwrap();
        let generated = ConfiguratorGenerator::new(&KEYCODES).generate_value(&layout).unwrap();
        assert_eq!(generated, source);
    }

    #[test]
    fn test_generate_defaults_for_foreign_layout() {
        let mut layout = UniversalLayout::new();
        layout.add_key(KeyDefinition::at(0.0, 0.0).with_keycode("KC_A"));
        let value = ConfiguratorGenerator::new(&KEYCODES).generate_value(&layout).unwrap();
        assert_eq!(value["keyboard"], json!("unknown"));
        assert_eq!(value["keymap"], json!("default_keymap"));
        assert_eq!(value["version"], json!(1));
    }
}
