//! Keyboard Layout Editor JSON
//!
//! A KLE document is an array: an optional metadata object followed by rows.
//! KLE carries physical geometry and legends but no matrix wiring, so parsed
//! keys have no matrix address and keycodes are recovered from legends.

use super::rows::{self, LayoutCursor, RowEncoder};
use super::{LayoutFormat, LayoutGenerator, LayoutParser};
use crate::error::{ConvertError, ConvertResult};
use crate::keycodes::{KeycodeTable, NO_KEY};
use crate::layout::{KeyDefinition, LayerDefinition, UniversalLayout};
use serde_json::{Map, Value};
use tracing::debug;

const FORMAT: LayoutFormat = LayoutFormat::Kle;

/// Metadata fields mapped onto the universal model
const METADATA_FIELDS: [&str; 4] = ["name", "author", "notes", "version"];

/// Parser for KLE JSON
pub struct KleParser<'a> {
    keycodes: &'a KeycodeTable,
}

impl<'a> KleParser<'a> {
    pub fn new(keycodes: &'a KeycodeTable) -> Self {
        Self { keycodes }
    }

    pub fn parse_value(&self, data: &Value) -> ConvertResult<UniversalLayout> {
        let elements = data
            .as_array()
            .ok_or_else(|| ConvertError::parse(FORMAT, "KLE data must be an array"))?;
        if elements.is_empty() {
            return Err(ConvertError::parse(FORMAT, "KLE data must not be empty"));
        }

        let mut layout = UniversalLayout::new();
        let mut cursor = LayoutCursor::new();
        let mut rows_start = 0;

        if let Some(Value::Object(first)) = elements.first() {
            if rows::is_formatting_object(first) {
                let props = rows::KeyProps::from_object(first).map_err(|e| {
                    ConvertError::parse(FORMAT, format!("invalid leading formatting object: {}", e))
                })?;
                cursor.apply(&props);
            } else {
                apply_metadata(&mut layout, first);
            }
            rows_start = 1;
        }

        let keys = rows::decode_rows(
            FORMAT,
            &elements[rows_start..],
            &mut cursor,
            0,
            |label, key| Ok(self.label_key(label, key)),
        )?;

        debug!("Parsed {} KLE keys", keys.len());

        let keycodes: Vec<String> = keys.iter().map(|k| k.keycode.clone()).collect();
        for key in keys {
            layout.add_key(key);
        }
        layout.replace_layers(vec![LayerDefinition::new("Default", 0, keycodes)]);

        if layout.name.is_empty() {
            layout.name = "KLE Layout".to_string();
        }
        Ok(layout)
    }

    fn label_key(&self, label: &str, mut key: KeyDefinition) -> KeyDefinition {
        key.keycode = self.keycodes.parse_display_label(label);

        let mut lines: Vec<&str> = label.split('\n').collect();
        let primary = lines.pop().unwrap_or_default();
        key.primary_label = primary.trim().to_string();
        key.secondary_labels = lines
            .into_iter()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        key
    }
}

fn apply_metadata(layout: &mut UniversalLayout, metadata: &Map<String, Value>) {
    let text = |field: &str| metadata.get(field).map(value_to_text);

    if let Some(name) = text("name") {
        layout.name = name;
    }
    if let Some(author) = text("author") {
        layout.author = author;
    }
    if let Some(notes) = text("notes") {
        layout.description = notes;
    }
    if let Some(version) = text("version") {
        layout.version = version;
    }
    layout.metadata.kle = metadata.clone();
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl LayoutParser for KleParser<'_> {
    fn format(&self) -> LayoutFormat {
        FORMAT
    }

    fn parse_str(&self, content: &str) -> ConvertResult<UniversalLayout> {
        let data = super::from_json(FORMAT, content)?;
        self.parse_value(&data)
    }
}

/// Generator for KLE JSON
pub struct KleGenerator<'a> {
    keycodes: &'a KeycodeTable,
}

impl<'a> KleGenerator<'a> {
    pub fn new(keycodes: &'a KeycodeTable) -> Self {
        Self { keycodes }
    }

    pub fn generate_value(&self, layout: &UniversalLayout) -> ConvertResult<Value> {
        if layout.keys().is_empty() {
            return Err(ConvertError::generate(FORMAT, "layout has no keys to generate"));
        }

        let mut document = Vec::new();
        let metadata = self.metadata(layout);
        if !metadata.is_empty() {
            document.push(Value::Object(metadata));
        }

        let grouped = rows::group_rows(layout.keys());
        let encoded = RowEncoder::new().encode(&grouped, |key| self.key_label(key));
        document.extend(encoded);

        Ok(Value::Array(document))
    }

    /// Legend for a key: full multi-line label, else primary, else table label
    pub fn key_label(&self, key: &KeyDefinition) -> String {
        if !key.secondary_labels.is_empty() {
            return key.full_label();
        }
        if !key.primary_label.is_empty() {
            return key.primary_label.clone();
        }
        if key.keycode.is_empty() || key.keycode == NO_KEY {
            return String::new();
        }
        self.keycodes.label_or_code(&key.keycode)
    }

    fn metadata(&self, layout: &UniversalLayout) -> Map<String, Value> {
        let mut metadata = Map::new();
        let fields = [
            ("name", &layout.name),
            ("author", &layout.author),
            ("notes", &layout.description),
            ("version", &layout.version),
        ];
        for (field, value) in fields {
            if !value.is_empty() {
                metadata.insert(field.to_string(), Value::String(value.clone()));
            }
        }
        for (field, value) in &layout.metadata.kle {
            if !METADATA_FIELDS.contains(&field.as_str()) {
                metadata.insert(field.clone(), value.clone());
            }
        }
        metadata
    }
}

impl LayoutGenerator for KleGenerator<'_> {
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
    use crate::keycodes::{KEYCODES, TRANSPARENT};
    use serde_json::json;

    fn parse(value: Value) -> UniversalLayout {
        KleParser::new(&KEYCODES).parse_value(&value).unwrap()
    }

    #[test]
    fn test_parse_simple_rows() {
        let layout = parse(json!([["Q", "W"], ["A", "S"]]));
        let positions: Vec<(f64, f64)> = layout.keys().iter().map(|k| (k.x, k.y)).collect();
        assert_eq!(positions, vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        assert_eq!(
            layout.layers()[0].keycodes,
            vec!["KC_Q", "KC_W", "KC_A", "KC_S"]
        );
        assert_eq!(layout.layer_count(), 1);
        assert!(layout.keys().iter().all(|k| k.matrix.is_none()));
    }

    #[test]
    fn test_parse_metadata_object() {
        let layout = parse(json!([
            {"name": "Test Board", "author": "someone", "background": {"name": "wood"}},
            ["Esc"]
        ]));
        assert_eq!(layout.name, "Test Board");
        assert_eq!(layout.author, "someone");
        assert!(layout.metadata.kle.contains_key("background"));
        assert_eq!(layout.keys()[0].keycode, "KC_ESC");
    }

    #[test]
    fn test_leading_formatting_object_is_carryover() {
        let layout = parse(json!([{"c": "#ff0000"}, ["A"]]));
        assert_eq!(layout.key_count(), 1);
        assert_eq!(layout.keys()[0].color, "#ff0000");
        assert_eq!(layout.name, "KLE Layout");
    }

    #[test]
    fn test_multi_line_labels() {
        let layout = parse(json!([["!\n1", "Foo"]]));
        let key = &layout.keys()[0];
        assert_eq!(key.primary_label, "1");
        assert_eq!(key.secondary_labels, vec!["!"]);
        assert_eq!(key.keycode, "KC_1");

        let unknown = &layout.keys()[1];
        assert_eq!(unknown.keycode, TRANSPARENT);
        assert_eq!(unknown.primary_label, "Foo");
    }

    #[test]
    fn test_blank_and_unknown_legends() {
        let layout = parse(json!([["A", "", "Foo"]]));
        let codes: Vec<&str> = layout.keys().iter().map(|k| k.keycode.as_str()).collect();
        assert_eq!(codes, vec!["KC_A", NO_KEY, TRANSPARENT]);

        let generator = KleGenerator::new(&KEYCODES);
        assert_eq!(generator.key_label(&layout.keys()[1]), "");
    }

    #[test]
    fn test_parse_errors() {
        let parser = KleParser::new(&KEYCODES);
        assert!(matches!(
            parser.parse_str("{not json"),
            Err(ConvertError::KleParse { .. })
        ));
        assert!(parser.parse_value(&json!({"a": 1})).is_err());
        assert!(parser.parse_value(&json!([])).is_err());
        let err = parser.parse_value(&json!([["A", true]])).unwrap_err();
        assert!(err.to_string().contains("element 1"));
    }

    #[test]
    fn test_generate_suppresses_default_formatting() {
        let mut layout = UniversalLayout::new();
        layout.add_key(KeyDefinition::at(0.0, 0.0).with_label("Q"));
        let value = KleGenerator::new(&KEYCODES).generate_value(&layout).unwrap();
        assert_eq!(value, json!([["Q"]]));
    }

    #[test]
    fn test_generate_label_fallbacks() {
        let generator = KleGenerator::new(&KEYCODES);
        let with_secondary = {
            let mut key = KeyDefinition::at(0.0, 0.0).with_label("1");
            key.secondary_labels = vec!["!".to_string()];
            key
        };
        assert_eq!(generator.key_label(&with_secondary), "!\n1");
        assert_eq!(
            generator.key_label(&KeyDefinition::at(0.0, 0.0).with_keycode("KC_ENT")),
            "Enter"
        );
        assert_eq!(
            generator.key_label(&KeyDefinition::at(0.0, 0.0).with_keycode("MO(1)")),
            "MO(1)"
        );
        assert_eq!(
            generator.key_label(&KeyDefinition::at(0.0, 0.0).with_keycode("")),
            ""
        );
    }

    #[test]
    fn test_generate_metadata_only_when_set() {
        let mut layout = UniversalLayout::new();
        layout.add_key(KeyDefinition::at(0.0, 0.0).with_label("A"));
        layout.name = "Board".to_string();
        layout.metadata.kle.insert("switchMount".into(), json!("cherry"));

        let value = KleGenerator::new(&KEYCODES).generate_value(&layout).unwrap();
        assert_eq!(value[0], json!({"name": "Board", "switchMount": "cherry"}));
    }

    #[test]
    fn test_empty_layout_is_generate_error() {
        let err = KleGenerator::new(&KEYCODES)
            .generate_value(&UniversalLayout::new())
            .unwrap_err();
        assert!(matches!(err, ConvertError::KleGenerate { .. }));
    }

    #[test]
    fn test_round_trip_geometry_and_labels() {
        let source = json!([
            {"name": "Round"},
            ["Esc", {"w": 1.5}, "Tab", {"x": 0.25}, "Q"],
            [{"y": 0.5, "w": 2.25}, "Shift", {"r": 10, "rx": 3, "ry": 1.5}, "Enter"]
        ]);
        let first = parse(source);
        let generated = KleGenerator::new(&KEYCODES).generate_value(&first).unwrap();
        let second = parse(generated);

        assert_eq!(first.key_count(), second.key_count());
        for (a, b) in first.keys().iter().zip(second.keys()) {
            assert!((a.x - b.x).abs() < 1e-6);
            assert!((a.y - b.y).abs() < 1e-6);
            assert_eq!(a.width, b.width);
            assert_eq!(a.rotation_angle, b.rotation_angle);
            assert_eq!(a.keycode, b.keycode);
            assert_eq!(a.primary_label, b.primary_label);
        }
        assert_eq!(second.name, "Round");
    }
}
