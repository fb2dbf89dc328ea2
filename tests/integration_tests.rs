//! Integration tests for the format converter
//!
//! These exercise the public API end to end: detection on real files,
//! conversions between every format pair and batch processing.

use qmk_format_converter::{
    batch::{BatchConverter, BatchOptions},
    converter::{detect_format, FormatConverter},
    formats::{generator_for, parser_for},
    ConvertError, LayerDefinition, LayoutFormat, UniversalLayout, KEYCODES,
};
use serde_json::{json, Value};
use std::{fs, path::PathBuf};
use tempfile::TempDir;

const KLE_2X2: &str = r#"[["Q","W"],["A","S"]]"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write test file");
    path
}

fn parse(format: LayoutFormat, content: &str) -> UniversalLayout {
    parser_for(format, &KEYCODES)
        .parse_str(content)
        .unwrap_or_else(|e| panic!("{} parse failed: {}", format, e))
}

fn generate(format: LayoutFormat, layout: &UniversalLayout) -> String {
    generator_for(format, &KEYCODES)
        .generate_string(layout)
        .unwrap_or_else(|e| panic!("{} generate failed: {}", format, e))
}

fn base_codes(layout: &UniversalLayout) -> Vec<String> {
    layout.base_layer().map(|l| l.keycodes.clone()).unwrap_or_default()
}

#[test]
fn test_format_detection_from_files() {
    let dir = TempDir::new().unwrap();

    let kle = write(&dir, "kle.json", r#"[{"name":"x"},["A","B"]]"#);
    let configurator = write(&dir, "conf.json", r#"{"keyboard":"x","layers":[["KC_A"]]}"#);
    let via = write(&dir, "via.json", r#"{"name":"x","vendorId":"0x1234","layouts":{}}"#);
    let meta = write(&dir, "meta.kle", r#"{"meta":{"name":"x"}}"#);
    let keymap = write(&dir, "keymap.c", "int x;");
    let keymap_txt = write(&dir, "keymap.txt", "#include QMK_KEYBOARD_H\n");
    let unknown = write(&dir, "notes.json", r#"{"something":"else"}"#);

    assert_eq!(detect_format(&kle), Some(LayoutFormat::Kle));
    assert_eq!(detect_format(&configurator), Some(LayoutFormat::QmkConfigurator));
    assert_eq!(detect_format(&via), Some(LayoutFormat::Via));
    assert_eq!(detect_format(&meta), Some(LayoutFormat::Kle));
    assert_eq!(detect_format(&keymap), Some(LayoutFormat::Keymap));
    assert_eq!(detect_format(&keymap_txt), Some(LayoutFormat::Keymap));
    assert_eq!(detect_format(&unknown), None);
    assert_eq!(detect_format(dir.path().join("missing.json")), None);
}

#[test]
fn test_detection_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "layout.json", r#"{"name":"x","vendorId":"0x1234","layouts":{}}"#);
    let first = detect_format(&path);
    for _ in 0..5 {
        assert_eq!(detect_format(&path), first);
    }
}

#[test]
fn test_kle_to_configurator_scenario() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "pad.json", KLE_2X2);
    let output = dir.path().join("pad_configurator.json");

    let converter = FormatConverter::new();
    let report = converter
        .convert(&input, None, &output, LayoutFormat::QmkConfigurator)
        .unwrap();
    assert_eq!(report.from, LayoutFormat::Kle);
    assert_eq!(report.key_count, 4);

    let value: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(value["layers"][0], json!(["KC_Q", "KC_W", "KC_A", "KC_S"]));

    let (layout, _) = converter.load(&input, None).unwrap();
    let positions: Vec<(f64, f64)> = layout.keys().iter().map(|k| (k.x, k.y)).collect();
    assert_eq!(positions, vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
}

#[test]
fn test_kle_round_trip_keeps_geometry() {
    let source = r#"[
        {"name": "Round Trip", "author": "someone"},
        ["Esc", {"x": 0.5}, "F1"],
        [{"w": 1.5}, "Tab", "Q"],
        [{"r": 15, "rx": 4, "ry": 1}, "Space"]
    ]"#;
    let first = parse(LayoutFormat::Kle, source);
    let second = parse(LayoutFormat::Kle, &generate(LayoutFormat::Kle, &first));

    assert_eq!(second.name, "Round Trip");
    assert_eq!(second.key_count(), first.key_count());
    for (a, b) in first.keys().iter().zip(second.keys()) {
        assert!((a.x - b.x).abs() < 1e-9, "x differs: {} vs {}", a.x, b.x);
        assert!((a.y - b.y).abs() < 1e-9, "y differs: {} vs {}", a.y, b.y);
        assert_eq!(a.width, b.width);
        assert_eq!(a.height, b.height);
        assert_eq!(a.rotation_angle, b.rotation_angle);
        assert_eq!(a.keycode, b.keycode);
    }
    assert_eq!(base_codes(&first), base_codes(&second));
}

#[test]
fn test_kle_default_keys_have_no_formatting() {
    let layout = parse(LayoutFormat::Kle, KLE_2X2);
    let value: Value = serde_json::from_str(&generate(LayoutFormat::Kle, &layout)).unwrap();
    let rows = value.as_array().unwrap();
    assert!(rows
        .iter()
        .flat_map(|row| row.as_array().into_iter().flatten())
        .all(Value::is_string));
}

#[test]
fn test_via_round_trip() {
    let source = json!({
        "name": "Macropad",
        "vendorId": "0x4653",
        "productId": "0x0001",
        "matrix": {"rows": 2, "cols": 3},
        "layouts": {"keymap": [["0,0", "0,1", "0,2"], [{"w": 2}, "1,0", "1,2"]]},
        "keymaps": [{"name": "default", "layers": [
            ["KC_1", "KC_2", "KC_3", "KC_SPC", "MO(1)"],
            ["KC_F1", "KC_F2", "KC_F3", "KC_TRNS", "KC_TRNS"]
        ]}]
    })
    .to_string();

    let first = parse(LayoutFormat::Via, &source);
    let second = parse(LayoutFormat::Via, &generate(LayoutFormat::Via, &first));

    assert_eq!(second.matrix_dimensions(), (2, 3));
    assert_eq!(second.layer_count(), 2);
    for (a, b) in first.layers().iter().zip(second.layers()) {
        assert_eq!(a.keycodes, b.keycodes);
    }
    let matrix: Vec<_> = second.keys().iter().map(|k| k.matrix).collect();
    let expected: Vec<_> = first.keys().iter().map(|k| k.matrix).collect();
    assert_eq!(matrix, expected);
    assert_eq!(second.keys()[3].width, 2.0);
    assert_eq!(second.vendor_id.as_deref(), Some("0x4653"));
}

#[test]
fn test_via_simplified_58_keys() {
    let codes: Vec<String> = (0..58).map(|i| format!("KC_F{}", i % 24 + 1)).collect();
    let layout = parse(LayoutFormat::Via, &json!({"name": "Split", "layers": [codes]}).to_string());

    assert_eq!(layout.key_count(), 58);
    let mut seen = std::collections::HashSet::new();
    let (rows, cols) = layout.matrix_dimensions();
    for key in layout.keys() {
        let pos = key.matrix.expect("every synthesized key has an address");
        assert!(pos.row < rows && pos.col < cols);
        assert!(seen.insert(pos), "duplicate address {}", pos);
    }
}

#[test]
fn test_configurator_round_trip_keeps_passthrough() {
    let source = json!({
        "version": 1,
        "notes": "my notes",
        "documentation": "custom docs",
        "keyboard": "planck/rev6",
        "keymap": "mine",
        "layout": "LAYOUT_ortho_4x12",
        "layers": [["KC_A", "KC_B", "KC_C"], ["KC_1", "KC_2", "MO(1)"]],
        "author": "someone"
    })
    .to_string();

    let first = parse(LayoutFormat::QmkConfigurator, &source);
    let output: Value =
        serde_json::from_str(&generate(LayoutFormat::QmkConfigurator, &first)).unwrap();

    assert_eq!(output["keyboard"], json!("planck/rev6"));
    assert_eq!(output["keymap"], json!("mine"));
    assert_eq!(output["layout"], json!("LAYOUT_ortho_4x12"));
    assert_eq!(output["notes"], json!("my notes"));
    assert_eq!(output["documentation"], json!("custom docs"));
    assert_eq!(output["author"], json!("someone"));
    assert_eq!(
        output["layers"],
        json!([["KC_A", "KC_B", "KC_C"], ["KC_1", "KC_2", "MO(1)"]])
    );
}

#[test]
fn test_configurator_validation_is_aggregated() {
    let err = parser_for(LayoutFormat::QmkConfigurator, &KEYCODES)
        .parse_str(r#"{"layers": [["KC_A"], ["KC_A", 3]]}"#)
        .unwrap_err();
    assert!(matches!(err, ConvertError::ConfiguratorParse { .. }));
    assert!(err.to_string().contains("; "));
}

#[test]
fn test_keymap_round_trip() {
    let source = r#"
#include QMK_KEYBOARD_H

enum layers { _BASE, _NAV };

enum custom_keycodes { EMAIL = SAFE_RANGE };

const uint16_t PROGMEM keymaps[][MATRIX_ROWS][MATRIX_COLS] = {
    [_BASE] = LAYOUT_split_3x5_3(
        KC_Q, KC_W, LT(_NAV, KC_SPC), EMAIL
    ),
    [_NAV] = LAYOUT_split_3x5_3(
        KC_LEFT, KC_RGHT, _______, MT(MOD_LSFT | MOD_LCTL, KC_ENT)
    )
};
"#;
    let first = parse(LayoutFormat::Keymap, source);
    let second = parse(LayoutFormat::Keymap, &generate(LayoutFormat::Keymap, &first));

    assert_eq!(second.layout_name, "LAYOUT_split_3x5_3");
    assert_eq!(second.layer_count(), 2);
    for (a, b) in first.layers().iter().zip(second.layers()) {
        assert_eq!(a.index, b.index);
        assert_eq!(a.name, b.name);
        assert_eq!(a.keycodes, b.keycodes);
    }
    assert_eq!(
        second.layers()[1].keycodes[3],
        "MT(MOD_LSFT | MOD_LCTL, KC_ENT)"
    );
}

#[test]
fn test_keymap_nested_macro_arguments() {
    let source = "const uint16_t PROGMEM keymaps[][MATRIX_ROWS][MATRIX_COLS] = {\n\
        [0] = LAYOUT(A(B(C),D),E)\n\
    };";
    let layout = parse(LayoutFormat::Keymap, source);
    assert_eq!(base_codes(&layout), vec!["A(B(C),D)", "E"]);
}

#[test]
fn test_keymap_layers_never_overwritten() {
    let source = "const uint16_t PROGMEM keymaps[][MATRIX_ROWS][MATRIX_COLS] = {\n\
        [0] = LAYOUT(KC_A, KC_B),\n\
        [2] = LAYOUT(KC_C, KC_D),\n\
        [FOO] = LAYOUT(KC_E, KC_F)\n\
    };";
    let layout = parse(LayoutFormat::Keymap, source);

    assert_eq!(layout.layer_count(), 3);
    let indices: Vec<usize> = layout.layers().iter().map(|l| l.index).collect();
    assert_eq!(indices, vec![0, 2, 3]);
    assert_eq!(layout.layer_by_index(2).unwrap().keycodes, vec!["KC_C", "KC_D"]);
    assert_eq!(layout.layer_by_index(3).unwrap().keycodes, vec!["KC_E", "KC_F"]);

    let duplicate = "const uint16_t PROGMEM keymaps[][MATRIX_ROWS][MATRIX_COLS] = {\n\
        [1] = LAYOUT(KC_A),\n\
        [1] = LAYOUT(KC_B)\n\
    };";
    let err = parser_for(LayoutFormat::Keymap, &KEYCODES)
        .parse_str(duplicate)
        .unwrap_err();
    assert!(matches!(err, ConvertError::KeymapParse { .. }));
}

#[test]
fn test_kle_blank_and_unknown_legends() {
    let converter = FormatConverter::new();
    let output = converter
        .convert_str(r#"[["A", "", "Hyper Turbo"]]"#, LayoutFormat::Kle, LayoutFormat::QmkConfigurator)
        .unwrap();

    let value: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(value["layers"][0], json!(["KC_A", "KC_NO", "KC_TRNS"]));
}

#[test]
fn test_cross_format_chain_keeps_keycodes() {
    let converter = FormatConverter::new();
    let via = converter
        .convert_str(KLE_2X2, LayoutFormat::Kle, LayoutFormat::Via)
        .unwrap();
    let keymap = converter
        .convert_str(&via, LayoutFormat::Via, LayoutFormat::Keymap)
        .unwrap();
    let configurator = converter
        .convert_str(&keymap, LayoutFormat::Keymap, LayoutFormat::QmkConfigurator)
        .unwrap();

    let value: Value = serde_json::from_str(&configurator).unwrap();
    assert_eq!(value["layers"][0], json!(["KC_Q", "KC_W", "KC_A", "KC_S"]));
}

#[test]
fn test_layer_lengths_follow_key_count() {
    let mut layout = UniversalLayout::new();
    layout.add_layer(LayerDefinition::new("Fn", 1, vec!["KC_1".to_string()]));
    for i in 0..5 {
        layout.add_key(qmk_format_converter::KeyDefinition::at(i as f64, 0.0));
        assert!(layout.layers().iter().all(|l| l.keycodes.len() == layout.key_count()));
    }
    layout.add_layer(LayerDefinition::new("Long", 2, vec!["KC_A".to_string(); 9]));
    assert!(layout.layers().iter().all(|l| l.keycodes.len() == 5));
}

#[test]
fn test_failed_conversion_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "broken.c", "const uint16_t PROGMEM keymaps[][MATRIX_ROWS][MATRIX_COLS] = { [0] = LAYOUT(KC_A };");
    let output = dir.path().join("out.json");

    let result = FormatConverter::new().convert(&input, None, &output, LayoutFormat::Via);
    assert!(result.is_err());
    assert!(!output.exists());
}

#[test]
fn test_convert_overwrites_existing_output_atomically() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "pad.json", KLE_2X2);
    let output = write(&dir, "pad.c", "old content");

    FormatConverter::new()
        .convert(&input, Some(LayoutFormat::Kle), &output, LayoutFormat::Keymap)
        .unwrap();
    let content = fs::read_to_string(&output).unwrap();
    assert!(content.contains("#include QMK_KEYBOARD_H"));
    assert!(!content.contains("old content"));
}

#[test]
fn test_validate_file_reports_problems() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "stacked.json",
        r#"[["A", {"x": -1}, "B"]]"#,
    );
    let report = FormatConverter::new().validate_file(&path, None).unwrap();
    assert_eq!(report.format, LayoutFormat::Kle);
    assert!(!report.is_valid());
    assert!(report.messages.iter().any(|m| m.contains("overlap")));
}

#[test]
fn test_batch_conversion() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    write(&input_dir, "one.json", KLE_2X2);
    write(&input_dir, "two.json", r#"[["Esc","1","2"]]"#);
    write(&input_dir, "bad.json", r#"{"keyboard":"x","layers":[[1]]}"#);
    write(&input_dir, "readme.md", "not a layout");

    let converter = FormatConverter::new();
    let options = BatchOptions {
        from: None,
        to: LayoutFormat::Via,
        output_dir: output_dir.path().to_path_buf(),
        overwrite: false,
        recursive: false,
    };
    let batch = BatchConverter::new(&converter, false);

    let result = batch.run(input_dir.path(), &options).unwrap();
    assert_eq!(result.converted.len(), 2);
    assert_eq!(result.failed.len(), 1);
    assert!(result.failed[0].0.ends_with("bad.json"));
    assert!(output_dir.path().join("one.json").exists());
    assert!(output_dir.path().join("two.json").exists());

    let rerun = batch.run(input_dir.path(), &options).unwrap();
    assert_eq!(rerun.skipped.len(), 2);
    assert_eq!(rerun.converted.len(), 0);

    let forced = batch
        .run(input_dir.path(), &BatchOptions { overwrite: true, ..options })
        .unwrap();
    assert_eq!(forced.converted.len(), 2);
}

#[test]
fn test_batch_missing_directory() {
    let dir = TempDir::new().unwrap();
    let options = BatchOptions {
        from: None,
        to: LayoutFormat::Kle,
        output_dir: dir.path().join("out"),
        overwrite: false,
        recursive: false,
    };
    let converter = FormatConverter::new();
    let err = BatchConverter::new(&converter, false)
        .run(&dir.path().join("nope"), &options)
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}
