//! Layout validation
//!
//! Checks return human readable messages instead of failing. The converter
//! logs them as warnings; only the CLI's validation mode treats a non-empty
//! list as a failure.

use crate::formats::keymap::{scanner, BAG_CUSTOM_KEYCODES};
use crate::formats::LayoutFormat;
use crate::keycodes::{KeycodeTable, SAFE_RANGE};
use crate::layout::{KeyDefinition, MatrixPosition, UniversalLayout};
use std::collections::HashMap;

/// Edges closer than this are touching, not overlapping
const EDGE_EPSILON: f64 = 1e-6;

const QMK_PREFIXES: [&str; 7] = ["KC_", "QK_", "RGB_", "UG_", "BL_", "RM_", "MS_"];

/// Every format independent check
pub fn validate_layout(layout: &UniversalLayout, table: &KeycodeTable) -> Vec<String> {
    let mut messages = Vec::new();

    if layout.key_count() == 0 {
        messages.push("Layout must have at least one key".to_string());
    }
    if layout.layer_count() == 0 {
        messages.push("Layout must have at least one layer".to_string());
    }

    for (i, key) in layout.keys().iter().enumerate() {
        if key.width.is_nan() || key.height.is_nan() || key.width <= 0.0 || key.height <= 0.0 {
            messages.push(format!("Key {}: invalid size {}x{}", i, key.width, key.height));
        }
    }
    for layer in layout.layers() {
        if layer.keycodes.len() != layout.key_count() {
            messages.push(format!(
                "Layer '{}': keycode count ({}) doesn't match key count ({})",
                layer.name,
                layer.keycodes.len(),
                layout.key_count()
            ));
        }
    }

    messages.extend(check_overlaps(layout.keys()));
    messages.extend(check_matrix(layout));
    messages.extend(check_keycodes(layout, table));
    messages
}

/// General checks plus what the target format needs to be written faithfully
pub fn validate_for_format(
    layout: &UniversalLayout,
    format: LayoutFormat,
    table: &KeycodeTable,
) -> Vec<String> {
    let mut messages = validate_layout(layout, table);

    match format {
        LayoutFormat::Via => {
            let missing = layout.keys().iter().filter(|k| k.matrix.is_none()).count();
            if missing > 0 {
                messages.push(format!(
                    "{} of {} keys have no matrix address; addresses will be assigned from the physical layout",
                    missing,
                    layout.key_count()
                ));
            }
        }
        LayoutFormat::QmkConfigurator => {
            let in_bag = layout
                .metadata
                .configurator
                .get("keyboard")
                .and_then(|v| v.as_str())
                .is_some_and(|s| !s.trim().is_empty());
            if layout.keyboard.trim().is_empty() && !in_bag {
                messages.push(
                    "No keyboard identifier; the export will name the keyboard 'unknown'"
                        .to_string(),
                );
            }
        }
        LayoutFormat::Keymap => {
            let name = layout.layout_name.trim();
            if !name.is_empty() && !scanner::is_identifier(name) {
                messages.push(format!("Invalid layout macro name: {}", name));
            }
        }
        LayoutFormat::Kle => messages.extend(check_stacked(layout.keys())),
    }

    messages
}

fn overlaps(a: &KeyDefinition, b: &KeyDefinition) -> bool {
    a.x < b.right_edge() - EDGE_EPSILON
        && b.x < a.right_edge() - EDGE_EPSILON
        && a.y < b.bottom_edge() - EDGE_EPSILON
        && b.y < a.bottom_edge() - EDGE_EPSILON
}

/// Bounding box overlap between unrotated keys
pub fn check_overlaps(keys: &[KeyDefinition]) -> Vec<String> {
    let mut messages = Vec::new();
    for (i, a) in keys.iter().enumerate() {
        if a.is_rotated() {
            continue;
        }
        for (j, b) in keys.iter().enumerate().skip(i + 1) {
            if !b.is_rotated() && overlaps(a, b) {
                messages.push(format!("Keys {} and {} overlap in physical position", i, j));
            }
        }
    }
    messages
}

/// Keys sharing the exact same position and rotation
pub fn check_stacked(keys: &[KeyDefinition]) -> Vec<String> {
    let mut messages = Vec::new();
    for (i, a) in keys.iter().enumerate() {
        for (j, b) in keys.iter().enumerate().skip(i + 1) {
            let same = (a.x - b.x).abs() < EDGE_EPSILON
                && (a.y - b.y).abs() < EDGE_EPSILON
                && (a.rotation_angle - b.rotation_angle).abs() < EDGE_EPSILON;
            if same {
                messages.push(format!(
                    "Keys {} and {} are stacked at ({}, {})",
                    i, j, a.x, a.y
                ));
            }
        }
    }
    messages
}

/// Matrix bounds and duplicate addresses
pub fn check_matrix(layout: &UniversalLayout) -> Vec<String> {
    let mut messages = Vec::new();
    let (rows, cols) = layout.matrix_dimensions();
    let mut seen: HashMap<MatrixPosition, usize> = HashMap::new();

    for (i, key) in layout.keys().iter().enumerate() {
        let Some(pos) = key.matrix else { continue };
        if pos.row >= rows {
            messages.push(format!("Key {}: matrix row {} >= matrix rows {}", i, pos.row, rows));
        }
        if pos.col >= cols {
            messages.push(format!("Key {}: matrix col {} >= matrix cols {}", i, pos.col, cols));
        }
        if let Some(first) = seen.insert(pos, i) {
            messages.push(format!(
                "Keys {} and {} share matrix position {}",
                first, i, pos
            ));
        }
    }
    messages
}

/// Keycodes QMK would not accept
pub fn check_keycodes(layout: &UniversalLayout, table: &KeycodeTable) -> Vec<String> {
    let declared: Vec<&str> = layout
        .metadata
        .keymap
        .get(BAG_CUSTOM_KEYCODES)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut messages = Vec::new();
    for layer in layout.layers() {
        for (i, keycode) in layer.keycodes.iter().enumerate() {
            let keycode = keycode.trim();
            if keycode.is_empty() {
                messages.push(format!("Layer '{}', position {}: empty keycode", layer.name, i));
            } else if !is_plausible_keycode(keycode, table, &declared) {
                messages.push(format!(
                    "Layer '{}', position {}: invalid keycode '{}'",
                    layer.name, i, keycode
                ));
            }
        }
    }
    messages
}

/// Known code, QMK prefixed identifier, declared custom code, numeric
/// literal or a `NAME(args)` call
pub fn is_plausible_keycode(keycode: &str, table: &KeycodeTable, declared: &[&str]) -> bool {
    if table.is_known(keycode) || declared.contains(&keycode) || keycode == SAFE_RANGE {
        return true;
    }
    if scanner::is_identifier(keycode) {
        return QMK_PREFIXES.iter().any(|p| keycode.starts_with(p));
    }
    if keycode.chars().all(|c| c.is_ascii_digit())
        || keycode
            .strip_prefix("0x")
            .is_some_and(|hex| !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return true;
    }
    scanner::split_macro_call(keycode).is_some()
}
