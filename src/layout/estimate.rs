//! Layout estimation strategies
//!
//! Several formats carry keycodes but no physical arrangement. The functions
//! here invent a plausible grid from the key count (and, for keymap sources,
//! the layout macro name). Results are lossy and never authoritative: they
//! only exist so that a generator which needs positions has something to
//! emit.

use super::{KeyDefinition, MatrixPosition};
use tracing::debug;

/// Keys per row used once a template runs out of rows
const OVERFLOW_ROW_WIDTH: usize = 12;

/// Column count for a Configurator layout with `key_count` keys
pub fn configurator_columns(key_count: usize) -> usize {
    match key_count {
        0..=12 => 3,
        13..=30 => 10,
        31..=50 => 12,
        51..=70 => 15,
        _ => 21,
    }
}

/// Row-major grid positions for `key_count` keys, `columns` per row
pub fn grid_positions(key_count: usize, columns: usize) -> Vec<(usize, usize)> {
    let columns = columns.max(1);
    (0..key_count).map(|i| (i / columns, i % columns)).collect()
}

/// `(rows, cols)` for a layout that declares no matrix at all
pub fn matrix_from_key_count(key_count: usize) -> (usize, usize) {
    let cols = 10;
    let rows = key_count.div_ceil(cols).max(1);
    (rows, cols)
}

/// Row template for a key-count size class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowTemplate {
    pub keys_per_row: &'static [usize],
    pub row_offsets: &'static [f64],
    pub matrix: (usize, usize),
}

const COMPACT: RowTemplate = RowTemplate {
    keys_per_row: &[14, 14, 13, 12, 7],
    row_offsets: &[0.0, 0.25, 0.375, 0.75, 1.25],
    matrix: (5, 14),
};

const TENKEYLESS: RowTemplate = RowTemplate {
    keys_per_row: &[14, 14, 14, 14, 12, 8, 11],
    row_offsets: &[0.0, 0.0, 0.0, 0.0, 0.0, 1.5, 1.0],
    matrix: (6, 17),
};

const FULL_SIZE: RowTemplate = RowTemplate {
    keys_per_row: &[15, 15, 15, 15, 13, 12, 10],
    row_offsets: &[0.0, 0.0, 0.0, 0.0, 0.0, 1.5, 1.5],
    matrix: (6, 21),
};

impl RowTemplate {
    pub fn for_key_count(key_count: usize) -> Self {
        match key_count {
            0..=60 => COMPACT,
            61..=87 => TENKEYLESS,
            _ => FULL_SIZE,
        }
    }
}

/// Keys synthesized from a row template
#[derive(Debug, Clone)]
pub struct SynthesizedGrid {
    pub keys: Vec<KeyDefinition>,
    pub matrix_rows: usize,
    pub matrix_cols: usize,
}

/// Synthesize keys for a keymap that has no physical layout.
///
/// Rows follow the size-class template; keys beyond the template's capacity
/// go into extra rows of twelve. Matrix addresses mirror the grid so every
/// key gets a distinct one.
pub fn synthesize_from_template(key_count: usize) -> SynthesizedGrid {
    let template = RowTemplate::for_key_count(key_count);
    let mut keys = Vec::with_capacity(key_count);
    let mut row = 0;

    while keys.len() < key_count {
        let (width, offset) = match template.keys_per_row.get(row) {
            Some(&w) => (w, template.row_offsets.get(row).copied().unwrap_or(0.0)),
            None => (OVERFLOW_ROW_WIDTH, 0.0),
        };
        let take = width.min(key_count - keys.len());
        for col in 0..take {
            let mut key = KeyDefinition::at(col as f64 + offset, row as f64).with_matrix(row, col);
            key.primary_label = format!("{},{}", row, col);
            keys.push(key);
        }
        row += 1;
    }

    let used_rows = row;
    let used_cols = keys
        .iter()
        .filter_map(|k| k.matrix)
        .map(|m| m.col + 1)
        .max()
        .unwrap_or(0);

    debug!(
        "Synthesized {} keys over {} rows from the {}x{} template",
        key_count, used_rows, template.matrix.0, template.matrix.1
    );

    SynthesizedGrid {
        keys,
        matrix_rows: template.matrix.0.max(used_rows),
        matrix_cols: template.matrix.1.max(used_cols),
    }
}

/// Column count for a keymap source, from its layout macro or key count
pub fn keymap_columns(layout_macro: &str, key_count: usize) -> usize {
    const BY_MACRO: &[(&str, usize)] = &[
        ("60_ansi", 14),
        ("tkl", 17),
        ("fullsize", 19),
        ("planck", 12),
        ("preonic", 12),
        ("ortho_4x12", 12),
        ("ortho_5x12", 12),
        ("split_3x6_3", 6),
        ("split_3x5_3", 5),
    ];

    let suffix = layout_macro.strip_prefix("LAYOUT_").unwrap_or("");
    if let Some((_, cols)) = BY_MACRO.iter().find(|(name, _)| *name == suffix) {
        return *cols;
    }

    let lowered = layout_macro.to_lowercase();
    if let Some((_, cols)) = BY_MACRO.iter().find(|(name, _)| lowered.contains(name)) {
        return *cols;
    }

    match key_count {
        0..=48 => 12,
        49..=70 => 14,
        71..=90 => 17,
        _ => 19,
    }
}

/// Matrix slots a keymap source leaves out for a known key count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownPadding {
    pub key_count: usize,
    /// Positions in the padded list, applied in ascending order
    pub insert_at: &'static [usize],
    pub columns: usize,
}

/// Known split boards whose keymaps skip encoder slots.
/// Add entries here as more boards are verified.
pub const KNOWN_PADDING: &[KnownPadding] = &[KnownPadding {
    key_count: 58,
    insert_at: &[24, 55],
    columns: 12,
}];

pub fn padding_for(key_count: usize) -> Option<&'static KnownPadding> {
    KNOWN_PADDING.iter().find(|p| p.key_count == key_count)
}

/// Insert `filler` at the padding positions; returns the positions used
pub fn apply_padding(keycodes: &mut Vec<String>, padding: &KnownPadding, filler: &str) -> Vec<usize> {
    let mut applied = Vec::new();
    for &pos in padding.insert_at {
        if pos <= keycodes.len() {
            keycodes.insert(pos, filler.to_string());
            applied.push(pos);
        }
    }
    applied
}

/// Undo [`apply_padding`]; positions whose value is no longer `filler` are kept
pub fn remove_padding(keycodes: &[String], positions: &[usize], filler: &str) -> Vec<String> {
    keycodes
        .iter()
        .enumerate()
        .filter(|(i, code)| !(positions.contains(i) && code.as_str() == filler))
        .map(|(_, code)| code.clone())
        .collect()
}

/// Derive matrix addresses from physical positions.
///
/// Keys are sorted by `y` then `x`; a new matrix row starts whenever `y`
/// moves by more than half a unit.
pub fn assign_matrix_positions(keys: &[KeyDefinition]) -> Vec<MatrixPosition> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| {
        keys[a]
            .y
            .total_cmp(&keys[b].y)
            .then(keys[a].x.total_cmp(&keys[b].x))
    });

    let mut positions = vec![MatrixPosition::new(0, 0); keys.len()];
    let mut row = 0;
    let mut col = 0;
    let mut row_y: Option<f64> = None;

    for idx in order {
        let y = keys[idx].y;
        match row_y {
            Some(prev) if (y - prev).abs() > 0.5 => {
                row += 1;
                col = 0;
                row_y = Some(y);
            }
            None => row_y = Some(y),
            _ => {}
        }
        positions[idx] = MatrixPosition::new(row, col);
        col += 1;
    }

    positions
}
