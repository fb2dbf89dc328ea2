//! keymap.c generator

use super::scanner::is_identifier;
use super::{
    BAG_COPYRIGHT_YEAR, BAG_CUSTOM_ENUM, BAG_CUSTOM_KEYCODES, BAG_LAYER_ENUM, BAG_LAYER_ENUM_NAME,
    BAG_PADDING, DEFAULT_CUSTOM_ENUM, DEFAULT_LAYER_ENUM,
};
use crate::error::{ConvertError, ConvertResult};
use crate::formats::{rows, LayoutFormat, LayoutGenerator};
use crate::keycodes::{KeycodeTable, NO_KEY, SAFE_RANGE};
use crate::layout::{estimate, LayerDefinition, UniversalLayout, DEFAULT_LAYOUT_MACRO};
use chrono::Datelike;
use std::collections::HashSet;
use std::fmt::Write as _;
use tracing::debug;

const FORMAT: LayoutFormat = LayoutFormat::Keymap;

const DEFAULT_AUTHOR: &str = "QMK Format Converter";

/// Identifiers with these prefixes belong to QMK itself
const QMK_PREFIXES: [&str; 7] = ["KC_", "QK_", "RGB_", "UG_", "BL_", "RM_", "MS_"];

/// Fixed line groupings for key counts whose macro argument order does not
/// follow physical rows
const LINE_TEMPLATES: &[(usize, &[usize])] = &[(58, &[12, 12, 12, 12, 10])];

const LICENSE_BODY: &str = " *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 2 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */";

const USER_HOOKS: &str = "bool process_record_user(uint16_t keycode, keyrecord_t *record) {
    switch (keycode) {
        // Custom keycode handling goes here
    }
    return true;
}

void matrix_init_user(void) {
}

void matrix_scan_user(void) {
}";

/// Generator for QMK keymap.c sources
pub struct KeymapGenerator<'a> {
    keycodes: &'a KeycodeTable,
}

/// Key order and line lengths for the layer blocks
struct LinePlan {
    order: Vec<usize>,
    strip_padding: Vec<usize>,
    lines: Vec<usize>,
}

impl<'a> KeymapGenerator<'a> {
    pub fn new(keycodes: &'a KeycodeTable) -> Self {
        Self { keycodes }
    }

    pub fn generate_source(&self, layout: &UniversalLayout) -> ConvertResult<String> {
        if layout.key_count() == 0 {
            return Err(ConvertError::generate(FORMAT, "layout has no keys"));
        }

        let macro_name = if layout.layout_name.trim().is_empty() {
            DEFAULT_LAYOUT_MACRO
        } else {
            layout.layout_name.trim()
        };
        if !is_identifier(macro_name) {
            return Err(ConvertError::generate(
                FORMAT,
                format!("'{}' is not a valid layout macro name", macro_name),
            ));
        }

        let layer_enum = layer_enum_entries(layout);
        let plan = plan_lines(layout);

        let mut parts = vec![self.header(layout), "#include QMK_KEYBOARD_H".to_string()];
        if !layer_enum.is_empty() {
            parts.push(render_layer_enum(layout, &layer_enum));
        }
        let customs = self.custom_keycodes(layout, &layer_enum);
        if !customs.is_empty() {
            let tag = bag_str(layout, BAG_CUSTOM_ENUM).unwrap_or(DEFAULT_CUSTOM_ENUM);
            let mut block = format!("enum {} {{\n", tag);
            for (i, name) in customs.iter().enumerate() {
                if i == 0 {
                    let _ = writeln!(block, "    {} = {},", name, SAFE_RANGE);
                } else {
                    let _ = writeln!(block, "    {},", name);
                }
            }
            block.push_str("};");
            parts.push(block);
        }

        let blocks: Vec<String> = layout
            .layers()
            .iter()
            .map(|layer| render_layer(layer, macro_name, &plan, &layer_enum))
            .collect();
        parts.push(format!(
            "const uint16_t PROGMEM keymaps[][MATRIX_ROWS][MATRIX_COLS] = {{\n{}\n}};",
            blocks.join(",\n\n")
        ));
        parts.push(USER_HOOKS.to_string());

        debug!(
            "Generated keymap with {} layers, {} custom keycodes, macro {}",
            layout.layer_count(),
            customs.len(),
            macro_name
        );
        Ok(parts.join("\n\n") + "\n")
    }

    fn header(&self, layout: &UniversalLayout) -> String {
        let year = bag_str(layout, BAG_COPYRIGHT_YEAR)
            .map(String::from)
            .unwrap_or_else(|| chrono::Local::now().year().to_string());
        let author = if layout.author.trim().is_empty() {
            DEFAULT_AUTHOR
        } else {
            layout.author.trim()
        };
        format!("/* Copyright {} {}\n{}", year, author, LICENSE_BODY)
    }

    /// Declared custom keycodes that a layer uses, plus any bare identifier
    /// QMK would not know
    fn custom_keycodes(&self, layout: &UniversalLayout, layer_enum: &[(String, usize)]) -> Vec<String> {
        let used: HashSet<&str> = layout
            .layers()
            .iter()
            .flat_map(|l| l.keycodes.iter())
            .flat_map(|k| k.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')))
            .filter(|token| !token.is_empty())
            .collect();

        let mut names: Vec<String> = layout
            .metadata
            .keymap
            .get(BAG_CUSTOM_KEYCODES)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter(|s| is_identifier(s) && *s != SAFE_RANGE && used.contains(s))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        for keycode in layout.layers().iter().flat_map(|l| l.keycodes.iter()) {
            let keycode = keycode.as_str();
            if !is_identifier(keycode)
                || keycode == SAFE_RANGE
                || self.keycodes.is_known(keycode)
                || QMK_PREFIXES.iter().any(|p| keycode.starts_with(p))
                || layer_enum.iter().any(|(name, _)| name == keycode)
                || names.iter().any(|n| n == keycode)
            {
                continue;
            }
            names.push(keycode.to_string());
        }
        names
    }
}

fn bag_str<'l>(layout: &'l UniversalLayout, key: &str) -> Option<&'l str> {
    layout.metadata.keymap.get(key).and_then(|v| v.as_str())
}

/// Layer enum entries from the metadata bag, ordered by value
fn layer_enum_entries(layout: &UniversalLayout) -> Vec<(String, usize)> {
    let mut entries: Vec<(String, usize)> = layout
        .metadata
        .keymap
        .get(BAG_LAYER_ENUM)
        .and_then(|v| v.as_object())
        .map(|map| {
            map.iter()
                .filter(|(name, _)| is_identifier(name))
                .filter_map(|(name, v)| Some((name.clone(), usize::try_from(v.as_u64()?).ok()?)))
                .collect()
        })
        .unwrap_or_default();
    entries.sort_by_key(|(_, value)| *value);
    entries
}

fn render_layer_enum(layout: &UniversalLayout, entries: &[(String, usize)]) -> String {
    let tag = bag_str(layout, BAG_LAYER_ENUM_NAME).unwrap_or(DEFAULT_LAYER_ENUM);
    let mut block = format!("enum {} {{\n", tag);
    let mut expected = 0;
    for (name, value) in entries {
        if *value == expected {
            let _ = writeln!(block, "    {},", name);
        } else {
            let _ = writeln!(block, "    {} = {},", name, value);
        }
        expected = value + 1;
    }
    block.push_str("};");
    block
}

/// Decide key order, padding removal and line lengths once for all layers
fn plan_lines(layout: &UniversalLayout) -> LinePlan {
    let key_count = layout.key_count();
    let identity: Vec<usize> = (0..key_count).collect();

    let padding: Vec<usize> = layout
        .metadata
        .keymap
        .get(BAG_PADDING)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_u64().and_then(|n| usize::try_from(n).ok()))
                .collect()
        })
        .unwrap_or_default();
    let strippable = !padding.is_empty()
        && layout.layers().iter().all(|layer| {
            padding
                .iter()
                .all(|&p| layer.keycodes.get(p).map(String::as_str) == Some(NO_KEY))
        });

    if strippable {
        let emitted = key_count.saturating_sub(padding.len());
        let lines = template_lines(emitted).unwrap_or_else(|| {
            chunk_lengths(emitted, layout.matrix_cols().max(1))
        });
        return LinePlan {
            order: identity,
            strip_padding: padding,
            lines,
        };
    }

    if let Some(lines) = template_lines(key_count) {
        return LinePlan {
            order: identity,
            strip_padding: Vec::new(),
            lines,
        };
    }

    let rows = rows::row_indices(layout.keys());
    LinePlan {
        lines: rows.iter().map(Vec::len).collect(),
        order: rows.into_iter().flatten().collect(),
        strip_padding: Vec::new(),
    }
}

fn template_lines(count: usize) -> Option<Vec<usize>> {
    LINE_TEMPLATES
        .iter()
        .find(|(n, _)| *n == count)
        .map(|(_, lines)| lines.to_vec())
}

fn chunk_lengths(count: usize, width: usize) -> Vec<usize> {
    (0..count)
        .step_by(width)
        .map(|start| width.min(count - start))
        .collect()
}

fn render_layer(
    layer: &LayerDefinition,
    macro_name: &str,
    plan: &LinePlan,
    layer_enum: &[(String, usize)],
) -> String {
    let ordered: Vec<String> = plan
        .order
        .iter()
        .map(|&i| layer.keycodes.get(i).cloned().unwrap_or_else(|| NO_KEY.to_string()))
        .collect();
    let codes = if plan.strip_padding.is_empty() {
        ordered
    } else {
        estimate::remove_padding(&ordered, &plan.strip_padding, NO_KEY)
    };

    let id = layer_enum
        .iter()
        .find(|(_, value)| *value == layer.index)
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| layer.index.to_string());

    let mut lines = Vec::new();
    let mut rest = codes.as_slice();
    for &len in &plan.lines {
        if rest.is_empty() {
            break;
        }
        let (line, tail) = rest.split_at(len.min(rest.len()));
        lines.push(line);
        rest = tail;
    }
    if !rest.is_empty() {
        lines.push(rest);
    }

    let body: Vec<String> = lines
        .iter()
        .map(|line| {
            let cells: Vec<String> = line.iter().map(|code| format!("{:<8}", code)).collect();
            format!("        {}", cells.join(", ")).trim_end().to_string()
        })
        .collect();

    format!(
        "    /* {} */\n    [{}] = {}(\n{}\n    )",
        layer.name,
        id,
        macro_name,
        body.join(",\n")
    )
}

impl LayoutGenerator for KeymapGenerator<'_> {
    fn format(&self) -> LayoutFormat {
        FORMAT
    }

    fn generate_string(&self, layout: &UniversalLayout) -> ConvertResult<String> {
        self.generate_source(layout)
    }
}
