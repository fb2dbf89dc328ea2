//! keymap.c parser

use super::scanner;
use super::{
    BAG_COPYRIGHT_YEAR, BAG_CUSTOM_ENUM, BAG_CUSTOM_KEYCODES, BAG_LAYER_ENUM, BAG_LAYER_ENUM_NAME,
    BAG_PADDING,
};
use crate::error::{ConvertError, ConvertResult};
use crate::formats::{LayoutFormat, LayoutParser};
use crate::keycodes::{KeycodeTable, NO_KEY, SAFE_RANGE};
use crate::layout::{estimate, KeyDefinition, LayerDefinition, UniversalLayout};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

const FORMAT: LayoutFormat = LayoutFormat::Keymap;

/// Words that mark an underscore-prefixed enum entry as a layer name
const LAYER_WORDS: [&str; 16] = [
    "BASE", "LOWER", "RAISE", "ADJUST", "FN", "LAYER", "QWERTY", "COLEMAK", "DVORAK", "NAV",
    "NUM", "SYM", "MEDIA", "GAME", "FUNC", "MOUSE",
];

lazy_static! {
    static ref ENUM_RE: Regex = Regex::new(r"\benum\b\s*([A-Za-z_][A-Za-z0-9_]*)?\s*\{")
        .expect("enum pattern is valid");
    static ref KEYMAPS_RE: Regex = Regex::new(
        r"\bkeymaps\s*\[\s*\]\s*\[\s*MATRIX_ROWS\s*\]\s*\[\s*MATRIX_COLS\s*\]\s*=\s*\{"
    )
    .expect("keymaps pattern is valid");
    static ref ENTRY_RE: Regex =
        Regex::new(r"\[\s*([A-Za-z0-9_]+)\s*\]\s*=\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(")
            .expect("layer entry pattern is valid");
    static ref COPYRIGHT_RE: Regex =
        Regex::new(r"(?i)Copyright\s+(?:\(c\)\s*)?(\d{4})(?:\s*-\s*\d{4})?\s+([^*\n]+)")
            .expect("copyright pattern is valid");
    static ref KEYCODE_ARG_RE: Regex =
        Regex::new(r"^(?:[A-Za-z_][A-Za-z0-9_]*(?:\(.*\))?|0[xX][0-9A-Fa-f]+|\d+)$")
            .expect("keycode pattern is valid");
}

/// One entry of a C enum with its resolved value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumEntry {
    pub name: String,
    /// `None` when the value depends on something outside the file
    pub value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumBlock {
    pub tag: Option<String>,
    pub entries: Vec<EnumEntry>,
}

impl EnumBlock {
    pub fn is_layer_enum(&self) -> bool {
        self.entries.iter().any(|e| is_layer_name(&e.name))
    }
}

/// A `[id] = MACRO(...)` entry of the keymaps array
#[derive(Debug, Clone, PartialEq)]
pub struct LayerEntry {
    pub id: String,
    pub macro_name: String,
    pub keycodes: Vec<String>,
    /// First line of the block comment right before the entry
    pub comment: Option<String>,
}

/// `_LOWER`, `_QWERTY`, `_NAV_LAYER` and similar
pub fn is_layer_name(name: &str) -> bool {
    if !name.starts_with('_') {
        return false;
    }
    let upper = name.to_uppercase();
    LAYER_WORDS.iter().any(|w| upper.contains(w))
}

/// `_QWERTY` becomes `Qwerty`, `_NAV_LAYER` becomes `Nav_Layer`
pub fn layer_display_name(identifier: &str) -> String {
    let trimmed = identifier.trim_start_matches('_');
    let mut out = String::with_capacity(trimmed.len());
    let mut word_start = true;
    for ch in trimmed.chars() {
        if ch.is_alphabetic() {
            if word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(ch);
            word_start = true;
        }
    }
    out
}

/// Every `enum { ... }` block in comment-free code
pub fn parse_enums(code: &str) -> Vec<EnumBlock> {
    let mut blocks = Vec::new();

    for caps in ENUM_RE.captures_iter(code) {
        let Some(whole) = caps.get(0) else { continue };
        let open = whole.end() - 1;
        let Some(close) = scanner::matching_close(code, open) else {
            continue;
        };

        let mut entries: Vec<EnumEntry> = Vec::new();
        let mut next: Option<i64> = Some(0);
        for item in scanner::split_top_level(&code[open + 1..close]) {
            let (name, value) = match item.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value.trim())),
                None => (item.trim(), None),
            };
            if !scanner::is_identifier(name) {
                continue;
            }

            let resolved = match value {
                Some(expr) => parse_int(expr)
                    .or_else(|| entries.iter().find(|e| e.name == expr).and_then(|e| e.value)),
                None => next,
            };
            next = resolved.map(|v| v + 1);
            entries.push(EnumEntry {
                name: name.to_string(),
                value: resolved,
            });
        }

        blocks.push(EnumBlock {
            tag: caps.get(1).map(|m| m.as_str().to_string()),
            entries,
        });
    }

    blocks
}

fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    text.parse().ok()
}

/// Year and holder from a `Copyright` line
pub fn extract_copyright(source: &str) -> Option<(String, String)> {
    scanner::block_comments(source)
        .into_iter()
        .chain(source.lines())
        .find_map(|text| {
            let caps = COPYRIGHT_RE.captures(text)?;
            let year = caps.get(1)?.as_str().to_string();
            let holder = caps.get(2)?.as_str().trim().to_string();
            (!holder.is_empty()).then_some((year, holder))
        })
}

/// Parser for QMK keymap.c sources
pub struct KeymapParser<'a> {
    keycodes: &'a KeycodeTable,
}

impl<'a> KeymapParser<'a> {
    pub fn new(keycodes: &'a KeycodeTable) -> Self {
        Self { keycodes }
    }

    /// Locate and split every layer entry of the keymaps array
    pub fn extract_layers(&self, source: &str) -> ConvertResult<Vec<LayerEntry>> {
        let code = scanner::blank_comments(source);
        scanner::check_balance(&code)
            .map_err(|e| ConvertError::parse(FORMAT, format!("unbalanced brackets: {}", e)))?;

        let header = KEYMAPS_RE.find(&code).ok_or_else(|| {
            ConvertError::parse(FORMAT, "could not find the keymaps array declaration")
        })?;
        let open = header.end() - 1;
        let close = scanner::matching_close(&code, open).ok_or_else(|| {
            ConvertError::parse(FORMAT, "keymaps array is not terminated")
        })?;

        let mut entries = Vec::new();
        let mut cursor = open + 1;
        while let Some(caps) = ENTRY_RE.captures_at(&code[..close], cursor) {
            let (Some(whole), Some(id), Some(name)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                break;
            };
            let paren = whole.end() - 1;
            let end = scanner::matching_close(&code, paren).ok_or_else(|| {
                ConvertError::parse(
                    FORMAT,
                    format!("layer [{}] has an unterminated macro call", id.as_str()),
                )
            })?;

            let call = &code[name.start()..=end];
            let (macro_name, keycodes) = scanner::split_macro_call(call).ok_or_else(|| {
                ConvertError::parse(
                    FORMAT,
                    format!("layer [{}] is not a layout macro call", id.as_str()),
                )
            })?;

            let comment = scanner::block_comments(&source[cursor..whole.start()])
                .last()
                .and_then(|c| {
                    c.lines()
                        .map(|l| l.trim().trim_start_matches('*').trim())
                        .find(|l| !l.is_empty())
                        .map(String::from)
                });

            entries.push(LayerEntry {
                id: id.as_str().to_string(),
                macro_name,
                keycodes,
                comment,
            });
            cursor = end + 1;
        }

        if entries.is_empty() {
            return Err(ConvertError::parse(
                FORMAT,
                "no layout macro call found in the keymaps array",
            ));
        }
        Ok(entries)
    }

    pub fn parse_source(&self, source: &str) -> ConvertResult<UniversalLayout> {
        let source = scanner::strip_line_comments(source);
        let entries = self.extract_layers(&source)?;
        let code = scanner::blank_comments(&source);

        let enums = parse_enums(&code);
        let layer_enum = enums.iter().find(|e| e.is_layer_enum());
        let layer_ids: BTreeMap<String, i64> = layer_enum
            .map(|e| {
                e.entries
                    .iter()
                    .filter_map(|entry| entry.value.map(|v| (entry.name.clone(), v)))
                    .collect()
            })
            .unwrap_or_default();
        let custom_keycodes: Vec<String> = enums
            .iter()
            .filter(|e| !e.is_layer_enum())
            .flat_map(|e| e.entries.iter())
            .map(|e| e.name.clone())
            .filter(|name| name != SAFE_RANGE)
            .collect();

        for entry in &entries {
            for keycode in &entry.keycodes {
                if !KEYCODE_ARG_RE.is_match(keycode) {
                    warn!("Unrecognized keycode expression in layer [{}]: {}", entry.id, keycode);
                }
            }
        }

        let base_entry = entries
            .iter()
            .find(|e| resolve_layer_id(&e.id, &layer_ids) == Some(0))
            .unwrap_or(&entries[0]);
        let macro_name = base_entry.macro_name.clone();
        let key_count = base_entry.keycodes.len();

        let mut layout = UniversalLayout::new();
        layout.layout_name = macro_name.clone();
        layout.name = "QMK Keymap".to_string();

        let padding = estimate::padding_for(key_count);
        let columns = match padding {
            Some(p) => p.columns,
            None => estimate::keymap_columns(&macro_name, key_count),
        };

        let indices = assign_layer_indices(&entries, &layer_ids)?;
        let mut layers = Vec::new();
        let mut padded_at = Vec::new();
        for (entry, &index) in entries.iter().zip(&indices) {
            let name = if entry.id.chars().all(|c| c.is_ascii_digit()) {
                match index {
                    0 => "Base".to_string(),
                    1 => "Function".to_string(),
                    _ => format!("Layer_{}", index),
                }
            } else {
                layer_display_name(&entry.id)
            };

            let mut keycodes = entry.keycodes.clone();
            if let Some(p) = padding.filter(|_| keycodes.len() == key_count) {
                padded_at = estimate::apply_padding(&mut keycodes, p, NO_KEY);
            }

            let mut layer = LayerDefinition::new(name, index, keycodes);
            if let Some(comment) = &entry.comment {
                layer.description = comment.clone();
            }
            layers.push(layer);
        }

        if !padded_at.is_empty() {
            info!(
                "Inserted {} unused matrix positions for a {}-key layout",
                padded_at.len(),
                key_count
            );
        }

        let base = layers
            .iter()
            .find(|l| l.index == 0)
            .or_else(|| layers.first())
            .map(|l| l.keycodes.clone())
            .unwrap_or_default();
        for ((row, col), keycode) in estimate::grid_positions(base.len(), columns)
            .into_iter()
            .zip(&base)
        {
            layout.add_key(
                KeyDefinition::at(col as f64, row as f64)
                    .with_matrix(row, col)
                    .with_keycode(keycode.clone())
                    .with_label(self.keycodes.label_or_code(keycode)),
            );
        }
        layout.set_matrix_dimensions(base.len().div_ceil(columns).max(1), columns);
        layout.replace_layers(layers);
        layout.infer_layer_activation(|arg| {
            resolve_layer_id(arg, &layer_ids).and_then(|v| usize::try_from(v).ok())
        });

        let bag = &mut layout.metadata.keymap;
        if let Some(block) = layer_enum {
            let mut ids = Map::new();
            for entry in &block.entries {
                if let Some(value) = entry.value {
                    ids.insert(entry.name.clone(), json!(value));
                }
            }
            bag.insert(BAG_LAYER_ENUM.to_string(), Value::Object(ids));
            if let Some(tag) = &block.tag {
                bag.insert(BAG_LAYER_ENUM_NAME.to_string(), json!(tag));
            }
        }
        if !custom_keycodes.is_empty() {
            bag.insert(BAG_CUSTOM_KEYCODES.to_string(), json!(custom_keycodes));
            if let Some(tag) = enums
                .iter()
                .find(|e| !e.is_layer_enum())
                .and_then(|e| e.tag.clone())
            {
                bag.insert(BAG_CUSTOM_ENUM.to_string(), json!(tag));
            }
        }
        if !padded_at.is_empty() {
            bag.insert(BAG_PADDING.to_string(), json!(padded_at));
        }

        if let Some((year, holder)) = extract_copyright(&source) {
            layout.author = holder;
            layout.description = format!("QMK Keymap (Copyright {})", year);
            layout
                .metadata
                .keymap
                .insert(BAG_COPYRIGHT_YEAR.to_string(), json!(year));
        }

        debug!(
            "Parsed keymap with {} keys, {} layers, macro {}",
            layout.key_count(),
            layout.layer_count(),
            macro_name
        );
        Ok(layout)
    }
}

/// Numeric layer ids parse directly; identifiers go through the layer enum
fn resolve_layer_id(id: &str, layer_ids: &BTreeMap<String, i64>) -> Option<i64> {
    parse_int(id).or_else(|| layer_ids.get(id).copied())
}

/// Layer index for every entry, in source order.
///
/// Entries whose id resolves keep that index; two of them sharing an index
/// is an error. Unresolvable ids take their position in the array, or the
/// next index nobody claimed.
fn assign_layer_indices(
    entries: &[LayerEntry],
    layer_ids: &BTreeMap<String, i64>,
) -> ConvertResult<Vec<usize>> {
    let resolved: Vec<Option<usize>> = entries
        .iter()
        .map(|e| resolve_layer_id(&e.id, layer_ids).and_then(|v| usize::try_from(v).ok()))
        .collect();

    let mut taken = BTreeSet::new();
    for (entry, index) in entries.iter().zip(&resolved) {
        if let Some(index) = index {
            if !taken.insert(*index) {
                return Err(ConvertError::parse(
                    FORMAT,
                    format!("layer [{}] reuses layer index {}", entry.id, index),
                ));
            }
        }
    }

    let mut indices = Vec::with_capacity(entries.len());
    for (position, (entry, index)) in entries.iter().zip(resolved).enumerate() {
        let index = match index {
            Some(index) => index,
            None => {
                let mut candidate = position;
                while taken.contains(&candidate) {
                    candidate += 1;
                }
                taken.insert(candidate);
                debug!("Layer id {} is not resolvable, using index {}", entry.id, candidate);
                candidate
            }
        };
        indices.push(index);
    }
    Ok(indices)
}

impl LayoutParser for KeymapParser<'_> {
    fn format(&self) -> LayoutFormat {
        FORMAT
    }

    fn parse_str(&self, content: &str) -> ConvertResult<UniversalLayout> {
        self.parse_source(content)
    }
}
