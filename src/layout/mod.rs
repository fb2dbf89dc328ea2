//! Universal layout model
//!
//! Every parser produces a [`UniversalLayout`] and every generator consumes
//! one. The model keeps the physical arrangement (positions, sizes,
//! rotation), the optional matrix wiring and the logical layers side by side,
//! plus one passthrough metadata bag per format for fields that only matter
//! on a round trip.

pub mod estimate;

use crate::keycodes::{KeycodeTable, TRANSPARENT};
use serde_json::{Map, Value};
use std::fmt;

/// Smallest width/height a key is normalized up to
pub const MIN_KEY_SIZE: f64 = 0.1;

pub const DEFAULT_KEY_COLOR: &str = "#cccccc";
pub const DEFAULT_TEXT_COLOR: &str = "#000000";
pub const DEFAULT_FONT_SIZE: i64 = 3;
pub const DEFAULT_PROFILE: &str = "OEM";
pub const DEFAULT_LAYOUT_MACRO: &str = "LAYOUT";

/// Address of a key in the scanning matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatrixPosition {
    pub row: usize,
    pub col: usize,
}

impl MatrixPosition {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for MatrixPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

/// One physical key
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDefinition {
    /// Position in key units
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees, kept in `[0, 360)`
    pub rotation_angle: f64,
    pub rotation_x: f64,
    pub rotation_y: f64,
    pub color: String,
    pub text_color: String,
    pub font_size: i64,
    pub profile: String,
    /// Many formats carry no wiring information; never assume this is set
    pub matrix: Option<MatrixPosition>,
    pub keycode: String,
    pub primary_label: String,
    /// Non-primary legend lines, top to bottom
    pub secondary_labels: Vec<String>,
}

impl Default for KeyDefinition {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
            rotation_angle: 0.0,
            rotation_x: 0.0,
            rotation_y: 0.0,
            color: DEFAULT_KEY_COLOR.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            profile: DEFAULT_PROFILE.to_string(),
            matrix: None,
            keycode: TRANSPARENT.to_string(),
            primary_label: String::new(),
            secondary_labels: Vec::new(),
        }
    }
}

impl KeyDefinition {
    /// A 1u key at `(x, y)`
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_matrix(mut self, row: usize, col: usize) -> Self {
        self.matrix = Some(MatrixPosition::new(row, col));
        self
    }

    pub fn with_keycode(mut self, keycode: impl Into<String>) -> Self {
        self.keycode = keycode.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.primary_label = label.into();
        self
    }

    pub fn with_rotation(mut self, angle: f64, rx: f64, ry: f64) -> Self {
        self.rotation_angle = angle;
        self.rotation_x = rx;
        self.rotation_y = ry;
        self
    }

    /// Clamp non-positive sizes and wrap the rotation angle
    pub fn normalize(&mut self) {
        if self.width.is_nan() || self.width <= 0.0 {
            self.width = MIN_KEY_SIZE;
        }
        if self.height.is_nan() || self.height <= 0.0 {
            self.height = MIN_KEY_SIZE;
        }
        self.rotation_angle = self.rotation_angle.rem_euclid(360.0);
        if self.rotation_angle >= 360.0 {
            self.rotation_angle = 0.0;
        }
    }

    pub fn right_edge(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom_edge(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_rotated(&self) -> bool {
        self.rotation_angle.abs() > f64::EPSILON
    }

    /// Legend as one string, secondary lines first
    pub fn full_label(&self) -> String {
        if self.secondary_labels.is_empty() {
            return self.primary_label.clone();
        }
        let mut lines = self.secondary_labels.clone();
        lines.push(self.primary_label.clone());
        lines.join("\n")
    }
}

/// How a non-base layer is activated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationType {
    Momentary,
    Toggle,
    OneShot,
}

impl ActivationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationType::Momentary => "momentary",
            ActivationType::Toggle => "toggle",
            ActivationType::OneShot => "one_shot",
        }
    }
}

/// One logical layer; `keycodes[i]` belongs to the owning layout's `keys[i]`
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDefinition {
    pub name: String,
    pub index: usize,
    pub keycodes: Vec<String>,
    pub description: String,
    pub is_default: bool,
    pub activation_type: ActivationType,
    pub activation_key: Option<String>,
}

impl LayerDefinition {
    pub fn new(name: impl Into<String>, index: usize, keycodes: Vec<String>) -> Self {
        let mut name = name.into();
        if name.trim().is_empty() {
            name = format!("Layer_{}", index);
        }
        Self {
            name,
            index,
            keycodes,
            description: String::new(),
            is_default: index == 0,
            activation_type: ActivationType::Momentary,
            activation_key: None,
        }
    }

    /// Pad with the transparent sentinel or truncate to `len`
    pub fn fit_to(&mut self, len: usize) {
        if self.keycodes.len() < len {
            self.keycodes.resize(len, TRANSPARENT.to_string());
        } else {
            self.keycodes.truncate(len);
        }
    }
}

/// Passthrough fields, one bag per format
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatMetadata {
    pub kle: Map<String, Value>,
    pub via: Map<String, Value>,
    pub keymap: Map<String, Value>,
    pub configurator: Map<String, Value>,
}

/// Summary used by validation output and the CLI
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSummary {
    pub name: String,
    pub author: String,
    pub version: String,
    pub key_count: usize,
    pub layer_count: usize,
    pub matrix_size: String,
    pub layout_name: String,
    pub layers: Vec<String>,
}

/// The aggregate every conversion passes through
#[derive(Debug, Clone, PartialEq)]
pub struct UniversalLayout {
    pub name: String,
    pub description: String,
    pub author: String,
    pub version: String,

    keys: Vec<KeyDefinition>,
    layers: Vec<LayerDefinition>,

    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    pub manufacturer: String,
    pub product: String,
    /// Keyboard identifier, e.g. `lily58/rev1`
    pub keyboard: String,

    /// Layout macro a keymap source should use
    pub layout_name: String,
    matrix_dimensions: Option<(usize, usize)>,

    pub metadata: FormatMetadata,
}

impl Default for UniversalLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl UniversalLayout {
    /// An empty layout holding a single transparent default layer
    pub fn new() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            author: String::new(),
            version: String::new(),
            keys: Vec::new(),
            layers: vec![LayerDefinition::new("Default", 0, Vec::new())],
            vendor_id: None,
            product_id: None,
            manufacturer: String::new(),
            product: String::new(),
            keyboard: String::new(),
            layout_name: DEFAULT_LAYOUT_MACRO.to_string(),
            matrix_dimensions: None,
            metadata: FormatMetadata::default(),
        }
    }

    pub fn keys(&self) -> &[KeyDefinition] {
        &self.keys
    }

    /// Mutable access to the keys; the key count cannot change through this
    pub fn keys_mut(&mut self) -> &mut [KeyDefinition] {
        &mut self.keys
    }

    /// Layers ordered by index
    pub fn layers(&self) -> &[LayerDefinition] {
        &self.layers
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Append a key and pad every layer with the transparent sentinel
    pub fn add_key(&mut self, mut key: KeyDefinition) {
        key.normalize();
        self.keys.push(key);
        let count = self.keys.len();
        for layer in &mut self.layers {
            layer.fit_to(count);
        }
    }

    /// Insert a layer in index order; a layer with the same index is replaced
    pub fn add_layer(&mut self, mut layer: LayerDefinition) {
        layer.fit_to(self.keys.len());
        layer.is_default = layer.index == 0;

        match self.layers.binary_search_by_key(&layer.index, |l| l.index) {
            Ok(pos) => self.layers[pos] = layer,
            Err(pos) => self.layers.insert(pos, layer),
        }
    }

    /// Replace every layer. An empty list falls back to one transparent layer.
    pub fn replace_layers(&mut self, layers: Vec<LayerDefinition>) {
        self.layers.clear();
        for layer in layers {
            self.add_layer(layer);
        }
        if self.layers.is_empty() {
            self.add_layer(LayerDefinition::new("Default", 0, Vec::new()));
        }
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&LayerDefinition> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn layer_by_index(&self, index: usize) -> Option<&LayerDefinition> {
        self.layers.iter().find(|l| l.index == index)
    }

    /// Base layer (index 0), or the lowest layer if there is none
    pub fn base_layer(&self) -> Option<&LayerDefinition> {
        self.layer_by_index(0).or_else(|| self.layers.first())
    }

    pub fn set_matrix_dimensions(&mut self, rows: usize, cols: usize) {
        self.matrix_dimensions = Some((rows, cols));
    }

    pub fn has_explicit_matrix(&self) -> bool {
        self.matrix_dimensions.is_some()
    }

    /// `(rows, cols)`: explicit if set, else derived from declared addresses,
    /// else estimated from the key count
    pub fn matrix_dimensions(&self) -> (usize, usize) {
        if let Some(dims) = self.matrix_dimensions {
            return dims;
        }

        let declared: Vec<MatrixPosition> = self.keys.iter().filter_map(|k| k.matrix).collect();
        if !declared.is_empty() {
            let rows = declared.iter().map(|m| m.row).max().unwrap_or(0) + 1;
            let cols = declared.iter().map(|m| m.col).max().unwrap_or(0) + 1;
            return (rows, cols);
        }

        estimate::matrix_from_key_count(self.keys.len())
    }

    pub fn matrix_rows(&self) -> usize {
        self.matrix_dimensions().0
    }

    pub fn matrix_cols(&self) -> usize {
        self.matrix_dimensions().1
    }

    /// Copy the base layer's keycodes onto the keys and refresh their labels
    pub fn sync_keys_with_base_layer(&mut self, table: &KeycodeTable) {
        let Some(base) = self.base_layer().map(|l| l.keycodes.clone()) else {
            return;
        };
        for (key, keycode) in self.keys.iter_mut().zip(base) {
            key.primary_label = table.label_or_code(&keycode);
            key.secondary_labels.clear();
            key.keycode = keycode;
        }
    }

    /// Fill in activation metadata from layer-switching keycodes.
    ///
    /// `resolve` maps a layer argument (a number or an identifier) to an
    /// index. The first switching key found for a layer wins.
    pub fn infer_layer_activation<F>(&mut self, resolve: F)
    where
        F: Fn(&str) -> Option<usize>,
    {
        let mut found: Vec<(usize, ActivationType, String)> = Vec::new();

        for layer in &self.layers {
            for keycode in &layer.keycodes {
                let Some((kind, target)) = layer_switch_target(keycode) else {
                    continue;
                };
                let Some(index) = resolve(target) else {
                    continue;
                };
                if index != layer.index && !found.iter().any(|(i, _, _)| *i == index) {
                    found.push((index, kind, keycode.clone()));
                }
            }
        }

        for (index, kind, keycode) in found {
            if let Some(layer) = self.layers.iter_mut().find(|l| l.index == index) {
                if layer.index != 0 {
                    layer.activation_type = kind;
                    layer.activation_key = Some(keycode);
                }
            }
        }
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` of all keys
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        if self.keys.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }
        self.keys.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(min_x, min_y, max_x, max_y), k| {
                (
                    min_x.min(k.x),
                    min_y.min(k.y),
                    max_x.max(k.right_edge()),
                    max_y.max(k.bottom_edge()),
                )
            },
        )
    }

    pub fn size(&self) -> (f64, f64) {
        let (min_x, min_y, max_x, max_y) = self.bounds();
        (max_x - min_x, max_y - min_y)
    }

    /// Shift every key so the layout starts at `(0, 0)`
    pub fn normalize_positions(&mut self) {
        let (min_x, min_y, _, _) = self.bounds();
        for key in &mut self.keys {
            key.x -= min_x;
            key.y -= min_y;
        }
    }

    pub fn summary(&self) -> LayoutSummary {
        let (rows, cols) = self.matrix_dimensions();
        LayoutSummary {
            name: self.name.clone(),
            author: self.author.clone(),
            version: self.version.clone(),
            key_count: self.keys.len(),
            layer_count: self.layers.len(),
            matrix_size: format!("{}x{}", rows, cols),
            layout_name: self.layout_name.clone(),
            layers: self.layers.iter().map(|l| l.name.clone()).collect(),
        }
    }
}

/// `MO(2)` → `(Momentary, "2")`; `LT(_NAV, KC_SPC)` → `(Momentary, "_NAV")`
fn layer_switch_target(keycode: &str) -> Option<(ActivationType, &str)> {
    let open = keycode.find('(')?;
    let inner = keycode[open + 1..].strip_suffix(')')?;
    let kind = match keycode[..open].trim() {
        "MO" | "LT" | "TT" | "LM" => ActivationType::Momentary,
        "TG" | "TO" | "DF" => ActivationType::Toggle,
        "OSL" => ActivationType::OneShot,
        _ => return None,
    };
    let target = inner.split(',').next()?.trim();
    if target.is_empty() {
        return None;
    }
    Some((kind, target))
}
