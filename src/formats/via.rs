//! VIA keymap JSON
//!
//! The standard form pairs a KLE-style physical grid of `"row,col"` matrix
//! coordinates with named keymaps of layers. A simplified form with only a
//! top-level `layers` array is also accepted; positions for it are
//! synthesized from templates.

use super::rows::{self, LayoutCursor, RowEncoder};
use super::{LayoutFormat, LayoutGenerator, LayoutParser};
use crate::error::{ConvertError, ConvertResult};
use crate::keycodes::KeycodeTable;
use crate::layout::{estimate, KeyDefinition, LayerDefinition, MatrixPosition, UniversalLayout};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

const FORMAT: LayoutFormat = LayoutFormat::Via;

/// Bag entry holding the name of the parsed keymap
pub const KEYMAP_NAME: &str = "keymap_name";
/// Bag entry holding `layouts` fields other than `keymap`
pub const LAYOUT_EXTRAS: &str = "layouts";

const DEFAULT_KEYMAP_NAME: &str = "default";

#[derive(Debug, Deserialize)]
struct ViaDocument {
    name: Option<String>,
    vendor_id: Option<Value>,
    #[serde(rename = "vendorId")]
    vendor_id_camel: Option<Value>,
    product_id: Option<Value>,
    #[serde(rename = "productId")]
    product_id_camel: Option<Value>,
    manufacturer: Option<String>,
    product: Option<String>,
    matrix: Option<ViaMatrix>,
    layouts: Option<ViaLayouts>,
    keymaps: Option<Vec<ViaKeymap>>,
    layers: Option<Vec<Vec<String>>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ViaMatrix {
    rows: usize,
    cols: usize,
}

#[derive(Debug, Default, Deserialize)]
struct ViaLayouts {
    #[serde(default)]
    keymap: Vec<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ViaKeymap {
    name: Option<String>,
    #[serde(default)]
    layers: Vec<Vec<String>>,
}

impl ViaDocument {
    fn is_simplified(&self) -> bool {
        self.layers.is_some() && self.layouts.as_ref().map_or(true, |l| l.keymap.is_empty())
    }
}

/// Parser for VIA JSON
pub struct ViaParser<'a> {
    keycodes: &'a KeycodeTable,
}

impl<'a> ViaParser<'a> {
    pub fn new(keycodes: &'a KeycodeTable) -> Self {
        Self { keycodes }
    }

    pub fn parse_value(&self, data: &Value) -> ConvertResult<UniversalLayout> {
        if !data.is_object() {
            return Err(ConvertError::parse(FORMAT, "VIA data must be an object"));
        }
        let document: ViaDocument = serde_json::from_value(data.clone())
            .map_err(|e| ConvertError::parse(FORMAT, format!("invalid VIA document: {}", e)))?;

        let mut layout = UniversalLayout::new();
        apply_metadata(&mut layout, &document);

        if document.is_simplified() {
            self.parse_simplified(&mut layout, &document)?;
        } else {
            self.parse_standard(&mut layout, &document)?;
        }

        layout.sync_keys_with_base_layer(self.keycodes);
        if layout.name.is_empty() {
            layout.name = "VIA Layout".to_string();
        }

        debug!(
            "Parsed VIA layout with {} keys and {} layers",
            layout.key_count(),
            layout.layer_count()
        );
        Ok(layout)
    }

    fn parse_simplified(
        &self,
        layout: &mut UniversalLayout,
        document: &ViaDocument,
    ) -> ConvertResult<()> {
        let layers = document.layers.as_deref().unwrap_or_default();
        let key_count = layers.first().map_or(0, Vec::len);
        if key_count == 0 {
            return Err(ConvertError::parse(
                FORMAT,
                "no layers found in simplified VIA format",
            ));
        }

        info!(
            "Simplified VIA layout without physical data, estimating positions for {} keys",
            key_count
        );
        let grid = estimate::synthesize_from_template(key_count);
        for key in grid.keys {
            layout.add_key(key);
        }
        layout.set_matrix_dimensions(grid.matrix_rows, grid.matrix_cols);

        let definitions = layers
            .iter()
            .enumerate()
            .map(|(i, codes)| LayerDefinition::new(format!("Layer_{}", i), i, codes.clone()))
            .collect();
        layout.replace_layers(definitions);
        Ok(())
    }

    fn parse_standard(
        &self,
        layout: &mut UniversalLayout,
        document: &ViaDocument,
    ) -> ConvertResult<()> {
        if let Some(matrix) = &document.matrix {
            layout.set_matrix_dimensions(matrix.rows, matrix.cols);
        }

        let physical = document
            .layouts
            .as_ref()
            .filter(|l| !l.keymap.is_empty())
            .ok_or_else(|| ConvertError::parse(FORMAT, "no keymap layout found"))?;

        if !physical.extra.is_empty() {
            layout.metadata.via.insert(
                LAYOUT_EXTRAS.to_string(),
                Value::Object(physical.extra.clone()),
            );
        }

        let mut cursor = LayoutCursor::new();
        let keys = rows::decode_rows(FORMAT, &physical.keymap, &mut cursor, 0, |coordinate, key| {
            let position = parse_coordinate(coordinate)?;
            Ok(KeyDefinition {
                matrix: Some(position),
                primary_label: position.to_string(),
                ..key
            })
        })?;
        for key in keys {
            layout.add_key(key);
        }

        let keymaps = document.keymaps.as_deref().unwrap_or_default();
        if let Some(name) = keymaps.first().and_then(|k| k.name.as_ref()) {
            if name != DEFAULT_KEYMAP_NAME {
                layout
                    .metadata
                    .via
                    .insert(KEYMAP_NAME.to_string(), Value::String(name.clone()));
            }
        }

        let mut definitions = Vec::new();
        for keymap in keymaps {
            let keymap_name = keymap.name.as_deref().unwrap_or(DEFAULT_KEYMAP_NAME);
            for (i, codes) in keymap.layers.iter().enumerate() {
                let index = definitions.len();
                let name = if keymap_name == DEFAULT_KEYMAP_NAME {
                    format!("Layer_{}", i)
                } else {
                    format!("{}_L{}", keymap_name, i)
                };
                definitions.push(LayerDefinition::new(name, index, codes.clone()));
            }
        }
        if !definitions.is_empty() {
            layout.replace_layers(definitions);
        }
        Ok(())
    }
}

/// Parse a `"row,col"` matrix coordinate
pub fn parse_coordinate(coordinate: &str) -> ConvertResult<MatrixPosition> {
    let invalid = || {
        ConvertError::parse(
            FORMAT,
            format!("invalid matrix coordinate '{}', expected \"row,col\"", coordinate),
        )
    };

    let (row, col) = coordinate.split_once(',').ok_or_else(invalid)?;
    let row = row.trim().parse::<usize>().map_err(|_| invalid())?;
    let col = col.trim().parse::<usize>().map_err(|_| invalid())?;
    Ok(MatrixPosition::new(row, col))
}

fn apply_metadata(layout: &mut UniversalLayout, document: &ViaDocument) {
    if let Some(name) = &document.name {
        layout.name = name.clone();
    }
    layout.vendor_id = document
        .vendor_id
        .as_ref()
        .or(document.vendor_id_camel.as_ref())
        .map(id_to_text);
    layout.product_id = document
        .product_id
        .as_ref()
        .or(document.product_id_camel.as_ref())
        .map(id_to_text);
    if let Some(manufacturer) = &document.manufacturer {
        layout.manufacturer = manufacturer.clone();
    }
    if let Some(product) = &document.product {
        layout.product = product.clone();
    }
    for (key, value) in &document.extra {
        layout.metadata.via.insert(key.clone(), value.clone());
    }
}

fn id_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n
            .as_u64()
            .map(|v| format!("0x{:04X}", v))
            .unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

impl LayoutParser for ViaParser<'_> {
    fn format(&self) -> LayoutFormat {
        FORMAT
    }

    fn parse_str(&self, content: &str) -> ConvertResult<UniversalLayout> {
        let data = super::from_json(FORMAT, content)?;
        self.parse_value(&data)
    }
}

/// Generator for VIA JSON, always in the standard form
pub struct ViaGenerator<'a> {
    keycodes: &'a KeycodeTable,
}

impl<'a> ViaGenerator<'a> {
    pub fn new(keycodes: &'a KeycodeTable) -> Self {
        Self { keycodes }
    }

    pub fn generate_value(&self, layout: &UniversalLayout) -> ConvertResult<Value> {
        if layout.keys().is_empty() {
            return Err(ConvertError::generate(FORMAT, "layout has no keys to generate"));
        }

        let (positions, (rows, cols)) = matrix_addresses(layout);

        // Layers are stored in key order, which must match the physical grid
        let row_indices = rows::row_indices(layout.keys());
        let order: Vec<usize> = row_indices.iter().flatten().copied().collect();
        let grouped: Vec<Vec<&KeyDefinition>> = row_indices
            .iter()
            .map(|row| row.iter().map(|&i| &layout.keys()[i]).collect())
            .collect();

        let mut next = order.iter();
        let keymap_rows = RowEncoder::new().encode(&grouped, |_| {
            next.next()
                .map(|&i| positions[i].to_string())
                .unwrap_or_default()
        });

        let layers: Vec<Value> = layout
            .layers()
            .iter()
            .map(|layer| {
                let codes: Vec<&str> = order
                    .iter()
                    .map(|&i| {
                        layer
                            .keycodes
                            .get(i)
                            .map_or(crate::keycodes::TRANSPARENT, |c| {
                                self.keycodes.to_via_code(c)
                            })
                    })
                    .collect();
                json!(codes)
            })
            .collect();

        let bag = &layout.metadata.via;
        let mut document = Map::new();
        let name = if layout.name.is_empty() {
            "QMK Layout"
        } else {
            layout.name.as_str()
        };
        document.insert("name".into(), json!(name));
        if let Some(vendor_id) = &layout.vendor_id {
            document.insert("vendor_id".into(), json!(vendor_id));
        }
        if let Some(product_id) = &layout.product_id {
            document.insert("product_id".into(), json!(product_id));
        }
        if !layout.manufacturer.is_empty() {
            document.insert("manufacturer".into(), json!(layout.manufacturer));
        }
        if !layout.product.is_empty() {
            document.insert("product".into(), json!(layout.product));
        }
        document.insert("matrix".into(), json!({ "rows": rows, "cols": cols }));

        let mut physical = Map::new();
        if let Some(Value::Object(extra)) = bag.get(LAYOUT_EXTRAS) {
            physical.extend(extra.clone());
        }
        physical.insert("keymap".into(), Value::Array(keymap_rows));
        document.insert("layouts".into(), Value::Object(physical));

        let keymap_name = bag
            .get(KEYMAP_NAME)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_KEYMAP_NAME);
        document.insert(
            "keymaps".into(),
            json!([{ "name": keymap_name, "layers": layers }]),
        );

        for field in ["encoders", "macros"] {
            let value = bag.get(field).cloned().unwrap_or_else(|| json!([]));
            document.insert(field.into(), value);
        }
        for (key, value) in bag {
            if key == KEYMAP_NAME || key == LAYOUT_EXTRAS || document.contains_key(key) {
                continue;
            }
            document.insert(key.clone(), value.clone());
        }

        Ok(Value::Object(document))
    }
}

/// Matrix address per key and the matrix size.
///
/// Declared addresses are used when every key has one; otherwise the whole
/// layout is re-addressed from its physical rows.
fn matrix_addresses(layout: &UniversalLayout) -> (Vec<MatrixPosition>, (usize, usize)) {
    let declared: Option<Vec<MatrixPosition>> = layout.keys().iter().map(|k| k.matrix).collect();
    if let Some(positions) = declared {
        return (positions, layout.matrix_dimensions());
    }

    info!("Assigning matrix positions from the physical layout");
    let positions = estimate::assign_matrix_positions(layout.keys());
    let rows = positions.iter().map(|p| p.row + 1).max().unwrap_or(1);
    let cols = positions.iter().map(|p| p.col + 1).max().unwrap_or(1);
    (positions, (rows, cols))
}

impl LayoutGenerator for ViaGenerator<'_> {
    fn format(&self) -> LayoutFormat {
        FORMAT
    }

    fn generate_string(&self, layout: &UniversalLayout) -> ConvertResult<String> {
        let value = self.generate_value(layout)?;
        super::to_pretty_json(FORMAT, &value)
    }
}
