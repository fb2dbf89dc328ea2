//! KLE-style row encoding shared by the KLE and VIA formats
//!
//! A row is an array of formatting objects and strings. Formatting objects
//! update a persistent property set; each string places one key at the
//! cursor. The decoder and the encoder below keep the exact same state so
//! that encoded rows decode back to the same positions.

use super::LayoutFormat;
use crate::error::{ConvertError, ConvertResult};
use crate::layout::{
    KeyDefinition, DEFAULT_FONT_SIZE, DEFAULT_KEY_COLOR, DEFAULT_PROFILE, DEFAULT_TEXT_COLOR,
};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Keys that mark an object as a formatting object rather than metadata
pub const FORMATTING_KEYS: [&str; 12] = ["w", "h", "x", "y", "r", "rx", "ry", "c", "t", "f", "a", "p"];

const DEFAULT_ALIGNMENT: i64 = 4;
const EPSILON: f64 = 1e-9;

/// Typed view of a formatting object. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct KeyProps {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub w: Option<f64>,
    pub h: Option<f64>,
    pub r: Option<f64>,
    pub rx: Option<f64>,
    pub ry: Option<f64>,
    pub c: Option<String>,
    pub t: Option<String>,
    pub f: Option<f64>,
    pub a: Option<i64>,
    pub p: Option<String>,
}

impl KeyProps {
    pub fn from_object(object: &Map<String, Value>) -> Result<Self, String> {
        serde_json::from_value(Value::Object(object.clone())).map_err(|e| e.to_string())
    }
}

/// Whether `object` carries any formatting key
pub fn is_formatting_object(object: &Map<String, Value>) -> bool {
    FORMATTING_KEYS.iter().any(|k| object.contains_key(*k))
}

/// One element of a row
#[derive(Debug, Clone, PartialEq)]
pub enum RowItem {
    Props(KeyProps),
    Label(String),
}

impl RowItem {
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(RowItem::Label(s.clone())),
            Value::Object(map) => KeyProps::from_object(map)
                .map(RowItem::Props)
                .map_err(|e| format!("invalid formatting object: {}", e)),
            other => Err(format!(
                "expected a string or a formatting object, found {}",
                json_kind(other)
            )),
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Properties that persist from key to key
#[derive(Debug, Clone, PartialEq)]
struct PersistentProps {
    w: f64,
    h: f64,
    r: f64,
    rx: f64,
    ry: f64,
    c: String,
    t: String,
    f: i64,
    a: i64,
    p: String,
}

impl Default for PersistentProps {
    fn default() -> Self {
        Self {
            w: 1.0,
            h: 1.0,
            r: 0.0,
            rx: 0.0,
            ry: 0.0,
            c: DEFAULT_KEY_COLOR.to_string(),
            t: DEFAULT_TEXT_COLOR.to_string(),
            f: DEFAULT_FONT_SIZE,
            a: DEFAULT_ALIGNMENT,
            p: DEFAULT_PROFILE.to_string(),
        }
    }
}

/// Decoder state while walking rows
#[derive(Debug, Clone, Default)]
pub struct LayoutCursor {
    pub x: f64,
    pub y: f64,
    pub row: usize,
    pub col: usize,
    props: PersistentProps,
}

impl LayoutCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a formatting object; `x`/`y` move the cursor immediately
    pub fn apply(&mut self, props: &KeyProps) {
        if let Some(x) = props.x {
            self.x += x;
        }
        if let Some(y) = props.y {
            self.y += y;
        }
        if let Some(w) = props.w {
            self.props.w = w;
        }
        if let Some(h) = props.h {
            self.props.h = h;
        }
        if let Some(r) = props.r {
            self.props.r = r;
        }
        if let Some(rx) = props.rx {
            self.props.rx = rx;
        }
        if let Some(ry) = props.ry {
            self.props.ry = ry;
        }
        if let Some(c) = &props.c {
            self.props.c = c.clone();
        }
        if let Some(t) = &props.t {
            self.props.t = t.clone();
        }
        if let Some(f) = props.f {
            self.props.f = f.round() as i64;
        }
        if let Some(a) = props.a {
            self.props.a = a;
        }
        if let Some(p) = &props.p {
            self.props.p = p.clone();
        }
    }

    /// A key at the cursor with the current properties
    pub fn place(&self) -> KeyDefinition {
        KeyDefinition {
            x: self.x,
            y: self.y,
            width: self.props.w,
            height: self.props.h,
            rotation_angle: self.props.r,
            rotation_x: self.props.rx,
            rotation_y: self.props.ry,
            color: self.props.c.clone(),
            text_color: self.props.t.clone(),
            font_size: self.props.f,
            profile: self.props.p.clone(),
            ..KeyDefinition::default()
        }
    }

    /// Move past the key just placed; width and height reset to 1
    pub fn advance(&mut self) {
        self.x += self.props.w;
        self.col += 1;
        self.props.w = 1.0;
        self.props.h = 1.0;
    }

    /// Rows have a fixed pitch of one unit
    pub fn next_row(&mut self) {
        self.row += 1;
        self.col = 0;
        self.x = 0.0;
        self.y += 1.0;
    }
}

/// Walk `rows`, calling `place` with each label and the key created for it.
///
/// `first_row` is only used to number rows in error messages.
pub fn decode_rows<F>(
    format: LayoutFormat,
    rows: &[Value],
    cursor: &mut LayoutCursor,
    first_row: usize,
    mut place: F,
) -> ConvertResult<Vec<KeyDefinition>>
where
    F: FnMut(&str, KeyDefinition) -> ConvertResult<KeyDefinition>,
{
    let mut keys = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let row_number = first_row + i;
        let items = row.as_array().ok_or_else(|| {
            ConvertError::parse(
                format,
                format!("row {} must be an array, found {}", row_number, json_kind(row)),
            )
        })?;

        for (j, item) in items.iter().enumerate() {
            let item = RowItem::from_value(item).map_err(|reason| {
                ConvertError::parse(
                    format,
                    format!("row {}, element {}: {}", row_number, j, reason),
                )
            })?;
            match item {
                RowItem::Props(props) => cursor.apply(&props),
                RowItem::Label(label) => {
                    let key = place(&label, cursor.place())?;
                    keys.push(key);
                    cursor.advance();
                }
            }
        }

        cursor.next_row();
    }

    Ok(keys)
}

/// Group keys into rows by `y`, rows ordered by `y` and keys by `x`
pub fn group_rows(keys: &[KeyDefinition]) -> Vec<Vec<&KeyDefinition>> {
    row_indices(keys)
        .into_iter()
        .map(|row| row.into_iter().map(|i| &keys[i]).collect())
        .collect()
}

/// Same grouping as [`group_rows`], as indices into `keys`
pub fn row_indices(keys: &[KeyDefinition]) -> Vec<Vec<usize>> {
    let mut sorted: Vec<usize> = (0..keys.len()).collect();
    sorted.sort_by(|&a, &b| {
        keys[a]
            .y
            .total_cmp(&keys[b].y)
            .then(keys[a].x.total_cmp(&keys[b].x))
    });

    let mut rows: Vec<Vec<usize>> = Vec::new();
    for idx in sorted {
        let same_row = rows
            .last()
            .and_then(|row| row.first())
            .is_some_and(|&first| (keys[first].y - keys[idx].y).abs() < EPSILON);
        match rows.last_mut() {
            Some(row) if same_row => row.push(idx),
            _ => rows.push(vec![idx]),
        }
    }
    rows
}

/// Encoder state mirroring [`LayoutCursor`]
#[derive(Debug, Clone, Default)]
pub struct RowEncoder {
    x: f64,
    y: f64,
    props: PersistentProps,
}

impl RowEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode rows, emitting a formatting object only for keys that need one
    pub fn encode<F>(&mut self, rows: &[Vec<&KeyDefinition>], mut label: F) -> Vec<Value>
    where
        F: FnMut(&KeyDefinition) -> String,
    {
        let mut encoded = Vec::with_capacity(rows.len());
        for row in rows {
            let mut items = Vec::new();
            for key in row {
                let props = self.diff(key);
                if !props.is_empty() {
                    items.push(Value::Object(props));
                }
                items.push(Value::String(label(key)));
            }
            encoded.push(Value::Array(items));
            self.x = 0.0;
            self.y += 1.0;
        }
        encoded
    }

    /// Properties of `key` that differ from the decoder's state
    fn diff(&mut self, key: &KeyDefinition) -> Map<String, Value> {
        let mut out = Map::new();

        if differs(key.rotation_angle, self.props.r) {
            out.insert("r".into(), number(key.rotation_angle));
            self.props.r = key.rotation_angle;
        }
        if differs(key.rotation_x, self.props.rx) {
            out.insert("rx".into(), number(key.rotation_x));
            self.props.rx = key.rotation_x;
        }
        if differs(key.rotation_y, self.props.ry) {
            out.insert("ry".into(), number(key.rotation_y));
            self.props.ry = key.rotation_y;
        }

        let dy = key.y - self.y;
        if differs(dy, 0.0) {
            out.insert("y".into(), number(dy));
        }
        self.y = key.y;

        let dx = key.x - self.x;
        if differs(dx, 0.0) {
            out.insert("x".into(), number(dx));
        }

        if key.color != self.props.c {
            out.insert("c".into(), Value::String(key.color.clone()));
            self.props.c = key.color.clone();
        }
        if key.text_color != self.props.t {
            out.insert("t".into(), Value::String(key.text_color.clone()));
            self.props.t = key.text_color.clone();
        }
        if key.profile != self.props.p {
            out.insert("p".into(), Value::String(key.profile.clone()));
            self.props.p = key.profile.clone();
        }
        if key.font_size != self.props.f {
            out.insert("f".into(), Value::from(key.font_size));
            self.props.f = key.font_size;
        }

        if differs(key.width, 1.0) {
            out.insert("w".into(), number(key.width));
        }
        if differs(key.height, 1.0) {
            out.insert("h".into(), number(key.height));
        }

        self.x = key.x + key.width;
        out
    }
}

fn differs(a: f64, b: f64) -> bool {
    (a - b).abs() > EPSILON
}

/// Round to six decimals; integral values become JSON integers
pub(crate) fn number(value: f64) -> Value {
    let rounded = (value * 1_000_000.0).round() / 1_000_000.0;
    if rounded.fract() == 0.0 && rounded.abs() < i64::MAX as f64 {
        Value::from(rounded as i64)
    } else {
        Value::from(rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(rows: Value) -> Vec<KeyDefinition> {
        let rows = rows.as_array().cloned().unwrap();
        let mut cursor = LayoutCursor::new();
        decode_rows(LayoutFormat::Kle, &rows, &mut cursor, 0, |_, key| Ok(key)).unwrap()
    }

    #[test]
    fn test_cursor_offsets_and_reset() {
        let keys = decode(json!([["A", {"w": 2}, "B", "C"], [{"x": 0.5, "h": 2}, "D", "E"]]));
        let positions: Vec<(f64, f64, f64, f64)> =
            keys.iter().map(|k| (k.x, k.y, k.width, k.height)).collect();
        assert_eq!(
            positions,
            vec![
                (0.0, 0.0, 1.0, 1.0),
                (1.0, 0.0, 2.0, 1.0),
                (3.0, 0.0, 1.0, 1.0),
                (0.5, 1.0, 1.0, 2.0),
                (1.5, 1.0, 1.0, 1.0),
            ]
        );
    }

    #[test]
    fn test_colors_persist_across_keys() {
        let keys = decode(json!([[{"c": "#ff0000"}, "A", "B"]]));
        assert_eq!(keys[1].color, "#ff0000");
    }

    #[test]
    fn test_invalid_element_reports_position() {
        let rows = vec![json!(["A", 5])];
        let mut cursor = LayoutCursor::new();
        let err = decode_rows(LayoutFormat::Kle, &rows, &mut cursor, 0, |_, k| Ok(k)).unwrap_err();
        assert!(err.to_string().contains("row 0, element 1"));
    }

    #[test]
    fn test_default_key_has_no_formatting_object() {
        let key = KeyDefinition::at(0.0, 0.0);
        let rows = vec![vec![&key]];
        let encoded = RowEncoder::new().encode(&rows, |_| "Q".to_string());
        assert_eq!(encoded, vec![json!(["Q"])]);
    }

    #[test]
    fn test_encode_decode_preserves_geometry() {
        let keys = vec![
            KeyDefinition::at(0.0, 0.0).with_size(1.5, 1.0),
            KeyDefinition::at(1.5, 0.0),
            KeyDefinition::at(3.0, 0.0).with_size(1.0, 2.0),
            KeyDefinition::at(0.25, 1.5).with_rotation(15.0, 1.0, 1.0),
            KeyDefinition::at(2.0, 1.5).with_size(2.25, 1.0),
        ];
        let rows = group_rows(&keys);
        let encoded = RowEncoder::new().encode(&rows, |_| String::new());
        let decoded = decode(Value::Array(encoded));

        assert_eq!(decoded.len(), keys.len());
        for (a, b) in keys.iter().zip(&decoded) {
            assert!((a.x - b.x).abs() < 1e-6, "x {} vs {}", a.x, b.x);
            assert!((a.y - b.y).abs() < 1e-6, "y {} vs {}", a.y, b.y);
            assert_eq!(a.width, b.width);
            assert_eq!(a.height, b.height);
            assert_eq!(a.rotation_angle, b.rotation_angle);
        }
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(number(2.0), json!(2));
        assert_eq!(number(0.1 + 0.2), json!(0.3));
    }
}
