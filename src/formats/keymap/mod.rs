//! QMK keymap.c support
//!
//! Keymap sources are C, not data. The [`scanner`] does the lexical work
//! (comments, bracket balance, argument splitting), the parser recovers
//! layers from the `keymaps` array and the generator writes a complete
//! keymap file back out.

pub mod generator;
pub mod parser;
pub mod scanner;

pub use generator::KeymapGenerator;
pub use parser::KeymapParser;

/// Custom keycode names declared in the source
pub const BAG_CUSTOM_KEYCODES: &str = "custom_keycodes";
/// Tag of the custom keycode enum
pub const BAG_CUSTOM_ENUM: &str = "custom_enum_name";
/// Layer enum entries as `{name: index}`
pub const BAG_LAYER_ENUM: &str = "layer_enum";
pub const BAG_LAYER_ENUM_NAME: &str = "layer_enum_name";
/// Positions where unused matrix slots were inserted while parsing
pub const BAG_PADDING: &str = "padding";
pub const BAG_COPYRIGHT_YEAR: &str = "copyright_year";

/// `enum` tag used when the source did not name one
pub const DEFAULT_CUSTOM_ENUM: &str = "custom_keycodes";
pub const DEFAULT_LAYER_ENUM: &str = "layer_names";
