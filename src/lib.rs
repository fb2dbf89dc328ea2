// SPDX-License-Identifier: Apache-2.0

//! Keyboard layout format converter
//!
//! Converts layouts between Keyboard Layout Editor JSON, VIA definitions,
//! QMK Configurator exports and QMK `keymap.c` sources. Every conversion
//! goes through [`layout::UniversalLayout`]: a parser builds one, a generator
//! writes it out again.
//!
//! ```no_run
//! use qmk_format_converter::{FormatConverter, LayoutFormat};
//!
//! # fn main() -> anyhow::Result<()> {
//! let converter = FormatConverter::new();
//! converter.convert("lily58.json", None, "keymap.c", LayoutFormat::Keymap)?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod converter;
pub mod error;
pub mod formats;
pub mod keycodes;
pub mod layout;
pub mod progress;
pub mod validate;

pub use converter::{detect_format, ConversionReport, FormatConverter};
pub use error::{ConvertError, ConvertResult, Result};
pub use formats::{LayoutFormat, LayoutGenerator, LayoutParser};
pub use keycodes::{KeycodeTable, KEYCODES};
pub use layout::{KeyDefinition, LayerDefinition, UniversalLayout};
