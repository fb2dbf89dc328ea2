//! Format parsers and generators
//!
//! Each supported format has a parser turning text into a
//! [`UniversalLayout`] and a generator turning one back into text. Both are
//! pure: file access lives in the converter.

pub mod configurator;
pub mod keymap;
pub mod kle;
pub mod rows;
pub mod via;

use crate::error::{ConvertError, ConvertResult};
use crate::keycodes::KeycodeTable;
use crate::layout::UniversalLayout;
use std::fmt;
use std::str::FromStr;

/// Supported layout formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutFormat {
    Kle,
    Via,
    QmkConfigurator,
    Keymap,
}

impl LayoutFormat {
    pub const ALL: [LayoutFormat; 4] = [
        LayoutFormat::Kle,
        LayoutFormat::Via,
        LayoutFormat::QmkConfigurator,
        LayoutFormat::Keymap,
    ];

    /// Canonical name used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutFormat::Kle => "kle",
            LayoutFormat::Via => "via",
            LayoutFormat::QmkConfigurator => "qmk_configurator",
            LayoutFormat::Keymap => "keymap",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            LayoutFormat::Kle => "KLE",
            LayoutFormat::Via => "VIA",
            LayoutFormat::QmkConfigurator => "QMK Configurator",
            LayoutFormat::Keymap => "QMK keymap.c",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LayoutFormat::Kle => "Keyboard Layout Editor JSON (physical layout and legends)",
            LayoutFormat::Via => "VIA keymap JSON (matrix, physical layout and layers)",
            LayoutFormat::QmkConfigurator => "QMK Configurator JSON export (flat layers)",
            LayoutFormat::Keymap => "QMK firmware keymap.c source",
        }
    }

    /// Extension used for generated files, without the dot
    pub fn default_extension(&self) -> &'static str {
        match self {
            LayoutFormat::Keymap => "c",
            _ => "json",
        }
    }

    /// Whether generated output is JSON
    pub fn is_json(&self) -> bool {
        !matches!(self, LayoutFormat::Keymap)
    }
}

impl fmt::Display for LayoutFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kle" => Ok(LayoutFormat::Kle),
            "via" => Ok(LayoutFormat::Via),
            "qmk_configurator" | "qmk-configurator" | "configurator" | "qmk" => {
                Ok(LayoutFormat::QmkConfigurator)
            }
            "keymap" | "keymap.c" | "keymap_c" | "c" => Ok(LayoutFormat::Keymap),
            other => Err(anyhow::anyhow!(
                "Unknown format '{}'. Supported formats: kle, via, qmk_configurator, keymap",
                other
            )),
        }
    }
}

/// Turns format text into a universal layout
pub trait LayoutParser {
    fn format(&self) -> LayoutFormat;

    fn parse_str(&self, content: &str) -> ConvertResult<UniversalLayout>;

    /// Parse raw bytes, which must be UTF-8
    fn parse_bytes(&self, bytes: &[u8]) -> ConvertResult<UniversalLayout> {
        let content = std::str::from_utf8(bytes).map_err(|e| {
            ConvertError::parse(self.format(), format!("input is not valid UTF-8: {}", e))
        })?;
        self.parse_str(content)
    }
}

/// Turns a universal layout into format text
pub trait LayoutGenerator {
    fn format(&self) -> LayoutFormat;

    fn generate_string(&self, layout: &UniversalLayout) -> ConvertResult<String>;

    fn generate_bytes(&self, layout: &UniversalLayout) -> ConvertResult<Vec<u8>> {
        self.generate_string(layout).map(String::into_bytes)
    }
}

/// Parser for `format` backed by `table`
pub fn parser_for(format: LayoutFormat, table: &KeycodeTable) -> Box<dyn LayoutParser + '_> {
    match format {
        LayoutFormat::Kle => Box::new(kle::KleParser::new(table)),
        LayoutFormat::Via => Box::new(via::ViaParser::new(table)),
        LayoutFormat::QmkConfigurator => Box::new(configurator::ConfiguratorParser::new(table)),
        LayoutFormat::Keymap => Box::new(keymap::KeymapParser::new(table)),
    }
}

/// Generator for `format` backed by `table`
pub fn generator_for(format: LayoutFormat, table: &KeycodeTable) -> Box<dyn LayoutGenerator + '_> {
    match format {
        LayoutFormat::Kle => Box::new(kle::KleGenerator::new(table)),
        LayoutFormat::Via => Box::new(via::ViaGenerator::new(table)),
        LayoutFormat::QmkConfigurator => {
            Box::new(configurator::ConfiguratorGenerator::new(table))
        }
        LayoutFormat::Keymap => Box::new(keymap::KeymapGenerator::new(table)),
    }
}

/// Serialize JSON output the same way for every JSON format
pub(crate) fn to_pretty_json(
    format: LayoutFormat,
    value: &serde_json::Value,
) -> ConvertResult<String> {
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|e| ConvertError::generate(format, format!("failed to serialize JSON: {}", e)))?;
    text.push('\n');
    Ok(text)
}

/// Decode JSON input, mapping syntax errors onto the format's parse error
pub(crate) fn from_json(format: LayoutFormat, content: &str) -> ConvertResult<serde_json::Value> {
    serde_json::from_str(content)
        .map_err(|e| ConvertError::parse(format, format!("invalid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_aliases() {
        assert_eq!("KLE".parse::<LayoutFormat>().unwrap(), LayoutFormat::Kle);
        assert_eq!(
            "qmk-configurator".parse::<LayoutFormat>().unwrap(),
            LayoutFormat::QmkConfigurator
        );
        assert_eq!(
            "keymap.c".parse::<LayoutFormat>().unwrap(),
            LayoutFormat::Keymap
        );
        assert!("svg".parse::<LayoutFormat>().is_err());
    }

    #[test]
    fn test_format_names_round_trip() {
        for format in LayoutFormat::ALL {
            assert_eq!(format.as_str().parse::<LayoutFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_default_extensions() {
        assert_eq!(LayoutFormat::Keymap.default_extension(), "c");
        assert_eq!(LayoutFormat::Via.default_extension(), "json");
        assert!(!LayoutFormat::Keymap.is_json());
    }

    #[test]
    fn test_parse_bytes_rejects_invalid_utf8() {
        let parser = parser_for(LayoutFormat::Kle, &crate::keycodes::KEYCODES);
        let err = parser.parse_bytes(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ConvertError::KleParse { .. }));
    }
}
