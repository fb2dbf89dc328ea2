//! Error handling for the format converter
//!
//! Parsers and generators raise the typed [`ConvertError`] family; the
//! orchestrator and the CLI propagate through `anyhow` and attach file and
//! format context on the way out.

use crate::formats::LayoutFormat;
use anyhow::Context;
use std::path::Path;

pub type Result<T> = anyhow::Result<T>;

/// Result type used by every parser and generator
pub type ConvertResult<T> = std::result::Result<T, ConvertError>;

/// Extension trait for Results to add context with file paths
pub trait ResultExt<T> {
    /// Add context with file path information
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T>;

    /// Add context with layout format information
    fn with_format_context(self, format: LayoutFormat) -> Result<T>;

    /// Add context with conversion operation
    fn with_conversion_context(self, from: LayoutFormat, to: LayoutFormat) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error> + Send + Sync + 'static,
{
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Failed to {} file: {}", operation, path.as_ref().display()))
    }

    fn with_format_context(self, format: LayoutFormat) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Error processing {} format", format.display_name()))
    }

    fn with_conversion_context(self, from: LayoutFormat, to: LayoutFormat) -> Result<T> {
        self.map_err(|e| e.into()).with_context(|| {
            format!(
                "Error converting from {} to {}",
                from.display_name(),
                to.display_name()
            )
        })
    }
}

/// Conversion errors, one parse and one generate variant per format
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("KLE parse error: {reason}")]
    KleParse { reason: String },

    #[error("KLE generate error: {reason}")]
    KleGenerate { reason: String },

    #[error("VIA parse error: {reason}")]
    ViaParse { reason: String },

    #[error("VIA generate error: {reason}")]
    ViaGenerate { reason: String },

    #[error("QMK Configurator parse error: {reason}")]
    ConfiguratorParse { reason: String },

    #[error("QMK Configurator generate error: {reason}")]
    ConfiguratorGenerate { reason: String },

    #[error("Keymap parse error: {reason}")]
    KeymapParse { reason: String },

    #[error("Keymap generate error: {reason}")]
    KeymapGenerate { reason: String },

    #[error("Unable to detect format for file: {path}")]
    UndetectedFormat { path: String },

    #[error("Input file not found: {path}")]
    InputNotFound { path: String },
}

impl ConvertError {
    /// Build the parse error variant belonging to `format`
    pub fn parse(format: LayoutFormat, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match format {
            LayoutFormat::Kle => ConvertError::KleParse { reason },
            LayoutFormat::Via => ConvertError::ViaParse { reason },
            LayoutFormat::QmkConfigurator => ConvertError::ConfiguratorParse { reason },
            LayoutFormat::Keymap => ConvertError::KeymapParse { reason },
        }
    }

    /// Build the generate error variant belonging to `format`
    pub fn generate(format: LayoutFormat, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match format {
            LayoutFormat::Kle => ConvertError::KleGenerate { reason },
            LayoutFormat::Via => ConvertError::ViaGenerate { reason },
            LayoutFormat::QmkConfigurator => ConvertError::ConfiguratorGenerate { reason },
            LayoutFormat::Keymap => ConvertError::KeymapGenerate { reason },
        }
    }

    /// The format that raised this error, if any
    pub fn format(&self) -> Option<LayoutFormat> {
        match self {
            ConvertError::KleParse { .. } | ConvertError::KleGenerate { .. } => {
                Some(LayoutFormat::Kle)
            }
            ConvertError::ViaParse { .. } | ConvertError::ViaGenerate { .. } => {
                Some(LayoutFormat::Via)
            }
            ConvertError::ConfiguratorParse { .. } | ConvertError::ConfiguratorGenerate { .. } => {
                Some(LayoutFormat::QmkConfigurator)
            }
            ConvertError::KeymapParse { .. } | ConvertError::KeymapGenerate { .. } => {
                Some(LayoutFormat::Keymap)
            }
            ConvertError::UndetectedFormat { .. } | ConvertError::InputNotFound { .. } => None,
        }
    }

    /// Whether the error was raised while reading a format
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ConvertError::KleParse { .. }
                | ConvertError::ViaParse { .. }
                | ConvertError::ConfiguratorParse { .. }
                | ConvertError::KeymapParse { .. }
        )
    }
}
