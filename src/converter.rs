//! Conversion orchestration
//!
//! Detects input formats, dispatches to the matching parser and generator
//! and owns the only file access in the crate. Output is generated fully in
//! memory and then moved into place, so a failed conversion never leaves a
//! partial file behind.

use crate::{
    error::{ConvertError, Result, ResultExt},
    formats::{generator_for, parser_for, LayoutFormat},
    keycodes::{KeycodeTable, KEYCODES},
    layout::{LayoutSummary, UniversalLayout},
    validate,
};
use serde_json::Value;
use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Top-level keys that mark a JSON object as a VIA definition
pub const VIA_INDICATORS: [&str; 9] = [
    "name",
    "vendorId",
    "productId",
    "vendor_id",
    "product_id",
    "layouts",
    "keycodes",
    "matrix",
    "keymaps",
];

/// Substrings that only show up in keymap sources
pub const KEYMAP_SIGNATURES: [&str; 4] = [
    "LAYOUT(",
    "const uint16_t PROGMEM",
    "#include QMK_KEYBOARD_H",
    "keymaps[][MATRIX_ROWS]",
];

/// Detect the format of a file from its extension and content.
///
/// Returns `None` when the file is missing or nothing matches; callers
/// should stop rather than guess.
pub fn detect_format<P: AsRef<Path>>(path: P) -> Option<LayoutFormat> {
    let path = path.as_ref();
    if !path.is_file() {
        return None;
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    if extension.as_deref() == Some("c") {
        return Some(LayoutFormat::Keymap);
    }

    let content = fs::read_to_string(path).ok()?;
    detect_format_from_content(extension.as_deref(), &content)
}

/// Content based detection; `extension` is lowercase without the dot
pub fn detect_format_from_content(extension: Option<&str>, content: &str) -> Option<LayoutFormat> {
    match extension {
        Some("c") | Some("h") => return Some(LayoutFormat::Keymap),
        Some("json") | Some("kle") => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => {
                    if let Some(format) = detect_json(&value) {
                        return Some(format);
                    }
                }
                Err(e) => debug!("Content is not JSON ({}), scanning for keymap source", e),
            }
        }
        _ => {}
    }

    KEYMAP_SIGNATURES
        .iter()
        .any(|signature| content.contains(signature))
        .then_some(LayoutFormat::Keymap)
}

/// Structural fingerprint of a parsed JSON document
pub fn detect_json(value: &Value) -> Option<LayoutFormat> {
    match value {
        Value::Array(_) => Some(LayoutFormat::Kle),
        Value::Object(map) => {
            if map.contains_key("keyboard") && map.get("layers").is_some_and(Value::is_array) {
                Some(LayoutFormat::QmkConfigurator)
            } else if VIA_INDICATORS.iter().any(|key| map.contains_key(*key)) {
                Some(LayoutFormat::Via)
            } else if map.contains_key("meta") {
                Some(LayoutFormat::Kle)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Formats with their descriptions, in CLI order
pub fn list_supported_formats() -> Vec<(LayoutFormat, &'static str)> {
    LayoutFormat::ALL
        .iter()
        .map(|format| (*format, format.description()))
        .collect()
}

/// Outcome of one file conversion
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub from: LayoutFormat,
    pub to: LayoutFormat,
    pub key_count: usize,
    pub layer_count: usize,
    /// Validation messages; never fatal for a conversion
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) -> {} ({}): {} keys, {} layers",
            self.input.display(),
            self.from,
            self.output.display(),
            self.to,
            self.key_count,
            self.layer_count
        )?;
        if !self.warnings.is_empty() {
            write!(f, ", {} warnings", self.warnings.len())?;
        }
        Ok(())
    }
}

/// Result of validating a file without converting it
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub format: LayoutFormat,
    pub summary: LayoutSummary,
    pub messages: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Loads, validates and writes layouts in any supported format
pub struct FormatConverter<'a> {
    keycodes: &'a KeycodeTable,
}

impl Default for FormatConverter<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter<'static> {
    /// Converter backed by the standard keycode table
    pub fn new() -> Self {
        Self {
            keycodes: &KEYCODES,
        }
    }
}

impl<'a> FormatConverter<'a> {
    pub fn with_keycodes(keycodes: &'a KeycodeTable) -> Self {
        Self { keycodes }
    }

    pub fn keycodes(&self) -> &'a KeycodeTable {
        self.keycodes
    }

    /// Read and parse `path`, detecting the format when `format` is `None`
    pub fn load<P: AsRef<Path>>(
        &self,
        path: P,
        format: Option<LayoutFormat>,
    ) -> Result<(UniversalLayout, LayoutFormat)> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConvertError::InputNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let format = match format {
            Some(format) => format,
            None => {
                let detected = detect_format(path).ok_or_else(|| ConvertError::UndetectedFormat {
                    path: path.display().to_string(),
                })?;
                info!("Detected {} format for {}", detected, path.display());
                detected
            }
        };

        let bytes = fs::read(path).with_path_context("read", path)?;
        let layout = parser_for(format, self.keycodes)
            .parse_bytes(&bytes)
            .with_format_context(format)
            .with_path_context("parse", path)?;

        debug!(
            "Loaded {}: {} keys, {} layers",
            path.display(),
            layout.key_count(),
            layout.layer_count()
        );
        Ok((layout, format))
    }

    /// Validate, generate and atomically write `layout`; returns the warnings
    pub fn save<P: AsRef<Path>>(
        &self,
        layout: &UniversalLayout,
        path: P,
        format: LayoutFormat,
    ) -> Result<Vec<String>> {
        let path = path.as_ref();
        let warnings = self.check(layout, format);

        let bytes = generator_for(format, self.keycodes)
            .generate_bytes(layout)
            .with_format_context(format)?;
        write_atomic(path, &bytes)?;

        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(warnings)
    }

    /// Convert one file into another
    pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        from: Option<LayoutFormat>,
        output: Q,
        to: LayoutFormat,
    ) -> Result<ConversionReport> {
        let start = Instant::now();
        let (input, output) = (input.as_ref(), output.as_ref());

        let (layout, from) = self.load(input, from)?;
        let warnings = self
            .save(&layout, output, to)
            .with_conversion_context(from, to)?;

        let report = ConversionReport {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            from,
            to,
            key_count: layout.key_count(),
            layer_count: layout.layer_count(),
            warnings,
            elapsed: start.elapsed(),
        };
        info!("Converted {} in {} ms", report, report.elapsed.as_millis());
        Ok(report)
    }

    /// Convert text without touching the filesystem
    pub fn convert_str(&self, content: &str, from: LayoutFormat, to: LayoutFormat) -> Result<String> {
        let layout = parser_for(from, self.keycodes)
            .parse_str(content)
            .with_format_context(from)?;
        self.check(&layout, to);
        generator_for(to, self.keycodes)
            .generate_string(&layout)
            .with_conversion_context(from, to)
    }

    /// Parse `path` and run every check for its own format
    pub fn validate_file<P: AsRef<Path>>(
        &self,
        path: P,
        format: Option<LayoutFormat>,
    ) -> Result<ValidationReport> {
        let path = path.as_ref();
        let (layout, format) = self.load(path, format)?;
        Ok(ValidationReport {
            path: path.to_path_buf(),
            format,
            summary: layout.summary(),
            messages: validate::validate_for_format(&layout, format, self.keycodes),
        })
    }

    fn check(&self, layout: &UniversalLayout, format: LayoutFormat) -> Vec<String> {
        let warnings = validate::validate_for_format(layout, format, self.keycodes);
        for warning in &warnings {
            warn!("{}", warning);
        }
        warnings
    }
}

/// Write through a temporary file in the target directory, then rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_path_context("create output directory", dir)?;

    let mut file = NamedTempFile::new_in(dir).with_path_context("create temporary", dir)?;
    file.write_all(bytes).with_path_context("write", file.path())?;
    file.persist(path)
        .map_err(|e| e.error)
        .with_path_context("write", path)?;

    debug!("Written output file: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_detect_json_fingerprints() {
        assert_eq!(detect_json(&json!([{"name": "x"}, ["A"]])), Some(LayoutFormat::Kle));
        assert_eq!(
            detect_json(&json!({"keyboard": "x", "layers": [["KC_A"]]})),
            Some(LayoutFormat::QmkConfigurator)
        );
        assert_eq!(
            detect_json(&json!({"keyboard": "x", "layers": "nope", "name": "y"})),
            Some(LayoutFormat::Via)
        );
        assert_eq!(detect_json(&json!({"meta": {}})), Some(LayoutFormat::Kle));
        assert_eq!(detect_json(&json!({"other": 1})), None);
        assert_eq!(detect_json(&json!(3)), None);
    }

    #[test]
    fn test_detect_from_content() {
        assert_eq!(
            detect_format_from_content(Some("c"), ""),
            Some(LayoutFormat::Keymap)
        );
        assert_eq!(
            detect_format_from_content(Some("json"), "#include QMK_KEYBOARD_H\n"),
            Some(LayoutFormat::Keymap)
        );
        assert_eq!(
            detect_format_from_content(Some("txt"), "const uint16_t PROGMEM keymaps"),
            Some(LayoutFormat::Keymap)
        );
        assert_eq!(detect_format_from_content(Some("json"), "   "), None);
        assert_eq!(detect_format_from_content(None, "hello"), None);
    }

    #[test]
    fn test_detect_missing_file() {
        let dir = tempdir().unwrap();
        assert_eq!(detect_format(dir.path().join("nothing.json")), None);
    }

    #[test]
    fn test_load_reports_missing_and_undetected() {
        let dir = tempdir().unwrap();
        let converter = FormatConverter::new();

        let err = converter.load(dir.path().join("missing.json"), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConvertError>(),
            Some(ConvertError::InputNotFound { .. })
        ));

        let path = dir.path().join("plain.txt");
        fs::write(&path, "just some text").unwrap();
        let err = converter.load(&path, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConvertError>(),
            Some(ConvertError::UndetectedFormat { .. })
        ));
    }

    #[test]
    fn test_convert_str_kle_to_configurator() {
        let out = FormatConverter::new()
            .convert_str(r#"[["Q","W"],["A","S"]]"#, LayoutFormat::Kle, LayoutFormat::QmkConfigurator)
            .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["layers"][0], json!(["KC_Q", "KC_W", "KC_A", "KC_S"]));
    }

    #[test]
    fn test_failed_save_leaves_no_file() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.c");
        let mut layout = UniversalLayout::new();
        layout.layout_name = "not valid".to_string();
        layout.add_key(crate::layout::KeyDefinition::at(0.0, 0.0).with_keycode("KC_A"));

        let result = FormatConverter::new().save(&layout, &output, LayoutFormat::Keymap);
        assert!(result.is_err());
        assert!(!output.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_atomic_creates_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_atomic(&path, b"[]\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]\n");
    }

    #[test]
    fn test_list_supported_formats() {
        let formats = list_supported_formats();
        assert_eq!(formats.len(), 4);
        assert_eq!(formats[0].0, LayoutFormat::Kle);
    }
}
