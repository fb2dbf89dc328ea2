//! Directory batch conversion

use crate::{
    converter::{detect_format, ConversionReport, FormatConverter},
    error::{ConvertError, Result, ResultExt},
    formats::LayoutFormat,
    progress::ProgressTracker,
};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Extensions picked up when walking a directory
pub const INPUT_EXTENSIONS: [&str; 3] = ["json", "kle", "c"];

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Only convert files of this format; every detectable file when `None`
    pub from: Option<LayoutFormat>,
    pub to: LayoutFormat,
    pub output_dir: PathBuf,
    pub overwrite: bool,
    pub recursive: bool,
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub converted: Vec<ConversionReport>,
    pub skipped: Vec<(PathBuf, String)>,
    pub failed: Vec<(PathBuf, String)>,
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.converted.len() + self.skipped.len() + self.failed.len()
    }

    /// Percentage of files converted
    pub fn success_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.converted.len() as f64 * 100.0 / total as f64,
        }
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} converted, {} skipped, {} failed ({:.1}%) in {:.2}s",
            self.total(),
            self.converted.len(),
            self.skipped.len(),
            self.failed.len(),
            self.success_rate(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Candidate input files under `dir`, sorted by path
pub fn find_input_files(dir: &Path, from: Option<LayoutFormat>, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files(dir, recursive, &mut files)?;
    files.sort();

    if let Some(format) = from {
        files.retain(|path| detect_format(path) == Some(format));
    }
    debug!("Found {} input files in {}", files.len(), dir.display());
    Ok(files)
}

fn collect_files(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_path_context("read directory", dir)? {
        let path = entry.with_path_context("read directory", dir)?.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, recursive, files)?;
            }
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .is_some_and(|ext| INPUT_EXTENSIONS.contains(&ext.as_str()));
        if matches {
            files.push(path);
        }
    }
    Ok(())
}

/// `<output_dir>/<subdir>/<input stem>.<target extension>`, where `subdir` is
/// the input's directory relative to `input_dir`
pub fn output_path_for(input: &Path, input_dir: &Path, output_dir: &Path, to: LayoutFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layout".to_string());
    let subdir = input
        .parent()
        .and_then(|parent| parent.strip_prefix(input_dir).ok())
        .unwrap_or_else(|| Path::new(""));
    output_dir
        .join(subdir)
        .join(format!("{}.{}", stem, to.default_extension()))
}

/// Converts every layout file in a directory
pub struct BatchConverter<'c, 'k> {
    converter: &'c FormatConverter<'k>,
    progress: ProgressTracker,
}

impl<'c, 'k> BatchConverter<'c, 'k> {
    pub fn new(converter: &'c FormatConverter<'k>, show_progress: bool) -> Self {
        Self {
            converter,
            progress: ProgressTracker::new(show_progress),
        }
    }

    /// Convert `input_dir`; per-file failures are collected, not raised
    pub fn run(&self, input_dir: &Path, options: &BatchOptions) -> Result<BatchResult> {
        let start = Instant::now();
        if !input_dir.is_dir() {
            return Err(ConvertError::InputNotFound {
                path: input_dir.display().to_string(),
            }
            .into());
        }

        let files = find_input_files(input_dir, options.from, options.recursive)?;
        info!(
            "Converting {} files from {} to {}",
            files.len(),
            input_dir.display(),
            options.output_dir.display()
        );

        let mut result = BatchResult::default();
        let pb = self.progress.create_file_progress(files.len(), "Converting files");

        for input in files {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let output = output_path_for(&input, input_dir, &options.output_dir, options.to);

            if output.exists() && !options.overwrite {
                let reason = format!("output exists: {}", output.display());
                debug!("Skipping {}: {}", input.display(), reason);
                result.skipped.push((input, reason));
            } else {
                match self.converter.convert(&input, options.from, &output, options.to) {
                    Ok(report) => result.converted.push(report),
                    Err(e) => {
                        warn!("Failed to convert {}: {:#}", input.display(), e);
                        ProgressTracker::println(&pb, &format!("✗ {}: {:#}", name, e));
                        result.failed.push((input, format!("{:#}", e)));
                    }
                }
            }
            ProgressTracker::update_progress(&pb, 1, Some(&name));
        }

        result.elapsed = start.elapsed();
        if result.failed.is_empty() {
            ProgressTracker::finish_progress(pb, "Batch conversion completed");
        } else {
            ProgressTracker::finish_with_error(pb, &format!("{} files failed", result.failed.len()));
        }
        info!("{}", result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_output_path_for() {
        let out = output_path_for(
            Path::new("in/lily58.json"),
            Path::new("in"),
            Path::new("out"),
            LayoutFormat::Keymap,
        );
        assert_eq!(out, PathBuf::from("out/lily58.c"));

        let nested = output_path_for(
            Path::new("in/rev2/lily58.json"),
            Path::new("in"),
            Path::new("out"),
            LayoutFormat::Via,
        );
        assert_eq!(nested, PathBuf::from("out/rev2/lily58.json"));
    }

    #[test]
    fn test_recursive_run_keeps_same_named_files_apart() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        for sub in ["rev1", "rev2"] {
            fs::create_dir(input.path().join(sub)).unwrap();
        }
        fs::write(input.path().join("rev1").join("board.json"), r#"[["A"]]"#).unwrap();
        fs::write(input.path().join("rev2").join("board.json"), r#"[["B"]]"#).unwrap();

        let converter = FormatConverter::new();
        let options = BatchOptions {
            from: None,
            to: LayoutFormat::QmkConfigurator,
            output_dir: output.path().to_path_buf(),
            overwrite: false,
            recursive: true,
        };
        let result = BatchConverter::new(&converter, false)
            .run(input.path(), &options)
            .unwrap();

        assert_eq!(result.converted.len(), 2);
        assert!(result.skipped.is_empty());
        let first = fs::read_to_string(output.path().join("rev1").join("board.json")).unwrap();
        let second = fs::read_to_string(output.path().join("rev2").join("board.json")).unwrap();
        assert!(first.contains("KC_A"));
        assert!(second.contains("KC_B"));
    }

    #[test]
    fn test_find_input_files_filters_and_sorts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.json"), r#"[["A"]]"#).unwrap();
        fs::write(dir.path().join("a.json"), r#"{"keyboard":"x","layers":[["KC_A"]]}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("c.json"), r#"[["B"]]"#).unwrap();

        let all = find_input_files(dir.path(), None, false).unwrap();
        let names: Vec<_> = all.iter().filter_map(|p| p.file_name()).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);

        let kle = find_input_files(dir.path(), Some(LayoutFormat::Kle), true).unwrap();
        assert_eq!(kle.len(), 2);
    }

    #[test]
    fn test_success_rate() {
        let result = BatchResult::default();
        assert_eq!(result.success_rate(), 0.0);
        assert_eq!(result.total(), 0);
    }
}
