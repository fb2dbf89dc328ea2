//! qmkconv - convert keyboard layouts between KLE, VIA, QMK Configurator
//! and keymap.c

use qmk_format_converter::{
    batch::{BatchConverter, BatchOptions},
    config::{Config, Mode},
    converter::{list_supported_formats, FormatConverter},
    error::Result,
    progress::ProgressTracker,
};
use tracing::{error, info};

fn main() -> Result<()> {
    // Parse configuration and initialize logging
    let config = Config::from_args().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(2);
    });

    let mode = config.mode().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("Run with --help for usage.");
        std::process::exit(2);
    });

    match run(&config, mode) {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Conversion failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `false` when the task ran but did not fully succeed
fn run(config: &Config, mode: Mode) -> Result<bool> {
    let converter = FormatConverter::new();

    match mode {
        Mode::ListFormats => {
            println!("Supported formats:");
            for (format, description) in list_supported_formats() {
                println!("  {:<18} {}", format.as_str(), description);
            }
            Ok(true)
        }
        Mode::Validate { input } => {
            let report = converter.validate_file(&input, config.from)?;
            let summary = &report.summary;
            println!("File:   {}", input.display());
            println!("Format: {}", report.format.display_name());
            println!(
                "Layout: {} ({} keys, {} layers, matrix {}, macro {})",
                summary.name,
                summary.key_count,
                summary.layer_count,
                summary.matrix_size,
                summary.layout_name
            );
            if report.is_valid() {
                println!("✓ No problems found");
            } else {
                println!("✗ {} problems found:", report.messages.len());
                for message in &report.messages {
                    println!("  - {}", message);
                }
            }
            Ok(report.is_valid())
        }
        Mode::Convert { input, output, to } => {
            let tracker = ProgressTracker::new(!config.no_progress);
            let spinner = tracker.create_spinner(&format!("Converting {}...", input.display()));

            match converter.convert(&input, config.from, &output, to) {
                Ok(report) => {
                    ProgressTracker::finish_progress(spinner, "Conversion completed");
                    for warning in &report.warnings {
                        eprintln!("warning: {}", warning);
                    }
                    println!("✓ {}", report);
                    Ok(true)
                }
                Err(e) => {
                    ProgressTracker::finish_with_error(spinner, "Conversion failed");
                    Err(e)
                }
            }
        }
        Mode::Batch {
            input_dir,
            output_dir,
            to,
        } => {
            let options = BatchOptions {
                from: config.from,
                to,
                output_dir,
                overwrite: config.overwrite,
                recursive: config.recursive,
            };
            let result = BatchConverter::new(&converter, !config.no_progress).run(&input_dir, &options)?;

            for (path, reason) in &result.skipped {
                println!("- skipped {}: {}", path.display(), reason);
            }
            for (path, reason) in &result.failed {
                println!("✗ {}: {}", path.display(), reason);
            }
            println!("{}", result);
            info!("Batch finished with {} failures", result.failed.len());
            Ok(result.failed.is_empty())
        }
    }
}
