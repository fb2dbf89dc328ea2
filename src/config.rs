//! Command line configuration
//!
//! This module handles CLI argument parsing and logging setup.

use crate::formats::LayoutFormat;
use anyhow::{anyhow, bail, Result};
use clap::builder::styling;
use clap::{value_parser, Arg, ArgAction, ArgMatches, ColorChoice, Command};
use std::path::{Path, PathBuf};
use tracing::info;

fn parse_format(value: &str) -> std::result::Result<LayoutFormat, String> {
    value.parse::<LayoutFormat>().map_err(|e| e.to_string())
}

/// Build the CLI command
pub fn build_cli() -> Command {
    let styles = styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Blue.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default());

    Command::new("qmkconv")
        .about("Convert keyboard layouts between KLE, VIA, QMK Configurator and keymap.c")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("input")
                .help("Input layout file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Output file path")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("from")
                .long("from")
                .help("Input format (kle, via, qmk_configurator, keymap); detected when omitted")
                .value_parser(parse_format),
        )
        .arg(
            Arg::new("to")
                .long("to")
                .help("Output format (kle, via, qmk_configurator, keymap)")
                .value_parser(parse_format),
        )
        .arg(
            Arg::new("validate")
                .long("validate")
                .help("Validate the input file instead of converting it")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("batch_dir")
                .long("batch-dir")
                .help("Convert every layout file in this directory")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output_dir")
                .long("output-dir")
                .help("Output directory for batch conversion")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("recursive")
                .long("recursive")
                .help("Descend into subdirectories in batch mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("Overwrite existing output files in batch mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list_formats")
                .long("list-formats")
                .help("List supported formats and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no_progress")
                .long("no-progress")
                .help("Disable progress indicators")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,

    /// Input format; `None` means detect
    pub from: Option<LayoutFormat>,
    pub to: Option<LayoutFormat>,

    pub validate: bool,
    pub batch_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub recursive: bool,
    pub overwrite: bool,
    pub list_formats: bool,

    pub verbose: bool,
    pub no_progress: bool,
}

/// What the binary should do, resolved from the flags
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    ListFormats,
    Validate {
        input: PathBuf,
    },
    Convert {
        input: PathBuf,
        output: PathBuf,
        to: LayoutFormat,
    },
    Batch {
        input_dir: PathBuf,
        output_dir: PathBuf,
        to: LayoutFormat,
    },
}

impl Config {
    /// Parse arguments and initialize logging
    pub fn from_args() -> Result<Self> {
        let config = Self::from_matches(&build_cli().get_matches());
        init_logging(config.verbose);

        if config.verbose {
            info!("Configuration: {:?}", config);
        }
        Ok(config)
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        Config {
            input: matches.get_one::<PathBuf>("input").cloned(),
            output: matches.get_one::<PathBuf>("output").cloned(),
            from: matches.get_one::<LayoutFormat>("from").copied(),
            to: matches.get_one::<LayoutFormat>("to").copied(),
            validate: matches.get_flag("validate"),
            batch_dir: matches.get_one::<PathBuf>("batch_dir").cloned(),
            output_dir: matches.get_one::<PathBuf>("output_dir").cloned(),
            recursive: matches.get_flag("recursive"),
            overwrite: matches.get_flag("overwrite"),
            list_formats: matches.get_flag("list_formats"),
            verbose: matches.get_flag("verbose"),
            no_progress: matches.get_flag("no_progress"),
        }
    }

    /// Check that the flags describe exactly one runnable task
    pub fn validate(&self) -> Result<()> {
        self.mode().map(|_| ())
    }

    pub fn mode(&self) -> Result<Mode> {
        if self.list_formats {
            return Ok(Mode::ListFormats);
        }

        if let Some(input_dir) = &self.batch_dir {
            if self.input.is_some() {
                bail!("--batch-dir cannot be combined with an input file");
            }
            let to = self
                .to
                .ok_or_else(|| anyhow!("--to is required for batch conversion"))?;
            let output_dir = self
                .output_dir
                .clone()
                .ok_or_else(|| anyhow!("--output-dir is required for batch conversion"))?;
            return Ok(Mode::Batch {
                input_dir: input_dir.clone(),
                output_dir,
                to,
            });
        }

        let input = self
            .input
            .clone()
            .ok_or_else(|| anyhow!("An input file is required (or use --batch-dir / --list-formats)"))?;

        if self.validate {
            return Ok(Mode::Validate { input });
        }

        let to = match (self.to, &self.output) {
            (Some(to), _) => to,
            (None, Some(output)) if has_extension(output, "c") => LayoutFormat::Keymap,
            _ => bail!("--to is required unless the output file ends in .c"),
        };
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&input, to));

        if output == input {
            bail!("Output path must differ from the input path: {}", input.display());
        }
        Ok(Mode::Convert { input, output, to })
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// `<dir>/<stem>_<format>.<ext>` next to the input
pub fn default_output_path(input: &Path, to: LayoutFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layout".to_string());
    input.with_file_name(format!("{}_{}.{}", stem, to.as_str(), to.default_extension()))
}

/// `RUST_LOG` wins; otherwise `info` when verbose and `warn` when not
pub fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
