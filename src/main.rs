//! docx-fill CLI
//!
//! Usage:
//!   docx-fill [OPTIONS] <TEMPLATE> <DATA> <OUTPUT>
//!
//! Options:
//!   -c, --config <FILE>     Fill settings (TOML format)
//!       --anchors           Fill by matching labels instead of template tags
//!       --min-score <F>     Minimum label similarity for --anchors
//!       --empty <TEXT>      Text written for missing values
//!       --strict            Fail on undefined template variables
//!   -v, --verbose           Increase log output (-v, -vv)
//!   -h, --help              Print help

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use docx_fill::{fill_by_anchors, fill_template, ConfigOverrides, FillConfig, FillError};

/// Anchors listed after an anchor fill
const MAX_REPORTED_ANCHORS: usize = 50;

#[derive(Parser)]
#[command(name = "docx-fill")]
#[command(about = "Fill a DOCX template with values from a JSON file")]
struct Cli {
    /// Template document (.docx)
    template: PathBuf,

    /// JSON data file
    data: PathBuf,

    /// Where to write the filled document
    output: PathBuf,

    /// Fill settings file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fill by matching labels in a document without template tags
    #[arg(long)]
    anchors: bool,

    /// Minimum label similarity (0..1) for --anchors
    #[arg(long, value_name = "F")]
    min_score: Option<f64>,

    /// Text written wherever a value is missing
    #[arg(long, value_name = "TEXT")]
    empty: Option<String>,

    /// Treat undefined template variables as errors
    #[arg(long)]
    strict: bool,

    /// Increase log output (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Flags that override the config and data files
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            empty_placeholder: self.empty.clone(),
            min_score: self.min_score,
            strict: self.strict,
        }
    }
}

/// Log level used when `RUST_LOG` is not set
fn default_level(verbose: u8) -> tracing::Level {
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    }
}

fn init_tracing(verbose: u8) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default().add_directive(default_level(verbose).into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        match &e {
            FillError::Template { .. } | FillError::Render { .. } => eprintln!("{}", e.report()),
            _ => eprintln!("Error: {}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), FillError> {
    let config = match &cli.config {
        Some(path) => FillConfig::from_file(path)?,
        None => FillConfig::default(),
    };
    let overrides = cli.overrides();

    if !cli.anchors {
        fill_template(&cli.template, &cli.data, &cli.output, config, &overrides)?;
        return Ok(());
    }

    let report = fill_by_anchors(&cli.template, &cli.data, &cli.output, config, &overrides)?;
    if !report.not_found.is_empty() {
        println!("Anchors not found (check labels or lower --min-score):");
        for anchor in report.not_found.iter().take(MAX_REPORTED_ANCHORS) {
            println!(" - {}", anchor);
        }
    }
    Ok(())
}
