use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use textscan::{imread, ModelSources, OrtModelProvider, ScannerConfig, TextScanner};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "textscan")]
#[command(about = "Text extraction: line detection followed by recognition", long_about = None)]
struct Cli {
    /// Path to detection model (ONNX)
    #[arg(long)]
    det_model: PathBuf,

    /// Path to recognition model (ONNX)
    #[arg(long)]
    rec_model: PathBuf,

    /// Path to dictionary file, one entry per line
    #[arg(long)]
    dict: PathBuf,

    /// JSON scanner configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read the models into memory first and initialize from the buffers
    #[arg(long)]
    from_memory: bool,

    /// Treat the whole image as a single text line (no detection)
    #[arg(long)]
    line: bool,

    /// Input image path
    image: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    /// One line per recognized region
    Text,
    /// All regions on one line, tab separated
    Tsv,
    /// JSON array of strings
    Json,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ScannerConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ScannerConfig::default(),
    };

    let sources = if cli.from_memory {
        let read = |path: &PathBuf| {
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))
        };
        ModelSources::from_memory(read(&cli.rec_model)?, read(&cli.dict)?, read(&cli.det_model)?)
    } else {
        ModelSources::from_files(&cli.det_model, &cli.rec_model, &cli.dict)
    };

    let mut scanner = TextScanner::new(Arc::new(OrtModelProvider), config);
    if let Err(err) = scanner.initialize(&sources) {
        bail!("initialization failed ({:?}): {err}", err.status());
    }

    let img = imread(&cli.image).with_context(|| format!("loading {}", cli.image.display()))?;
    info!(width = img.cols(), height = img.rows(), "image loaded");

    let results = scanner
        .try_scan_list(&img.as_pixels(), cli.line)
        .context("scan failed")?;

    match cli.format {
        OutputFormat::Text => {
            for text in &results {
                println!("{text}");
            }
        }
        OutputFormat::Tsv => println!("{}", textscan::join_results(&results)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
    }

    Ok(())
}
