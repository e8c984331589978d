use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use colored::*;
use sheetprobe_core::ProbeConfig;
use sheetprobe_core::export::{ConversionSummary, convert_file};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sheetexport")]
#[command(about = "Convert a sheetprobe full-details JSON into per-sheet CSV, JSON and an index")]
#[command(version)]
struct Cli {
    /// Path to a *_full_details.json file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output directory (a subfolder named after the input is created)
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Also write one NDJSON file with every cell
    #[arg(long)]
    ndjson: bool,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_summary(summary: &ConversionSummary) {
    println!("{}", "✓ Conversion complete.".green().bold());
    for sheet in &summary.sheets {
        println!(
            "  {} {} ({} cells, {} formulas, {} validations)",
            "Sheet:".bold(),
            sheet.name.cyan(),
            sheet.stats.cells,
            sheet.stats.formulas,
            sheet.stats.validations
        );
    }
    println!("Output directory: {}", summary.out_root.display());
    println!("Index: {}", summary.index_path.display());
    if let Some(ndjson) = &summary.ndjson_path {
        println!("NDJSON: {}", ndjson.display());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = ProbeConfig::discover(cli.config.as_deref()).context("Invalid configuration")?;
    let out_dir = cli.out.clone().unwrap_or(config.export.out_dir);
    let ndjson = cli.ndjson || config.export.ndjson;

    debug!("Writing into {} (ndjson: {})", out_dir.display(), ndjson);

    let summary = convert_file(&cli.input, &out_dir, ndjson).with_context(|| {
        format!(
            "Failed to convert {} (expected a _full_details.json file)",
            cli.input.display()
        )
    })?;

    print_summary(&summary);
    Ok(())
}
