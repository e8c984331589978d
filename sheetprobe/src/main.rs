use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use sheetprobe_core::export::{self, Report, ReportFormat};
use sheetprobe_core::{BackendKind, Extractor, ProbeConfig};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod formatter;

#[derive(Parser)]
#[command(name = "sheetprobe")]
#[command(about = "Extract formulas, values, formats and data validations from Excel workbooks", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the Excel file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Worksheet name (defaults to the active sheet)
    #[arg(short, long)]
    sheet: Option<String>,

    /// Output file path
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Cell range, e.g. A1:D10
    #[arg(short, long, value_name = "RANGE")]
    range: Option<String>,

    /// Extract the dependencies of one formula cell
    #[arg(short, long, value_name = "CELL")]
    dependencies: Option<String>,

    /// Extract every cell with formatting, validations, hyperlinks and notes
    #[arg(long)]
    full: bool,

    /// Process every sheet (ignored for range and dependency extraction)
    #[arg(long)]
    all_sheets: bool,

    /// Backend used to read the workbook
    #[arg(short, long, value_enum)]
    engine: Option<Engine>,

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

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => ReportFormat::Json,
            OutputFormat::Text => ReportFormat::Text,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Engine {
    /// Parse the file directly
    File,
    /// Drive the spreadsheet application through the bridge
    Live,
}

impl From<Engine> for BackendKind {
    fn from(engine: Engine) -> Self {
        match engine {
            Engine::File => BackendKind::File,
            Engine::Live => BackendKind::Live,
        }
    }
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

/// `<stem>_full_details.json`, `<stem>_formulas.json` or `<stem>_formulas.txt`
fn default_output(file: &Path, full: bool, format: ReportFormat) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    let kind = match format {
        ReportFormat::Json if full => "full_details",
        _ => "formulas",
    };
    PathBuf::from(format!("{}_{}.{}", stem, kind, format.extension()))
}

fn run(cli: &Cli, extractor: &mut Extractor) -> Result<Report> {
    let sheet = cli.sheet.as_deref();
    Ok(if cli.full {
        if cli.all_sheets {
            Report::WorkbookDetails(extractor.extract_workbook_full_details()?)
        } else {
            Report::SheetDetails(extractor.extract_sheet_full_details(sheet)?)
        }
    } else if let Some(cell) = &cli.dependencies {
        Report::Dependencies(extractor.extract_dependencies(sheet, cell)?)
    } else if let Some(range) = &cli.range {
        Report::Range(extractor.extract_range(sheet, range)?)
    } else if cli.all_sheets {
        Report::AllSheets(extractor.extract_all_sheets_formulas()?)
    } else {
        Report::Formulas(extractor.extract_all_formulas(sheet)?)
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = ProbeConfig::discover(cli.config.as_deref()).context("Invalid configuration")?;

    let engine = match cli.engine {
        Some(engine) => engine.into(),
        None => config.engine()?,
    };
    let format = match cli.format {
        Some(format) => format.into(),
        None => ReportFormat::parse(&config.extract.format).unwrap_or_default(),
    };

    debug!("Engine: {}, format: {:?}", engine, format);

    let mut extractor = Extractor::open(&cli.file, engine, &config.bridge)?;
    let result = run(&cli, &mut extractor);
    // The session is released even when extraction failed
    let closed = extractor.close();
    let report = result?;
    closed.context("Failed to close the workbook session")?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.file, cli.full, format));
    export::write_report(&report, format, &output)?;

    formatter::print_summary(&cli.file, &report, &output);
    Ok(())
}
