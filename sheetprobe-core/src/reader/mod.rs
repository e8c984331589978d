//! Workbook file reader: a custom XML parser for OOXML, calamine for the rest

use anyhow::{Context, Result};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

pub mod calamine_reader;
pub mod parser_utils;
pub mod styles;
pub mod workbook;
pub mod xlsx_parser;

use self::calamine_reader::CalamineReader;
use self::xlsx_parser::XlsxReader;
use crate::error::ExtractError;
pub use styles::{CellStyle, Rgb};
pub use workbook::{
    Cell, CellValue, DataValidation, DefinedName, Hyperlink, Sheet, SheetProtection, Table,
    Workbook,
};

/// Trait for spreadsheet format readers
pub trait WorkbookReader {
    fn read_sheets(&mut self) -> Result<Vec<Sheet>>;
    fn read_defined_names(&mut self) -> Result<Vec<DefinedName>>;
    /// Index of the selected tab
    fn read_active_sheet(&mut self) -> Result<usize>;
    fn styles(&self) -> Vec<CellStyle>;
}

/// Extensions handled by the OOXML parser
const OOXML_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xltx", "xltm"];

/// Read a workbook from a file path
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    let path_ref = path.as_ref();
    if !path_ref.is_file() {
        return Err(ExtractError::FileNotFound(path_ref.to_path_buf()).into());
    }

    let is_ooxml = path_ref
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| OOXML_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false);

    let workbook = if is_ooxml {
        let file = File::open(path_ref)
            .with_context(|| format!("Failed to open file: {}", path_ref.display()))?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).context("Failed to open zip archive")?;
        let mut reader = XlsxReader::new(&mut archive)?;
        load(&mut reader, path_ref)?
    } else {
        let mut reader = CalamineReader::open(path_ref)?;
        load(&mut reader, path_ref)?
    };

    debug!(
        "Loaded {} ({} sheets, {} defined names)",
        path_ref.display(),
        workbook.sheets.len(),
        workbook.defined_names.len()
    );
    Ok(workbook)
}

/// Sheets are required; names and the active tab degrade to their defaults
fn load<R: WorkbookReader>(reader: &mut R, path: &Path) -> Result<Workbook> {
    let sheets = reader.read_sheets()?;
    let defined_names = reader.read_defined_names().unwrap_or_else(|e| {
        warn!("Defined names unavailable: {e:#}");
        Vec::new()
    });
    let active_sheet = reader
        .read_active_sheet()
        .unwrap_or_else(|e| {
            warn!("Active sheet unavailable: {e:#}");
            0
        })
        .min(sheets.len().saturating_sub(1));

    Ok(Workbook {
        path: path.to_path_buf(),
        sheets,
        defined_names,
        active_sheet,
        styles: reader.styles(),
    })
}
