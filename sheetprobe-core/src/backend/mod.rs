//! Workbook access backends
//!
//! Extraction talks to a workbook through [`WorkbookBackend`]. Two variants
//! exist: [`file::FileBackend`] parses the file directly and
//! [`live::LiveBackend`] drives the spreadsheet application through an
//! automation bridge process. All rows and columns are 1-based.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub mod file;
pub mod live;
pub mod protocol;

use crate::address::CellRange;
use crate::config::BridgeConfig;
use crate::reader::DefinedName;
use crate::record::{
    FormatInfo, HyperlinkRecord, ScalarValue, SheetInfo, TableRecord, ValidationRecord,
};

pub use file::FileBackend;
pub use live::{BridgeError, LiveBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Live,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::File => write!(f, "file"),
            BackendKind::Live => write!(f, "live"),
        }
    }
}

/// The lookups validation list resolution needs
pub trait ListSource {
    /// Values of `range` on `sheet`, row-major, blanks included as `Null`
    fn range_values(&mut self, sheet: &str, range: &CellRange) -> Result<Vec<ScalarValue>>;

    /// Data-body values of a table column; `None` when the table or column does not exist
    fn table_column_values(&mut self, table: &str, column: &str)
    -> Result<Option<Vec<ScalarValue>>>;

    /// Workbook-scoped defined names
    fn defined_names(&mut self) -> Result<Vec<DefinedName>>;

    /// Evaluate `expression` on `sheet` and return the address of the range it yields.
    ///
    /// Backends that cannot evaluate return `Ok(None)`.
    fn evaluate_reference(&mut self, _sheet: &str, _expression: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// One open workbook session
pub trait WorkbookBackend: ListSource {
    fn file_path(&self) -> &Path;

    fn sheet_names(&mut self) -> Result<Vec<String>>;

    /// Name of the sheet that is active (or was active when the file was saved)
    fn active_sheet(&mut self) -> Result<String>;

    fn sheet_info(&mut self, sheet: &str) -> Result<SheetInfo>;

    /// `None` for an empty sheet
    fn used_range(&mut self, sheet: &str) -> Result<Option<CellRange>>;

    fn cell_value(&mut self, sheet: &str, row: u32, col: u32) -> Result<ScalarValue>;

    /// Formula with its leading '=', `None` for constant cells
    fn cell_formula(&mut self, sheet: &str, row: u32, col: u32) -> Result<Option<String>>;

    fn cell_display_text(&mut self, sheet: &str, row: u32, col: u32) -> Result<Option<String>>;

    fn cell_format(&mut self, sheet: &str, row: u32, col: u32) -> Result<FormatInfo>;

    fn cell_hyperlink(&mut self, sheet: &str, row: u32, col: u32)
    -> Result<Option<HyperlinkRecord>>;

    fn cell_note(&mut self, sheet: &str, row: u32, col: u32) -> Result<Option<String>>;

    /// Validation rule covering the cell, without resolved list items
    fn cell_validation(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
    ) -> Result<Option<ValidationRecord>>;

    fn tables(&mut self, sheet: &str) -> Result<Vec<TableRecord>>;

    /// Release the session. Calling it twice is harmless.
    fn close(&mut self) -> Result<()>;
}

/// Open `path` with the requested backend
pub fn open_backend(
    kind: BackendKind,
    path: &Path,
    bridge: &BridgeConfig,
) -> Result<Box<dyn WorkbookBackend>> {
    Ok(match kind {
        BackendKind::File => Box::new(FileBackend::open(path)?),
        BackendKind::Live => Box::new(LiveBackend::spawn(bridge, path)?),
    })
}
