//! Workbook data structures
//!
//! Cell coordinates are 1-based `(row, col)` pairs throughout.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::address::CellRange;

use super::styles::CellStyle;

/// A workbook-scoped defined name
#[derive(Debug, Clone, PartialEq)]
pub struct DefinedName {
    pub name: String,
    /// Target as written in the file, without a leading '='
    pub refers_to: String,
}

/// Represents a complete workbook
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub path: PathBuf,
    pub sheets: Vec<Sheet>,
    pub defined_names: Vec<DefinedName>,
    /// Index into `sheets` of the tab that was selected when the file was saved
    pub active_sheet: usize,
    /// Cell formats indexed by the `s` attribute of a cell
    pub styles: Vec<CellStyle>,
}

impl Workbook {
    /// Get a sheet by name
    pub fn get_sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn style(&self, index: usize) -> Option<&CellStyle> {
        self.styles.get(index)
    }

    /// Find a table by display name on any sheet
    pub fn find_table(&self, name: &str) -> Option<(&Sheet, &Table)> {
        self.sheets.iter().find_map(|sheet| {
            sheet
                .tables
                .iter()
                .find(|t| t.name == name)
                .map(|table| (sheet, table))
        })
    }
}

/// Represents a worksheet
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub cells: HashMap<(u32, u32), Cell>,
    /// Declared `<dimension>` of the sheet, if the file carries one
    pub dimension: Option<CellRange>,
    pub visible: bool,
    pub protection: SheetProtection,
    pub merged_cells: Vec<CellRange>,
    pub data_validations: Vec<DataValidation>,
    pub hyperlinks: Vec<Hyperlink>,
    /// Plain-text notes keyed by cell
    pub comments: HashMap<(u32, u32), String>,
    pub tables: Vec<Table>,
    /// Set when the sheet body could not be read; the sheet is then reported degraded
    pub load_error: Option<String>,
}

impl Sheet {
    pub fn new(name: String) -> Self {
        Self {
            name,
            visible: true,
            ..Default::default()
        }
    }

    /// Get a cell at the given position
    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Bounding box of every stored cell, including style-only cells.
    pub fn cell_extent(&self) -> Option<CellRange> {
        self.cells
            .keys()
            .map(|&(row, col)| CellRange::single(row, col))
            .reduce(|acc, r| acc.union(&r))
    }

    /// The used range: the union of the declared dimension and the actual cell extent.
    ///
    /// A declared dimension of a lone `A1` with no cells means the sheet is empty.
    pub fn used_range(&self) -> Option<CellRange> {
        match (self.dimension, self.cell_extent()) {
            (Some(dim), Some(extent)) => Some(dim.union(&extent)),
            (Some(dim), None) if dim.cell_count() > 1 => Some(dim),
            (_, extent) => extent,
        }
    }

    pub fn merge_area(&self, row: u32, col: u32) -> Option<&CellRange> {
        self.merged_cells.iter().find(|r| r.contains(row, col))
    }

    /// Validation rule covering the cell; the first declared rule wins on overlap.
    pub fn validation_at(&self, row: u32, col: u32) -> Option<&DataValidation> {
        self.data_validations
            .iter()
            .find(|dv| dv.sqref.iter().any(|r| r.contains(row, col)))
    }

    pub fn hyperlink_at(&self, row: u32, col: u32) -> Option<&Hyperlink> {
        self.hyperlinks.iter().find(|h| h.range.contains(row, col))
    }
}

/// Represents a single cell
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    /// Literal value, or the cached result when `formula` is set
    pub value: CellValue,
    /// Formula text without the leading '='
    pub formula: Option<String>,
    /// Index into `Workbook::styles`
    pub style: Option<usize>,
}

/// Cell value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Error literal such as `#N/A`
    Error(String),
    /// Date or time already rendered as ISO-8601 text
    DateTime(String),
}

impl CellValue {
    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

/// Sheet protection flags from `<sheetProtection>`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SheetProtection {
    pub contents: bool,
    pub drawing: bool,
    pub scenarios: bool,
}

/// A data validation rule and the cells it applies to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataValidation {
    /// OOXML type attribute (`list`, `whole`, ...); `none` when absent
    pub kind: String,
    pub operator: Option<String>,
    pub allow_blank: bool,
    /// Whether the in-cell dropdown arrow is shown
    pub in_cell_dropdown: bool,
    pub error_style: Option<String>,
    pub formula1: Option<String>,
    pub formula2: Option<String>,
    pub sqref: Vec<CellRange>,
}

/// A hyperlink anchored on one or more cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hyperlink {
    pub range: CellRange,
    /// External target resolved through the sheet relationships
    pub target: Option<String>,
    /// In-document location such as `Sheet2!A1`
    pub location: Option<String>,
    pub display: Option<String>,
}

/// An Excel table (list object)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Display name, used by structured references
    pub name: String,
    pub range: CellRange,
    pub header_row_count: u32,
    pub totals_row_count: u32,
    pub columns: Vec<String>,
}

impl Table {
    /// `None` when there is no header row or the count exceeds the table
    pub fn header_row_range(&self) -> Option<CellRange> {
        if self.header_row_count == 0 {
            return None;
        }
        let last = self.range.start_row.checked_add(self.header_row_count - 1)?;
        (last <= self.range.end_row)
            .then(|| CellRange::new(self.range.start_row, self.range.start_col, last, self.range.end_col))
    }

    /// `None` when there is no totals row or the count exceeds the table
    pub fn totals_row_range(&self) -> Option<CellRange> {
        if self.totals_row_count == 0 {
            return None;
        }
        let first = self.range.end_row.checked_add(1)?.checked_sub(self.totals_row_count)?;
        (first >= self.range.start_row)
            .then(|| CellRange::new(first, self.range.start_col, self.range.end_row, self.range.end_col))
    }

    /// Rows between the header and the totals row; `None` for a table with no body rows.
    pub fn data_body_range(&self) -> Option<CellRange> {
        let first = self.range.start_row.checked_add(self.header_row_count)?;
        let last = self.range.end_row.checked_sub(self.totals_row_count)?;
        (first <= last).then(|| CellRange::new(first, self.range.start_col, last, self.range.end_col))
    }

    /// Absolute column index of a column, matched by header name
    pub fn column_index(&self, column: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(column))
            })
            .map(|i| self.range.start_col + i as u32)
    }
}
