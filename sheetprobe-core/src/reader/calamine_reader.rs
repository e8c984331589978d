//! Reader for the formats without a dedicated XML parser (`.xls`, `.xlsb`, `.ods`)
//!
//! Only values, formulas, visibility and defined names are available through
//! calamine; formatting, validation and table metadata stay empty.

use anyhow::{Context, Result};
use calamine::{Data, Range, Reader, SheetVisible, Sheets, open_workbook_auto};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::warn;

use super::styles::{CellStyle, excel_serial_to_iso};
use super::{Cell, CellValue, DefinedName, Sheet, WorkbookReader};
use crate::address::CellRange;

pub struct CalamineReader {
    workbook: Sheets<BufReader<File>>,
}

impl CalamineReader {
    pub fn open(path: &Path) -> Result<Self> {
        let workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
        Ok(Self { workbook })
    }
}

impl WorkbookReader for CalamineReader {
    fn read_sheets(&mut self) -> Result<Vec<Sheet>> {
        let metadata = self.workbook.sheets_metadata().to_vec();
        let mut sheets = Vec::with_capacity(metadata.len());

        for meta in metadata {
            let mut sheet = Sheet::new(meta.name.clone());
            sheet.visible = matches!(meta.visible, SheetVisible::Visible);

            let range = match self.workbook.worksheet_range(&meta.name) {
                Ok(range) => range,
                Err(e) => {
                    warn!("Sheet '{}' could not be read: {}", meta.name, e);
                    sheet.load_error = Some(e.to_string());
                    sheets.push(sheet);
                    continue;
                }
            };
            // Formula extraction is best effort; values still load without it
            let formulas = match self.workbook.worksheet_formula(&meta.name) {
                Ok(f) => Some(f),
                Err(e) => {
                    warn!("Sheet '{}': formulas unavailable: {}", meta.name, e);
                    None
                }
            };

            fill_sheet(&mut sheet, &range, formulas.as_ref());
            sheets.push(sheet);
        }
        Ok(sheets)
    }

    fn read_defined_names(&mut self) -> Result<Vec<DefinedName>> {
        Ok(self
            .workbook
            .defined_names()
            .iter()
            .filter(|(name, _)| !name.starts_with("_xlnm.") && !name.contains("_FilterDatabase"))
            .map(|(name, refers_to)| DefinedName {
                name: name.clone(),
                refers_to: refers_to.trim_start_matches('=').to_string(),
            })
            .collect())
    }

    fn read_active_sheet(&mut self) -> Result<usize> {
        Ok(0)
    }

    fn styles(&self) -> Vec<CellStyle> {
        Vec::new()
    }
}

/// Merge the value and formula grids into 1-based cells
fn fill_sheet(sheet: &mut Sheet, range: &Range<Data>, formulas: Option<&Range<String>>) {
    if let Some((row0, col0)) = range.start() {
        for (r, c, data) in range.cells() {
            if matches!(data, Data::Empty) {
                continue;
            }
            let (row, col) = (row0 + r as u32 + 1, col0 + c as u32 + 1);
            sheet.cells.insert(
                (row, col),
                Cell {
                    row,
                    col,
                    value: parse_cell_value(data),
                    ..Default::default()
                },
            );
        }
    }

    if let Some(f) = formulas
        && let Some((row0, col0)) = f.start()
    {
        for (r, c, formula) in f.cells() {
            if formula.is_empty() {
                continue;
            }
            let (row, col) = (row0 + r as u32 + 1, col0 + c as u32 + 1);
            let cell = sheet.cells.entry((row, col)).or_insert_with(|| Cell {
                row,
                col,
                ..Default::default()
            });
            cell.formula = Some(formula.trim_start_matches('=').to_string());
        }
    }

    if let (Some(start), Some(end)) = (range.start(), range.end()) {
        sheet.dimension = Some(CellRange::new(start.0 + 1, start.1 + 1, end.0 + 1, end.1 + 1));
    }
}

fn parse_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::Error(e) => CellValue::Error(e.to_string()),
        Data::Empty => CellValue::Empty,
        Data::DateTime(dt) => excel_serial_to_iso(dt.as_f64())
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) => CellValue::DateTime(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;

    #[test]
    fn test_parse_cell_value() {
        assert_eq!(parse_cell_value(&Data::Int(3)), CellValue::Number(3.0));
        assert_eq!(
            parse_cell_value(&Data::Error(CellErrorType::Div0)),
            CellValue::Error("#DIV/0!".to_string())
        );
        assert_eq!(
            parse_cell_value(&Data::DateTimeIso("2024-01-02".to_string())),
            CellValue::DateTime("2024-01-02".to_string())
        );
    }

    #[test]
    fn test_fill_sheet_offsets_and_formulas() {
        let mut values: Range<Data> = Range::new((1, 1), (2, 2));
        values.set_value((1, 1), Data::Float(4.0));
        values.set_value((2, 2), Data::Float(8.0));
        let mut formulas: Range<String> = Range::new((2, 2), (2, 2));
        formulas.set_value((2, 2), "B2*2".to_string());

        let mut sheet = Sheet::new("S".to_string());
        fill_sheet(&mut sheet, &values, Some(&formulas));

        assert_eq!(sheet.get_cell(2, 2).unwrap().value, CellValue::Number(4.0));
        let c3 = sheet.get_cell(3, 3).unwrap();
        assert_eq!(c3.formula.as_deref(), Some("B2*2"));
        assert_eq!(c3.value, CellValue::Number(8.0));
        assert_eq!(sheet.dimension.unwrap().address(), "B2:C3");
    }
}
