//! Backend over a workbook parsed from disk

use anyhow::{Result, anyhow};
use std::path::Path;

use super::{ListSource, WorkbookBackend};
use crate::address::CellRange;
use crate::error::ExtractError;
use crate::reader::{self, DefinedName, Sheet, Workbook};
use crate::record::{
    FillColor, FormatInfo, HyperlinkRecord, ScalarValue, SheetInfo, TableRecord,
    ValidationRecord, validation_type_code, validation_type_name,
};

/// Validation types whose operator defaults to `between` when the file omits it
const OPERATOR_TYPES: &[&str] = &["whole", "decimal", "date", "time", "textLength"];

pub struct FileBackend {
    workbook: Workbook,
}

impl FileBackend {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_workbook(reader::read_workbook(path)?))
    }

    pub fn from_workbook(workbook: Workbook) -> Self {
        Self { workbook }
    }

    /// A readable sheet; degraded sheets surface their load error here
    fn sheet(&self, name: &str) -> Result<&Sheet> {
        let sheet = self
            .workbook
            .get_sheet(name)
            .ok_or_else(|| ExtractError::SheetNotFound(name.to_string()))?;
        match &sheet.load_error {
            Some(error) => Err(anyhow!("Sheet '{}' is unreadable: {}", name, error)),
            None => Ok(sheet),
        }
    }
}

impl ListSource for FileBackend {
    fn range_values(&mut self, sheet: &str, range: &CellRange) -> Result<Vec<ScalarValue>> {
        let sheet = self.sheet(sheet)?;
        // Whole-column and whole-row references stop at the used range
        let Some(bounded) = sheet.used_range().and_then(|used| range.intersect(&used)) else {
            return Ok(Vec::new());
        };
        Ok(bounded
            .positions()
            .map(|(row, col)| {
                sheet
                    .get_cell(row, col)
                    .map(|c| ScalarValue::from(&c.value))
                    .unwrap_or_default()
            })
            .collect())
    }

    fn table_column_values(
        &mut self,
        table: &str,
        column: &str,
    ) -> Result<Option<Vec<ScalarValue>>> {
        let found = self.workbook.find_table(table).or_else(|| {
            self.workbook.sheets.iter().find_map(|sheet| {
                sheet
                    .tables
                    .iter()
                    .find(|t| t.name.eq_ignore_ascii_case(table))
                    .map(|t| (sheet, t))
            })
        });
        let Some((sheet, table)) = found else {
            return Ok(None);
        };
        let Some(col) = table.column_index(column) else {
            return Ok(None);
        };
        let Some(body) = table.data_body_range() else {
            return Ok(Some(Vec::new()));
        };
        Ok(Some(
            (body.start_row..=body.end_row)
                .map(|row| {
                    sheet
                        .get_cell(row, col)
                        .map(|c| ScalarValue::from(&c.value))
                        .unwrap_or_default()
                })
                .collect(),
        ))
    }

    fn defined_names(&mut self) -> Result<Vec<DefinedName>> {
        Ok(self.workbook.defined_names.clone())
    }
}

impl WorkbookBackend for FileBackend {
    fn file_path(&self) -> &Path {
        &self.workbook.path
    }

    fn sheet_names(&mut self) -> Result<Vec<String>> {
        Ok(self
            .workbook
            .sheet_names()
            .into_iter()
            .map(String::from)
            .collect())
    }

    fn active_sheet(&mut self) -> Result<String> {
        self.workbook
            .sheets
            .get(self.workbook.active_sheet)
            .or_else(|| self.workbook.sheets.first())
            .map(|s| s.name.clone())
            .ok_or_else(|| ExtractError::NoSheets(self.workbook.path.clone()).into())
    }

    fn sheet_info(&mut self, sheet: &str) -> Result<SheetInfo> {
        let sheet = self.sheet(sheet)?;
        let used = sheet.used_range();
        Ok(SheetInfo {
            name: sheet.name.clone(),
            used_range: used.map(|r| r.address()),
            rows: used.map(|r| r.rows()).unwrap_or(0),
            columns: used.map(|r| r.columns()).unwrap_or(0),
            visible: Some(sheet.visible),
            protect_contents: Some(sheet.protection.contents),
            protect_drawing: Some(sheet.protection.drawing),
            protect_scenarios: Some(sheet.protection.scenarios),
        })
    }

    fn used_range(&mut self, sheet: &str) -> Result<Option<CellRange>> {
        Ok(self.sheet(sheet)?.used_range())
    }

    fn cell_value(&mut self, sheet: &str, row: u32, col: u32) -> Result<ScalarValue> {
        Ok(self
            .sheet(sheet)?
            .get_cell(row, col)
            .map(|c| ScalarValue::from(&c.value))
            .unwrap_or_default())
    }

    fn cell_formula(&mut self, sheet: &str, row: u32, col: u32) -> Result<Option<String>> {
        Ok(self
            .sheet(sheet)?
            .get_cell(row, col)
            .and_then(|c| c.formula.as_ref())
            .map(|f| format!("={}", f)))
    }

    /// Rendering display text needs the application's formatter
    fn cell_display_text(&mut self, sheet: &str, _row: u32, _col: u32) -> Result<Option<String>> {
        self.sheet(sheet)?;
        Ok(None)
    }

    fn cell_format(&mut self, sheet_name: &str, row: u32, col: u32) -> Result<FormatInfo> {
        let sheet = self.sheet(sheet_name)?;
        let merge_area = sheet.merge_area(row, col).map(|r| r.address());
        // Unstyled cells use the first cell format
        let style_index = sheet.get_cell(row, col).and_then(|c| c.style).unwrap_or(0);

        let mut info = FormatInfo {
            merged: merge_area.is_some(),
            merge_area,
            ..Default::default()
        };
        if let Some(style) = self.workbook.style(style_index) {
            info.number_format = Some(style.number_format.clone());
            info.font_name = style.font_name.clone();
            info.font_size = style.font_size;
            info.font_bold = Some(style.font_bold);
            info.font_italic = Some(style.font_italic);
            info.font_color_rgb = style.font_color;
            info.fill_color = style.fill_color.map(FillColor::from);
            info.horizontal_alignment = style.horizontal_alignment.clone();
            info.vertical_alignment = style.vertical_alignment.clone();
            info.locked = Some(style.locked);
            info.formula_hidden = Some(style.formula_hidden);
        }
        Ok(info)
    }

    fn cell_hyperlink(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
    ) -> Result<Option<HyperlinkRecord>> {
        Ok(self
            .sheet(sheet)?
            .hyperlink_at(row, col)
            .map(|link| HyperlinkRecord {
                address: link.target.clone(),
                sub_address: link.location.clone(),
                text_to_display: link.display.clone(),
            }))
    }

    fn cell_note(&mut self, sheet: &str, row: u32, col: u32) -> Result<Option<String>> {
        Ok(self.sheet(sheet)?.comments.get(&(row, col)).cloned())
    }

    fn cell_validation(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
    ) -> Result<Option<ValidationRecord>> {
        let Some(dv) = self.sheet(sheet)?.validation_at(row, col) else {
            return Ok(None);
        };
        let code = validation_type_code(&dv.kind);
        let operator = match &dv.operator {
            Some(op) => Some(op.clone()),
            None if OPERATOR_TYPES.contains(&dv.kind.as_str()) => Some("between".to_string()),
            None => None,
        };
        Ok(Some(ValidationRecord {
            kind: code,
            type_name: validation_type_name(code).to_string(),
            alert_style: Some(dv.error_style.clone().unwrap_or_else(|| "stop".to_string())),
            operator,
            ignore_blank: Some(dv.allow_blank),
            in_cell_dropdown: Some(dv.in_cell_dropdown),
            formula1: dv.formula1.clone(),
            formula2: dv.formula2.clone(),
            list_items: None,
        }))
    }

    fn tables(&mut self, sheet: &str) -> Result<Vec<TableRecord>> {
        Ok(self
            .sheet(sheet)?
            .tables
            .iter()
            .map(|t| TableRecord {
                name: t.name.clone(),
                range: Some(t.range.address()),
                data_body_range: t.data_body_range().map(|r| r.address()),
                header_row_range: t.header_row_range().map(|r| r.address()),
                totals_row_range: t.totals_row_range().map(|r| r.address()),
                show_totals: t.totals_row_count > 0,
                columns: t.columns.clone(),
            })
            .collect())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
