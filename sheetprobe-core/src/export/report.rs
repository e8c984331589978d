//! JSON and plain-text rendering of extraction results

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::record::{
    AllSheetsFormulaReport, CellRecord, DependencyReport, DependencyValue, FormulaReport,
    FullDetailsReport, RangeReport, SheetDetails, SheetDetailsReport, SheetMeta,
};

/// Any result the extraction CLI can write
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Report {
    Formulas(FormulaReport),
    AllSheets(AllSheetsFormulaReport),
    Range(RangeReport),
    Dependencies(DependencyReport),
    SheetDetails(SheetDetailsReport),
    WorkbookDetails(FullDetailsReport),
}

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Json,
    Text,
}

impl ReportFormat {
    pub fn parse(format: &str) -> Option<Self> {
        match format.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" | "txt" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "txt",
        }
    }
}

/// Pretty-printed JSON with a two-space indent
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize report")
}

pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    fs::write(path, to_json(value)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn write_report(report: &Report, format: ReportFormat, path: &Path) -> Result<()> {
    match format {
        ReportFormat::Json => write_json(report, path),
        ReportFormat::Text => fs::write(path, render_text(report))
            .with_context(|| format!("Failed to write {}", path.display())),
    }
}

const TITLE: &str = "EXCEL FORMULA EXTRACTION REPORT";

fn header(out: &mut String, file_path: &str, timestamp: &str) {
    let _ = writeln!(out, "{}", TITLE);
    let _ = writeln!(out, "{}\n", "=".repeat(50));
    let _ = writeln!(out, "File: {}", file_path);
    let _ = writeln!(out, "Extracted: {}", timestamp);
}

fn cell_block(out: &mut String, cell: &CellRecord) {
    let _ = writeln!(out, "Cell: {}", cell.address);
    if let Some(formula) = &cell.formula {
        let _ = writeln!(out, "Formula: {}", formula);
    }
    let _ = writeln!(out, "Value: {}", cell.value.to_plain_string());
    let _ = writeln!(out, "Row: {}, Column: {}", cell.row, cell.column_letter);
    let _ = writeln!(out, "{}", "-".repeat(10));
}

fn formula_section(out: &mut String, total: usize, cells: &[CellRecord]) {
    let _ = writeln!(out, "Total Formulas: {}\n", total);
    let _ = writeln!(out, "FORMULAS:");
    let _ = writeln!(out, "{}", "-".repeat(20));
    cells.iter().for_each(|cell| cell_block(out, cell));
}

fn sheet_section(out: &mut String, details: &SheetDetails) {
    let _ = writeln!(out, "Worksheet: {}", details.sheet.name());
    if let SheetMeta::Failed { error, .. } = &details.sheet {
        let _ = writeln!(out, "Error: {}\n", error);
        return;
    }
    let _ = writeln!(out, "Total Cells: {}", details.cells.len());
    for table in &details.tables {
        let _ = writeln!(
            out,
            "Table: {} ({})",
            table.name,
            table.range.as_deref().unwrap_or("?")
        );
    }
    let _ = writeln!(out, "\nCELLS:");
    let _ = writeln!(out, "{}", "-".repeat(20));
    details.cells.iter().for_each(|cell| cell_block(out, cell));
    out.push('\n');
}

/// Human-readable rendering of a report
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    match report {
        Report::Formulas(r) => {
            header(&mut out, &r.file_path, &r.extraction_timestamp);
            let _ = writeln!(out, "Worksheet: {}", r.worksheet_info.sheet_name);
            formula_section(&mut out, r.total_formulas_found, &r.formulas);
        }
        Report::AllSheets(r) => {
            header(&mut out, &r.file_path, &r.extraction_timestamp);
            for sheet in &r.sheets {
                let _ = writeln!(out, "\nWorksheet: {}", sheet.worksheet_info.sheet_name);
                formula_section(&mut out, sheet.total_formulas_found, &sheet.formulas);
            }
        }
        Report::Range(r) => {
            header(&mut out, &r.file_path, &r.extraction_timestamp);
            let _ = writeln!(out, "Worksheet: {}", r.sheet_name);
            let _ = writeln!(out, "Range: {}", r.range);
            formula_section(&mut out, r.total_formulas_found, &r.formulas);
        }
        Report::Dependencies(DependencyReport::NoFormula { error }) => {
            let _ = writeln!(out, "{}", TITLE);
            let _ = writeln!(out, "{}\n", "=".repeat(50));
            let _ = writeln!(out, "Error: {}", error);
        }
        Report::Dependencies(DependencyReport::Found {
            cell_address,
            formula,
            dependencies,
            dependent_values,
            calculated_value,
        }) => {
            let _ = writeln!(out, "{}", TITLE);
            let _ = writeln!(out, "{}\n", "=".repeat(50));
            let _ = writeln!(out, "Cell: {}", cell_address);
            let _ = writeln!(out, "Formula: {}", formula);
            let _ = writeln!(out, "Value: {}\n", calculated_value.to_plain_string());
            let _ = writeln!(out, "DEPENDENCIES:");
            let _ = writeln!(out, "{}", "-".repeat(20));
            for dep in dependencies {
                match dependent_values.get(dep) {
                    Some(DependencyValue::Resolved { value, formula, .. }) => {
                        let _ = writeln!(out, "Cell: {}", dep);
                        if let Some(formula) = formula {
                            let _ = writeln!(out, "Formula: {}", formula);
                        }
                        let _ = writeln!(out, "Value: {}", value.to_plain_string());
                    }
                    Some(DependencyValue::Inaccessible { error }) => {
                        let _ = writeln!(out, "Cell: {}\nError: {}", dep, error);
                    }
                    None => {
                        let _ = writeln!(out, "Cell: {}", dep);
                    }
                }
                let _ = writeln!(out, "{}", "-".repeat(10));
            }
        }
        Report::SheetDetails(r) => {
            header(&mut out, &r.file_path, &r.extraction_timestamp);
            sheet_section(&mut out, &r.details);
        }
        Report::WorkbookDetails(r) => {
            header(&mut out, &r.file_path, &r.extraction_timestamp);
            let _ = writeln!(out, "Sheets: {}\n", r.workbook.sheet_count);
            r.workbook
                .sheets
                .iter()
                .for_each(|sheet| sheet_section(&mut out, sheet));
            if !r.workbook.names.is_empty() {
                let _ = writeln!(out, "NAMES:");
                for name in &r.workbook.names {
                    let _ = writeln!(out, "{} -> {}", name.name, name.refers_to);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ScalarValue, WorksheetInfo};

    fn formula_report() -> FormulaReport {
        FormulaReport {
            file_path: "C:/book.xlsx".to_string(),
            extraction_timestamp: "2024-05-01T10:00:00.000000".to_string(),
            worksheet_info: WorksheetInfo {
                sheet_name: "Data".to_string(),
                used_range: Some("A1:B4".to_string()),
                rows: 4,
                columns: 2,
                total_cells: 8,
            },
            total_formulas_found: 2,
            formulas: vec![
                CellRecord {
                    address: "A4".to_string(),
                    row: 4,
                    column: 1,
                    column_letter: "A".to_string(),
                    formula: Some("=SUM(A2:A3)".to_string()),
                    ..Default::default()
                },
                CellRecord {
                    address: "B2".to_string(),
                    row: 2,
                    column: 2,
                    column_letter: "B".to_string(),
                    value: ScalarValue::Number(12.5),
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_text_report_layout() {
        let text = render_text(&Report::Formulas(formula_report()));
        let expected = "\
EXCEL FORMULA EXTRACTION REPORT
==================================================

File: C:/book.xlsx
Extracted: 2024-05-01T10:00:00.000000
Worksheet: Data
Total Formulas: 2

FORMULAS:
--------------------
Cell: A4
Formula: =SUM(A2:A3)
Value: None
Row: 4, Column: A
----------
Cell: B2
Value: 12.5
Row: 2, Column: B
----------
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_json_report_is_the_record_itself() {
        let json = to_json(&Report::Formulas(formula_report())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["worksheet_info"]["sheet_name"], "Data");
        assert_eq!(value["formulas"][1]["value"], 12.5);
        assert!(json.contains("\n  \"file_path\""));
    }

    #[test]
    fn test_non_ascii_preserved() {
        let json = to_json(&serde_json::json!({"sheet": "Übersicht"})).unwrap();
        assert!(json.contains("Übersicht"));
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_report(&Report::Formulas(formula_report()), ReportFormat::Text, &path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with(TITLE));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(ReportFormat::parse("JSON"), Some(ReportFormat::Json));
        assert_eq!(ReportFormat::parse("text"), Some(ReportFormat::Text));
        assert_eq!(ReportFormat::parse("xml"), None);
        assert_eq!(ReportFormat::Text.extension(), "txt");
    }
}
