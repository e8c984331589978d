//! Conversion of a full-details dump into per-sheet files
//!
//! Layout under `<out_dir>/<stem>/`:
//!
//! ```text
//! INDEX.md
//! <stem>-cells.ndjson            (optional)
//! <sheet>/<sheet>-cells.csv
//! <sheet>/<sheet>-formulas.csv
//! <sheet>/<sheet>-validations.csv
//! <sheet>/<sheet>.json
//! ```
//!
//! The input is read as untyped JSON so dumps from either backend, or from
//! older runs, convert without a schema match.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ExtractError;

/// Flattened CSV columns; dotted names reach into nested objects
pub const CSV_COLUMNS: [&str; 20] = [
    "address",
    "row",
    "column",
    "column_letter",
    "value",
    "display_text",
    "formula",
    "format.number_format",
    "format.font_name",
    "format.font_size",
    "format.font_bold",
    "format.font_italic",
    "hyperlink.address",
    "note",
    "data_validation.type_name",
    "data_validation.formula1",
    "data_validation.formula2",
    "data_validation.list_items",
    "format.merged",
    "format.merge_area",
];

const MAX_NAME_LEN: usize = 120;
const LIST_TYPE_NAME: &str = "xlValidateList";

/// Shape of a prior extraction dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    Workbook,
    Sheet,
    Unknown,
}

pub fn detect_structure(document: &Value) -> DumpKind {
    if document
        .get("workbook")
        .is_some_and(|wb| wb.is_object() && wb.get("sheets").is_some())
    {
        DumpKind::Workbook
    } else if document.get("sheet").is_some() && document.get("cells").is_some() {
        DumpKind::Sheet
    } else {
        DumpKind::Unknown
    }
}

/// Sheet entries of a dump, in order
pub fn extract_sheets(document: &Value) -> Vec<&Value> {
    match detect_structure(document) {
        DumpKind::Workbook => document["workbook"]["sheets"]
            .as_array()
            .map(|sheets| sheets.iter().collect())
            .unwrap_or_default(),
        DumpKind::Sheet => vec![document],
        DumpKind::Unknown => Vec::new(),
    }
}

/// Filesystem-safe sheet name
pub fn sanitize_filename(name: &str) -> String {
    thread_local! {
        static UNSAFE: regex::Regex =
            regex::Regex::new(r#"[\\/:*?"<>|]"#).expect("unsafe-character pattern is valid");
        static SPACES: regex::Regex = regex::Regex::new(r"\s+").expect("whitespace pattern is valid");
    }
    let replaced = UNSAFE.with(|re| re.replace_all(name.trim(), "_").into_owned());
    let collapsed = SPACES.with(|re| re.replace_all(&replaced, "_").into_owned());
    let truncated: String = collapsed.chars().take(MAX_NAME_LEN).collect();
    if truncated.is_empty() {
        "sheet".to_string()
    } else {
        truncated
    }
}

fn sheet_name(entry: &Value) -> &str {
    entry
        .get("sheet")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
}

fn cells(entry: &Value) -> &[Value] {
    entry
        .get("cells")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Present and not null, false, zero or empty
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn has_formula(cell: &Value) -> bool {
    truthy(cell.get("formula"))
}

fn has_validation(cell: &Value) -> bool {
    truthy(cell.get("data_validation"))
}

fn is_dropdown(cell: &Value) -> bool {
    cell.get("data_validation")
        .and_then(|dv| dv.get("type_name"))
        .and_then(Value::as_str)
        == Some(LIST_TYPE_NAME)
}

/// Per-sheet counts shown in the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetStats {
    pub cells: usize,
    pub formulas: usize,
    pub validations: usize,
    pub dropdowns: usize,
}

impl SheetStats {
    pub fn of(entry: &Value) -> Self {
        let cells = cells(entry);
        Self {
            cells: cells.len(),
            formulas: cells.iter().filter(|c| has_formula(c)).count(),
            validations: cells.iter().filter(|c| has_validation(c)).count(),
            dropdowns: cells.iter().filter(|c| is_dropdown(c)).count(),
        }
    }
}

/// Files written for one sheet, relative to the output root
#[derive(Debug, Clone)]
pub struct SheetOutput {
    pub name: String,
    pub stats: SheetStats,
    pub cells_csv: PathBuf,
    pub formulas_csv: PathBuf,
    pub validations_csv: PathBuf,
    pub json: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConversionSummary {
    pub out_root: PathBuf,
    pub index_path: PathBuf,
    pub ndjson_path: Option<PathBuf>,
    pub sheets: Vec<SheetOutput>,
}

fn lookup<'a>(cell: &'a Value, column: &str) -> Option<&'a Value> {
    column
        .split('.')
        .try_fold(cell, |current, part| current.as_object()?.get(part))
}

/// One CSV field: null is empty, lists are joined with ", "
pub fn csv_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| csv_field(Some(item)))
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

pub fn write_csv<'a, I>(path: &Path, rows: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(CSV_COLUMNS)?;
    for row in rows {
        writer.write_record(CSV_COLUMNS.iter().map(|col| csv_field(lookup(row, col))))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_sheet(out_root: &Path, entry: &Value) -> Result<SheetOutput> {
    let name = sheet_name(entry);
    let base = sanitize_filename(name);
    let sheet_dir = out_root.join(&base);
    fs::create_dir_all(&sheet_dir)
        .with_context(|| format!("Failed to create {}", sheet_dir.display()))?;

    let cells = cells(entry);
    let relative = |suffix: &str| PathBuf::from(&base).join(format!("{}{}", base, suffix));
    let output = SheetOutput {
        name: name.to_string(),
        stats: SheetStats::of(entry),
        cells_csv: relative("-cells.csv"),
        formulas_csv: relative("-formulas.csv"),
        validations_csv: relative("-validations.csv"),
        json: relative(".json"),
    };

    write_csv(&out_root.join(&output.cells_csv), cells)?;
    write_csv(
        &out_root.join(&output.formulas_csv),
        cells.iter().filter(|c| has_formula(c)),
    )?;
    write_csv(
        &out_root.join(&output.validations_csv),
        cells.iter().filter(|c| has_validation(c)),
    )?;

    let json_path = out_root.join(&output.json);
    fs::write(&json_path, serde_json::to_string_pretty(entry)?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    debug!("Wrote {} cells for sheet '{}'", output.stats.cells, name);
    Ok(output)
}

/// One line per cell, tagged with its sheet name
pub fn write_ndjson(path: &Path, sheets: &[&Value]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for entry in sheets {
        let name = sheet_name(entry);
        for cell in cells(entry) {
            let mut line = Map::new();
            line.insert("sheet".to_string(), Value::String(name.to_string()));
            if let Some(fields) = cell.as_object() {
                line.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            serde_json::to_writer(&mut out, &line)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;
    Ok(())
}

fn link(path: &Path) -> String {
    let target = path.to_string_lossy().replace('\\', "/");
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("[{}]({})", label, target)
}

pub fn render_index(source_file: &str, sheets: &[SheetOutput]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Excel Extraction Index\n");
    let _ = writeln!(out, "- **source_file**: `{}`\n", source_file);
    let _ = writeln!(out, "## Sheets\n");
    let _ = writeln!(
        out,
        "| Sheet | Cells | Formulas | Validations | Dropdowns | CSV (cells) | CSV (formulas) | CSV (validations) | JSON |"
    );
    let _ = writeln!(out, "|---|---:|---:|---:|---:|---|---|---|---|");
    for sheet in sheets {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
            sheet.name.replace('|', "\\|"),
            sheet.stats.cells,
            sheet.stats.formulas,
            sheet.stats.validations,
            sheet.stats.dropdowns,
            link(&sheet.cells_csv),
            link(&sheet.formulas_csv),
            link(&sheet.validations_csv),
            link(&sheet.json),
        );
    }
    let _ = writeln!(out, "\nGenerated by sheetexport");
    out
}

/// Convert an already-parsed dump. `input_name` is the dump's file name.
pub fn convert_document(
    document: &Value,
    input_name: &str,
    out_dir: &Path,
    ndjson: bool,
) -> Result<ConversionSummary> {
    let sheets = extract_sheets(document);
    if sheets.is_empty() {
        return Err(ExtractError::NoSheets(PathBuf::from(input_name)).into());
    }

    let stem = Path::new(input_name)
        .file_stem()
        .map(|s| s.to_string_lossy().replace(' ', "_"))
        .unwrap_or_else(|| "workbook".to_string());
    let out_root = out_dir.join(&stem);
    fs::create_dir_all(&out_root)
        .with_context(|| format!("Failed to create {}", out_root.display()))?;

    let outputs = sheets
        .iter()
        .map(|entry| write_sheet(&out_root, entry))
        .collect::<Result<Vec<_>>>()?;

    let ndjson_path = if ndjson {
        let path = out_root.join(format!("{}-cells.ndjson", stem));
        write_ndjson(&path, &sheets)?;
        Some(path)
    } else {
        None
    };

    let index_path = out_root.join("INDEX.md");
    fs::write(&index_path, render_index(input_name, &outputs))
        .with_context(|| format!("Failed to write {}", index_path.display()))?;

    info!("Converted {} sheets into {}", outputs.len(), out_root.display());
    Ok(ConversionSummary {
        out_root,
        index_path,
        ndjson_path,
        sheets: outputs,
    })
}

/// Read a full-details JSON file and convert it
pub fn convert_file(input: &Path, out_dir: &Path, ndjson: bool) -> Result<ConversionSummary> {
    if !input.is_file() {
        return Err(ExtractError::FileNotFound(input.to_path_buf()).into());
    }
    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let document: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", input.display()))?;
    let input_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    convert_document(&document, &input_name, out_dir, ndjson)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dump() -> Value {
        json!({
            "file_path": "Budget Book.xlsx",
            "extraction_timestamp": "2024-05-01T10:00:00.000000",
            "workbook": {
                "sheet_count": 2,
                "sheets": [
                    {
                        "sheet": {"name": "Q1/Q2:Report", "used_range": "A1:B2"},
                        "cells": [
                            {"address": "A1", "row": 1, "column": 1, "column_letter": "A",
                             "value": "Qty", "formula": null,
                             "format": {"font_name": "Arial", "font_bold": true, "merged": false}},
                            {"address": "A2", "row": 2, "column": 1, "column_letter": "A",
                             "value": null, "formula": "=SUM(B1:B2)",
                             "format": {"font_size": 11.5, "merged": true, "merge_area": "A2:B2"}},
                            {"address": "B1", "row": 1, "column": 2, "column_letter": "B",
                             "value": "Red", "formula": null,
                             "data_validation": {"type": 3, "type_name": "xlValidateList",
                                                 "formula1": "=Colors", "list_items": ["Red", "Blue", 7]}},
                            {"address": "B2", "row": 2, "column": 2, "column_letter": "B",
                             "value": 5, "formula": "",
                             "data_validation": {"type": 1, "type_name": "xlValidateWholeNumber",
                                                 "formula1": "0", "formula2": "10"}}
                        ],
                        "tables": []
                    },
                    {"sheet": {"name": "Broken", "error": "unreadable"}, "cells": [], "tables": []}
                ],
                "names": []
            }
        })
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Q1/Q2:Report"), "Q1_Q2_Report");
        assert_eq!(sanitize_filename("  Sales   2024 "), "Sales_2024");
        assert_eq!(sanitize_filename("a*b?c\"d<e>f|g\\h"), "a_b_c_d_e_f_g_h");
        assert_eq!(sanitize_filename("   "), "sheet");
        assert_eq!(sanitize_filename(&"é".repeat(200)).chars().count(), 120);
    }

    #[test]
    fn test_detect_structure() {
        assert_eq!(detect_structure(&dump()), DumpKind::Workbook);
        assert_eq!(
            detect_structure(&json!({"sheet": {"name": "S"}, "cells": []})),
            DumpKind::Sheet
        );
        assert_eq!(detect_structure(&json!({"formulas": []})), DumpKind::Unknown);
        assert_eq!(detect_structure(&json!({"workbook": []})), DumpKind::Unknown);
    }

    #[test]
    fn test_csv_field_flattening() {
        let cell = &dump()["workbook"]["sheets"][0]["cells"][2];
        assert_eq!(csv_field(lookup(cell, "data_validation.list_items")), "Red, Blue, 7");
        assert_eq!(csv_field(lookup(cell, "format.font_name")), "");
        assert_eq!(csv_field(lookup(cell, "formula")), "");
        assert_eq!(csv_field(Some(&json!(true))), "true");
        assert_eq!(csv_field(Some(&json!(11.5))), "11.5");
    }

    #[test]
    fn test_stats_counts() {
        let document = dump();
        let stats = SheetStats::of(&document["workbook"]["sheets"][0]);
        assert_eq!(
            stats,
            SheetStats {
                cells: 4,
                formulas: 1,
                validations: 2,
                dropdowns: 1
            }
        );
    }

    #[test]
    fn test_convert_document_layout() {
        let dir = tempfile::tempdir().unwrap();
        let summary = convert_document(&dump(), "Budget Book_full_details.json", dir.path(), true).unwrap();

        let root = dir.path().join("Budget_Book_full_details");
        assert_eq!(summary.out_root, root);
        let sheet_dir = root.join("Q1_Q2_Report");
        for file in [
            "Q1_Q2_Report-cells.csv",
            "Q1_Q2_Report-formulas.csv",
            "Q1_Q2_Report-validations.csv",
            "Q1_Q2_Report.json",
        ] {
            assert!(sheet_dir.join(file).is_file(), "missing {file}");
        }

        let cells_csv = fs::read_to_string(sheet_dir.join("Q1_Q2_Report-cells.csv")).unwrap();
        let mut lines = cells_csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_COLUMNS.join(","));
        assert_eq!(lines.count(), 4);

        let formulas = fs::read_to_string(sheet_dir.join("Q1_Q2_Report-formulas.csv")).unwrap();
        assert_eq!(formulas.lines().count(), 2);
        assert!(formulas.contains("=SUM(B1:B2)"));
        assert!(formulas.contains(",true,A2:B2"));

        let validations =
            fs::read_to_string(sheet_dir.join("Q1_Q2_Report-validations.csv")).unwrap();
        assert!(validations.contains("\"Red, Blue, 7\""));

        // Degraded sheet still gets its files
        assert!(root.join("Broken").join("Broken-cells.csv").is_file());

        let ndjson = fs::read_to_string(summary.ndjson_path.unwrap()).unwrap();
        let first: Value = serde_json::from_str(ndjson.lines().next().unwrap()).unwrap();
        assert_eq!(first.as_object().unwrap().keys().next().unwrap(), "sheet");
        assert_eq!(first["sheet"], "Q1/Q2:Report");
        assert_eq!(ndjson.lines().count(), 4);

        let index = fs::read_to_string(&summary.index_path).unwrap();
        assert!(index.starts_with("# Excel Extraction Index"));
        assert!(index.contains("- **source_file**: `Budget Book_full_details.json`"));
        assert!(index.contains(
            "| Q1/Q2:Report | 4 | 1 | 2 | 1 | [Q1_Q2_Report-cells.csv](Q1_Q2_Report/Q1_Q2_Report-cells.csv)"
        ));
        assert!(index.contains("| Broken | 0 | 0 | 0 | 0 |"));
    }

    #[test]
    fn test_conversion_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let first = convert_document(&dump(), "book.json", dir.path(), false).unwrap();
        let path = first.out_root.join(&first.sheets[0].cells_csv);
        let before = fs::read(&path).unwrap();
        let second = convert_document(&dump(), "book.json", dir.path(), false).unwrap();
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(second.ndjson_path.is_none());
    }

    #[test]
    fn test_single_sheet_dump() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dump()["workbook"]["sheets"][0].clone();
        let summary = convert_document(&sheet, "one.json", dir.path(), false).unwrap();
        assert_eq!(summary.sheets.len(), 1);
    }

    #[test]
    fn test_unknown_structure_has_no_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let err = convert_document(&json!({"formulas": []}), "x.json", dir.path(), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::NoSheets(_))
        ));
    }

    #[test]
    fn test_convert_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dump.json");
        fs::write(&input, serde_json::to_string(&dump()).unwrap()).unwrap();
        let summary = convert_file(&input, &dir.path().join("out"), false).unwrap();
        assert!(summary.index_path.ends_with("dump/INDEX.md"));

        assert!(convert_file(&dir.path().join("missing.json"), dir.path(), false).is_err());
    }
}
