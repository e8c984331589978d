//! Serializable extraction records
//!
//! Field order in these structs is the key order of the emitted JSON.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::reader::{CellValue, Rgb};

/// A single cell value as reported in records and list items
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    /// Text, and dates rendered as ISO text
    Text(String),
}

impl ScalarValue {
    /// Null or the empty string
    pub fn is_blank(&self) -> bool {
        match self {
            ScalarValue::Null => true,
            ScalarValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Plain rendering used by the text report
    pub fn to_plain_string(&self) -> String {
        match self {
            ScalarValue::Null => "None".to_string(),
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Number(n) => format_number(*n),
            ScalarValue::Text(s) => s.clone(),
        }
    }
}

/// Integral values print without a fractional part
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScalarValue::Null => serializer.serialize_none(),
            ScalarValue::Bool(b) => serializer.serialize_bool(*b),
            ScalarValue::Number(n) if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 => {
                serializer.serialize_i64(*n as i64)
            }
            ScalarValue::Number(n) => serializer.serialize_f64(*n),
            ScalarValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&CellValue> for ScalarValue {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Empty => ScalarValue::Null,
            CellValue::Number(n) => ScalarValue::Number(*n),
            CellValue::Text(s) => ScalarValue::Text(s.clone()),
            CellValue::Boolean(b) => ScalarValue::Bool(*b),
            CellValue::Error(e) => ScalarValue::Text(e.clone()),
            CellValue::DateTime(s) => ScalarValue::Text(s.clone()),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Number(value)
    }
}

/// Everything extracted for one cell
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellRecord {
    pub address: String,
    pub row: u32,
    pub column: u32,
    pub column_letter: String,
    /// Null whenever `formula` is set
    pub value: ScalarValue,
    /// Formula text including the leading '='
    pub formula: Option<String>,
    pub display_text: Option<String>,
    pub format: Option<FormatInfo>,
    pub hyperlink: Option<HyperlinkRecord>,
    pub note: Option<String>,
    pub data_validation: Option<ValidationRecord>,
}

impl CellRecord {
    /// Formula cells and nonzero numbers
    pub fn is_calculation(&self) -> bool {
        self.formula.is_some() || self.value.as_f64().is_some_and(|n| n != 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormatInfo {
    pub number_format: Option<String>,
    pub font_name: Option<String>,
    pub font_size: Option<f64>,
    pub font_bold: Option<bool>,
    pub font_italic: Option<bool>,
    pub font_color_rgb: Option<Rgb>,
    pub fill_color: Option<FillColor>,
    pub horizontal_alignment: Option<String>,
    pub vertical_alignment: Option<String>,
    pub locked: Option<bool>,
    pub formula_hidden: Option<bool>,
    pub merged: bool,
    pub merge_area: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillColor {
    /// Color as the application stores it (0x00BBGGRR)
    pub excel_bgr: u32,
    pub rgb: Rgb,
}

impl From<Rgb> for FillColor {
    fn from(rgb: Rgb) -> Self {
        Self {
            excel_bgr: rgb.to_bgr(),
            rgb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HyperlinkRecord {
    pub address: Option<String>,
    pub sub_address: Option<String>,
    pub text_to_display: Option<String>,
}

/// Validation types in code order
pub const VALIDATION_TYPES: [(&str, &str); 8] = [
    ("none", "xlValidateInputOnly"),
    ("whole", "xlValidateWholeNumber"),
    ("decimal", "xlValidateDecimal"),
    ("list", "xlValidateList"),
    ("date", "xlValidateDate"),
    ("time", "xlValidateTime"),
    ("textLength", "xlValidateTextLength"),
    ("custom", "xlValidateCustom"),
];

/// Operator names in code order, starting at 1
pub const VALIDATION_OPERATORS: [&str; 8] = [
    "between",
    "notBetween",
    "equal",
    "notEqual",
    "greaterThan",
    "lessThan",
    "greaterThanOrEqual",
    "lessThanOrEqual",
];

/// Alert styles in code order, starting at 1
pub const ALERT_STYLES: [&str; 3] = ["stop", "warning", "information"];

/// Numeric code of an OOXML validation type; unknown types count as input-only
pub fn validation_type_code(kind: &str) -> u8 {
    VALIDATION_TYPES
        .iter()
        .position(|(name, _)| name.eq_ignore_ascii_case(kind))
        .unwrap_or(0) as u8
}

pub fn validation_type_name(code: u8) -> &'static str {
    VALIDATION_TYPES
        .get(code as usize)
        .map(|(_, name)| *name)
        .unwrap_or("xlValidateInputOnly")
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationRecord {
    #[serde(rename = "type")]
    pub kind: u8,
    pub type_name: String,
    pub alert_style: Option<String>,
    pub operator: Option<String>,
    pub ignore_blank: Option<bool>,
    pub in_cell_dropdown: Option<bool>,
    pub formula1: Option<String>,
    pub formula2: Option<String>,
    /// Present only when the list source was resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_items: Option<Vec<ScalarValue>>,
}

impl ValidationRecord {
    pub fn is_list(&self) -> bool {
        self.kind == 3
    }
}

/// Sheet header of a full-details dump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetMeta {
    Loaded(SheetInfo),
    /// The sheet could not be read; only its name and the reason survive
    Failed { name: String, error: String },
}

impl SheetMeta {
    pub fn name(&self) -> &str {
        match self {
            SheetMeta::Loaded(info) => &info.name,
            SheetMeta::Failed { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SheetInfo {
    pub name: String,
    pub used_range: Option<String>,
    pub rows: u32,
    pub columns: u32,
    pub visible: Option<bool>,
    pub protect_contents: Option<bool>,
    pub protect_drawing: Option<bool>,
    pub protect_scenarios: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetDetails {
    pub sheet: SheetMeta,
    pub cells: Vec<CellRecord>,
    pub tables: Vec<TableRecord>,
}

impl SheetDetails {
    pub fn failed(name: &str, error: String) -> Self {
        Self {
            sheet: SheetMeta::Failed {
                name: name.to_string(),
                error,
            },
            cells: Vec::new(),
            tables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableRecord {
    pub name: String,
    pub range: Option<String>,
    pub data_body_range: Option<String>,
    pub header_row_range: Option<String>,
    pub totals_row_range: Option<String>,
    pub show_totals: bool,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRangeRecord {
    pub name: String,
    pub refers_to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookDetails {
    pub sheet_count: usize,
    pub sheets: Vec<SheetDetails>,
    pub names: Vec<NamedRangeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullDetailsReport {
    pub file_path: String,
    pub extraction_timestamp: String,
    pub workbook: WorkbookDetails,
}

/// Single-sheet full-details dump, written as the sheet record itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetDetailsReport {
    pub file_path: String,
    pub extraction_timestamp: String,
    #[serde(flatten)]
    pub details: SheetDetails,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorksheetInfo {
    pub sheet_name: String,
    pub used_range: Option<String>,
    pub rows: u32,
    pub columns: u32,
    pub total_cells: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaReport {
    pub file_path: String,
    pub extraction_timestamp: String,
    pub worksheet_info: WorksheetInfo,
    pub total_formulas_found: usize,
    pub formulas: Vec<CellRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllSheetsFormulaReport {
    pub file_path: String,
    pub extraction_timestamp: String,
    pub sheets: Vec<FormulaReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeReport {
    pub file_path: String,
    pub extraction_timestamp: String,
    pub sheet_name: String,
    pub range: String,
    pub total_formulas_found: usize,
    pub formulas: Vec<CellRecord>,
}

/// Value of one referenced cell, or why it could not be read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyValue {
    Resolved {
        value: ScalarValue,
        formula: Option<String>,
        address: String,
    },
    Inaccessible {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyReport {
    Found {
        cell_address: String,
        formula: String,
        dependencies: Vec<String>,
        dependent_values: BTreeMap<String, DependencyValue>,
        calculated_value: ScalarValue,
    },
    NoFormula {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_serialization() {
        let values = vec![
            ScalarValue::Number(10.0),
            ScalarValue::Number(2.5),
            ScalarValue::Null,
            ScalarValue::Text("x".to_string()),
            ScalarValue::Bool(true),
        ];
        assert_eq!(
            serde_json::to_value(&values).unwrap(),
            json!([10, 2.5, null, "x", true])
        );

        let parsed: Vec<ScalarValue> = serde_json::from_value(json!([1, "a", null])).unwrap();
        assert_eq!(
            parsed,
            vec![ScalarValue::Number(1.0), ScalarValue::from("a"), ScalarValue::Null]
        );
    }

    #[test]
    fn test_validation_codes() {
        assert_eq!(validation_type_code("list"), 3);
        assert_eq!(validation_type_code("textLength"), 6);
        assert_eq!(validation_type_code("bogus"), 0);
        assert_eq!(validation_type_name(3), "xlValidateList");
        assert_eq!(validation_type_name(42), "xlValidateInputOnly");
    }

    #[test]
    fn test_list_items_omitted_when_unresolved() {
        let record = ValidationRecord {
            kind: 3,
            type_name: validation_type_name(3).to_string(),
            formula1: Some("=Missing".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("list_items").is_none());
        assert_eq!(value["type"], json!(3));
        assert_eq!(value["type_name"], json!("xlValidateList"));
    }

    #[test]
    fn test_failed_sheet_shape() {
        let details = SheetDetails::failed("Broken", "sheet unreadable".to_string());
        assert_eq!(
            serde_json::to_value(&details).unwrap(),
            json!({
                "sheet": {"name": "Broken", "error": "sheet unreadable"},
                "cells": [],
                "tables": []
            })
        );
    }

    #[test]
    fn test_calculation_filter() {
        let mut record = CellRecord {
            value: ScalarValue::Number(0.0),
            ..Default::default()
        };
        assert!(!record.is_calculation());
        record.value = ScalarValue::Number(-1.0);
        assert!(record.is_calculation());
        record.value = ScalarValue::Null;
        record.formula = Some("=A1".to_string());
        assert!(record.is_calculation());
    }
}
