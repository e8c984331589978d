//! Wire types for the automation bridge.
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.
//! Requests look like `{"id":1,"cmd":"cell_value","params":{...}}`, responses
//! like `{"id":1,"status":"ok","data":...}` or `{"id":1,"status":"error","message":"..."}`.

use serde::{Deserialize, Serialize};

/// A command sent to the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the bridge understands. Rows and columns are 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum Command {
    /// Start the application and open the workbook read-only.
    Open { path: String, visible: bool },
    SheetNames,
    ActiveSheet,
    UsedRange { sheet: String },
    SheetProperties { sheet: String },
    CellValue { sheet: String, row: u32, column: u32 },
    CellFormula { sheet: String, row: u32, column: u32 },
    /// Text as the application displays it
    CellText { sheet: String, row: u32, column: u32 },
    CellFormat { sheet: String, row: u32, column: u32 },
    CellHyperlink { sheet: String, row: u32, column: u32 },
    CellNote { sheet: String, row: u32, column: u32 },
    CellValidation { sheet: String, row: u32, column: u32 },
    /// Values of a rectangular range, flattened row-major
    RangeValues { sheet: String, range: String },
    Tables { sheet: String },
    Names,
    /// Evaluate an expression on a sheet; answers with the address of the resulting range
    Evaluate { sheet: String, expression: String },
    /// Close the workbook without saving and quit the application.
    Close,
}

/// A response from the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(default)]
        data: serde_json::Value,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// `cell_format` payload. Colors use the application's BGR integers and
/// alignments its numeric constants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CellFormatData {
    pub number_format: Option<String>,
    pub font_name: Option<String>,
    pub font_size: Option<f64>,
    pub font_bold: Option<bool>,
    pub font_italic: Option<bool>,
    pub font_color: Option<u32>,
    pub fill_color: Option<u32>,
    pub horizontal_alignment: Option<i64>,
    pub vertical_alignment: Option<i64>,
    pub locked: Option<bool>,
    pub formula_hidden: Option<bool>,
    pub merged: bool,
    pub merge_area: Option<String>,
}

/// `cell_validation` payload with the application's numeric codes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationData {
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default)]
    pub alert_style: Option<i64>,
    #[serde(default)]
    pub operator: Option<i64>,
    #[serde(default)]
    pub ignore_blank: Option<bool>,
    #[serde(default)]
    pub in_cell_dropdown: Option<bool>,
    #[serde(default)]
    pub formula1: Option<String>,
    #[serde(default)]
    pub formula2: Option<String>,
}

/// Name of an alignment constant
pub fn alignment_name(code: i64) -> Option<&'static str> {
    Some(match code {
        1 => "general",
        -4131 => "left",
        -4108 => "center",
        -4152 => "right",
        5 => "fill",
        -4130 => "justify",
        7 => "centerContinuous",
        -4117 => "distributed",
        -4160 => "top",
        -4107 => "bottom",
        _ => return None,
    })
}
