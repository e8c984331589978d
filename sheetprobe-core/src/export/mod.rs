//! Writing extraction results to disk

pub mod convert;
pub mod report;

pub use convert::{ConversionSummary, convert_document, convert_file, sanitize_filename};
pub use report::{Report, ReportFormat, render_text, write_json, write_report};
