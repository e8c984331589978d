//! Fatal errors that abort an extraction or conversion run

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("No sheets found in {}", .0.display())]
    NoSheets(PathBuf),

    #[error("Sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    #[error("Unsupported engine '{0}' (expected 'file' or 'live')")]
    UnsupportedEngine(String),
}
