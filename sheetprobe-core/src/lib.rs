//! sheetprobe: formula, value, format and validation extraction for spreadsheets
//!
//! Workbooks are read through a [`WorkbookBackend`]: either the file on disk
//! (OOXML metadata plus calamine) or a live spreadsheet application driven
//! through a bridge process. The [`Extractor`] walks sheets and cells and
//! produces serializable records; [`export`] turns them into reports and
//! per-sheet CSV/JSON files.

pub mod address;
pub mod backend;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod reader;
pub mod record;
pub mod resolver;

pub use backend::{BackendKind, FileBackend, LiveBackend, ListSource, WorkbookBackend};
pub use config::ProbeConfig;
pub use error::ExtractError;
pub use extract::Extractor;
pub use record::{CellRecord, FullDetailsReport, ScalarValue, ValidationRecord};
pub use resolver::resolve_list;
