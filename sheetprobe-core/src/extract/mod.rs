//! Sheet and workbook walking

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing::{debug, info, warn};

pub mod cell;
pub mod dependencies;

pub use cell::extract_cell;
pub use dependencies::{extract_dependencies, parse_dependencies};

use crate::address::{CellRange, MAX_COLUMNS, MAX_ROWS, parse_cell_ref};
use crate::backend::{self, BackendKind, WorkbookBackend};
use crate::config::BridgeConfig;
use crate::error::ExtractError;
use crate::record::{
    AllSheetsFormulaReport, CellRecord, DependencyReport, FormulaReport, FullDetailsReport,
    NamedRangeRecord, RangeReport, SheetDetails, SheetDetailsReport, SheetMeta, WorkbookDetails,
    WorksheetInfo,
};

/// Local time with microseconds and no offset
pub fn extraction_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Main extraction interface over one open workbook session
pub struct Extractor {
    backend: Box<dyn WorkbookBackend>,
}

impl Extractor {
    /// Open `path` with the requested backend
    pub fn open(path: &Path, kind: BackendKind, bridge: &BridgeConfig) -> Result<Self> {
        if !path.is_file() {
            return Err(ExtractError::FileNotFound(path.to_path_buf()).into());
        }
        let backend = backend::open_backend(kind, path, bridge)
            .with_context(|| format!("Failed to open {} with the {} backend", path.display(), kind))?;
        info!("Opened {} ({} backend)", path.display(), kind);
        Ok(Self::new(backend))
    }

    pub fn new(backend: Box<dyn WorkbookBackend>) -> Self {
        Self { backend }
    }

    pub fn file_path(&self) -> String {
        self.backend.file_path().display().to_string()
    }

    /// The named sheet, or the active one when no name is given
    pub fn resolve_sheet(&mut self, sheet: Option<&str>) -> Result<String> {
        match sheet {
            Some(name) => {
                if self.backend.sheet_names()?.iter().any(|s| s == name) {
                    Ok(name.to_string())
                } else {
                    Err(ExtractError::SheetNotFound(name.to_string()).into())
                }
            }
            None => self.backend.active_sheet(),
        }
    }

    pub fn worksheet_info(&mut self, sheet: Option<&str>) -> Result<WorksheetInfo> {
        let name = self.resolve_sheet(sheet)?;
        let used = self.backend.used_range(&name)?;
        let rows = used.map(|r| r.rows()).unwrap_or(0);
        let columns = used.map(|r| r.columns()).unwrap_or(0);
        Ok(WorksheetInfo {
            sheet_name: name,
            used_range: used.map(|r| r.address()),
            rows,
            columns,
            total_cells: rows as u64 * columns as u64,
        })
    }

    pub fn extract_cell(&mut self, sheet: &str, row: u32, col: u32) -> CellRecord {
        cell::extract_cell(self.backend.as_mut(), sheet, row, col)
    }

    /// Records of every cell in `range` that holds a formula or a nonzero number
    fn calculation_cells(&mut self, sheet: &str, range: &CellRange) -> Vec<CellRecord> {
        range
            .positions()
            .map(|(row, col)| self.extract_cell(sheet, row, col))
            .filter(CellRecord::is_calculation)
            .collect()
    }

    /// Formula cells of one sheet
    pub fn extract_all_formulas(&mut self, sheet: Option<&str>) -> Result<FormulaReport> {
        let info = self.worksheet_info(sheet)?;
        let formulas = match info.used_range.as_deref().and_then(CellRange::parse) {
            Some(used) => self.calculation_cells(&info.sheet_name, &used),
            None => Vec::new(),
        };
        debug!("{}: {} formula cells", info.sheet_name, formulas.len());
        Ok(FormulaReport {
            file_path: self.file_path(),
            extraction_timestamp: extraction_timestamp(),
            total_formulas_found: formulas.len(),
            worksheet_info: info,
            formulas,
        })
    }

    /// Formula cells of every sheet; unreadable sheets are skipped
    pub fn extract_all_sheets_formulas(&mut self) -> Result<AllSheetsFormulaReport> {
        let mut sheets = Vec::new();
        for name in self.backend.sheet_names()? {
            match self.extract_all_formulas(Some(name.as_str())) {
                Ok(report) => sheets.push(report),
                Err(e) => warn!("Skipping sheet '{}': {e:#}", name),
            }
        }
        Ok(AllSheetsFormulaReport {
            file_path: self.file_path(),
            extraction_timestamp: extraction_timestamp(),
            sheets,
        })
    }

    /// Formula cells within an explicit range (`A1:D10` or a single cell)
    pub fn extract_range(&mut self, sheet: Option<&str>, range: &str) -> Result<RangeReport> {
        let name = self.resolve_sheet(sheet)?;
        let requested =
            CellRange::parse(range).ok_or_else(|| anyhow!("Invalid range '{}'", range))?;
        // Whole rows and columns only reach as far as the used range
        let bounded = if requested.end_row == MAX_ROWS || requested.end_col == MAX_COLUMNS {
            self.backend
                .used_range(&name)?
                .and_then(|used| requested.intersect(&used))
        } else {
            Some(requested)
        };
        let formulas = match bounded {
            Some(r) => self.calculation_cells(&name, &r),
            None => Vec::new(),
        };
        Ok(RangeReport {
            file_path: self.file_path(),
            extraction_timestamp: extraction_timestamp(),
            sheet_name: name,
            range: requested.address(),
            total_formulas_found: formulas.len(),
            formulas,
        })
    }

    pub fn extract_dependencies(
        &mut self,
        sheet: Option<&str>,
        address: &str,
    ) -> Result<DependencyReport> {
        let name = self.resolve_sheet(sheet)?;
        let (row, col) =
            parse_cell_ref(address).ok_or_else(|| anyhow!("Invalid cell address '{}'", address))?;
        Ok(dependencies::extract_dependencies(
            self.backend.as_mut(),
            &name,
            address,
            row,
            col,
        ))
    }

    /// Every cell, plus sheet and table metadata. A failing sheet yields a degraded record.
    pub fn sheet_details(&mut self, name: &str) -> SheetDetails {
        match self.try_sheet_details(name) {
            Ok(details) => details,
            Err(e) => {
                warn!("Sheet '{}' degraded: {e:#}", name);
                SheetDetails::failed(name, format!("{e:#}"))
            }
        }
    }

    fn try_sheet_details(&mut self, name: &str) -> Result<SheetDetails> {
        let info = self.backend.sheet_info(name)?;
        let used = self.backend.used_range(name)?;
        let cells = match used {
            Some(range) => range
                .positions()
                .map(|(row, col)| self.extract_cell(name, row, col))
                .collect(),
            None => Vec::new(),
        };
        let tables = self.backend.tables(name).unwrap_or_else(|e| {
            warn!("Sheet '{}': tables unavailable: {e:#}", name);
            Vec::new()
        });
        Ok(SheetDetails {
            sheet: SheetMeta::Loaded(info),
            cells,
            tables,
        })
    }

    pub fn extract_sheet_full_details(&mut self, sheet: Option<&str>) -> Result<SheetDetailsReport> {
        let name = self.resolve_sheet(sheet)?;
        Ok(SheetDetailsReport {
            file_path: self.file_path(),
            extraction_timestamp: extraction_timestamp(),
            details: self.sheet_details(&name),
        })
    }

    pub fn extract_workbook_full_details(&mut self) -> Result<FullDetailsReport> {
        let names = self.backend.sheet_names()?;
        let sheets: Vec<SheetDetails> = names.iter().map(|name| self.sheet_details(name)).collect();
        let degraded = sheets
            .iter()
            .filter(|s| matches!(s.sheet, SheetMeta::Failed { .. }))
            .count();
        if degraded > 0 {
            warn!("{} of {} sheets could not be read", degraded, sheets.len());
        }

        let named_ranges = self
            .backend
            .defined_names()
            .unwrap_or_else(|e| {
                warn!("Named ranges unavailable: {e:#}");
                Vec::new()
            })
            .into_iter()
            .map(|n| NamedRangeRecord {
                name: n.name,
                refers_to: format!("={}", n.refers_to),
            })
            .collect();

        Ok(FullDetailsReport {
            file_path: self.file_path(),
            extraction_timestamp: extraction_timestamp(),
            workbook: WorkbookDetails {
                sheet_count: names.len(),
                sheets,
                names: named_ranges,
            },
        })
    }

    /// End the session
    pub fn close(mut self) -> Result<()> {
        self.backend.close()
    }
}
