//! Backend driving the spreadsheet application through a bridge process.
//!
//! The bridge owns the application instance. The session opens the workbook on
//! construction and closes it on [`WorkbookBackend::close`] or, failing that,
//! when the backend is dropped.

use anyhow::Result;
use serde::de::DeserializeOwned;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use tracing::{debug, info, warn};

use super::protocol::{
    CellFormatData, Command, Request, Response, ResponseResult, ValidationData, alignment_name,
};
use super::{ListSource, WorkbookBackend};
use crate::address::{CellRange, quote_sheet_name};
use crate::config::BridgeConfig;
use crate::reader::{DefinedName, Rgb};
use crate::record::{
    ALERT_STYLES, FillColor, FormatInfo, HyperlinkRecord, NamedRangeRecord, ScalarValue,
    SheetInfo, TableRecord, VALIDATION_OPERATORS, ValidationRecord, validation_type_name,
};

/// Errors from the automation bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn bridge process '{program}': {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },

    #[error("Bridge process not running")]
    NotRunning,

    #[error("Failed to send command to bridge: {0}")]
    SendFailed(String),

    #[error("Failed to read response from bridge: {0}")]
    ReadFailed(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Bridge returned error: {0}")]
    Remote(String),

    #[error("Unexpected response from bridge (expected id {expected}, got {actual})")]
    UnexpectedResponse { expected: u64, actual: u64 },
}

pub struct LiveBackend<R: BufRead, W: Write> {
    reader: R,
    /// Dropped on close so the bridge sees end of input
    writer: Option<W>,
    child: Option<Child>,
    path: PathBuf,
    next_id: u64,
    open: bool,
}

impl LiveBackend<BufReader<ChildStdout>, ChildStdin> {
    /// Start the bridge process and open `path` in the application.
    pub fn spawn(config: &BridgeConfig, path: &Path) -> Result<Self> {
        let mut cmd = std::process::Command::new(&config.program);
        cmd.args(&config.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit()); // Bridge diagnostics go to our stderr

        let mut child = cmd.spawn().map_err(|source| BridgeError::SpawnFailed {
            program: config.program.clone(),
            source,
        })?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(BridgeError::NotRunning.into());
        };
        debug!("Spawned bridge '{}' (pid {})", config.program, child.id());

        let mut backend = Self::connect(BufReader::new(stdout), stdin, path);
        backend.child = Some(child);
        backend.open_session(config.visible)?;
        Ok(backend)
    }
}

impl<R: BufRead, W: Write> LiveBackend<R, W> {
    fn connect(reader: R, writer: W, path: &Path) -> Self {
        Self {
            reader,
            writer: Some(writer),
            child: None,
            path: path.to_path_buf(),
            next_id: 1,
            open: false,
        }
    }

    /// Open a session over an already-connected transport
    pub fn with_transport(reader: R, writer: W, path: &Path, visible: bool) -> Result<Self> {
        let mut backend = Self::connect(reader, writer, path);
        backend.open_session(visible)?;
        Ok(backend)
    }

    fn open_session(&mut self, visible: bool) -> Result<()> {
        let absolute = std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
        self.send(Command::Open {
            path: absolute.display().to_string(),
            visible,
        })?;
        self.open = true;
        info!("Opened {} in the live application", self.path.display());
        Ok(())
    }

    /// Send a command to the bridge and wait for the response.
    fn send(&mut self, command: Command) -> Result<serde_json::Value, BridgeError> {
        let id = self.next_id;
        self.next_id += 1;

        let writer = self.writer.as_mut().ok_or(BridgeError::NotRunning)?;
        let json = serde_json::to_string(&Request { id, command })?;
        writeln!(writer, "{json}").map_err(|e| BridgeError::SendFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| BridgeError::SendFailed(e.to_string()))?;

        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|e| BridgeError::ReadFailed(e.to_string()))?;
        if line.is_empty() {
            return Err(BridgeError::NotRunning);
        }

        let response: Response = serde_json::from_str(&line)?;
        if response.id != id {
            return Err(BridgeError::UnexpectedResponse {
                expected: id,
                actual: response.id,
            });
        }
        match response.result {
            ResponseResult::Ok { data } => Ok(data),
            ResponseResult::Error { message } => Err(BridgeError::Remote(message)),
        }
    }

    fn request<T: DeserializeOwned>(&mut self, command: Command) -> Result<T> {
        let data = self.send(command)?;
        Ok(serde_json::from_value(data).map_err(BridgeError::from)?)
    }
}

/// Map a 1-based application code into a name table
fn code_name(table: &[&str], code: i64) -> Option<String> {
    usize::try_from(code - 1)
        .ok()
        .and_then(|i| table.get(i))
        .map(|s| s.to_string())
}

impl From<CellFormatData> for FormatInfo {
    fn from(data: CellFormatData) -> Self {
        FormatInfo {
            number_format: data.number_format,
            font_name: data.font_name,
            font_size: data.font_size,
            font_bold: data.font_bold,
            font_italic: data.font_italic,
            font_color_rgb: data.font_color.map(Rgb::from_bgr),
            fill_color: data.fill_color.map(|bgr| FillColor {
                excel_bgr: bgr,
                rgb: Rgb::from_bgr(bgr),
            }),
            horizontal_alignment: data
                .horizontal_alignment
                .and_then(alignment_name)
                .map(String::from),
            vertical_alignment: data
                .vertical_alignment
                .and_then(alignment_name)
                .map(String::from),
            locked: data.locked,
            formula_hidden: data.formula_hidden,
            merged: data.merged,
            merge_area: data.merge_area.filter(|_| data.merged),
        }
    }
}

impl From<ValidationData> for ValidationRecord {
    fn from(data: ValidationData) -> Self {
        let kind = u8::try_from(data.kind).ok().filter(|k| *k <= 7).unwrap_or(0);
        ValidationRecord {
            kind,
            type_name: validation_type_name(kind).to_string(),
            alert_style: data.alert_style.and_then(|c| code_name(&ALERT_STYLES, c)),
            operator: data.operator.and_then(|c| code_name(&VALIDATION_OPERATORS, c)),
            ignore_blank: data.ignore_blank,
            in_cell_dropdown: data.in_cell_dropdown,
            formula1: data.formula1,
            formula2: data.formula2,
            list_items: None,
        }
    }
}

impl<R: BufRead, W: Write> ListSource for LiveBackend<R, W> {
    fn range_values(&mut self, sheet: &str, range: &CellRange) -> Result<Vec<ScalarValue>> {
        // Whole-column and whole-row references stop at the used range
        let Some(bounded) = self.used_range(sheet)?.and_then(|used| range.intersect(&used)) else {
            return Ok(Vec::new());
        };
        self.request(Command::RangeValues {
            sheet: sheet.to_string(),
            range: bounded.address(),
        })
    }

    fn table_column_values(
        &mut self,
        table: &str,
        column: &str,
    ) -> Result<Option<Vec<ScalarValue>>> {
        for sheet in self.sheet_names()? {
            let tables = self.tables(&sheet)?;
            let Some(found) = tables.iter().find(|t| t.name.eq_ignore_ascii_case(table)) else {
                continue;
            };
            let Some(index) = found
                .columns
                .iter()
                .position(|c| c == column)
                .or_else(|| found.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))
            else {
                return Ok(None);
            };
            let Some(body) = found.data_body_range.as_deref().and_then(CellRange::parse) else {
                return Ok(Some(Vec::new()));
            };
            let col = body.start_col + index as u32;
            let column_range = CellRange::new(body.start_row, col, body.end_row, col);
            return self.range_values(&sheet, &column_range).map(Some);
        }
        Ok(None)
    }

    fn defined_names(&mut self) -> Result<Vec<DefinedName>> {
        let names: Vec<NamedRangeRecord> = self.request(Command::Names)?;
        Ok(names
            .into_iter()
            .filter(|n| !n.name.starts_with("_xlnm."))
            .map(|n| DefinedName {
                name: n.name,
                refers_to: n.refers_to.trim_start_matches('=').to_string(),
            })
            .collect())
    }

    fn evaluate_reference(&mut self, sheet: &str, expression: &str) -> Result<Option<String>> {
        let address: Option<String> = self.request(Command::Evaluate {
            sheet: sheet.to_string(),
            expression: expression.to_string(),
        })?;
        // An unqualified address belongs to the sheet it was evaluated on
        Ok(address.map(|a| {
            if a.contains('!') {
                a
            } else {
                format!("{}!{}", quote_sheet_name(sheet), a)
            }
        }))
    }
}

impl<R: BufRead, W: Write> WorkbookBackend for LiveBackend<R, W> {
    fn file_path(&self) -> &Path {
        &self.path
    }

    fn sheet_names(&mut self) -> Result<Vec<String>> {
        self.request(Command::SheetNames)
    }

    fn active_sheet(&mut self) -> Result<String> {
        self.request(Command::ActiveSheet)
    }

    fn sheet_info(&mut self, sheet: &str) -> Result<SheetInfo> {
        self.request(Command::SheetProperties {
            sheet: sheet.to_string(),
        })
    }

    fn used_range(&mut self, sheet: &str) -> Result<Option<CellRange>> {
        let address: Option<String> = self.request(Command::UsedRange {
            sheet: sheet.to_string(),
        })?;
        Ok(address.as_deref().and_then(CellRange::parse))
    }

    fn cell_value(&mut self, sheet: &str, row: u32, col: u32) -> Result<ScalarValue> {
        self.request(Command::CellValue {
            sheet: sheet.to_string(),
            row,
            column: col,
        })
    }

    fn cell_formula(&mut self, sheet: &str, row: u32, col: u32) -> Result<Option<String>> {
        let command = Command::CellFormula {
            sheet: sheet.to_string(),
            row,
            column: col,
        };
        let formula: Option<String> = self.request(command)?;
        Ok(formula.filter(|f| f.starts_with('=')))
    }

    fn cell_display_text(&mut self, sheet: &str, row: u32, col: u32) -> Result<Option<String>> {
        let command = Command::CellText {
            sheet: sheet.to_string(),
            row,
            column: col,
        };
        self.request(command)
    }

    fn cell_format(&mut self, sheet: &str, row: u32, col: u32) -> Result<FormatInfo> {
        let command = Command::CellFormat {
            sheet: sheet.to_string(),
            row,
            column: col,
        };
        let data: CellFormatData = self.request(command)?;
        Ok(data.into())
    }

    fn cell_hyperlink(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
    ) -> Result<Option<HyperlinkRecord>> {
        let command = Command::CellHyperlink {
            sheet: sheet.to_string(),
            row,
            column: col,
        };
        self.request(command)
    }

    fn cell_note(&mut self, sheet: &str, row: u32, col: u32) -> Result<Option<String>> {
        let command = Command::CellNote {
            sheet: sheet.to_string(),
            row,
            column: col,
        };
        self.request(command)
    }

    fn cell_validation(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
    ) -> Result<Option<ValidationRecord>> {
        let command = Command::CellValidation {
            sheet: sheet.to_string(),
            row,
            column: col,
        };
        let data: Option<ValidationData> = self.request(command)?;
        Ok(data.map(ValidationRecord::from))
    }

    fn tables(&mut self, sheet: &str) -> Result<Vec<TableRecord>> {
        self.request(Command::Tables {
            sheet: sheet.to_string(),
        })
    }

    fn close(&mut self) -> Result<()> {
        let result = if self.open {
            self.open = false;
            self.send(Command::Close)
                .map(|_| info!("Closed {} in the live application", self.path.display()))
        } else {
            Ok(())
        };
        self.writer = None;
        if let Some(mut child) = self.child.take() {
            if result.is_err() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
        Ok(result?)
    }
}

impl<R: BufRead, W: Write> Drop for LiveBackend<R, W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close live session: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::cell::{Cell, RefCell};
    use std::io::Cursor;
    use std::rc::Rc;

    /// Scripted bridge: each response line answers the request with the same position
    fn scripted(responses: &[Value]) -> Cursor<Vec<u8>> {
        let mut script = String::new();
        for (i, data) in responses.iter().enumerate() {
            let line = if let Some(message) = data.get("__error") {
                json!({"id": i + 1, "status": "error", "message": message})
            } else {
                json!({"id": i + 1, "status": "ok", "data": data})
            };
            script.push_str(&line.to_string());
            script.push('\n');
        }
        Cursor::new(script.into_bytes())
    }

    fn sent(writer: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(writer)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_open_and_close_session() {
        let mut writer = Vec::new();
        {
            let mut backend = LiveBackend::with_transport(
                scripted(&[Value::Null, json!(["Data", "Lists"]), Value::Null]),
                &mut writer,
                Path::new("book.xlsx"),
                false,
            )
            .unwrap();
            assert_eq!(backend.sheet_names().unwrap(), vec!["Data", "Lists"]);
            backend.close().unwrap();
            // Second close sends nothing
            backend.close().unwrap();
        }
        let requests = sent(&writer);
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0]["cmd"], json!("open"));
        assert_eq!(requests[0]["params"]["visible"], json!(false));
        assert_eq!(requests[1]["cmd"], json!("sheet_names"));
        assert_eq!(requests[2]["cmd"], json!("close"));
    }

    #[test]
    fn test_drop_closes_session() {
        let mut writer = Vec::new();
        {
            let _backend = LiveBackend::with_transport(
                scripted(&[Value::Null, Value::Null]),
                &mut writer,
                Path::new("book.xlsx"),
                true,
            )
            .unwrap();
        }
        let requests = sent(&writer);
        assert_eq!(requests.last().unwrap()["cmd"], json!("close"));
    }

    #[test]
    fn test_open_failure_is_reported() {
        let mut writer = Vec::new();
        let result = LiveBackend::with_transport(
            scripted(&[json!({"__error": "file is locked"})]),
            &mut writer,
            Path::new("book.xlsx"),
            false,
        );
        let err = result.err().unwrap();
        assert!(err.to_string().contains("file is locked"));
    }

    #[test]
    fn test_validation_codes_are_named() {
        let mut writer = Vec::new();
        {
            let mut backend = LiveBackend::with_transport(
                scripted(&[
                    Value::Null,
                    json!({"type": 3, "alert_style": 1, "operator": 1, "ignore_blank": true,
                           "in_cell_dropdown": true, "formula1": "=Lists!$A$1:$A$3"}),
                    Value::Null,
                ]),
                &mut writer,
                Path::new("book.xlsx"),
                false,
            )
            .unwrap();
            let validation = backend.cell_validation("Data", 2, 2).unwrap().unwrap();
            assert_eq!(validation.kind, 3);
            assert_eq!(validation.type_name, "xlValidateList");
            assert_eq!(validation.alert_style.as_deref(), Some("stop"));
            assert_eq!(validation.operator.as_deref(), Some("between"));
            backend.close().unwrap();
        }

        let requests = sent(&writer);
        assert_eq!(
            requests[1]["params"],
            json!({"sheet": "Data", "row": 2, "column": 2})
        );
    }

    #[test]
    fn test_format_and_evaluate() {
        let mut writer = Vec::new();
        let mut backend = LiveBackend::with_transport(
            scripted(&[
                Value::Null,
                json!({"number_format": "General", "fill_color": 65535,
                       "horizontal_alignment": -4108, "merged": false, "merge_area": "$A$1:$B$1"}),
                json!("$A$1:$A$3"),
                Value::Null,
                Value::Null,
            ]),
            &mut writer,
            Path::new("book.xlsx"),
            false,
        )
        .unwrap();

        let format = backend.cell_format("My Data", 1, 1).unwrap();
        let fill = format.fill_color.unwrap();
        assert_eq!(fill.rgb, Rgb { r: 255, g: 255, b: 0 });
        assert_eq!(format.horizontal_alignment.as_deref(), Some("center"));
        assert_eq!(format.merge_area, None);

        assert_eq!(
            backend.evaluate_reference("My Data", "OFFSET(A1,0,0,3,1)").unwrap().as_deref(),
            Some("'My Data'!$A$1:$A$3")
        );
        assert_eq!(backend.evaluate_reference("My Data", "1+1").unwrap(), None);
        backend.close().unwrap();
    }

    #[test]
    fn test_closed_pipe_is_not_running() {
        let mut writer = Vec::new();
        let mut backend = LiveBackend::with_transport(
            scripted(&[Value::Null]),
            &mut writer,
            Path::new("book.xlsx"),
            false,
        )
        .unwrap();
        let err = backend.sheet_names().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BridgeError>(),
            Some(BridgeError::NotRunning)
        ));
        // Close fails on the dead pipe but leaves the backend closed
        assert!(backend.close().is_err());
        assert!(backend.close().is_ok());
    }

    /// Writer that records when the backend lets go of it
    struct TrackedWriter {
        buf: Rc<RefCell<Vec<u8>>>,
        released: Rc<Cell<bool>>,
    }

    impl Write for TrackedWriter {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.buf.borrow_mut().write(data)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Drop for TrackedWriter {
        fn drop(&mut self) {
            self.released.set(true);
        }
    }

    #[test]
    fn test_failed_close_releases_input() {
        let buf = Rc::new(RefCell::new(Vec::new()));
        let released = Rc::new(Cell::new(false));
        let writer = TrackedWriter {
            buf: Rc::clone(&buf),
            released: Rc::clone(&released),
        };
        let mut backend = LiveBackend::with_transport(
            scripted(&[Value::Null, json!({"__error": "busy"})]),
            writer,
            Path::new("book.xlsx"),
            false,
        )
        .unwrap();

        let err = backend.close().unwrap_err();
        assert!(err.to_string().contains("busy"));
        assert!(released.get());
        drop(backend);

        let requests = sent(&buf.borrow());
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1]["cmd"], json!("close"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_close_with_running_bridge_terminates() {
        let script = concat!(
            "read line; echo '{\"id\":1,\"status\":\"ok\",\"data\":null}'; ",
            "read line; echo '{\"id\":2,\"status\":\"error\",\"message\":\"busy\"}'; ",
            "cat >/dev/null"
        );
        let config = BridgeConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            visible: false,
        };
        let mut backend = LiveBackend::spawn(&config, Path::new("book.xlsx")).unwrap();
        assert!(backend.close().is_err());
        assert!(backend.child.is_none());
        drop(backend);
    }

    #[test]
    fn test_whole_column_source_is_clamped() {
        let mut writer = Vec::new();
        {
            let mut backend = LiveBackend::with_transport(
                scripted(&[
                    Value::Null,
                    json!("A1:C4"),
                    json!(["Red", "", "Blue", null]),
                    Value::Null,
                ]),
                &mut writer,
                Path::new("book.xlsx"),
                false,
            )
            .unwrap();
            assert_eq!(
                crate::resolver::resolve_list(&mut backend, "Data", Some("=Lists!$A:$A")),
                Some(vec![ScalarValue::from("Red"), ScalarValue::from("Blue")])
            );
            backend.close().unwrap();
        }
        let requests = sent(&writer);
        assert_eq!(requests[1]["cmd"], json!("used_range"));
        assert_eq!(requests[1]["params"]["sheet"], json!("Lists"));
        assert_eq!(
            requests[2]["params"],
            json!({"sheet": "Lists", "range": "A1:A4"})
        );
    }
}
