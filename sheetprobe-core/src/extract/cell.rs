//! Per-cell record assembly

use anyhow::Result;
use tracing::debug;

use crate::address::{cell_address, column_to_letter};
use crate::backend::WorkbookBackend;
use crate::record::{CellRecord, ScalarValue};
use crate::resolver::resolve_list;

/// A field that failed to load is reported as absent
fn field<T>(result: Result<T>, name: &str, sheet: &str, address: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("{}!{}: {} unavailable: {e:#}", sheet, address, name);
            None
        }
    }
}

/// Build the record of one cell. Never fails: every field degrades on its own.
pub fn extract_cell<B: WorkbookBackend + ?Sized>(
    backend: &mut B,
    sheet: &str,
    row: u32,
    col: u32,
) -> CellRecord {
    let address = cell_address(row, col);

    let formula = field(backend.cell_formula(sheet, row, col), "formula", sheet, &address).flatten();
    let value = if formula.is_some() {
        ScalarValue::Null
    } else {
        field(backend.cell_value(sheet, row, col), "value", sheet, &address).unwrap_or_default()
    };
    let display_text = field(
        backend.cell_display_text(sheet, row, col),
        "display text",
        sheet,
        &address,
    )
    .flatten();
    let format = field(backend.cell_format(sheet, row, col), "format", sheet, &address);
    let hyperlink =
        field(backend.cell_hyperlink(sheet, row, col), "hyperlink", sheet, &address).flatten();
    let note = field(backend.cell_note(sheet, row, col), "note", sheet, &address).flatten();

    let mut data_validation = field(
        backend.cell_validation(sheet, row, col),
        "validation",
        sheet,
        &address,
    )
    .flatten();
    if let Some(validation) = data_validation.as_mut()
        && validation.is_list()
    {
        validation.list_items = resolve_list(backend, sheet, validation.formula1.as_deref());
    }

    CellRecord {
        address,
        row,
        column: col,
        column_letter: column_to_letter(col),
        value,
        formula,
        display_text,
        format,
        hyperlink,
        note,
        data_validation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileBackend;
    use crate::backend::file::tests::sample_workbook;

    #[test]
    fn test_formula_cell_suppresses_value() {
        let mut backend = FileBackend::from_workbook(sample_workbook());
        let record = extract_cell(&mut backend, "Data", 4, 1);
        assert_eq!(record.address, "A4");
        assert_eq!(record.column_letter, "A");
        assert_eq!(record.formula.as_deref(), Some("=SUM(A2:A3)"));
        assert_eq!(record.value, ScalarValue::Null);
        assert_eq!(record.format.unwrap().font_name.as_deref(), Some("Arial"));
    }

    #[test]
    fn test_list_validation_is_resolved() {
        let mut backend = FileBackend::from_workbook(sample_workbook());
        let record = extract_cell(&mut backend, "Data", 2, 2);
        assert_eq!(record.value, ScalarValue::from("Red"));
        let validation = record.data_validation.unwrap();
        assert_eq!(
            validation.list_items,
            Some(vec![
                ScalarValue::from("Red"),
                ScalarValue::from("Blue"),
                ScalarValue::Number(7.0)
            ])
        );

        // Non-list rules never carry items
        let whole = extract_cell(&mut backend, "Data", 2, 1).data_validation.unwrap();
        assert_eq!(whole.list_items, None);
    }

    #[test]
    fn test_inaccessible_sheet_degrades_every_field() {
        let mut backend = FileBackend::from_workbook(sample_workbook());
        let record = extract_cell(&mut backend, "Missing", 1, 1);
        assert_eq!(record.address, "A1");
        assert_eq!(record.value, ScalarValue::Null);
        assert!(record.formula.is_none());
        assert!(record.format.is_none());
        assert!(record.data_validation.is_none());
    }
}
