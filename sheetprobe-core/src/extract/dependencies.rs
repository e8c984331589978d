//! Lexical formula dependency scan

use std::collections::BTreeMap;

use crate::address::parse_cell_ref;
use crate::backend::WorkbookBackend;
use crate::record::{DependencyReport, DependencyValue};

/// Cell-reference tokens of a formula, sorted and deduplicated.
///
/// Purely lexical: `A1:B2` gives `A1` and `B2`, `Sheet1!A1` gives `A1`.
pub fn parse_dependencies(formula: &str) -> Vec<String> {
    thread_local! {
        static RE: regex::Regex =
            regex::Regex::new(r"[A-Z]+\d+").expect("dependency pattern is valid");
    }
    let mut deps: Vec<String> =
        RE.with(|re| re.find_iter(formula).map(|m| m.as_str().to_string()).collect());
    deps.sort();
    deps.dedup();
    deps
}

/// Dependencies of the formula in `address` with the current value of each
pub fn extract_dependencies<B: WorkbookBackend + ?Sized>(
    backend: &mut B,
    sheet: &str,
    address: &str,
    row: u32,
    col: u32,
) -> DependencyReport {
    let Ok(Some(formula)) = backend.cell_formula(sheet, row, col) else {
        return DependencyReport::NoFormula {
            error: "Cell does not contain a formula".to_string(),
        };
    };

    let dependencies = parse_dependencies(&formula);
    let mut dependent_values = BTreeMap::new();
    for dep in &dependencies {
        let entry = match parse_cell_ref(dep) {
            Some((r, c)) => match (backend.cell_value(sheet, r, c), backend.cell_formula(sheet, r, c)) {
                (Ok(value), Ok(formula)) => DependencyValue::Resolved {
                    value,
                    formula,
                    address: dep.clone(),
                },
                _ => inaccessible(),
            },
            // Tokens like LOG10 fall outside the grid
            None => inaccessible(),
        };
        dependent_values.insert(dep.clone(), entry);
    }

    DependencyReport::Found {
        cell_address: address.to_string(),
        calculated_value: backend.cell_value(sheet, row, col).unwrap_or_default(),
        formula,
        dependencies,
        dependent_values,
    }
}

fn inaccessible() -> DependencyValue {
    DependencyValue::Inaccessible {
        error: "Could not access cell".to_string(),
    }
}
