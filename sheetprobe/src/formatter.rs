//! Console summaries of extraction results

use colored::*;
use sheetprobe_core::export::Report;
use sheetprobe_core::record::{DependencyReport, SheetDetails, SheetMeta};
use std::path::Path;

/// Print a short colored summary of what was extracted and where it went
pub fn print_summary(file_path: &Path, report: &Report, output: &Path) {
    println!("{}", format!("Workbook: {}", file_path.display()).bold());

    match report {
        Report::Formulas(r) => {
            println!(
                "  {} {} ({} formulas)",
                "Sheet:".bold(),
                r.worksheet_info.sheet_name.cyan(),
                r.total_formulas_found
            );
        }
        Report::AllSheets(r) => {
            for sheet in &r.sheets {
                println!(
                    "  {} {} ({} formulas)",
                    "Sheet:".bold(),
                    sheet.worksheet_info.sheet_name.cyan(),
                    sheet.total_formulas_found
                );
            }
        }
        Report::Range(r) => {
            println!(
                "  {} {}!{} ({} formulas)",
                "Range:".bold(),
                r.sheet_name.cyan(),
                r.range.yellow(),
                r.total_formulas_found
            );
        }
        Report::Dependencies(DependencyReport::Found {
            cell_address,
            dependencies,
            ..
        }) => {
            println!(
                "  {} {} ({} dependencies)",
                "Cell:".bold(),
                cell_address.yellow(),
                dependencies.len()
            );
        }
        Report::Dependencies(DependencyReport::NoFormula { error }) => {
            println!("  {} {}", "WARN".yellow().bold(), error);
        }
        Report::SheetDetails(r) => print_sheet(&r.details),
        Report::WorkbookDetails(r) => {
            r.workbook.sheets.iter().for_each(print_sheet);
            if !r.workbook.names.is_empty() {
                println!("  {} {}", "Named ranges:".bold(), r.workbook.names.len());
            }
        }
    }

    println!();
    println!("{}", "✓ Extraction completed successfully!".green().bold());
    println!("Output file: {}", output.display());
}

fn print_sheet(details: &SheetDetails) {
    match &details.sheet {
        SheetMeta::Loaded(info) => {
            let dropdowns = details
                .cells
                .iter()
                .filter(|c| c.data_validation.as_ref().is_some_and(|v| v.is_list()))
                .count();
            println!(
                "  {} {} [{}] {} cells, {} tables, {} dropdowns",
                "Sheet:".bold(),
                info.name.cyan(),
                info.used_range.as_deref().unwrap_or("empty").bright_black(),
                details.cells.len(),
                details.tables.len(),
                dropdowns
            );
        }
        SheetMeta::Failed { name, error } => {
            println!(
                "  {} {} {}",
                "Sheet:".bold(),
                name.cyan(),
                format!("unreadable: {}", error).red()
            );
        }
    }
}
