//! Data-validation list resolution
//!
//! A list validation's source is classified once, then fetched through the
//! matching handler. Classification is an ordered table: the first classifier
//! that accepts the normalized source decides its kind.

use anyhow::Result;
use tracing::debug;

use crate::address::{CellRange, split_sheet_reference};
use crate::backend::ListSource;
use crate::record::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Literal,
    RangeRef,
    NamedRange,
    TableColumn,
    Unresolved,
}

/// A validation source with its `=`, `INDIRECT("...")` and quote wrapping removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    /// The source was a double-quoted string
    pub quoted: bool,
}

pub fn normalize(source: &str) -> Normalized {
    let mut text = source.trim();
    text = text.strip_prefix('=').unwrap_or(text).trim();

    // INDIRECT("Table1[Col]") is how structured references reach a validation rule
    if let Some(prefix) = text.get(..9)
        && prefix.eq_ignore_ascii_case("INDIRECT(")
        && text.ends_with(')')
    {
        text = text[9..text.len() - 1].trim();
    }

    let quoted = text.len() >= 2 && text.starts_with('"') && text.ends_with('"');
    if quoted {
        text = &text[1..text.len() - 1];
    }
    Normalized {
        text: text.to_string(),
        quoted,
    }
}

type Classifier = fn(&Normalized) -> bool;

fn is_table_column(n: &Normalized) -> bool {
    n.text.contains('[') && n.text.contains(']')
}

fn is_literal(n: &Normalized) -> bool {
    n.quoted || (n.text.contains(',') && !n.text.contains(['!', ':', '[']))
}

fn is_range_ref(n: &Normalized) -> bool {
    n.text.contains(['!', ':'])
}

fn is_named_range(n: &Normalized) -> bool {
    !n.text.trim().is_empty()
}

/// Priority order. Brackets are checked before the comma-literal test so
/// `A,B[C]` is a table column.
const CLASSIFIERS: &[(ReferenceKind, Classifier)] = &[
    (ReferenceKind::TableColumn, is_table_column),
    (ReferenceKind::Literal, is_literal),
    (ReferenceKind::RangeRef, is_range_ref),
    (ReferenceKind::NamedRange, is_named_range),
];

pub fn classify(normalized: &Normalized) -> ReferenceKind {
    CLASSIFIERS
        .iter()
        .find(|(_, accepts)| accepts(normalized))
        .map(|(kind, _)| *kind)
        .unwrap_or(ReferenceKind::Unresolved)
}

/// Resolve a list validation source to its items.
///
/// `None` means the list could not be resolved; `Some(vec![])` means it
/// resolved to nothing. Blank cells are dropped from range-backed lists.
pub fn resolve_list<S: ListSource + ?Sized>(
    source: &mut S,
    current_sheet: &str,
    formula: Option<&str>,
) -> Option<Vec<ScalarValue>> {
    let normalized = normalize(formula?);
    let kind = classify(&normalized);
    let result = match kind {
        ReferenceKind::Literal => Ok(Some(resolve_literal(&normalized.text))),
        ReferenceKind::TableColumn => resolve_table_column(source, &normalized.text),
        ReferenceKind::RangeRef => resolve_range(source, current_sheet, &normalized.text),
        ReferenceKind::NamedRange => resolve_named(source, current_sheet, &normalized.text),
        ReferenceKind::Unresolved => Ok(None),
    };
    match result {
        Ok(items) => items,
        Err(e) => {
            debug!("List source '{}' ({:?}) unresolved: {e:#}", normalized.text, kind);
            None
        }
    }
}

fn resolve_literal(text: &str) -> Vec<ScalarValue> {
    text.split(',')
        .map(|item| ScalarValue::Text(item.trim().to_string()))
        .collect()
}

/// Split `Table[Column]` (also `Table[[#Data],[Column]]`)
fn parse_structured_reference(text: &str) -> Option<(&str, &str)> {
    let open = text.find('[')?;
    let close = text.rfind(']')?;
    if close <= open {
        return None;
    }
    let table = text[..open].trim();
    let inner = &text[open + 1..close];
    let column = inner
        .rsplit('[')
        .next()
        .unwrap_or(inner)
        .trim_end_matches(']')
        .trim();
    (!table.is_empty() && !column.is_empty()).then_some((table, column))
}

/// No fall-through: a missing table or column leaves the list unresolved
fn resolve_table_column<S: ListSource + ?Sized>(
    source: &mut S,
    text: &str,
) -> Result<Option<Vec<ScalarValue>>> {
    let Some((table, column)) = parse_structured_reference(text) else {
        return Ok(None);
    };
    Ok(source
        .table_column_values(table, column)?
        .map(drop_blanks))
}

fn resolve_range<S: ListSource + ?Sized>(
    source: &mut S,
    current_sheet: &str,
    reference: &str,
) -> Result<Option<Vec<ScalarValue>>> {
    let (sheet, address) = split_sheet_reference(reference);
    let Some(range) = CellRange::parse(address) else {
        return Ok(None);
    };
    let sheet = sheet.as_deref().unwrap_or(current_sheet);
    Ok(Some(drop_blanks(source.range_values(sheet, &range)?)))
}

/// Names compare case-insensitively with whitespace removed
fn name_key(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn looks_like_reference(target: &str) -> bool {
    let (_, address) = split_sheet_reference(target);
    CellRange::parse(address).is_some()
}

fn resolve_named<S: ListSource + ?Sized>(
    source: &mut S,
    current_sheet: &str,
    text: &str,
) -> Result<Option<Vec<ScalarValue>>> {
    let key = name_key(text);
    let target = source
        .defined_names()?
        .into_iter()
        .find(|n| name_key(&n.name) == key)
        .map(|n| n.refers_to);

    if let Some(target) = target {
        let target = target.trim().trim_start_matches('=');
        if looks_like_reference(target) {
            return resolve_range(source, current_sheet, target);
        }
        // Dynamic names (OFFSET, INDEX...) need the application to find their range
        if let Some(address) = evaluate(source, current_sheet, target) {
            return resolve_range(source, current_sheet, &address);
        }
    }

    if let Some(address) = evaluate(source, current_sheet, text) {
        return resolve_range(source, current_sheet, &address);
    }
    // A bare cell address such as `A1` is a one-cell range on the current sheet
    if CellRange::parse(text).is_some() {
        return resolve_range(source, current_sheet, text);
    }
    Ok(None)
}

/// Evaluation failures fall through to the next candidate
fn evaluate<S: ListSource + ?Sized>(source: &mut S, sheet: &str, expression: &str) -> Option<String> {
    source.evaluate_reference(sheet, expression).unwrap_or_else(|e| {
        debug!("Could not evaluate '{}': {e:#}", expression);
        None
    })
}

fn drop_blanks(values: Vec<ScalarValue>) -> Vec<ScalarValue> {
    values.into_iter().filter(|v| !v.is_blank()).collect()
}
