//! A1-style address handling: column letters, cell references, ranges and
//! sheet-qualified references.
//!
//! All rows and columns in this module are 1-based, as they appear in the
//! spreadsheet UI and in extraction records.

use std::fmt;

/// Last row addressable in an OOXML worksheet.
pub const MAX_ROWS: u32 = 1_048_576;
/// Last column addressable in an OOXML worksheet (`XFD`).
pub const MAX_COLUMNS: u32 = 16_384;

/// Convert a 1-based column index to its letter label (1 -> "A", 27 -> "AA").
///
/// Bijective base-26: there is no zero digit. Returns an empty string for 0.
pub fn column_to_letter(column: u32) -> String {
    let mut n = column;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Convert a column label ("A", "aa", "XFD") back to its 1-based index.
pub fn letter_to_column(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut col = 0u32;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col
            .checked_mul(26)?
            .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    Some(col)
}

/// Build a plain A1 address from 1-based coordinates.
pub fn cell_address(row: u32, column: u32) -> String {
    format!("{}{}", column_to_letter(column), row)
}

/// Parse a single cell reference like `B7` or `$B$7` into 1-based `(row, col)`.
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let s = cell_ref.trim();
    let s = s.strip_prefix('$').unwrap_or(s);
    let letters_end = s.find(|c: char| !c.is_ascii_alphabetic())?;
    let (letters, rest) = s.split_at(letters_end);
    let digits = rest.strip_prefix('$').unwrap_or(rest);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let col = letter_to_column(letters)?;
    let row = digits.parse::<u32>().ok()?;
    if row == 0 {
        return None;
    }
    Some((row, col))
}

/// An inclusive rectangular block of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl CellRange {
    pub fn new(start_row: u32, start_col: u32, end_row: u32, end_col: u32) -> Self {
        Self {
            start_row: start_row.min(end_row),
            start_col: start_col.min(end_col),
            end_row: start_row.max(end_row),
            end_col: start_col.max(end_col),
        }
    }

    pub fn single(row: u32, col: u32) -> Self {
        Self::new(row, col, row, col)
    }

    /// Parse `A1`, `A1:C9`, `$A$1:$C$9`, whole columns (`A:C`) or whole rows (`2:5`).
    ///
    /// Whole-column and whole-row forms expand to the sheet limits; callers
    /// usually clamp them with [`CellRange::intersect`].
    pub fn parse(range: &str) -> Option<Self> {
        let range = range.trim();
        if range.is_empty() {
            return None;
        }
        let Some((first, second)) = range.split_once(':') else {
            let (row, col) = parse_cell_ref(range)?;
            return Some(Self::single(row, col));
        };
        if let (Some((r1, c1)), Some((r2, c2))) = (parse_cell_ref(first), parse_cell_ref(second)) {
            return Some(Self::new(r1, c1, r2, c2));
        }

        let first = first.trim().trim_start_matches('$');
        let second = second.trim().trim_start_matches('$');
        if let (Some(c1), Some(c2)) = (letter_to_column(first), letter_to_column(second)) {
            return Some(Self::new(1, c1, MAX_ROWS, c2));
        }
        if let (Ok(r1), Ok(r2)) = (first.parse::<u32>(), second.parse::<u32>())
            && r1 > 0
            && r2 > 0
        {
            return Some(Self::new(r1, 1, r2, MAX_COLUMNS));
        }
        None
    }

    pub fn rows(&self) -> u32 {
        self.end_row - self.start_row + 1
    }

    pub fn columns(&self) -> u32 {
        self.end_col - self.start_col + 1
    }

    pub fn cell_count(&self) -> u64 {
        self.rows() as u64 * self.columns() as u64
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.start_row && row <= self.end_row && col >= self.start_col && col <= self.end_col
    }

    /// Overlapping block of two ranges, if any.
    pub fn intersect(&self, other: &CellRange) -> Option<CellRange> {
        let start_row = self.start_row.max(other.start_row);
        let start_col = self.start_col.max(other.start_col);
        let end_row = self.end_row.min(other.end_row);
        let end_col = self.end_col.min(other.end_col);
        (start_row <= end_row && start_col <= end_col)
            .then(|| CellRange::new(start_row, start_col, end_row, end_col))
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &CellRange) -> CellRange {
        CellRange::new(
            self.start_row.min(other.start_row),
            self.start_col.min(other.start_col),
            self.end_row.max(other.end_row),
            self.end_col.max(other.end_col),
        )
    }

    /// Row-major iteration over every position in the range.
    pub fn positions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.start_row..=self.end_row)
            .flat_map(move |row| (self.start_col..=self.end_col).map(move |col| (row, col)))
    }

    /// `A1:C9`, or `A1` for a single cell.
    pub fn address(&self) -> String {
        let start = cell_address(self.start_row, self.start_col);
        if self.start_row == self.end_row && self.start_col == self.end_col {
            start
        } else {
            format!("{}:{}", start, cell_address(self.end_row, self.end_col))
        }
    }
}

impl Default for CellRange {
    fn default() -> Self {
        CellRange::single(1, 1)
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

/// Parse a space-separated OOXML `sqref` list such as `A1:A5 C3`.
pub fn parse_sqref(sqref: &str) -> Vec<CellRange> {
    sqref.split_whitespace().filter_map(CellRange::parse).collect()
}

/// Remove one level of single-quote wrapping from a sheet name, unescaping `''`.
pub fn unquote_sheet_name(name: &str) -> String {
    let name = name.trim();
    match name.strip_prefix('\'').and_then(|n| n.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => name.to_string(),
    }
}

/// Split `Sheet!A1:B2` or `'My Sheet'!A1` into an optional unquoted sheet
/// name and the address part. Returns `(None, input)` when unqualified.
pub fn split_sheet_reference(reference: &str) -> (Option<String>, &str) {
    let reference = reference.trim();
    if reference.starts_with('\'') {
        // Quoted names may themselves contain '!', so scan for the closing quote.
        let bytes = reference.as_bytes();
        let mut i = 1;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                if bytes.get(i + 1) == Some(&b'!') {
                    let sheet = unquote_sheet_name(&reference[..=i]);
                    return (Some(sheet), &reference[i + 2..]);
                }
                break;
            }
            i += 1;
        }
    }
    match reference.split_once('!') {
        Some((sheet, address)) => (Some(unquote_sheet_name(sheet)), address),
        None => (None, reference),
    }
}

/// Quote a sheet name for use in a reference when it is not a plain identifier.
pub fn quote_sheet_name(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_to_letter() {
        assert_eq!(column_to_letter(1), "A");
        assert_eq!(column_to_letter(26), "Z");
        assert_eq!(column_to_letter(27), "AA");
        assert_eq!(column_to_letter(52), "AZ");
        assert_eq!(column_to_letter(703), "AAA");
        assert_eq!(column_to_letter(MAX_COLUMNS), "XFD");
        assert_eq!(column_to_letter(0), "");
    }

    #[test]
    fn test_column_round_trip() {
        for n in 1..=MAX_COLUMNS {
            assert_eq!(letter_to_column(&column_to_letter(n)), Some(n), "column {n}");
        }
    }

    #[test]
    fn test_letter_to_column_rejects_garbage() {
        assert_eq!(letter_to_column(""), None);
        assert_eq!(letter_to_column("A1"), None);
        assert_eq!(letter_to_column("ab"), Some(28));
    }

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse_cell_ref("A1"), Some((1, 1)));
        assert_eq!(parse_cell_ref("$B$7"), Some((7, 2)));
        assert_eq!(parse_cell_ref("AA10"), Some((10, 27)));
        assert_eq!(parse_cell_ref("A0"), None);
        assert_eq!(parse_cell_ref("10"), None);
        assert_eq!(parse_cell_ref("A1B"), None);
    }

    #[test]
    fn test_parse_range() {
        let r = CellRange::parse("$A$1:$C$3").unwrap();
        assert_eq!(r, CellRange::new(1, 1, 3, 3));
        assert_eq!(r.rows(), 3);
        assert_eq!(r.address(), "A1:C3");

        // Reversed corners normalize
        assert_eq!(CellRange::parse("C3:A1"), Some(CellRange::new(1, 1, 3, 3)));
        assert_eq!(CellRange::parse("B2").unwrap().address(), "B2");
        assert_eq!(CellRange::parse("not a range"), None);
        assert_eq!(CellRange::parse("A1:"), None);
    }

    #[test]
    fn test_whole_column_and_row() {
        let col = CellRange::parse("B:B").unwrap();
        assert_eq!(col, CellRange::new(1, 2, MAX_ROWS, 2));
        let used = CellRange::new(1, 1, 4, 3);
        assert_eq!(col.intersect(&used), Some(CellRange::new(1, 2, 4, 2)));

        let rows = CellRange::parse("2:3").unwrap();
        assert_eq!(rows.intersect(&used), Some(CellRange::new(2, 1, 3, 3)));
    }

    #[test]
    fn test_positions_row_major() {
        let r = CellRange::new(1, 1, 2, 2);
        let positions: Vec<_> = r.positions().collect();
        assert_eq!(positions, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
    }

    #[test]
    fn test_split_sheet_reference() {
        assert_eq!(
            split_sheet_reference("Sheet2!$A$1:$A$3"),
            (Some("Sheet2".to_string()), "$A$1:$A$3")
        );
        assert_eq!(
            split_sheet_reference("'My Sheet'!A1"),
            (Some("My Sheet".to_string()), "A1")
        );
        assert_eq!(
            split_sheet_reference("'It''s!here'!B2"),
            (Some("It's!here".to_string()), "B2")
        );
        assert_eq!(split_sheet_reference("A1:A4"), (None, "A1:A4"));
    }

    #[test]
    fn test_sqref_and_quoting() {
        assert_eq!(
            parse_sqref("A1:A3 C5"),
            vec![CellRange::new(1, 1, 3, 1), CellRange::single(5, 3)]
        );
        assert_eq!(quote_sheet_name("Data"), "Data");
        assert_eq!(quote_sheet_name("My Data"), "'My Data'");
    }
}
