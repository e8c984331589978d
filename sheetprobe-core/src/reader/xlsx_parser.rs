//! OOXML (`.xlsx`/`.xlsm`) parsing: cells, formulas and sheet metadata

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::BufReader;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::parser_utils::{
    Relationship, attr_bool, attr_value, part_dir, read_relationships, read_text_node,
    rels_path_for, resolve_part_path,
};
use super::styles::{CellStyle, excel_serial_to_iso, is_date_format, parse_styles};
use super::{
    Cell, CellValue, DataValidation, DefinedName, Hyperlink, Sheet, SheetProtection, Table,
    WorkbookReader,
};
use crate::address::{CellRange, column_to_letter, letter_to_column, parse_cell_ref, parse_sqref};

const WORKBOOK_PART: &str = "xl/workbook.xml";

/// A `<sheet>` entry of `xl/workbook.xml`
#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    rel_id: String,
    visible: bool,
}

/// Shared formula anchor: text, anchor position and the block it covers
type SharedFormula = (String, u32, u32, Option<CellRange>);

pub struct XlsxReader<'a, R: std::io::Read + std::io::Seek> {
    archive: &'a mut ZipArchive<R>,
    shared_strings: Vec<String>,
    styles: Vec<CellStyle>,
}

impl<'a, R: std::io::Read + std::io::Seek> XlsxReader<'a, R> {
    pub fn new(archive: &'a mut ZipArchive<R>) -> Result<Self> {
        let shared_strings = extract_shared_strings(archive).unwrap_or_else(|e| {
            warn!("Failed to read shared strings: {e:#}");
            Vec::new()
        });
        let styles = parse_styles(archive).unwrap_or_else(|e| {
            warn!("Failed to read styles: {e:#}");
            Vec::new()
        });
        Ok(Self {
            archive,
            shared_strings,
            styles,
        })
    }
}

impl<'a, R: std::io::Read + std::io::Seek> WorkbookReader for XlsxReader<'a, R> {
    fn read_sheets(&mut self) -> Result<Vec<Sheet>> {
        let entries = self.read_sheet_entries()?;
        let workbook_rels = read_relationships(self.archive, &rels_path_for(WORKBOOK_PART))?;

        let mut sheets = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut sheet = Sheet::new(entry.name.clone());
            sheet.visible = entry.visible;

            let Some(rel) = workbook_rels.iter().find(|r| r.id == entry.rel_id) else {
                sheet.load_error = Some(format!(
                    "Relationship '{}' not found for sheet '{}'",
                    entry.rel_id, entry.name
                ));
                sheets.push(sheet);
                continue;
            };
            let path = resolve_part_path(part_dir(WORKBOOK_PART), &rel.target);

            if let Err(e) = self.load_sheet(&path, &mut sheet) {
                warn!("Sheet '{}' could not be read: {e:#}", entry.name);
                sheet.cells.clear();
                sheet.load_error = Some(format!("{e:#}"));
            }
            sheets.push(sheet);
        }
        Ok(sheets)
    }

    fn read_defined_names(&mut self) -> Result<Vec<DefinedName>> {
        extract_defined_names_from_xlsx(self.archive)
    }

    fn read_active_sheet(&mut self) -> Result<usize> {
        let workbook_xml = self
            .archive
            .by_name(WORKBOOK_PART)
            .context("Failed to find xl/workbook.xml")?;
        let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"workbookView" => {
                    return Ok(attr_value(&e, b"activeTab")?
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0));
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(0)
    }

    fn styles(&self) -> Vec<CellStyle> {
        self.styles.clone()
    }
}

impl<'a, R: std::io::Read + std::io::Seek> XlsxReader<'a, R> {
    fn read_sheet_entries(&mut self) -> Result<Vec<SheetEntry>> {
        let mut entries = Vec::new();
        let workbook_xml = self
            .archive
            .by_name(WORKBOOK_PART)
            .context("Failed to find xl/workbook.xml")?;
        let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"sheet" => {
                    let state = attr_value(&e, b"state")?.unwrap_or_default();
                    entries.push(SheetEntry {
                        name: attr_value(&e, b"name")?.unwrap_or_default(),
                        rel_id: attr_value(&e, b"r:id")?.unwrap_or_default(),
                        visible: state != "hidden" && state != "veryHidden",
                    });
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(entries)
    }

    /// Read the sheet body, then its related parts. Only the body is fatal for the sheet.
    fn load_sheet(&mut self, path: &str, sheet: &mut Sheet) -> Result<()> {
        let link_ids = self
            .parse_sheet_xml(path, sheet)
            .with_context(|| format!("Failed to parse {}", path))?;

        let rels = match read_relationships(self.archive, &rels_path_for(path)) {
            Ok(rels) => rels,
            Err(e) => {
                warn!("Sheet '{}': unreadable relationships: {e:#}", sheet.name);
                Vec::new()
            }
        };

        for (link, rel_id) in sheet.hyperlinks.iter_mut().zip(link_ids) {
            if let Some(rel_id) = rel_id {
                link.target = rels.iter().find(|r| r.id == rel_id).map(|r| r.target.clone());
            }
        }

        let base = part_dir(path).to_string();
        for rel in &rels {
            let part = resolve_part_path(&base, &rel.target);
            if is_rel_type(rel, "/comments") {
                match extract_comments(self.archive, &part) {
                    Ok(comments) => sheet.comments.extend(comments),
                    Err(e) => warn!("Sheet '{}': comments unavailable: {e:#}", sheet.name),
                }
            } else if is_rel_type(rel, "/table") {
                match extract_table(self.archive, &part) {
                    Ok(Some(table)) => sheet.tables.push(table),
                    Ok(None) => debug!("Sheet '{}': empty table part {}", sheet.name, part),
                    Err(e) => warn!("Sheet '{}': table {} unavailable: {e:#}", sheet.name, part),
                }
            }
        }
        Ok(())
    }

    /// Parse the worksheet part into `sheet`. Returns the relationship id of
    /// each hyperlink, in the order the hyperlinks were pushed.
    fn parse_sheet_xml(&mut self, path: &str, sheet: &mut Sheet) -> Result<Vec<Option<String>>> {
        let mut shared_formulas: HashMap<u32, Vec<SharedFormula>> = HashMap::new();
        let mut link_ids = Vec::new();
        let mut validation: Option<DataValidation> = None;
        let mut validation_field: Option<&'static str> = None;

        let sheet_xml = self.archive.by_name(path)?;
        let mut reader = Reader::from_reader(BufReader::new(sheet_xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut current_row = 1u32;
        let mut current_col = 1u32;

        loop {
            let event = reader.read_event_into(&mut buf)?;
            let empty = matches!(event, Event::Empty(_));
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                    b"dimension" => {
                        sheet.dimension = attr_value(e, b"ref")?.and_then(|r| CellRange::parse(&r));
                    }
                    b"sheetProtection" => {
                        sheet.protection = SheetProtection {
                            contents: attr_bool(e, b"sheet", false)?,
                            drawing: attr_bool(e, b"objects", false)?,
                            scenarios: attr_bool(e, b"scenarios", false)?,
                        };
                    }
                    b"row" => {
                        if let Some(r) = attr_value(e, b"r")? {
                            current_row = r.parse::<u32>()?;
                        } else {
                            current_row += 1;
                        }
                        current_col = 1;
                    }
                    b"c" => {
                        let r_attr = attr_value(e, b"r")?;
                        let style = attr_value(e, b"s")?.and_then(|s| s.parse::<usize>().ok());
                        let t_attr = attr_value(e, b"t")?.unwrap_or_default();

                        let (row, col) = match r_attr.as_deref().and_then(parse_cell_ref) {
                            Some(pos) => pos,
                            None => (current_row, current_col),
                        };
                        current_row = row;
                        current_col = col + 1;

                        let number_format = style
                            .and_then(|idx| self.styles.get(idx))
                            .map(|s| s.number_format.as_str());

                        let (value, mut formula, shared_si, shared_ref) = if empty {
                            (CellValue::Empty, None, None, None)
                        } else {
                            parse_cell_contents(
                                &mut reader,
                                &t_attr,
                                &self.shared_strings,
                                number_format,
                            )?
                        };

                        if let Some(si) = shared_si {
                            if let Some(f) = formula.as_ref() {
                                let block = shared_ref.as_deref().and_then(CellRange::parse);
                                shared_formulas
                                    .entry(si)
                                    .or_default()
                                    .push((f.clone(), row, col, block));
                            } else if let Some(defs) = shared_formulas.get(&si) {
                                let anchor = defs
                                    .iter()
                                    .find(|d| d.3.is_some_and(|b| b.contains(row, col)))
                                    .or_else(|| defs.last());
                                if let Some((base_formula, base_row, base_col, _)) = anchor {
                                    formula = Some(translate_shared_formula(
                                        base_formula,
                                        row as i64 - *base_row as i64,
                                        col as i64 - *base_col as i64,
                                    ));
                                }
                            }
                        }

                        let formula = formula.map(|f| f.strip_prefix('=').unwrap_or(&f).to_string());
                        sheet.cells.insert(
                            (row, col),
                            Cell {
                                row,
                                col,
                                value,
                                formula,
                                style,
                            },
                        );
                    }
                    b"mergeCell" => {
                        if let Some(range) = attr_value(e, b"ref")?.and_then(|r| CellRange::parse(&r)) {
                            sheet.merged_cells.push(range);
                        }
                    }
                    b"hyperlink" => {
                        if let Some(range) = attr_value(e, b"ref")?.and_then(|r| CellRange::parse(&r)) {
                            link_ids.push(attr_value(e, b"r:id")?);
                            sheet.hyperlinks.push(Hyperlink {
                                range,
                                target: None,
                                location: attr_value(e, b"location")?,
                                display: attr_value(e, b"display")?,
                            });
                        }
                    }
                    b"dataValidation" => {
                        let dv = parse_data_validation_attrs(e)?;
                        if empty {
                            sheet.data_validations.push(dv);
                        } else {
                            validation = Some(dv);
                        }
                    }
                    b"formula1" if validation.is_some() => validation_field = Some("formula1"),
                    b"formula2" if validation.is_some() => validation_field = Some("formula2"),
                    b"sqref" if validation.is_some() => validation_field = Some("sqref"),
                    _ => {}
                },
                Event::Text(ref t) => {
                    if let (Some(dv), Some(field)) = (validation.as_mut(), validation_field) {
                        let text = t.unescape()?.to_string();
                        match field {
                            "formula1" => dv.formula1.get_or_insert_with(String::new).push_str(&text),
                            "formula2" => dv.formula2.get_or_insert_with(String::new).push_str(&text),
                            _ => dv.sqref.extend(parse_sqref(&text)),
                        }
                    }
                }
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"formula1" | b"formula2" | b"sqref" => validation_field = None,
                    b"dataValidation" => {
                        if let Some(dv) = validation.take() {
                            sheet.data_validations.push(dv);
                        }
                    }
                    b"worksheet" => break,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(link_ids)
    }
}

fn is_rel_type(rel: &Relationship, suffix: &str) -> bool {
    rel.rel_type.ends_with(suffix)
}

/// Attributes of a `<dataValidation>` element (formulas arrive as children).
///
/// `showDropDown="1"` hides the in-cell arrow, so the flag is inverted.
fn parse_data_validation_attrs(e: &BytesStart) -> Result<DataValidation> {
    Ok(DataValidation {
        kind: attr_value(e, b"type")?.unwrap_or_else(|| "none".to_string()),
        operator: attr_value(e, b"operator")?,
        allow_blank: attr_bool(e, b"allowBlank", false)?,
        in_cell_dropdown: !attr_bool(e, b"showDropDown", false)?,
        error_style: attr_value(e, b"errorStyle")?,
        formula1: None,
        formula2: None,
        sqref: attr_value(e, b"sqref")?
            .map(|s| parse_sqref(&s))
            .unwrap_or_default(),
    })
}

fn parse_cell_contents<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    t_attr: &str,
    shared_strings: &[String],
    number_format: Option<&str>,
) -> Result<(CellValue, Option<String>, Option<u32>, Option<String>)> {
    let mut value = CellValue::Empty;
    let mut formula = None;
    let mut shared_si = None;
    let mut shared_ref = None;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"v" => {
                    let v_text = if let Event::Start(_) = event {
                        read_text_node(reader)?
                    } else {
                        String::new()
                    };
                    value = match t_attr {
                        "s" => {
                            let idx = v_text.parse::<usize>().unwrap_or(0);
                            CellValue::Text(shared_strings.get(idx).cloned().unwrap_or_default())
                        }
                        "b" => CellValue::Boolean(v_text == "1"),
                        "e" => CellValue::Error(v_text),
                        "str" | "inlineStr" => CellValue::Text(v_text),
                        "d" => CellValue::DateTime(v_text),
                        _ => match v_text.parse::<f64>() {
                            // Text-formatted numbers stay text
                            Ok(_) if number_format == Some("@") => CellValue::Text(v_text),
                            Ok(n) if number_format.is_some_and(is_date_format) => {
                                excel_serial_to_iso(n)
                                    .map(CellValue::DateTime)
                                    .unwrap_or(CellValue::Number(n))
                            }
                            Ok(n) => CellValue::Number(n),
                            Err(_) if v_text.is_empty() => CellValue::Empty,
                            Err(_) => CellValue::Text(v_text),
                        },
                    };
                }
                b"f" => {
                    let mut is_shared = false;
                    let mut si = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"si" => si = attr.unescape_value()?.parse::<u32>().ok(),
                            b"t" => is_shared = attr.value.as_ref() == b"shared",
                            b"ref" => shared_ref = Some(attr.unescape_value()?.to_string()),
                            _ => {}
                        }
                    }

                    if let Event::Start(_) = event {
                        let f_text = read_text_node(reader)?;
                        if !f_text.is_empty() {
                            formula = Some(f_text);
                        }
                    }

                    if is_shared {
                        shared_si = si;
                    }
                }
                b"is" => {
                    // Inline string can have multiple <t> tags
                    if let Event::Start(_) = event {
                        let mut is_text = String::new();
                        let mut is_buf = Vec::new();
                        loop {
                            match reader.read_event_into(&mut is_buf)? {
                                Event::Start(ref ee) if ee.name().as_ref() == b"t" => {
                                    is_text.push_str(&read_text_node(reader)?);
                                }
                                Event::End(ref ee) if ee.name().as_ref() == b"is" => break,
                                Event::Eof => break,
                                _ => {}
                            }
                            is_buf.clear();
                        }
                        value = CellValue::Text(is_text);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"c" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((value, formula, shared_si, shared_ref))
}

/// Shift the relative references of a shared formula's anchor text to another cell
fn translate_shared_formula(formula: &str, row_shift: i64, col_shift: i64) -> String {
    thread_local! {
        static RE: regex::Regex = regex::Regex::new(
            r"(?P<sheet>(?:'[^']+'|[A-Za-z0-9_\.\-]+)!)?(?P<col_abs>\$?)(?P<col>[A-Z]{1,3})(?P<row_abs>\$?)(?P<row>[0-9]+)"
        ).expect("shared formula pattern is valid");
    }
    RE.with(|re| {
        re.replace_all(formula, |caps: &regex::Captures| {
            let sheet = caps.name("sheet").map_or("", |m| m.as_str());
            let col_abs = caps.name("col_abs").is_some_and(|m| !m.as_str().is_empty());
            let row_abs = caps.name("row_abs").is_some_and(|m| !m.as_str().is_empty());
            let col = caps
                .name("col")
                .and_then(|m| letter_to_column(m.as_str()))
                .unwrap_or(1) as i64;
            let row = caps
                .name("row")
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .unwrap_or(1);

            let new_col = if col_abs { col } else { (col + col_shift).max(1) };
            let new_row = if row_abs { row } else { (row + row_shift).max(1) };

            format!(
                "{}{}{}{}{}",
                sheet,
                if col_abs { "$" } else { "" },
                column_to_letter(new_col as u32),
                if row_abs { "$" } else { "" },
                new_row
            )
        })
        .to_string()
    })
}

pub fn extract_shared_strings(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let ss_xml = match archive.by_name("xl/sharedStrings.xml") {
        Ok(file) => file,
        Err(_) => return Ok(strings),
    };

    let mut reader = Reader::from_reader(BufReader::new(ss_xml));
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut current_string = String::new();
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"rPh" => in_phonetic = true,
            Event::End(e) if e.name().as_ref() == b"rPh" => in_phonetic = false,
            Event::Start(e) if e.name().as_ref() == b"t" => {
                let text = read_text_node(&mut reader)?;
                if !in_phonetic {
                    current_string.push_str(&text);
                }
            }
            Event::End(e) if e.name().as_ref() == b"si" => {
                strings.push(std::mem::take(&mut current_string));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Extract defined names (named ranges) from XLSX file, in declaration order
pub fn extract_defined_names_from_xlsx(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
) -> Result<Vec<DefinedName>> {
    let mut defined_names = Vec::new();

    let workbook_xml = match archive.by_name(WORKBOOK_PART) {
        Ok(file) => file,
        Err(_) => return Ok(defined_names),
    };

    let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_ref = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"definedName" => {
                current_name = attr_value(&e, b"name")?;
                current_ref.clear();
            }
            Event::Text(e) if current_name.is_some() => {
                current_ref.push_str(&e.unescape()?);
            }
            Event::End(e) if e.name().as_ref() == b"definedName" => {
                if let Some(name) = current_name.take()
                    // Filter out internal Excel names
                    && !name.starts_with("_xlnm.")
                    && !name.contains("_FilterDatabase")
                {
                    defined_names.push(DefinedName {
                        name,
                        refers_to: current_ref.trim_start_matches('=').to_string(),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(defined_names)
}

/// Plain-text notes of a comments part, keyed by cell
pub fn extract_comments(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
    part: &str,
) -> Result<HashMap<(u32, u32), String>> {
    let mut comments = HashMap::new();
    let xml = archive
        .by_name(part)
        .with_context(|| format!("Missing comments part {}", part))?;
    let mut reader = Reader::from_reader(BufReader::new(xml));
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut current: Option<((u32, u32), String)> = None;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"comment" => {
                current = attr_value(&e, b"ref")?
                    .and_then(|r| parse_cell_ref(&r))
                    .map(|pos| (pos, String::new()));
            }
            Event::Start(e) if e.name().as_ref() == b"t" => {
                let text = read_text_node(&mut reader)?;
                if let Some((_, note)) = current.as_mut() {
                    note.push_str(&text);
                }
            }
            Event::End(e) if e.name().as_ref() == b"comment" => {
                if let Some((pos, note)) = current.take() {
                    comments.insert(pos, note);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(comments)
}

/// Parse one `xl/tables/tableN.xml` part
pub fn extract_table(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
    part: &str,
) -> Result<Option<Table>> {
    let xml = archive
        .by_name(part)
        .with_context(|| format!("Missing table part {}", part))?;
    let mut reader = Reader::from_reader(BufReader::new(xml));
    reader.config_mut().trim_text(true);

    let mut table: Option<Table> = None;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"table" => {
                    // displayName is the name used by structured references
                    let name = match attr_value(&e, b"displayName")? {
                        Some(display) => display,
                        None => attr_value(&e, b"name")?.unwrap_or_default(),
                    };
                    let Some(range) = attr_value(&e, b"ref")?.and_then(|r| CellRange::parse(&r))
                    else {
                        return Ok(None);
                    };
                    let count = |v: Option<String>, default: u32| {
                        v.and_then(|v| v.parse::<u32>().ok()).unwrap_or(default)
                    };
                    // Header and totals rows must fit inside the table range
                    let rows = range.rows();
                    let header_row_count =
                        count(attr_value(&e, b"headerRowCount")?, 1).min(rows);
                    let totals_row_count = count(attr_value(&e, b"totalsRowCount")?, 0)
                        .min(rows - header_row_count);
                    table = Some(Table {
                        name,
                        range,
                        header_row_count,
                        totals_row_count,
                        columns: Vec::new(),
                    });
                }
                b"tableColumn" => {
                    if let Some(t) = table.as_mut() {
                        t.columns.push(attr_value(&e, b"name")?.unwrap_or_default());
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(table.filter(|t| !t.name.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn archive(parts: &[(&str, &str)]) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
            for (name, body) in parts {
                zip.start_file(*name, options).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        ZipArchive::new(Cursor::new(buf)).unwrap()
    }

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<bookViews><workbookView activeTab="1"/></bookViews>
<sheets>
<sheet name="Data" sheetId="1" r:id="rId1"/>
<sheet name="Lists" sheetId="2" state="hidden" r:id="rId2"/>
</sheets>
<definedNames>
<definedName name="Colors">Lists!$A$1:$A$3</definedName>
<definedName name="_xlnm.Print_Area" localSheetId="0">Data!$A$1:$C$4</definedName>
</definedNames>
</workbook>"#;

    const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/>
</Relationships>"#;

    const SHEET1: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<dimension ref="A1:C3"/>
<sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1"><v>10</v></c><c r="C1"><f>B1*2</f><v>20</v></c></row>
<row r="2"><c r="B2"><v>5</v></c><c r="C2"><f t="shared" ref="C2:C3" si="0">B2+$B$1</f><v>15</v></c></row>
<row r="3"><c r="B3"><v>7</v></c><c r="C3"><f t="shared" si="0"/><v>17</v></c></row>
</sheetData>
<sheetProtection sheet="1" objects="1"/>
<mergeCells count="1"><mergeCell ref="A2:A3"/></mergeCells>
<dataValidations count="2">
<dataValidation type="list" allowBlank="1" showInputMessage="1" sqref="A2:A3"><formula1>"Red,Green,Blue"</formula1></dataValidation>
<dataValidation type="whole" operator="between" showDropDown="1" sqref="B2"><formula1>1</formula1><formula2>10</formula2></dataValidation>
</dataValidations>
<hyperlinks><hyperlink ref="A1" r:id="rId1" display="Home"/><hyperlink ref="B1" location="Lists!A1"/></hyperlinks>
<extLst><ext uri="{CCE6A557-97BC-4b89-ADB6-D9C93CAAB3DF}"><x14:dataValidations xmlns:x14="http://schemas.microsoft.com/office/spreadsheetml/2009/9/main" xmlns:xm="http://schemas.microsoft.com/office/excel/2006/main" count="1"><x14:dataValidation type="list" allowBlank="1"><x14:formula1><xm:f>Lists!$A$1:$A$3</xm:f></x14:formula1><xm:sqref>B3</xm:sqref></x14:dataValidation></x14:dataValidations></ext></extLst>
</worksheet>"#;

    const SHEET1_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/" TargetMode="External"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments" Target="../comments1.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/table" Target="../tables/table1.xml"/>
</Relationships>"#;

    const COMMENTS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<comments xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><authors><author>me</author></authors>
<commentList><comment ref="B2" authorId="0"><text><r><t>Check </t></r><r><t>this</t></r></text></comment></commentList></comments>"#;

    const TABLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<table xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" id="1" name="Table1" displayName="Prices" ref="B1:C3" totalsRowShown="0">
<tableColumns count="2"><tableColumn id="1" name="Qty"/><tableColumn id="2" name="Total"/></tableColumns></table>"#;

    const SHEET2: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>Red</t></is></c></row>
<row r="2"><c r="A2" t="inlineStr"><is><t>Green</t></is></c></row>
</sheetData></worksheet>"#;

    const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="1" uniqueCount="1"><si><t>Label</t></si></sst>"#;

    fn sample() -> ZipArchive<Cursor<Vec<u8>>> {
        archive(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/_rels/sheet1.xml.rels", SHEET1_RELS),
            ("xl/worksheets/sheet2.xml", SHEET2),
            ("xl/comments1.xml", COMMENTS),
            ("xl/tables/table1.xml", TABLE),
            ("xl/sharedStrings.xml", SHARED_STRINGS),
        ])
    }

    #[test]
    fn test_read_sheets_cells_and_formulas() {
        let mut archive = sample();
        let mut reader = XlsxReader::new(&mut archive).unwrap();
        let sheets = reader.read_sheets().unwrap();
        assert_eq!(sheets.len(), 2);

        let data = &sheets[0];
        assert_eq!(data.name, "Data");
        assert!(data.visible);
        assert!(!sheets[1].visible);
        assert_eq!(data.dimension.unwrap().address(), "A1:C3");

        assert_eq!(
            data.get_cell(1, 1).unwrap().value,
            CellValue::Text("Label".to_string())
        );
        let c1 = data.get_cell(1, 3).unwrap();
        assert_eq!(c1.formula.as_deref(), Some("B1*2"));
        assert_eq!(c1.value, CellValue::Number(20.0));

        // Shared formula is translated for the dependent cell
        assert_eq!(data.get_cell(3, 3).unwrap().formula.as_deref(), Some("B3+$B$1"));

        assert_eq!(
            sheets[1].get_cell(2, 1).unwrap().value,
            CellValue::Text("Green".to_string())
        );
    }

    #[test]
    fn test_read_sheet_metadata() {
        let mut archive = sample();
        let mut reader = XlsxReader::new(&mut archive).unwrap();
        let sheets = reader.read_sheets().unwrap();
        let data = &sheets[0];

        assert!(data.protection.contents);
        assert!(data.protection.drawing);
        assert!(!data.protection.scenarios);
        assert_eq!(data.merge_area(3, 1).unwrap().address(), "A2:A3");

        assert_eq!(data.data_validations.len(), 3);
        let list = data.validation_at(2, 1).unwrap();
        assert_eq!(list.kind, "list");
        assert!(list.allow_blank);
        assert!(list.in_cell_dropdown);
        assert_eq!(list.formula1.as_deref(), Some("\"Red,Green,Blue\""));

        let whole = data.validation_at(2, 2).unwrap();
        assert_eq!(whole.operator.as_deref(), Some("between"));
        assert!(!whole.in_cell_dropdown);
        assert_eq!(whole.formula2.as_deref(), Some("10"));

        let ext = data.validation_at(3, 2).unwrap();
        assert_eq!(ext.formula1.as_deref(), Some("Lists!$A$1:$A$3"));

        let home = data.hyperlink_at(1, 1).unwrap();
        assert_eq!(home.target.as_deref(), Some("https://example.com/"));
        assert_eq!(home.display.as_deref(), Some("Home"));
        assert_eq!(
            data.hyperlink_at(1, 2).unwrap().location.as_deref(),
            Some("Lists!A1")
        );

        assert_eq!(data.comments.get(&(2, 2)).map(String::as_str), Some("Check this"));

        assert_eq!(data.tables.len(), 1);
        let table = &data.tables[0];
        assert_eq!(table.name, "Prices");
        assert_eq!(table.columns, vec!["Qty", "Total"]);
        assert_eq!(table.data_body_range().unwrap().address(), "B2:C3");
    }

    #[test]
    fn test_defined_names_and_active_sheet() {
        let mut archive = sample();
        let mut reader = XlsxReader::new(&mut archive).unwrap();
        let names = reader.read_defined_names().unwrap();
        assert_eq!(
            names,
            vec![DefinedName {
                name: "Colors".to_string(),
                refers_to: "Lists!$A$1:$A$3".to_string(),
            }]
        );
        assert_eq!(reader.read_active_sheet().unwrap(), 1);
    }

    #[test]
    fn test_missing_sheet_part_degrades_only_that_sheet() {
        let mut archive = archive(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/worksheets/sheet2.xml", SHEET2),
        ]);
        let mut reader = XlsxReader::new(&mut archive).unwrap();
        let sheets = reader.read_sheets().unwrap();
        assert!(sheets[0].load_error.is_some());
        assert!(sheets[0].cells.is_empty());
        assert!(sheets[1].load_error.is_none());
        assert_eq!(sheets[1].cells.len(), 2);
    }

    #[test]
    fn test_table_row_counts_are_clamped() {
        const OVERSIZED: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<table xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" id="1" name="Bad" displayName="Bad" ref="E1:E2" totalsRowCount="5">
<tableColumns count="1"><tableColumn id="1" name="Only"/></tableColumns></table>"#;
        let mut archive = archive(&[("xl/tables/table1.xml", OVERSIZED)]);
        let table = extract_table(&mut archive, "xl/tables/table1.xml")
            .unwrap()
            .unwrap();
        assert_eq!(table.header_row_count, 1);
        assert_eq!(table.totals_row_count, 1);
        assert_eq!(table.totals_row_range().unwrap().address(), "E2");
        assert_eq!(table.data_body_range(), None);
    }

    #[test]
    fn test_translate_shared_formula() {
        assert_eq!(translate_shared_formula("A1+$B$1", 2, 1), "B3+$B$1");
        assert_eq!(translate_shared_formula("Sheet2!A1*2", 1, 0), "Sheet2!A2*2");
        assert_eq!(translate_shared_formula("SUM(A1:A3)", 0, 2), "SUM(C1:C3)");
    }
}
