//! Cell formats from `xl/styles.xml` and date handling for number formats

use anyhow::Result;
use chrono::{NaiveDate, TimeDelta};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufReader;
use zip::ZipArchive;

use super::parser_utils::{attr_bool, attr_value};

/// A color split into channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Parse `FFRRGGBB` (ARGB) or `RRGGBB`
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        let hex = if hex.len() == 8 { &hex[2..] } else { hex };
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    /// Decode an Excel `Color` integer, which stores blue in the high byte
    pub fn from_bgr(value: u32) -> Self {
        Self {
            r: (value & 0xFF) as u8,
            g: ((value >> 8) & 0xFF) as u8,
            b: ((value >> 16) & 0xFF) as u8,
        }
    }

    pub fn to_bgr(self) -> u32 {
        (self.b as u32) << 16 | (self.g as u32) << 8 | self.r as u32
    }
}

/// Resolved format of one `cellXfs` entry
#[derive(Debug, Clone, PartialEq)]
pub struct CellStyle {
    pub number_format: String,
    pub font_name: Option<String>,
    pub font_size: Option<f64>,
    pub font_bold: bool,
    pub font_italic: bool,
    pub font_color: Option<Rgb>,
    pub fill_color: Option<Rgb>,
    pub horizontal_alignment: Option<String>,
    pub vertical_alignment: Option<String>,
    pub locked: bool,
    pub formula_hidden: bool,
}

impl Default for CellStyle {
    fn default() -> Self {
        Self {
            number_format: "General".to_string(),
            font_name: None,
            font_size: None,
            font_bold: false,
            font_italic: false,
            font_color: None,
            fill_color: None,
            horizontal_alignment: None,
            vertical_alignment: None,
            // Excel locks cells unless the xf says otherwise
            locked: true,
            formula_hidden: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Font {
    name: Option<String>,
    size: Option<f64>,
    bold: bool,
    italic: bool,
    color: Option<Rgb>,
}

#[derive(Debug, Clone, Default)]
struct Fill {
    color: Option<Rgb>,
    pattern_none: bool,
}

#[derive(Debug, Clone)]
struct RawXf {
    num_fmt_id: u32,
    font_id: usize,
    fill_id: usize,
    horizontal: Option<String>,
    vertical: Option<String>,
    locked: bool,
    hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Other,
    Fonts,
    Fills,
    CellXfs,
}

struct StylesState {
    num_fmts: HashMap<u32, String>,
    fonts: Vec<Font>,
    fills: Vec<Fill>,
    xfs: Vec<RawXf>,
    section: Section,
    font: Option<Font>,
    fill: Option<Fill>,
    xf: Option<RawXf>,
}

/// Built-in number formats that have no `<numFmt>` entry
fn builtin_number_formats() -> HashMap<u32, String> {
    [
        (0, "General"),
        (1, "0"),
        (2, "0.00"),
        (3, "#,##0"),
        (4, "#,##0.00"),
        (9, "0%"),
        (10, "0.00%"),
        (11, "0.00E+00"),
        (12, "# ?/?"),
        (13, "# ??/??"),
        (14, "mm-dd-yy"),
        (15, "d-mmm-yy"),
        (16, "d-mmm"),
        (17, "mmm-yy"),
        (18, "h:mm AM/PM"),
        (19, "h:mm:ss AM/PM"),
        (20, "h:mm"),
        (21, "h:mm:ss"),
        (22, "m/d/yy h:mm"),
        (37, "#,##0 ;(#,##0)"),
        (38, "#,##0 ;[Red](#,##0)"),
        (39, "#,##0.00;(#,##0.00)"),
        (40, "#,##0.00;[Red](#,##0.00)"),
        (45, "mm:ss"),
        (46, "[h]:mm:ss"),
        (47, "mmss.0"),
        (48, "##0.0E+0"),
        (49, "@"),
    ]
    .into_iter()
    .map(|(id, code)| (id, code.to_string()))
    .collect()
}

impl StylesState {
    fn open(&mut self, e: &BytesStart, empty: bool) -> Result<()> {
        match (self.section, e.name().as_ref()) {
            (_, b"numFmt") => {
                let id = attr_value(e, b"numFmtId")?.and_then(|v| v.parse::<u32>().ok());
                let code = attr_value(e, b"formatCode")?.map(|c| c.replace('\\', ""));
                if let (Some(id), Some(code)) = (id, code)
                    && !code.is_empty()
                {
                    self.num_fmts.insert(id, code);
                }
            }
            (_, b"fonts") => self.section = Section::Fonts,
            (_, b"fills") => self.section = Section::Fills,
            (_, b"cellXfs") => self.section = Section::CellXfs,
            (Section::Fonts, b"font") => {
                if empty {
                    self.fonts.push(Font::default());
                } else {
                    self.font = Some(Font::default());
                }
            }
            (Section::Fonts, tag) => {
                if let Some(font) = self.font.as_mut() {
                    match tag {
                        b"b" => font.bold = attr_bool(e, b"val", true)?,
                        b"i" => font.italic = attr_bool(e, b"val", true)?,
                        b"sz" => {
                            font.size = attr_value(e, b"val")?.and_then(|v| v.parse::<f64>().ok())
                        }
                        b"name" => font.name = attr_value(e, b"val")?,
                        b"color" => {
                            font.color = attr_value(e, b"rgb")?.and_then(|v| Rgb::from_hex(&v))
                        }
                        _ => {}
                    }
                }
            }
            (Section::Fills, b"fill") => {
                if empty {
                    self.fills.push(Fill::default());
                } else {
                    self.fill = Some(Fill::default());
                }
            }
            (Section::Fills, tag) => {
                if let Some(fill) = self.fill.as_mut() {
                    match tag {
                        b"patternFill" => {
                            fill.pattern_none =
                                attr_value(e, b"patternType")?.is_none_or(|p| p == "none");
                        }
                        b"fgColor" => {
                            fill.color = attr_value(e, b"rgb")?.and_then(|v| Rgb::from_hex(&v))
                        }
                        _ => {}
                    }
                }
            }
            (Section::CellXfs, b"xf") => {
                let parse_id = |v: Option<String>| v.and_then(|v| v.parse().ok()).unwrap_or(0);
                let xf = RawXf {
                    num_fmt_id: parse_id(attr_value(e, b"numFmtId")?) as u32,
                    font_id: parse_id(attr_value(e, b"fontId")?),
                    fill_id: parse_id(attr_value(e, b"fillId")?),
                    horizontal: None,
                    vertical: None,
                    locked: true,
                    hidden: false,
                };
                if empty {
                    self.xfs.push(xf);
                } else {
                    self.xf = Some(xf);
                }
            }
            (Section::CellXfs, tag) => {
                if let Some(xf) = self.xf.as_mut() {
                    match tag {
                        b"alignment" => {
                            xf.horizontal = attr_value(e, b"horizontal")?;
                            xf.vertical = attr_value(e, b"vertical")?;
                        }
                        b"protection" => {
                            xf.locked = attr_bool(e, b"locked", true)?;
                            xf.hidden = attr_bool(e, b"hidden", false)?;
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, tag: &[u8]) {
        match tag {
            b"font" => {
                if let Some(font) = self.font.take() {
                    self.fonts.push(font);
                }
            }
            b"fill" => {
                if let Some(fill) = self.fill.take() {
                    self.fills.push(fill);
                }
            }
            b"xf" => {
                if let Some(xf) = self.xf.take() {
                    self.xfs.push(xf);
                }
            }
            b"fonts" | b"fills" | b"cellXfs" => self.section = Section::Other,
            _ => {}
        }
    }

    fn into_styles(self) -> Vec<CellStyle> {
        self.xfs
            .iter()
            .map(|xf| {
                let font = self.fonts.get(xf.font_id).cloned().unwrap_or_default();
                let fill_color = self
                    .fills
                    .get(xf.fill_id)
                    .filter(|f| !f.pattern_none)
                    .and_then(|f| f.color);
                CellStyle {
                    number_format: self
                        .num_fmts
                        .get(&xf.num_fmt_id)
                        .cloned()
                        .unwrap_or_else(|| "General".to_string()),
                    font_name: font.name,
                    font_size: font.size,
                    font_bold: font.bold,
                    font_italic: font.italic,
                    font_color: font.color,
                    fill_color,
                    horizontal_alignment: xf.horizontal.clone(),
                    vertical_alignment: xf.vertical.clone(),
                    locked: xf.locked,
                    formula_hidden: xf.hidden,
                }
            })
            .collect()
    }
}

/// Parse `xl/styles.xml` into one [`CellStyle`] per `cellXfs` entry.
///
/// A package without a styles part yields an empty list.
pub fn parse_styles(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
) -> Result<Vec<CellStyle>> {
    let styles_xml = match archive.by_name("xl/styles.xml") {
        Ok(file) => file,
        Err(_) => return Ok(Vec::new()),
    };

    let mut reader = Reader::from_reader(BufReader::new(styles_xml));
    reader.config_mut().trim_text(true);

    let mut state = StylesState {
        num_fmts: builtin_number_formats(),
        fonts: Vec::new(),
        fills: Vec::new(),
        xfs: Vec::new(),
        section: Section::Other,
        font: None,
        fill: None,
        xf: None,
    };

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => state.open(&e, false)?,
            Event::Empty(e) => state.open(&e, true)?,
            Event::End(e) => state.close(e.name().as_ref()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(state.into_styles())
}

/// Heuristic check for date/time number formats
pub fn is_date_format(format: &str) -> bool {
    let mut cleaned = String::new();
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;
    for ch in format.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            _ if in_quotes || in_brackets => {}
            c => cleaned.push(c.to_ascii_lowercase()),
        }
    }
    // Elapsed-time formats like [h]:mm:ss keep their bracket token
    if format.contains("[h]") || format.contains("[mm]") || format.contains("[ss]") {
        return true;
    }
    if cleaned.contains("general") {
        return false;
    }
    cleaned.contains('y')
        || cleaned.contains('d')
        || cleaned.contains('h')
        || cleaned.contains('s')
        || (cleaned.contains('m') && !cleaned.contains('0') && !cleaned.contains('#'))
}

/// Render an Excel serial date (1900 system) as ISO-8601 text.
///
/// Serials below 1 are treated as a time of day.
pub fn excel_serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    // Whole seconds are enough for spreadsheet dates
    let seconds = (millis + 500) / 1000;
    let datetime = epoch.checked_add_signed(TimeDelta::try_seconds(seconds)?)?;
    if serial < 1.0 {
        Some(datetime.format("%H:%M:%S").to_string())
    } else {
        Some(datetime.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}
