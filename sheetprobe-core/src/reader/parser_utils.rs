//! Common XML helpers shared by the OOXML parsers

use anyhow::Result;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::BufReader;
use zip::ZipArchive;

/// A package relationship from a `.rels` part
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// Read text content from an XML node
pub fn read_text_node<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(e.unescape()?.as_ref()),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// Unescaped value of an attribute, if present
pub fn attr_value(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.to_string()));
        }
    }
    Ok(None)
}

/// OOXML boolean attribute (`1`/`true`), falling back to `default` when absent
pub fn attr_bool(e: &BytesStart, key: &[u8], default: bool) -> Result<bool> {
    Ok(match attr_value(e, key)? {
        Some(v) => v == "1" || v.eq_ignore_ascii_case("true"),
        None => default,
    })
}

/// Resolve a relationship target against the directory of its source part.
///
/// `("xl/worksheets", "../comments1.xml")` gives `xl/comments1.xml`;
/// absolute targets (`/xl/...`) are taken from the package root.
pub fn resolve_part_path(base_dir: &str, target: &str) -> String {
    let mut parts: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|p| !p.is_empty()).collect()
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Path of the `.rels` part that belongs to `part` (`xl/worksheets/sheet1.xml`
/// maps to `xl/worksheets/_rels/sheet1.xml.rels`)
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Directory component of a part path
pub fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Read every relationship in a `.rels` part; a missing part yields none
pub fn read_relationships(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
    rels_path: &str,
) -> Result<Vec<Relationship>> {
    let mut relationships = Vec::new();
    let rels_xml = match archive.by_name(rels_path) {
        Ok(file) => file,
        Err(_) => return Ok(relationships),
    };
    let mut reader = Reader::from_reader(BufReader::new(rels_xml));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Relationship" => {
                relationships.push(Relationship {
                    id: attr_value(&e, b"Id")?.unwrap_or_default(),
                    rel_type: attr_value(&e, b"Type")?.unwrap_or_default(),
                    target: attr_value(&e, b"Target")?.unwrap_or_default(),
                    external: attr_value(&e, b"TargetMode")?.as_deref() == Some("External"),
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(relationships)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_part_path() {
        assert_eq!(
            resolve_part_path("xl", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_part_path("xl/worksheets", "../comments1.xml"),
            "xl/comments1.xml"
        );
        assert_eq!(
            resolve_part_path("xl/worksheets", "/xl/tables/table1.xml"),
            "xl/tables/table1.xml"
        );
    }

    #[test]
    fn test_rels_path_for() {
        assert_eq!(
            rels_path_for("xl/worksheets/sheet1.xml"),
            "xl/worksheets/_rels/sheet1.xml.rels"
        );
        assert_eq!(rels_path_for("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(part_dir("xl/worksheets/sheet1.xml"), "xl/worksheets");
    }

    #[test]
    fn test_attr_helpers() {
        let mut reader = Reader::from_str(r#"<dataValidation type="list" allowBlank="1"/>"#);
        let mut buf = Vec::new();
        let Event::Empty(e) = reader.read_event_into(&mut buf).unwrap() else {
            panic!("expected empty element");
        };
        assert_eq!(attr_value(&e, b"type").unwrap().as_deref(), Some("list"));
        assert!(attr_bool(&e, b"allowBlank", false).unwrap());
        assert!(!attr_bool(&e, b"showDropDown", false).unwrap());
        assert!(attr_bool(&e, b"missing", true).unwrap());
    }
}
