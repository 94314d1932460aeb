use roxmltree::Document;

use crate::worksheet::PartError;

pub const NS_X14: &str = "http://schemas.microsoft.com/office/spreadsheetml/2009/9/main";
pub const NS_XM: &str = "http://schemas.microsoft.com/office/excel/2006/main";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    pub fn is_external(&self) -> bool {
        self.target_mode
            .as_deref()
            .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("External"))
    }
}

/// Name of the `.rels` part describing the relationships of `part_name`.
pub fn rels_part_name(part_name: &str) -> String {
    let (dir, file) = part_name.rsplit_once('/').unwrap_or(("", part_name));
    if dir.is_empty() {
        format!("_rels/{file}.rels")
    } else {
        format!("{dir}/_rels/{file}.rels")
    }
}

/// Parse a `.rels` part. Entries without an `Id` or `Target` are dropped.
pub fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, PartError> {
    let xml = std::str::from_utf8(xml).map_err(PartError::Utf8)?;
    let xml = xml.strip_prefix('\u{FEFF}').unwrap_or(xml);
    let doc = Document::parse(xml)?;

    Ok(doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
        .filter_map(|node| {
            Some(Relationship {
                id: node.attribute("Id")?.to_string(),
                type_uri: node.attribute("Type").unwrap_or_default().to_string(),
                target: node.attribute("Target")?.to_string(),
                target_mode: node.attribute("TargetMode").map(str::to_string),
            })
        })
        .collect())
}

pub fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// OOXML booleans are `1`/`0` or `true`/`false`.
pub(crate) fn parse_xml_bool(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

/// Excel stores formulas without a leading `=`, but some producers write one anyway.
pub(crate) fn strip_leading_equals(formula: &str) -> &str {
    let trimmed = formula.trim();
    trimmed.strip_prefix('=').unwrap_or(trimmed)
}

/// Collapse the whitespace separating the areas of an `sqref` into single spaces.
pub fn normalize_sqref(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_relationships_captures_target_mode() {
        let rels = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;

        let parsed = parse_relationships(rels).expect("parse relationships");
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].is_external());
        assert_eq!(parsed[1].target, "worksheets/sheet1.xml");
        assert!(!parsed[1].is_external());
    }

    #[test]
    fn rels_part_name_in_subdir() {
        assert_eq!(rels_part_name("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(rels_part_name("workbook.xml"), "_rels/workbook.xml.rels");
    }

    #[test]
    fn normalize_sqref_collapses_whitespace() {
        assert_eq!(normalize_sqref("  A1:A5   C3 "), "A1:A5 C3");
    }

    #[test]
    fn strip_leading_equals_trims() {
        assert_eq!(strip_leading_equals(" =A1=\"\" "), "A1=\"\"");
        assert_eq!(strip_leading_equals("SUM(A1)"), "SUM(A1)");
    }
}
