use std::io::{Cursor, Write};

use rulescan_xlsx::{extract_workbook_rules_from_bytes, RulePackage, RulesError, SheetState};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

fn build_zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(cursor);
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);

    for (name, bytes) in entries {
        zip.start_file(*name, options).expect("start_file");
        zip.write_all(bytes).expect("write entry bytes");
    }

    zip.finish().expect("finish").into_inner()
}

const WORKBOOK: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
  xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Declaration" sheetId="1" r:id="rId2"/>
    <sheet name="Checker" sheetId="2" state="hidden" r:id="rId1"/>
  </sheets>
</workbook>"#;

const RELS: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/../worksheets/sheet1.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

const EMPTY_SHEET: &[u8] = br#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;

#[test]
fn resolves_sheets_through_relationships_not_position() {
    let bytes = build_zip_bytes(&[
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", RELS),
        ("xl/worksheets/sheet1.xml", EMPTY_SHEET),
        ("xl/worksheets/sheet2.xml", EMPTY_SHEET),
    ]);

    let package = RulePackage::from_bytes(bytes).expect("open package");
    assert_eq!(package.sheet_names(), vec!["Declaration", "Checker"]);
    assert_eq!(
        package.sheet_part("Declaration"),
        Some("xl/worksheets/sheet1.xml")
    );
    assert_eq!(package.sheet_part("Checker"), Some("xl/worksheets/sheet2.xml"));
    assert_eq!(package.sheets()[1].state, SheetState::Hidden);
    assert_eq!(package.sheet_part("Nope"), None);
}

#[test]
fn missing_workbook_part_is_reported() {
    let bytes = build_zip_bytes(&[("xl/_rels/workbook.xml.rels", RELS)]);
    match RulePackage::from_bytes(bytes) {
        Err(RulesError::MissingPart(part)) => assert_eq!(part, "xl/workbook.xml"),
        Err(other) => panic!("expected MissingPart, got {other:?}"),
        Ok(_) => panic!("expected MissingPart, got a package"),
    }
}

#[test]
fn missing_workbook_rels_is_reported() {
    let bytes = build_zip_bytes(&[("xl/workbook.xml", WORKBOOK)]);
    let err = RulePackage::from_bytes(bytes).err().expect("should fail");
    assert_eq!(err.class(), "MissingPart");
}

#[test]
fn dangling_relationship_id_is_unresolved() {
    let rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;
    let bytes = build_zip_bytes(&[
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", rels),
        ("xl/worksheets/sheet1.xml", EMPTY_SHEET),
    ]);
    match RulePackage::from_bytes(bytes) {
        Err(RulesError::UnresolvedRelationship { sheet, rel_id }) => {
            assert_eq!(sheet, "Checker");
            assert_eq!(rel_id, "rId1");
        }
        Err(other) => panic!("expected UnresolvedRelationship, got {other:?}"),
        Ok(_) => panic!("expected UnresolvedRelationship, got a package"),
    }
}

#[test]
fn resolved_part_absent_from_archive_is_missing() {
    let bytes = build_zip_bytes(&[
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", RELS),
        ("xl/worksheets/sheet1.xml", EMPTY_SHEET),
    ]);
    match RulePackage::from_bytes(bytes) {
        Err(RulesError::MissingPart(part)) => assert_eq!(part, "xl/worksheets/sheet2.xml"),
        Err(other) => panic!("expected MissingPart, got {other:?}"),
        Ok(_) => panic!("expected MissingPart, got a package"),
    }
}

#[test]
fn not_a_zip_is_a_malformed_archive() {
    let err = RulePackage::from_bytes(b"PK but not really".to_vec())
        .err()
        .expect("should fail");
    assert!(
        matches!(err, RulesError::MalformedArchive(_)),
        "unexpected error {err:?}"
    );
}

#[test]
fn truncated_sheet_fails_alone() {
    let good = br#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData/>
  <conditionalFormatting sqref="A1:A5">
    <cfRule type="expression" dxfId="0" priority="1"><formula>A1=""</formula></cfRule>
  </conditionalFormatting>
</worksheet>"#;
    let truncated = br#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1"><v>1</v></c>"#;

    let bytes = build_zip_bytes(&[
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", RELS),
        ("xl/worksheets/sheet1.xml", good),
        ("xl/worksheets/sheet2.xml", truncated),
    ]);

    let extraction = extract_workbook_rules_from_bytes(bytes).expect("package opens");
    assert_eq!(extraction.sheets.len(), 2);

    let declaration = &extraction.sheets[0];
    assert_eq!(declaration.sheet.name, "Declaration");
    let rules = declaration.rules.as_ref().expect("good sheet extracts");
    assert_eq!(rules.conditional_formats.len(), 1);

    let checker = &extraction.sheets[1];
    let err = checker.rules.as_ref().err().expect("truncated sheet fails");
    assert!(err.is_sheet_scoped());
    match err {
        RulesError::MalformedPart { part, .. } => assert_eq!(part, "xl/worksheets/sheet2.xml"),
        other => panic!("expected MalformedPart, got {other:?}"),
    }
}

#[test]
fn oversized_part_is_refused() {
    let bytes = build_zip_bytes(&[
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", RELS),
        ("xl/worksheets/sheet1.xml", EMPTY_SHEET),
        ("xl/worksheets/sheet2.xml", EMPTY_SHEET),
    ]);
    let err = RulePackage::from_reader_limited(Cursor::new(bytes), 16)
        .err()
        .expect("should fail");
    assert_eq!(err.class(), "PartTooLarge");
}

#[test]
fn malformed_workbook_rejects_the_whole_file() {
    let bytes = build_zip_bytes(&[
        ("xl/workbook.xml", b"<workbook><sheets></workbook>"),
        ("xl/_rels/workbook.xml.rels", RELS),
        ("xl/worksheets/sheet1.xml", EMPTY_SHEET),
    ]);
    let err = RulePackage::from_bytes(bytes)
        .err()
        .expect("broken workbook.xml should fail");
    assert_eq!(err.class(), "MalformedWorkbook");
    assert!(!err.is_sheet_scoped());
    match err {
        RulesError::MalformedWorkbook { part, .. } => assert_eq!(part, "xl/workbook.xml"),
        other => panic!("expected MalformedWorkbook, got {other:?}"),
    }

    let bytes = build_zip_bytes(&[
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", b"<Relationships><Relationship Id=\"rId1\""),
    ]);
    let err = RulePackage::from_bytes(bytes)
        .err()
        .expect("broken rels should fail");
    assert_eq!(err.class(), "MalformedWorkbook");
    assert!(!err.is_sheet_scoped());
}
