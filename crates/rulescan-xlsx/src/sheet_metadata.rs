use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::worksheet::PartError;

/// Workbook-level visibility of a sheet (`<sheet state="...">`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetState {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

impl SheetState {
    pub fn as_str(self) -> &'static str {
        match self {
            SheetState::Visible => "visible",
            SheetState::Hidden => "hidden",
            SheetState::VeryHidden => "veryHidden",
        }
    }
}

/// One `<sheet>` declaration from `xl/workbook.xml`, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookSheetInfo {
    pub name: String,
    pub sheet_id: Option<u32>,
    pub rel_id: Option<String>,
    pub state: SheetState,
}

pub fn parse_workbook_sheets(workbook_xml: &str) -> Result<Vec<WorkbookSheetInfo>, PartError> {
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut in_sheets = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == b"sheets" => in_sheets = true,
            Event::End(e) if e.local_name().as_ref() == b"sheets" => in_sheets = false,
            Event::Empty(e) | Event::Start(e) => {
                if in_sheets && e.local_name().as_ref() == b"sheet" {
                    if let Some(info) = parse_sheet_element(&e)? {
                        sheets.push(info);
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

fn parse_sheet_element(e: &BytesStart<'_>) -> Result<Option<WorkbookSheetInfo>, PartError> {
    let mut name: Option<String> = None;
    let mut sheet_id: Option<u32> = None;
    let mut rel_id: Option<String> = None;
    let mut state = SheetState::Visible;

    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        match key {
            b"name" => name = Some(attr.unescape_value()?.into_owned()),
            b"sheetId" => sheet_id = attr.unescape_value()?.trim().parse::<u32>().ok(),
            b"state" => {
                state = match attr.unescape_value()?.as_ref() {
                    "hidden" => SheetState::Hidden,
                    "veryHidden" => SheetState::VeryHidden,
                    _ => SheetState::Visible,
                };
            }
            // `r:id`, whatever prefix the producer bound the relationships namespace to.
            _ if key != b"id" && crate::openxml::local_name(key) == b"id" => {
                rel_id = Some(attr.unescape_value()?.into_owned())
            }
            _ => {}
        }
    }

    let Some(name) = name.filter(|n| !n.is_empty()) else {
        log::debug!("ignoring <sheet> declaration without a name");
        return Ok(None);
    };

    Ok(Some(WorkbookSheetInfo {
        name,
        sheet_id,
        rel_id,
        state,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sheets_in_declaration_order() {
        let xml = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
  xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Declaration" sheetId="1" r:id="rId3"/>
    <sheet name="Checker" sheetId="2" state="hidden" r:id="rId1"/>
    <sheet name="Lists" sheetId="7" state="veryHidden" r:id="rId2"/>
  </sheets>
</workbook>"#;

        let sheets = parse_workbook_sheets(xml).expect("parse workbook");
        let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Declaration", "Checker", "Lists"]);
        assert_eq!(sheets[0].rel_id.as_deref(), Some("rId3"));
        assert_eq!(sheets[1].state, SheetState::Hidden);
        assert_eq!(sheets[2].state, SheetState::VeryHidden);
        assert_eq!(sheets[2].sheet_id, Some(7));
    }

    #[test]
    fn sheet_without_relationship_id_is_kept() {
        let xml = r#"<workbook><sheets><sheet name="Orphan" sheetId="1"/></sheets></workbook>"#;
        let sheets = parse_workbook_sheets(xml).expect("parse workbook");
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].rel_id, None);
    }
}
