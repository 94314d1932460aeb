use std::ops::Range;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::openxml::{local_name, NS_X14, NS_XM};
use crate::worksheet::PartError;

/// Root children that can hold conditional-formatting rules.
fn carries_rules(local: &[u8]) -> bool {
    matches!(local, b"conditionalFormatting" | b"extLst")
}

/// A copy of the worksheet root start tag with only its namespace declarations, plus the
/// `x14`/`xm` prefixes extension content relies on when the original root omits them.
fn wrapper_root(original: &BytesStart<'_>) -> Result<BytesStart<'static>, PartError> {
    let qname = String::from_utf8_lossy(original.name().as_ref()).into_owned();
    let mut root = BytesStart::new(qname);
    let (mut has_x14, mut has_xm) = (false, false);
    for attr in original.attributes().with_checks(false) {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key != b"xmlns" && !key.starts_with(b"xmlns:") {
            continue;
        }
        has_x14 |= key == b"xmlns:x14";
        has_xm |= key == b"xmlns:xm";
        root.push_attribute(attr);
    }
    if !has_x14 {
        root.push_attribute(("xmlns:x14", NS_X14));
    }
    if !has_xm {
        root.push_attribute(("xmlns:xm", NS_XM));
    }
    Ok(root)
}

/// Cut the rule-carrying children out of a worksheet without building a DOM of the whole
/// sheet (`sheetData` can be huge).
///
/// The top-level `<conditionalFormatting>` and `<extLst>` elements are copied verbatim from the
/// source text into a small document under a root that keeps the original namespace
/// declarations. `None` when the worksheet has neither.
pub(crate) fn extract_conditional_formatting_wrapper(
    worksheet_xml: &str,
) -> Result<Option<String>, PartError> {
    let mut reader = Reader::from_str(worksheet_xml);
    reader.config_mut().trim_text(false);

    let mut root: Option<BytesStart<'static>> = None;
    let mut spans: Vec<Range<usize>> = Vec::new();
    let mut depth = 0usize;

    loop {
        let offset = reader.buffer_position() as usize;
        let event = reader.read_event()?;

        if root.is_none() {
            match event {
                Event::Start(e) => root = Some(wrapper_root(&e)?),
                Event::Empty(_) => return Ok(None),
                Event::Eof => return Err(PartError::MissingRoot),
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) if depth == 0 && carries_rules(local_name(e.name().as_ref())) => {
                reader.read_to_end(e.name())?;
                spans.push(offset..reader.buffer_position() as usize);
            }
            Event::Empty(e) if depth == 0 && carries_rules(local_name(e.name().as_ref())) => {
                spans.push(offset..reader.buffer_position() as usize);
            }
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => break,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(PartError::Invalid("unexpected end of worksheet")),
            _ => {}
        }
    }

    let Some(root) = root.filter(|_| !spans.is_empty()) else {
        return Ok(None);
    };

    let head = String::from_utf8_lossy(&root);
    let qname = String::from_utf8_lossy(root.name().as_ref()).into_owned();
    let body_len: usize = spans.iter().map(|span| span.len()).sum();
    let mut out = String::with_capacity(body_len + head.len() + qname.len() + 8);
    out.push('<');
    out.push_str(&head);
    out.push('>');
    for span in spans {
        out.push_str(&worksheet_xml[span]);
    }
    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worksheet_without_rules_has_no_wrapper() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;
        assert_eq!(extract_conditional_formatting_wrapper(xml).unwrap(), None);
        assert_eq!(extract_conditional_formatting_wrapper("<worksheet/>").unwrap(), None);
    }

    #[test]
    fn wrapper_keeps_blocks_and_namespaces() {
        let xml = r#"<x:worksheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main" mc:Ignorable="x14ac">
  <x:sheetData><x:row r="1"><x:c r="A1"/></x:row></x:sheetData>
  <x:conditionalFormatting sqref="A1"><x:cfRule type="expression" priority="1"><x:formula>A1=1</x:formula></x:cfRule></x:conditionalFormatting>
</x:worksheet>"#;
        let wrapper = extract_conditional_formatting_wrapper(xml)
            .unwrap()
            .expect("wrapper");
        assert!(wrapper.starts_with("<x:worksheet xmlns:x="));
        assert!(wrapper.contains(r#"<x:conditionalFormatting sqref="A1"><x:cfRule"#));
        assert!(wrapper.ends_with("</x:worksheet>"));
        assert!(!wrapper.contains("sheetData"));
        assert!(!wrapper.contains("Ignorable"));
        assert!(wrapper.contains("xmlns:x14="));
        roxmltree::Document::parse(&wrapper).expect("wrapper is well-formed");
    }

    #[test]
    fn nested_ext_lists_are_not_cut_twice() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData/>
  <extLst><ext uri="{X}"><extLst><ext uri="{Y}"/></extLst></ext></extLst>
</worksheet>"#;
        let wrapper = extract_conditional_formatting_wrapper(xml)
            .unwrap()
            .expect("wrapper");
        assert_eq!(wrapper.matches("<extLst>").count(), 2);
        roxmltree::Document::parse(&wrapper).expect("wrapper is well-formed");
    }

    #[test]
    fn truncated_worksheet_is_rejected() {
        let xml = r#"<worksheet><sheetData><row r="1">"#;
        assert!(extract_conditional_formatting_wrapper(xml).is_err());
    }

    #[test]
    fn non_xml_is_rejected() {
        assert!(matches!(
            extract_conditional_formatting_wrapper("definitely not xml"),
            Err(PartError::MissingRoot)
        ));
    }
}
