use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::openxml::{normalize_sqref, parse_xml_bool, strip_leading_equals};
use crate::rules::{DvKind, DvRule, RuleSource};
use crate::worksheet::PartError;

#[derive(Clone, Copy, Debug)]
enum TextTarget {
    Formula1,
    Formula2,
    Sqref,
}

/// Start a record from the attributes of a `<dataValidation>` element.
///
/// Absent booleans take their schema default (`false`); an absent `type` means `none`.
fn start_validation(e: &BytesStart<'_>, source: RuleSource) -> Result<DvRule, PartError> {
    let mut rule = DvRule {
        source,
        ..DvRule::default()
    };

    for attr in e.attributes() {
        let attr = attr?;
        let val = attr.unescape_value()?.into_owned();
        match attr.key.local_name().as_ref() {
            b"type" => rule.kind = DvKind::parse(&val),
            b"operator" => rule.operator = Some(val),
            b"allowBlank" => rule.allow_blank = parse_xml_bool(&val),
            b"showInputMessage" => rule.show_input_message = parse_xml_bool(&val),
            b"showErrorMessage" => rule.show_error_message = parse_xml_bool(&val),
            b"showDropDown" => rule.hide_drop_down = parse_xml_bool(&val),
            b"sqref" => rule.range = normalize_sqref(&val),
            b"promptTitle" => rule.prompt_title = Some(val),
            b"prompt" => rule.prompt = Some(val),
            b"errorStyle" => rule.error_style = Some(val),
            b"errorTitle" => rule.error_title = Some(val),
            b"error" => rule.error = Some(val),
            _ => {}
        }
    }

    Ok(rule)
}

fn finish_validation(mut rule: DvRule, sqref_text: &str) -> DvRule {
    if rule.range.is_empty() {
        rule.range = normalize_sqref(sqref_text);
    }
    rule.formula1 = rule
        .formula1
        .map(|f| strip_leading_equals(&f).to_string());
    rule.formula2 = rule
        .formula2
        .map(|f| strip_leading_equals(&f).to_string());
    rule
}

/// Read every data validation of a worksheet part, standard and extension alike, in document
/// order. Nothing is filtered: `type="none"` and unrecognized kinds are returned as well.
///
/// Extension validations (`<x14:dataValidation>`) take their range from `<xm:sqref>` and their
/// operands from `<x14:formula1><xm:f>`.
pub fn read_data_validations_from_worksheet_xml(xml: &str) -> Result<Vec<DvRule>, PartError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out: Vec<DvRule> = Vec::new();

    let mut ext_uris: Vec<String> = Vec::new();
    let mut current: Option<DvRule> = None;
    let mut text_target: Option<TextTarget> = None;
    let mut sqref_text = String::new();

    let source_for = |ext_uris: &[String]| match ext_uris.last() {
        Some(uri) => RuleSource::Extension { uri: uri.clone() },
        None => RuleSource::Standard,
    };

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"ext" => {
                    let mut uri = String::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"uri" {
                            uri = attr.unescape_value()?.into_owned();
                        }
                    }
                    ext_uris.push(uri);
                }
                b"dataValidation" => {
                    current = Some(start_validation(&e, source_for(&ext_uris))?);
                    sqref_text.clear();
                }
                b"formula1" if current.is_some() => {
                    if let Some(cur) = current.as_mut() {
                        cur.formula1.get_or_insert_with(String::new);
                    }
                    text_target = Some(TextTarget::Formula1);
                }
                b"formula2" if current.is_some() => {
                    if let Some(cur) = current.as_mut() {
                        cur.formula2.get_or_insert_with(String::new);
                    }
                    text_target = Some(TextTarget::Formula2);
                }
                b"sqref" if current.is_some() => text_target = Some(TextTarget::Sqref),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"dataValidation" => {
                    let rule = start_validation(&e, source_for(&ext_uris))?;
                    out.push(finish_validation(rule, ""));
                }
                b"formula1" => {
                    if let Some(cur) = current.as_mut() {
                        cur.formula1.get_or_insert_with(String::new);
                    }
                }
                b"formula2" => {
                    if let Some(cur) = current.as_mut() {
                        cur.formula2.get_or_insert_with(String::new);
                    }
                }
                _ => {}
            },
            Event::Text(e) => {
                if let (Some(target), Some(cur)) = (text_target, current.as_mut()) {
                    let text = e.unescape()?;
                    push_text(cur, &mut sqref_text, target, &text);
                }
            }
            Event::CData(e) => {
                if let (Some(target), Some(cur)) = (text_target, current.as_mut()) {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    push_text(cur, &mut sqref_text, target, &text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"ext" => {
                    ext_uris.pop();
                }
                b"formula1" | b"formula2" | b"sqref" => text_target = None,
                b"dataValidation" => {
                    if let Some(cur) = current.take() {
                        out.push(finish_validation(cur, &sqref_text));
                    }
                    text_target = None;
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

fn push_text(cur: &mut DvRule, sqref_text: &mut String, target: TextTarget, text: &str) {
    match target {
        TextTarget::Formula1 => cur.formula1.get_or_insert_with(String::new).push_str(text),
        TextTarget::Formula2 => cur.formula2.get_or_insert_with(String::new).push_str(text),
        TextTarget::Sqref => {
            if !sqref_text.is_empty() {
                sqref_text.push(' ');
            }
            sqref_text.push_str(text);
        }
    }
}
