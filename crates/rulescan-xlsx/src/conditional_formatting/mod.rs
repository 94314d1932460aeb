//! Conditional-formatting extraction.
//!
//! Rules live in two places in a worksheet part: top-level `<conditionalFormatting>` blocks and
//! extension containers nested under `<extLst><ext uri="...">`. Both produce [`CfRule`] records
//! and differ only in [`RuleSource`].

mod extension;
mod streaming;

use std::collections::BTreeMap;

use roxmltree::{Document, Node};

pub use extension::{discover_containers, ContainerShape, ExtensionContainer};

use crate::openxml::{normalize_sqref, strip_leading_equals};
use crate::rules::{CfKind, CfPayload, CfRule, CfVisual, ColorRef, RuleSource, ValueStop};
use crate::worksheet::PartError;

/// Extract every conditional-formatting rule from a worksheet part, in document order:
/// standard blocks first, then extension containers.
pub fn parse_worksheet_conditional_formatting(
    worksheet_xml: &str,
) -> Result<Vec<CfRule>, PartError> {
    match streaming::extract_conditional_formatting_wrapper(worksheet_xml)? {
        Some(wrapper) => parse_conditional_formatting_xml(&wrapper),
        None => Ok(Vec::new()),
    }
}

/// Parse CF rules from any document whose root element directly holds `conditionalFormatting`
/// and/or `extLst` children (a full worksheet or the streaming wrapper).
pub fn parse_conditional_formatting_xml(xml: &str) -> Result<Vec<CfRule>, PartError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    let mut rules = Vec::new();

    for block in element_children(root, "conditionalFormatting") {
        push_block_rules(block, &RuleSource::Standard, &mut rules);
    }

    for ext in element_children(root, "extLst").flat_map(|list| element_children(list, "ext")) {
        let source = RuleSource::Extension {
            uri: ext.attribute("uri").unwrap_or_default().to_string(),
        };
        for container in discover_containers(ext) {
            for block in container.blocks() {
                push_block_rules(block, &source, &mut rules);
            }
        }
    }

    Ok(rules)
}

fn element_children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn push_block_rules(block: Node<'_, '_>, source: &RuleSource, out: &mut Vec<CfRule>) {
    let range = block_range(block);
    let rule_nodes = block.children().filter(|n| {
        n.is_element() && !matches!(n.tag_name().name(), "sqref" | "extLst")
    });

    for (rule_index, node) in rule_nodes.enumerate() {
        if node.tag_name().name() == "cfRule" {
            out.push(parse_rule(node, &range, source, rule_index));
        } else {
            // Unfamiliar child of a block: keep it visible as an unknown rule.
            log::debug!(
                "unexpected <{}> inside conditionalFormatting {range}",
                node.tag_name().name()
            );
            out.push(CfRule {
                range: range.clone(),
                source: source.clone(),
                rule_index,
                kind: CfKind::Unknown(node.tag_name().name().to_string()),
                priority: None,
                priority_raw: None,
                style_ref: None,
                operator: None,
                formulas: Vec::new(),
                rule_id: None,
                linked_extension_id: None,
                payload: None,
            });
        }
    }
}

fn block_range(block: Node<'_, '_>) -> String {
    let raw = block
        .attribute("sqref")
        .or_else(|| {
            block
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "sqref")
                .and_then(|n| n.text())
        })
        .unwrap_or_default();
    normalize_sqref(raw)
}

fn parse_rule(node: Node<'_, '_>, range: &str, source: &RuleSource, rule_index: usize) -> CfRule {
    let style_ref = node.attribute("dxfId").map(str::to_string).or_else(|| {
        node.children()
            .any(|n| n.is_element() && n.tag_name().name() == "dxf")
            .then(|| "inline".to_string())
    });

    let formulas = node
        .children()
        .filter(|n| n.is_element() && matches!(n.tag_name().name(), "formula" | "f"))
        .map(|n| strip_leading_equals(n.text().unwrap_or_default()).to_string())
        .collect();

    let linked_extension_id = element_children(node, "extLst")
        .flat_map(|list| element_children(list, "ext"))
        .flat_map(|ext| ext.children().filter(|n| n.is_element()))
        .find(|n| n.tag_name().name() == "id")
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string());

    let payload = node.children().filter(|n| n.is_element()).find_map(|child| {
        match child.tag_name().name() {
            "colorScale" => Some(CfPayload::ColorScale(parse_visual(child))),
            "dataBar" => Some(CfPayload::DataBar(parse_visual(child))),
            "iconSet" => Some(CfPayload::IconSet(parse_visual(child))),
            _ => None,
        }
    });

    let (priority, priority_raw) = match node.attribute("priority") {
        None => (None, None),
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(priority) => (Some(priority), None),
            Err(_) => {
                log::debug!("non-numeric CF priority {raw:?} on {range}");
                (None, Some(raw.to_string()))
            }
        },
    };

    CfRule {
        range: range.to_string(),
        source: source.clone(),
        rule_index,
        kind: CfKind::parse(node.attribute("type").unwrap_or_default()),
        priority,
        priority_raw,
        style_ref,
        operator: node.attribute("operator").map(str::to_string),
        formulas,
        rule_id: node.attribute("id").map(str::to_string),
        linked_extension_id,
        payload,
    }
}

fn attribute_map(node: Node<'_, '_>) -> BTreeMap<String, String> {
    node.attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect()
}

fn parse_visual(node: Node<'_, '_>) -> CfVisual {
    let mut visual = CfVisual {
        attributes: attribute_map(node),
        ..CfVisual::default()
    };

    for child in node.children().filter(|n| n.is_element()) {
        let name = child.tag_name().name();
        match name {
            "cfvo" => {
                let value = child
                    .attribute("val")
                    .map(str::to_string)
                    .or_else(|| {
                        child
                            .children()
                            .find(|n| n.is_element() && n.tag_name().name() == "f")
                            .and_then(|n| n.text())
                            .map(|t| strip_leading_equals(t).to_string())
                    })
                    .unwrap_or_default();
                visual.stops.push(ValueStop {
                    kind: child.attribute("type").unwrap_or_default().to_string(),
                    value,
                    gte: child.attribute("gte").unwrap_or_default().to_string(),
                });
            }
            "cfIcon" => visual.icons.push(attribute_map(child)),
            _ if name == "color" || name.ends_with("Color") => visual.colors.push(ColorRef {
                role: name.to_string(),
                attributes: attribute_map(child),
            }),
            _ => {}
        }
    }

    visual
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NS: &str = r#"xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:x14="http://schemas.microsoft.com/office/spreadsheetml/2009/9/main" xmlns:xm="http://schemas.microsoft.com/office/excel/2006/main""#;

    #[test]
    fn standard_rule_with_visual_payload() {
        let xml = format!(
            r#"<worksheet {NS}><sheetData/>
<conditionalFormatting sqref="C1:C10">
  <cfRule type="colorScale" priority="2">
    <colorScale>
      <cfvo type="min"/><cfvo type="percentile" val="50"/><cfvo type="max"/>
      <color rgb="FFF8696B"/><color rgb="FFFFEB84"/><color rgb="FF63BE7B"/>
    </colorScale>
  </cfRule>
</conditionalFormatting></worksheet>"#
        );
        let rules = parse_worksheet_conditional_formatting(&xml).expect("parse");
        assert_eq!(rules.len(), 1);
        let Some(CfPayload::ColorScale(visual)) = &rules[0].payload else {
            panic!("expected color scale, got {:?}", rules[0].payload);
        };
        let kinds: Vec<&str> = visual.stops.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["min", "percentile", "max"]);
        assert_eq!(visual.stops[1].value, "50");
        assert_eq!(visual.colors.len(), 3);
        assert_eq!(visual.colors[0].attributes.get("rgb").map(String::as_str), Some("FFF8696B"));
    }

    #[test]
    fn standard_rule_links_to_extension_rule() {
        let xml = format!(
            r#"<worksheet {NS}>
<conditionalFormatting sqref="D2:D9">
  <cfRule type="dataBar" priority="1">
    <dataBar><cfvo type="min"/><cfvo type="max"/><color rgb="FF638EC6"/></dataBar>
    <extLst><ext uri="{{B025F937-C7B1-47D3-B67F-A62EFF666E3E}}"><x14:id>{{AAAA0000-0000-0000-0000-000000000001}}</x14:id></ext></extLst>
  </cfRule>
</conditionalFormatting></worksheet>"#
        );
        let rules = parse_worksheet_conditional_formatting(&xml).expect("parse");
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules[0].linked_extension_id.as_deref(),
            Some("{AAAA0000-0000-0000-0000-000000000001}")
        );
        assert_eq!(rules[0].range, "D2:D9");
    }

    #[test]
    fn extension_data_bar_reads_formula_stops_and_colors() {
        let xml = format!(
            r#"<worksheet {NS}><sheetData/>
<extLst><ext uri="{{78C0D931-6437-407d-A8EE-F0AAD7539E65}}">
  <x14:conditionalFormattings>
    <x14:conditionalFormatting xmlns:xm="http://schemas.microsoft.com/office/excel/2006/main">
      <x14:cfRule type="dataBar" id="{{AAAA0000-0000-0000-0000-000000000001}}">
        <x14:dataBar minLength="0" maxLength="100" gradient="0">
          <x14:cfvo type="num"><xm:f>0</xm:f></x14:cfvo>
          <x14:cfvo type="autoMax"/>
          <x14:fillColor rgb="FF638EC6"/>
          <x14:axisColor rgb="FF000000"/>
        </x14:dataBar>
      </x14:cfRule>
      <xm:sqref>D2:D9</xm:sqref>
    </x14:conditionalFormatting>
  </x14:conditionalFormattings>
</ext></extLst></worksheet>"#
        );
        let rules = parse_worksheet_conditional_formatting(&xml).expect("parse");
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.source.as_str(), "extension");
        assert_eq!(rule.range, "D2:D9");
        assert_eq!(rule.priority, None);
        let Some(CfPayload::DataBar(visual)) = &rule.payload else {
            panic!("expected data bar, got {:?}", rule.payload);
        };
        assert_eq!(visual.stops[0].value, "0");
        assert_eq!(visual.stops[1].kind, "autoMax");
        let roles: Vec<&str> = visual.colors.iter().map(|c| c.role.as_str()).collect();
        assert_eq!(roles, vec!["fillColor", "axisColor"]);
        assert_eq!(visual.attributes.get("gradient").map(String::as_str), Some("0"));
    }

    #[test]
    fn inline_dxf_and_unknown_children_are_kept() {
        let xml = format!(
            r#"<worksheet {NS}>
<extLst><ext uri="{{78C0D931-6437-407d-A8EE-F0AAD7539E65}}">
  <x14:conditionalFormatting>
    <x14:cfRule type="expression" priority="3" id="{{X}}"><xm:f>$A$1&gt;0</xm:f><x14:dxf><font/></x14:dxf></x14:cfRule>
    <x14:sparkleRule/>
    <xm:sqref>A1:B2   D4</xm:sqref>
  </x14:conditionalFormatting>
</ext></extLst></worksheet>"#
        );
        let rules = parse_worksheet_conditional_formatting(&xml).expect("parse");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].style_ref.as_deref(), Some("inline"));
        assert_eq!(rules[0].formulas, vec!["$A$1>0".to_string()]);
        assert_eq!(rules[0].range, "A1:B2 D4");
        assert_eq!(rules[1].kind.raw(), "sparkleRule");
        assert_eq!(rules[1].rule_index, 1);
    }

    #[test]
    fn unparseable_priority_keeps_its_text() {
        let xml = format!(
            r#"<worksheet {NS}>
<conditionalFormatting sqref="A1">
  <cfRule type="expression" priority=" 7 "><formula>A1=1</formula></cfRule>
  <cfRule type="expression" priority="high"><formula>A1=2</formula></cfRule>
  <cfRule type="expression"><formula>A1=3</formula></cfRule>
</conditionalFormatting></worksheet>"#
        );
        let rules = parse_worksheet_conditional_formatting(&xml).expect("parse");
        let priorities: Vec<(Option<u32>, Option<&str>)> = rules
            .iter()
            .map(|r| (r.priority, r.priority_raw.as_deref()))
            .collect();
        assert_eq!(
            priorities,
            vec![(Some(7), None), (None, Some("high")), (None, None)]
        );
    }
}
