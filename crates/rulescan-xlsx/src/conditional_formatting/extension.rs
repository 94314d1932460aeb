use roxmltree::Node;

const BLOCK: &str = "conditionalFormatting";
const COLLECTION: &str = "conditionalFormattings";

/// Shape of a conditional-formatting container found under an `ext` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerShape {
    /// A lone `<x14:conditionalFormatting>` block.
    SingleBlock,
    /// `<x14:conditionalFormattings>` wrapping any number of blocks.
    BlockCollection,
}

impl ContainerShape {
    fn of(node: Node<'_, '_>) -> Option<Self> {
        if !node.is_element() {
            return None;
        }
        match node.tag_name().name() {
            BLOCK => Some(ContainerShape::SingleBlock),
            COLLECTION => Some(ContainerShape::BlockCollection),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtensionContainer<'a, 'input> {
    pub shape: ContainerShape,
    pub node: Node<'a, 'input>,
}

impl<'a, 'input> ExtensionContainer<'a, 'input> {
    /// The `conditionalFormatting` blocks held by this container, in document order.
    pub fn blocks(&self) -> Vec<Node<'a, 'input>> {
        match self.shape {
            ContainerShape::SingleBlock => vec![self.node],
            ContainerShape::BlockCollection => self
                .node
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == BLOCK)
                .collect(),
        }
    }
}

/// Find every CF container below `ext`, at any depth.
///
/// Inside `mc:AlternateContent` the first `Choice` that yields a container wins; `Fallback` is
/// only consulted when no `Choice` does.
pub fn discover_containers<'a, 'input>(ext: Node<'a, 'input>) -> Vec<ExtensionContainer<'a, 'input>> {
    let mut out = Vec::new();
    collect(ext, &mut out);
    out
}

fn collect<'a, 'input>(parent: Node<'a, 'input>, out: &mut Vec<ExtensionContainer<'a, 'input>>) {
    for child in parent.children().filter(|n| n.is_element()) {
        if let Some(shape) = ContainerShape::of(child) {
            out.push(ExtensionContainer { shape, node: child });
            continue;
        }
        if child.tag_name().name() == "AlternateContent" {
            collect_alternate_content(child, out);
            continue;
        }
        collect(child, out);
    }
}

fn collect_alternate_content<'a, 'input>(
    alternate: Node<'a, 'input>,
    out: &mut Vec<ExtensionContainer<'a, 'input>>,
) {
    for choice in alternate
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Choice")
    {
        let mut found = Vec::new();
        collect(choice, &mut found);
        if !found.is_empty() {
            out.extend(found);
            return;
        }
    }
    if let Some(fallback) = alternate
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "Fallback")
    {
        collect(fallback, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    fn shapes(xml: &str) -> Vec<(ContainerShape, usize)> {
        let doc = Document::parse(xml).expect("parse");
        discover_containers(doc.root_element())
            .into_iter()
            .map(|c| (c.shape, c.blocks().len()))
            .collect()
    }

    #[test]
    fn dispatches_on_child_identity() {
        let xml = r#"<ext xmlns:x14="urn:x14">
  <x14:conditionalFormattings>
    <x14:conditionalFormatting/>
    <x14:conditionalFormatting/>
  </x14:conditionalFormattings>
  <x14:conditionalFormatting/>
</ext>"#;
        assert_eq!(
            shapes(xml),
            vec![
                (ContainerShape::BlockCollection, 2),
                (ContainerShape::SingleBlock, 1)
            ]
        );
    }

    #[test]
    fn finds_containers_at_arbitrary_depth() {
        let xml = r#"<ext xmlns:x14="urn:x14"><a><b><c><x14:conditionalFormatting/></c></b></a></ext>"#;
        assert_eq!(shapes(xml), vec![(ContainerShape::SingleBlock, 1)]);
    }

    #[test]
    fn alternate_content_prefers_first_productive_choice() {
        let xml = r#"<ext xmlns:mc="urn:mc" xmlns:x14="urn:x14">
  <mc:AlternateContent>
    <mc:Choice Requires="x15"><nothing/></mc:Choice>
    <mc:Choice Requires="x14">
      <x14:conditionalFormattings><x14:conditionalFormatting/></x14:conditionalFormattings>
    </mc:Choice>
    <mc:Fallback><x14:conditionalFormatting/></mc:Fallback>
  </mc:AlternateContent>
</ext>"#;
        assert_eq!(shapes(xml), vec![(ContainerShape::BlockCollection, 1)]);
    }

    #[test]
    fn alternate_content_falls_back() {
        let xml = r#"<ext xmlns:mc="urn:mc" xmlns:x14="urn:x14">
  <mc:AlternateContent>
    <mc:Choice Requires="x15"/>
    <mc:Fallback><x14:conditionalFormatting/></mc:Fallback>
  </mc:AlternateContent>
</ext>"#;
        assert_eq!(shapes(xml), vec![(ContainerShape::SingleBlock, 1)]);
    }
}
