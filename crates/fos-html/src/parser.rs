//! HTML5 Parser implementation
//!
//! Uses html5ever's build-in RcDom and replays it into a `fos_dom::Document`
//! through the document's own operations, so ids, names and resource loads
//! are maintained exactly as for script-driven mutations.

use fos_dom::{Document, DomResult, MarkupParser, NodeId};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

/// HTML5 parser
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlParser;

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self
    }

    /// Parse `html` and append the result under the document node
    pub fn parse_into_document(&self, document: &Document, html: &str) -> DomResult<usize> {
        tracing::debug!(bytes = html.len(), "Parsing HTML document");
        let dom = parse_document(RcDom::default(), Default::default()).one(html);

        let mut created = 0;
        // Depth-first with an explicit stack; parents are always attached
        // before their children
        let mut stack: Vec<(Handle, NodeId)> = dom
            .document
            .children
            .borrow()
            .iter()
            .rev()
            .map(|child| (child.clone(), document.root()))
            .collect();

        while let Some((handle, parent)) = stack.pop() {
            let Some(node) = self.convert_node(&handle, document, parent)? else {
                continue;
            };
            created += 1;
            for child in handle.children.borrow().iter().rev() {
                stack.push((child.clone(), node));
            }
        }

        tracing::debug!("Parsed {} nodes", created);
        Ok(created)
    }

    /// Create the counterpart of one RcDom node and attach it
    fn convert_node(&self, handle: &Handle, document: &Document, parent: NodeId) -> DomResult<Option<NodeId>> {
        let node = match &handle.data {
            RcNodeData::Document => return Ok(None),
            RcNodeData::Doctype { name, public_id, system_id } => {
                document.create_doctype(name, public_id, system_id)
            }
            RcNodeData::Text { contents } => {
                let text = contents.borrow();
                if text.trim().is_empty() {
                    return Ok(None);
                }
                document.create_text_node(&text)
            }
            RcNodeData::Comment { contents } => document.create_comment(contents),
            RcNodeData::ProcessingInstruction { target, contents } => {
                document.create_processing_instruction(target, contents)
            }
            RcNodeData::Element { name, attrs, .. } => {
                let element = document.create_element(&name.local);
                document.append_child(parent, element)?;
                // Attributes go on after attaching so ids register and
                // resources start loading the same way they would from script
                for attr in attrs.borrow().iter() {
                    document.set_attribute(element, &attr.name.local, &attr.value)?;
                }
                return Ok(Some(element));
            }
        };
        document.append_child(parent, node)?;
        Ok(Some(node))
    }
}

impl MarkupParser for HtmlParser {
    fn parse_into(&self, document: &Document, markup: &str) -> DomResult<()> {
        self.parse_into_document(document, markup).map(|_| ())
    }
}
