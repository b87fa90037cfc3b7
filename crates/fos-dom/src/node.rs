//! DOM Node
//!
//! One `Node` representation for every node kind. Elements carry a tag-kind
//! discriminant instead of a per-tag type; per-kind behaviour lives in
//! [`crate::behavior`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::behavior::ElementKind;
use crate::render::RenderHandle;
use crate::style::StyleSlot;
use crate::NodeId;

/// DOM node type, with the numeric codes scripts expect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Element,
    Text,
    ProcessingInstruction,
    Comment,
    Document,
    DocumentType,
    DocumentFragment,
}

impl NodeType {
    pub fn to_u32(self) -> u32 {
        match self {
            NodeType::Element => 1,
            NodeType::Text => 3,
            NodeType::ProcessingInstruction => 7,
            NodeType::Comment => 8,
            NodeType::Document => 9,
            NodeType::DocumentType => 10,
            NodeType::DocumentFragment => 11,
        }
    }
}

/// DOM Node - Core structure
pub struct Node {
    /// Non-owning link to the parent
    pub(crate) parent: Option<NodeId>,
    /// Children in document order
    pub(crate) children: Vec<NodeId>,
    /// Reachable from the document root
    pub(crate) attached: bool,
    /// Renderer handle, installed lazily by the renderer
    pub(crate) render: Option<Arc<dyn RenderHandle>>,
    /// Node-specific data
    pub(crate) data: NodeData,
}

impl Node {
    pub(crate) fn new(data: NodeData) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            attached: false,
            render: None,
            data,
        }
    }

    /// Node type
    pub fn node_type(&self) -> NodeType {
        match &self.data {
            NodeData::Document => NodeType::Document,
            NodeData::DocumentFragment => NodeType::DocumentFragment,
            NodeData::Doctype { .. } => NodeType::DocumentType,
            NodeData::Element(_) => NodeType::Element,
            NodeData::Text(_) => NodeType::Text,
            NodeData::Comment(_) => NodeType::Comment,
            NodeData::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
        }
    }

    /// Parent node, if any
    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in document order
    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the node is reachable from its document root
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Node-specific data
    #[inline]
    pub fn data(&self) -> &NodeData {
        &self.data
    }

    /// Check if this is an element
    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    /// Get element data if this is an element
    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get text content if this is a text node
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Character data nodes cannot have children
    pub(crate) fn can_have_children(&self) -> bool {
        matches!(
            self.data,
            NodeData::Document | NodeData::DocumentFragment | NodeData::Element(_)
        )
    }

    /// Copy identity and attributes, leaving out caches and renderer state
    pub(crate) fn shallow_clone(&self) -> Node {
        let data = match &self.data {
            NodeData::Document => NodeData::Document,
            NodeData::DocumentFragment => NodeData::DocumentFragment,
            NodeData::Doctype { name, public_id, system_id } => NodeData::Doctype {
                name: name.clone(),
                public_id: public_id.clone(),
                system_id: system_id.clone(),
            },
            NodeData::Element(e) => NodeData::Element(ElementData {
                tag: e.tag.clone(),
                kind: e.kind,
                attrs: e.attrs.clone(),
                styles: StyleSlot::default(),
            }),
            NodeData::Text(t) => NodeData::Text(t.clone()),
            NodeData::Comment(c) => NodeData::Comment(c.clone()),
            NodeData::ProcessingInstruction { target, data } => NodeData::ProcessingInstruction {
                target: target.clone(),
                data: data.clone(),
            },
        };
        Node::new(data)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("attached", &self.attached)
            .field("has_render", &self.render.is_some())
            .field("data", &self.data)
            .finish()
    }
}

/// Node-specific data
#[derive(Debug)]
pub enum NodeData {
    /// Document root
    Document,
    /// Lightweight container whose children move on insertion
    DocumentFragment,
    /// DOCTYPE
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
    /// Element
    Element(ElementData),
    /// Text content
    Text(String),
    /// Comment
    Comment(String),
    /// Processing instruction
    ProcessingInstruction { target: String, data: String },
}

/// Element-specific data
#[derive(Debug)]
pub struct ElementData {
    /// Lower-cased local name
    pub(crate) tag: String,
    /// Behaviour discriminant resolved from the tag
    pub(crate) kind: ElementKind,
    /// Attributes keyed by lower-cased name
    pub(crate) attrs: HashMap<String, String>,
    /// Computed-style cache, guarded by the tree-lock
    pub(crate) styles: StyleSlot,
}

impl ElementData {
    pub(crate) fn new(tag: String, kind: ElementKind) -> Self {
        Self {
            tag,
            kind,
            attrs: HashMap::new(),
            styles: StyleSlot::default(),
        }
    }

    /// Lower-cased local name
    #[inline]
    pub fn local_name(&self) -> &str {
        &self.tag
    }

    /// Upper-cased tag name, as exposed to scripts
    pub fn tag_name(&self) -> String {
        self.tag.to_ascii_uppercase()
    }

    /// Behaviour discriminant
    #[inline]
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Get an attribute value
    pub fn attribute(&self, name: &str) -> Option<&str> {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.attrs.get(&name.to_ascii_lowercase()).map(String::as_str)
        } else {
            self.attrs.get(name).map(String::as_str)
        }
    }

    /// Attribute names, sorted for stable output
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attrs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whitespace-separated class list
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attrs
            .get("class")
            .map(|c| c.split_ascii_whitespace())
            .into_iter()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_codes() {
        assert_eq!(NodeType::Element.to_u32(), 1);
        assert_eq!(NodeType::Text.to_u32(), 3);
        assert_eq!(NodeType::Document.to_u32(), 9);
        assert_eq!(NodeType::DocumentFragment.to_u32(), 11);
    }

    #[test]
    fn test_attribute_lookup_is_case_insensitive() {
        let mut elem = ElementData::new("div".into(), ElementKind::Div);
        elem.attrs.insert("class".into(), "a  b".into());
        assert_eq!(elem.attribute("CLASS"), Some("a  b"));
        assert_eq!(elem.classes().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(elem.tag_name(), "DIV");
    }

    #[test]
    fn test_shallow_clone_drops_render_state() {
        let mut elem = ElementData::new("img".into(), ElementKind::Img);
        elem.attrs.insert("src".into(), "a.png".into());
        let mut node = Node::new(NodeData::Element(elem));
        node.attached = true;
        let copy = node.shallow_clone();
        assert!(!copy.attached);
        assert!(copy.render.is_none());
        assert_eq!(copy.as_element().and_then(|e| e.attribute("src")), Some("a.png"));
    }
}
