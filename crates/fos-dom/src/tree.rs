//! DOM Tree (arena-based allocation)
//!
//! The document owns every node in a slot arena addressed by `NodeId`.
//! Parent links are plain handles into the arena. The tree itself does no
//! locking: `Document` keeps it behind the tree-lock and every method here
//! assumes the caller holds that lock.

use crate::generation::Generation;
use crate::node::{ElementData, Node, NodeData};
use crate::operations::{DomError, DomResult};
use crate::behavior::ElementKind;
use crate::NodeId;

struct Slot {
    generation: Generation,
    node: Option<Node>,
}

/// Arena-based DOM tree
pub struct DomTree {
    /// Owning document's identity, stamped into every handle
    document: u32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    live: usize,
}

impl DomTree {
    /// Create a tree holding only the (attached) document node
    pub(crate) fn new(document: u32) -> Self {
        let mut tree = Self {
            document,
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId { document, index: 0, generation: Generation::INITIAL },
            live: 0,
        };
        let mut document = Node::new(NodeData::Document);
        document.attached = true;
        tree.root = tree.alloc(document);
        tree
    }

    /// Document node
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, the document node included
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId { document: self.document, index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: Generation::INITIAL, node: Some(node) });
        NodeId { document: self.document, index, generation: Generation::INITIAL }
    }

    /// Handles minted by another document are rejected up front
    pub(crate) fn check_owner(&self, id: NodeId) -> DomResult<()> {
        if id.document == self.document {
            Ok(())
        } else {
            Err(DomError::WrongDocument)
        }
    }

    /// Get a node by ID; stale handles resolve to `None`
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.document != self.document {
            return None;
        }
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.document != self.document {
            return None;
        }
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub(crate) fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.get(id).ok_or(DomError::NotFound)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        self.get_mut(id).ok_or(DomError::NotFound)
    }

    pub(crate) fn element_mut(&mut self, id: NodeId) -> DomResult<&mut ElementData> {
        self.node_mut(id)?.as_element_mut().ok_or(DomError::InvalidNodeType)
    }

    /// Element view over a node, if it is an element
    pub fn element(&self, id: NodeId) -> Option<ElementView<'_>> {
        let data = self.get(id)?.as_element()?;
        Some(ElementView { tree: self, id, data })
    }

    /// Inclusive ancestor test: is `ancestor` equal to `node` or above it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(|n| n.parent);
        }
        false
    }

    /// Nearest ancestor that is an element
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.get(id)?.parent?;
        self.get(parent).filter(|n| n.is_element()).map(|_| parent)
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.subtree(id) {
            if let Some(text) = self.get(node).and_then(Node::as_text) {
                out.push_str(text);
            }
        }
        out
    }

    /// Detach `child` from its parent's child list
    pub(crate) fn unlink(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.get_mut(child)?.parent.take()?;
        if let Some(p) = self.get_mut(parent) {
            if let Some(pos) = p.children.iter().position(|&c| c == child) {
                p.children.remove(pos);
            }
        }
        Some(parent)
    }

    /// Insert an unparented `child` into `parent` at `index`
    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId, index: usize) -> DomResult<()> {
        self.node_mut(child)?.parent = Some(parent);
        let p = self.node_mut(parent)?;
        let index = index.min(p.children.len());
        p.children.insert(index, child);
        Ok(())
    }

    /// Subtree in pre-order, root first
    pub(crate) fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Recompute the attached flag top-down over the subtree.
    /// Returns the elements whose flag actually changed.
    pub(crate) fn set_attached(&mut self, root: NodeId, attached: bool) -> Vec<NodeId> {
        let mut changed = Vec::new();
        for id in self.subtree(root) {
            if let Some(node) = self.get_mut(id) {
                if node.attached != attached {
                    node.attached = attached;
                    if node.is_element() {
                        changed.push(id);
                    }
                }
            }
        }
        changed
    }

    /// Free every slot of a detached subtree. Handles into it go stale.
    pub(crate) fn release(&mut self, root: NodeId) -> usize {
        let ids = self.subtree(root);
        for id in &ids {
            let slot = &mut self.slots[id.index as usize];
            slot.node = None;
            slot.generation = slot.generation.next();
            self.free.push(id.index);
        }
        self.live -= ids.len();
        ids.len()
    }
}

impl std::fmt::Debug for DomTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomTree")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("root", &self.root)
            .finish()
    }
}

/// Read-only view of an element inside a locked tree.
///
/// Handed to the cascade engine and to collection filters; it can walk up
/// and sideways for selector matching but cannot mutate anything.
#[derive(Clone, Copy)]
pub struct ElementView<'a> {
    tree: &'a DomTree,
    id: NodeId,
    data: &'a ElementData,
}

impl<'a> ElementView<'a> {
    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn local_name(&self) -> &'a str {
        &self.data.tag
    }

    #[inline]
    pub fn kind(&self) -> ElementKind {
        self.data.kind
    }

    #[inline]
    pub fn data(&self) -> &'a ElementData {
        self.data
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.data.attribute(name)
    }

    pub fn id_attr(&self) -> Option<&'a str> {
        self.data.attrs.get("id").map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.data.classes().any(|c| c == class)
    }

    pub fn parent_element(&self) -> Option<ElementView<'a>> {
        let parent = self.tree.parent_element(self.id)?;
        self.tree.element(parent)
    }

    /// Parent is the document node
    pub fn is_root(&self) -> bool {
        self.tree.get(self.id).and_then(|n| n.parent) == Some(self.tree.root())
    }

    pub fn previous_element_sibling(&self) -> Option<ElementView<'a>> {
        let siblings = self.siblings()?;
        let pos = siblings.iter().position(|&c| c == self.id)?;
        siblings[..pos].iter().rev().find_map(|&c| self.tree.element(c))
    }

    pub fn next_element_sibling(&self) -> Option<ElementView<'a>> {
        let siblings = self.siblings()?;
        let pos = siblings.iter().position(|&c| c == self.id)?;
        siblings[pos + 1..].iter().find_map(|&c| self.tree.element(c))
    }

    pub fn has_child_nodes(&self) -> bool {
        self.tree.get(self.id).is_some_and(|n| !n.children.is_empty())
    }

    pub fn text_content(&self) -> String {
        self.tree.text_content(self.id)
    }

    fn siblings(&self) -> Option<&'a [NodeId]> {
        let parent = self.tree.get(self.id)?.parent?;
        Some(&self.tree.get(parent)?.children)
    }
}

impl std::fmt::Debug for ElementView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementView")
            .field("id", &self.id)
            .field("tag", &self.data.tag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tree: &mut DomTree, tag: &str) -> NodeId {
        tree.alloc(Node::new(NodeData::Element(ElementData::new(tag.into(), ElementKind::Unknown))))
    }

    #[test]
    fn test_new_tree_has_attached_root() {
        let tree = DomTree::new(1);
        assert_eq!(tree.len(), 1);
        assert!(tree.get(tree.root()).is_some_and(Node::is_attached));
    }

    #[test]
    fn test_link_and_unlink() {
        let mut tree = DomTree::new(1);
        let root = tree.root();
        let a = element(&mut tree, "a");
        let b = element(&mut tree, "b");
        tree.link(root, a, 0).unwrap();
        tree.link(root, b, 0).unwrap();
        assert_eq!(tree.get(root).unwrap().children(), &[b, a]);

        assert_eq!(tree.unlink(b), Some(root));
        assert_eq!(tree.get(root).unwrap().children(), &[a]);
        assert_eq!(tree.unlink(b), None);
    }

    #[test]
    fn test_subtree_is_preorder() {
        let mut tree = DomTree::new(1);
        let root = tree.root();
        let a = element(&mut tree, "a");
        let b = element(&mut tree, "b");
        let c = element(&mut tree, "c");
        tree.link(root, a, 0).unwrap();
        tree.link(a, b, 0).unwrap();
        tree.link(root, c, 1).unwrap();
        assert_eq!(tree.subtree(root), vec![root, a, b, c]);
    }

    #[test]
    fn test_release_makes_handles_stale() {
        let mut tree = DomTree::new(1);
        let a = element(&mut tree, "a");
        assert_eq!(tree.release(a), 1);
        assert!(tree.get(a).is_none());

        let reused = element(&mut tree, "b");
        assert_eq!(reused.index, a.index);
        assert_ne!(reused, a);
        assert!(tree.get(a).is_none());
    }

    #[test]
    fn test_foreign_handles_rejected() {
        let mut mine = DomTree::new(1);
        let mut other = DomTree::new(2);
        let a = element(&mut mine, "a");
        let b = element(&mut other, "b");
        assert_eq!(a.index, b.index);
        assert!(mine.get(b).is_none());
        assert_eq!(mine.check_owner(b), Err(DomError::WrongDocument));
        assert!(mine.check_owner(a).is_ok());
    }

    #[test]
    fn test_element_view_siblings() {
        let mut tree = DomTree::new(1);
        let root = tree.root();
        let a = element(&mut tree, "a");
        let b = element(&mut tree, "b");
        tree.link(root, a, 0).unwrap();
        tree.link(root, b, 1).unwrap();
        let view = tree.element(b).unwrap();
        assert_eq!(view.previous_element_sibling().map(|v| v.node_id()), Some(a));
        assert!(view.next_element_sibling().is_none());
        assert!(view.is_root());
    }
}
