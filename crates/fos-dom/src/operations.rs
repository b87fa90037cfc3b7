//! DOM Node Operations
//!
//! Core node manipulation: appendChild, removeChild, insertBefore,
//! replaceChild, cloneNode. Each operation validates and splices inside one
//! tree-lock section, collects its side effects, and applies them after the
//! lock is gone.

use std::collections::HashSet;

use crate::document::{Document, Effects, LoadStart, TreeState};
use crate::node::{Node, NodeData, NodeType};
use crate::notify::NotificationKind;
use crate::style::clear_subtree_styles;
use crate::traversal::Walk;
use crate::tree::DomTree;
use crate::NodeId;

/// Result type for DOM operations
pub type DomResult<T> = Result<T, DomError>;

/// DOM operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// Insertion would create a cycle or an invalid document
    #[error("Hierarchy request error")]
    HierarchyViolation,
    /// Node, child or reference not found
    #[error("Node not found")]
    NotFound,
    /// Handle belongs to another document
    #[error("Wrong document")]
    WrongDocument,
    /// Operation not valid for this kind of node
    #[error("Invalid node type")]
    InvalidNodeType,
    /// Feature not implemented by this engine
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    /// Caller broke a sequencing contract
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// The job worker thread could not be started
    #[error("Job worker unavailable: {0}")]
    WorkerUnavailable(String),
}

/// Check that `node` may go under `parent`. `replacing` is the child that
/// the insertion will remove, if any.
fn validate_insertion(tree: &DomTree, parent: NodeId, node: NodeId, replacing: Option<NodeId>) -> DomResult<()> {
    tree.check_owner(parent)?;
    tree.check_owner(node)?;
    let parent_node = tree.node(parent)?;
    let inserted = tree.node(node)?;

    if !parent_node.can_have_children() {
        return Err(DomError::HierarchyViolation);
    }
    if matches!(inserted.data, NodeData::Document) {
        return Err(DomError::HierarchyViolation);
    }
    if tree.contains(node, parent) {
        return Err(DomError::HierarchyViolation);
    }

    if matches!(parent_node.data, NodeData::Document) {
        let incoming: Vec<&Node> = match inserted.data {
            NodeData::DocumentFragment => inserted.children.iter().filter_map(|&c| tree.get(c)).collect(),
            _ => vec![inserted],
        };
        if incoming.iter().any(|n| matches!(n.data, NodeData::Text(_))) {
            return Err(DomError::HierarchyViolation);
        }
        let existing = |pred: fn(&Node) -> bool| {
            parent_node
                .children
                .iter()
                .filter(|&&c| c != node && Some(c) != replacing)
                .filter_map(|&c| tree.get(c))
                .filter(|n| pred(n))
                .count()
        };
        let is_element: fn(&Node) -> bool = Node::is_element;
        let is_doctype: fn(&Node) -> bool = |n| matches!(n.data, NodeData::Doctype { .. });
        for pred in [is_element, is_doctype] {
            if existing(pred) + incoming.iter().filter(|n| pred(n)).count() > 1 {
                return Err(DomError::HierarchyViolation);
            }
        }
    }
    Ok(())
}

fn next_sibling_in(tree: &DomTree, node: NodeId) -> Option<NodeId> {
    let parent = tree.get(node)?.parent?;
    let siblings = &tree.get(parent)?.children;
    let pos = siblings.iter().position(|&c| c == node)?;
    siblings.get(pos + 1).copied()
}

fn clone_subtree(tree: &mut DomTree, node: NodeId, deep: bool) -> DomResult<NodeId> {
    let copy = tree.node(node)?.shallow_clone();
    let root = tree.alloc(copy);
    if !deep {
        return Ok(root);
    }
    // (source, its copy) pairs whose children still need copying
    let mut stack = vec![(node, root)];
    while let Some((source, target)) = stack.pop() {
        let children = tree.node(source)?.children.clone();
        for (i, child) in children.into_iter().enumerate() {
            let copy = tree.node(child)?.shallow_clone();
            let child_copy = tree.alloc(copy);
            tree.link(target, child_copy, i)?;
            stack.push((child, child_copy));
        }
    }
    Ok(root)
}

impl Document {
    /// Append a child node
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> DomResult<NodeId> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference`, or at the end when there is none.
    ///
    /// A child that already has a parent is moved. A fragment contributes
    /// its children instead of itself.
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> DomResult<NodeId> {
        let mut effects = Effects::default();
        {
            let mut state = self.lock_tree();
            validate_insertion(&state.tree, parent, child, None)?;
            let reference = match reference {
                Some(r) => {
                    state.tree.check_owner(r)?;
                    if state.tree.get(r).and_then(Node::parent) != Some(parent) {
                        return Err(DomError::NotFound);
                    }
                    if r == child { next_sibling_in(&state.tree, child) } else { Some(r) }
                }
                None => None,
            };
            let incoming = self.take_incoming(&mut state, child, &mut effects);
            self.splice_in(&mut state, parent, &incoming, reference, &mut effects)?;
        }
        self.apply(effects);
        Ok(child)
    }

    /// Replace `old` with `new`; returns `old`
    pub fn replace_child(&self, parent: NodeId, new: NodeId, old: NodeId) -> DomResult<NodeId> {
        let mut effects = Effects::default();
        {
            let mut state = self.lock_tree();
            state.tree.check_owner(old)?;
            if state.tree.get(old).and_then(Node::parent) != Some(parent) {
                return Err(DomError::NotFound);
            }
            validate_insertion(&state.tree, parent, new, Some(old))?;
            if new == old {
                return Ok(old);
            }

            let mut reference = next_sibling_in(&state.tree, old);
            if reference == Some(new) {
                reference = next_sibling_in(&state.tree, new);
            }
            let incoming = self.take_incoming(&mut state, new, &mut effects);
            self.detach_locked(&mut state, old);
            self.splice_in(&mut state, parent, &incoming, reference, &mut effects)?;
        }
        self.apply(effects);
        Ok(old)
    }

    /// Remove a child node
    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> DomResult<NodeId> {
        {
            let mut state = self.lock_tree();
            state.tree.check_owner(parent)?;
            state.tree.check_owner(child)?;
            if state.tree.node(child)?.parent != Some(parent) {
                return Err(DomError::NotFound);
            }
            self.detach_locked(&mut state, child);
        }
        self.dispatch(parent, NotificationKind::Structure);
        Ok(child)
    }

    /// Remove the child at `index`; out of range is `NotFound`
    pub fn remove_child_at(&self, parent: NodeId, index: usize) -> DomResult<NodeId> {
        let child = {
            let state = self.lock_tree();
            state.tree.check_owner(parent)?;
            state.tree.node(parent)?.children.get(index).copied().ok_or(DomError::NotFound)?
        };
        self.remove_child(parent, child)
    }

    /// Copy a node, and with `deep` its descendants. The copy is detached
    /// and carries no cached style, render state or listeners.
    pub fn clone_node(&self, node: NodeId, deep: bool) -> DomResult<NodeId> {
        let mut state = self.lock_tree();
        state.tree.check_owner(node)?;
        if matches!(state.tree.node(node)?.data, NodeData::Document) {
            return Err(DomError::UnsupportedOperation("cloning the document node"));
        }
        clone_subtree(&mut state.tree, node, deep)
    }

    /// Free a detached subtree. Handles into it go stale and resolve to
    /// `NotFound` afterwards. Returns the number of nodes freed.
    pub fn release(&self, node: NodeId) -> DomResult<usize> {
        let mut state = self.lock_tree();
        state.tree.check_owner(node)?;
        let target = state.tree.node(node)?;
        if node == self.root() || target.parent.is_some() || target.attached {
            return Err(DomError::HierarchyViolation);
        }
        let freed = state.tree.release(node);
        tracing::trace!(freed, "Released detached subtree");
        Ok(freed)
    }

    /// Replace the children of an element or fragment with one text node,
    /// or the data of a character-data node
    pub fn set_text_content(&self, node: NodeId, text: &str) -> DomResult<()> {
        let mut effects = Effects::default();
        {
            let mut state = self.lock_tree();
            state.tree.check_owner(node)?;
            let holds_children = matches!(
                state.tree.node(node)?.data,
                NodeData::Element(_) | NodeData::DocumentFragment
            );
            if holds_children {
                let children = state.tree.node(node)?.children.clone();
                for child in children {
                    self.detach_locked(&mut state, child);
                }
                if !text.is_empty() {
                    let text_node = state.tree.alloc(Node::new(NodeData::Text(text.to_string())));
                    self.splice_in(&mut state, node, &[text_node], None, &mut effects)?;
                }
            } else {
                match &mut state.tree.node_mut(node)?.data {
                    NodeData::Text(data) | NodeData::Comment(data) => *data = text.to_string(),
                    NodeData::ProcessingInstruction { data, .. } => *data = text.to_string(),
                    _ => return Ok(()),
                }
            }
            effects.notify(node, NotificationKind::Structure);
        }
        self.apply(effects);
        Ok(())
    }

    pub fn create_range(&self) -> DomResult<()> {
        Err(DomError::UnsupportedOperation("ranges"))
    }

    /// Nodes that will be linked for an insertion of `node`, already
    /// detached from wherever they were
    fn take_incoming(&self, state: &mut TreeState, node: NodeId, effects: &mut Effects) -> Vec<NodeId> {
        let is_fragment = state
            .tree
            .get(node)
            .is_some_and(|n| matches!(n.data, NodeData::DocumentFragment));
        if is_fragment {
            let children = state.tree.get(node).map(|n| n.children.clone()).unwrap_or_default();
            for &child in &children {
                state.tree.unlink(child);
            }
            effects.notify(node, NotificationKind::Structure);
            children
        } else {
            if let Some(old_parent) = self.detach_locked(state, node) {
                effects.notify(old_parent, NotificationKind::Structure);
            }
            vec![node]
        }
    }

    /// Link `nodes` under `parent` before `reference` and propagate the
    /// attached flag
    fn splice_in(
        &self,
        state: &mut TreeState,
        parent: NodeId,
        nodes: &[NodeId],
        reference: Option<NodeId>,
        effects: &mut Effects,
    ) -> DomResult<()> {
        let parent_node = state.tree.node(parent)?;
        let attached = parent_node.attached;
        let index = reference
            .and_then(|r| parent_node.children.iter().position(|&c| c == r))
            .unwrap_or(parent_node.children.len());

        for (offset, &node) in nodes.iter().enumerate() {
            state.tree.link(parent, node, index + offset)?;
            clear_subtree_styles(&mut state.tree, node);
            if !attached {
                continue;
            }
            for element in state.tree.set_attached(node, true) {
                let Some(view) = state.tree.element(element) else { continue };
                let behavior = self.behaviors.behavior(view.kind());
                if let (Some(kind), Some(src)) = (behavior.resource, view.attr("src")) {
                    effects.loads.push(LoadStart {
                        node: element,
                        kind,
                        src: src.to_string(),
                        layout_blocking: behavior.layout_blocking,
                    });
                }
            }
        }
        effects.notify(parent, NotificationKind::Structure);
        Ok(())
    }

    /// Unlink `node` from its parent and mark its subtree detached. Index
    /// entries owned by the detached elements go away with them.
    pub(crate) fn detach_locked(&self, state: &mut TreeState, node: NodeId) -> Option<NodeId> {
        let parent = state.tree.unlink(node)?;
        let detached: HashSet<NodeId> = state.tree.set_attached(node, false).into_iter().collect();
        if !detached.is_empty() {
            state.ids.remove_owned_by(&detached);
            state.names.remove_owned_by(&detached);
            if state.focused.is_some_and(|f| detached.contains(&f)) {
                state.focused = None;
            }
        }
        clear_subtree_styles(&mut state.tree, node);
        Some(parent)
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.lock_tree().tree.get(node)?.parent
    }

    /// Children in document order
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.lock_tree().tree.get(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    pub fn child_count(&self, node: NodeId) -> usize {
        self.lock_tree().tree.get(node).map_or(0, |n| n.children.len())
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.lock_tree().tree.get(node)?.children.first().copied()
    }

    pub fn last_child(&self, node: NodeId) -> Option<NodeId> {
        self.lock_tree().tree.get(node)?.children.last().copied()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        next_sibling_in(&self.lock_tree().tree, node)
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let state = self.lock_tree();
        let parent = state.tree.get(node)?.parent?;
        let siblings = &state.tree.get(parent)?.children;
        let pos = siblings.iter().position(|&c| c == node)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    /// Is `ancestor` equal to `node` or one of its ancestors
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.lock_tree().tree.contains(ancestor, node)
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.lock_tree().tree.get(node).is_some_and(Node::is_attached)
    }

    pub fn node_type(&self, node: NodeId) -> Option<NodeType> {
        self.lock_tree().tree.get(node).map(Node::node_type)
    }

    /// DOM `nodeName`
    pub fn node_name(&self, node: NodeId) -> Option<String> {
        let state = self.lock_tree();
        let name = match &state.tree.get(node)?.data {
            NodeData::Element(e) => e.tag_name(),
            NodeData::Text(_) => "#text".to_string(),
            NodeData::Comment(_) => "#comment".to_string(),
            NodeData::Document => "#document".to_string(),
            NodeData::DocumentFragment => "#document-fragment".to_string(),
            NodeData::Doctype { name, .. } => name.clone(),
            NodeData::ProcessingInstruction { target, .. } => target.clone(),
        };
        Some(name)
    }

    /// Upper-cased tag name of an element
    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        Some(self.lock_tree().tree.get(node)?.as_element()?.tag_name())
    }

    /// Data of a character-data node
    pub fn node_value(&self, node: NodeId) -> Option<String> {
        let state = self.lock_tree();
        match &state.tree.get(node)?.data {
            NodeData::Text(data) | NodeData::Comment(data) => Some(data.clone()),
            NodeData::ProcessingInstruction { data, .. } => Some(data.clone()),
            _ => None,
        }
    }

    /// DOM `textContent`; `None` for the document and doctypes
    pub fn text_content(&self, node: NodeId) -> Option<String> {
        let state = self.lock_tree();
        match &state.tree.get(node)?.data {
            NodeData::Document | NodeData::Doctype { .. } => None,
            NodeData::Text(data) | NodeData::Comment(data) => Some(data.clone()),
            NodeData::ProcessingInstruction { data, .. } => Some(data.clone()),
            NodeData::Element(_) | NodeData::DocumentFragment => Some(state.tree.text_content(node)),
        }
    }

    /// Pre-order traversal under the tree-lock. The visitor must not call
    /// back into the document. Returns `true` if it stopped early.
    pub fn walk<F>(&self, root: NodeId, visit: F) -> DomResult<bool>
    where
        F: FnMut(NodeId, &Node) -> Walk,
    {
        let state = self.lock_tree();
        state.tree.check_owner(root)?;
        state.tree.node(root)?;
        Ok(state.tree.walk(root, visit))
    }

    /// Run `f` against the locked tree
    pub fn read_tree<R>(&self, f: impl FnOnce(&DomTree) -> R) -> R {
        f(&self.lock_tree().tree)
    }
}
