//! Tree traversal with explicit continuation
//!
//! Scans that need to stop early or prune a subtree say so through the
//! visitor's return value.

use crate::node::Node;
use crate::tree::DomTree;
use crate::NodeId;

/// What the traversal should do after visiting a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// Descend into the node's children, then carry on
    Continue,
    /// Do not visit this node's descendants
    SkipSubtree,
    /// End the traversal
    Stop,
}

impl DomTree {
    /// Depth-first pre-order traversal starting at (and including) `root`.
    ///
    /// Returns `true` if the visitor asked to stop.
    pub fn walk<F>(&self, root: NodeId, mut visit: F) -> bool
    where
        F: FnMut(NodeId, &Node) -> Walk,
    {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            match visit(id, node) {
                Walk::Continue => stack.extend(node.children.iter().rev().copied()),
                Walk::SkipSubtree => {}
                Walk::Stop => return true,
            }
        }
        false
    }

    /// First node in document order under `root` matching `pred`
    pub fn find<F>(&self, root: NodeId, mut pred: F) -> Option<NodeId>
    where
        F: FnMut(NodeId, &Node) -> bool,
    {
        let mut found = None;
        self.walk(root, |id, node| {
            if pred(id, node) {
                found = Some(id);
                Walk::Stop
            } else {
                Walk::Continue
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::ElementKind;
    use crate::node::{ElementData, NodeData};

    fn build() -> (DomTree, Vec<NodeId>) {
        // root > a > (b, c), root > d
        let mut tree = DomTree::new(1);
        let root = tree.root();
        let mut ids = Vec::new();
        for tag in ["a", "b", "c", "d"] {
            let data = ElementData::new(tag.into(), ElementKind::Unknown);
            ids.push(tree.alloc(Node::new(NodeData::Element(data))));
        }
        tree.link(root, ids[0], 0).unwrap();
        tree.link(ids[0], ids[1], 0).unwrap();
        tree.link(ids[0], ids[2], 1).unwrap();
        tree.link(root, ids[3], 1).unwrap();
        (tree, ids)
    }

    #[test]
    fn test_walk_skip_subtree() {
        let (tree, ids) = build();
        let mut seen = Vec::new();
        tree.walk(tree.root(), |id, _| {
            seen.push(id);
            if id == ids[0] { Walk::SkipSubtree } else { Walk::Continue }
        });
        assert_eq!(seen, vec![tree.root(), ids[0], ids[3]]);
    }

    #[test]
    fn test_walk_stop() {
        let (tree, ids) = build();
        let mut count = 0;
        let stopped = tree.walk(tree.root(), |id, _| {
            count += 1;
            if id == ids[1] { Walk::Stop } else { Walk::Continue }
        });
        assert!(stopped);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_find_document_order() {
        let (tree, ids) = build();
        let found = tree.find(tree.root(), |_, n| {
            n.as_element().is_some_and(|e| e.local_name() == "c" || e.local_name() == "d")
        });
        assert_eq!(found, Some(ids[2]));
    }
}
