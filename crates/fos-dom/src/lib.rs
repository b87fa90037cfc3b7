//! fOS DOM - Document Object Model
//!
//! Thread-safe document engine. One `Document` owns every node in an arena
//! behind a single tree-lock; structural changes fan out to listeners
//! through the notification bus, which drives the live collections, the
//! computed-style cache and the renderer. Asynchronous work is counted by
//! the load tracker, which decides when the load signal fires.

mod behavior;
mod collection;
mod config;
mod document;
mod generation;
mod load;
mod node;
mod notify;
mod operations;
mod render;
mod resource;
mod style;
mod traversal;
mod tree;

pub use behavior::{BehaviorRegistry, ElementBehavior, ElementKind, ScriptProperty};
pub use collection::{CollectionFilter, LiveCollection};
pub use config::DocumentConfig;
pub use document::{Collaborators, Document, MarkupParser, ReadyState};
pub use generation::Generation;
pub use load::{Job, LoadObserver, LoadTracker};
pub use node::{ElementData, Node, NodeData, NodeType};
pub use notify::{DocumentListener, ListenerError, ListenerToken, Notification, NotificationKind};
pub use operations::{DomError, DomResult};
pub use render::{Rect, RenderHandle};
pub use resource::{RequestId, ResourceEvent, ResourceFetcher, ResourceKind, ResourceRequest};
pub use style::{
    CascadeEngine, CascadeOrigin, ComputedStyle, GeneratedContent, MatchCondition, MatchedRule, NoCascade,
    PseudoElement, RuleIndex, StyleDeclaration, LAYOUT_AFFECTING_PROPERTIES,
};
pub use traversal::Walk;
pub use tree::{DomTree, ElementView};

/// Node identifier: arena slot plus the generation it was allocated in,
/// stamped with the owning document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) document: u32,
    pub(crate) index: u32,
    pub(crate) generation: Generation,
}

impl NodeId {
    /// Slot index inside the owning document's arena
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> Generation {
        self.generation
    }
}
