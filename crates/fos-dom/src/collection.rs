//! Live collections
//!
//! Filtered views over a subtree, populated on first access and dropped
//! back to "unpopulated" when a structural or load notification comes from
//! inside the subtree. The document only holds a weak reference to the
//! collection state through the registered listener.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use crate::behavior::ElementKind;
use crate::document::Document;
use crate::notify::{DocumentListener, ListenerError, ListenerToken, Notification, NotificationKind};
use crate::traversal::Walk;
use crate::tree::{DomTree, ElementView};
use crate::NodeId;

type Predicate = Arc<dyn Fn(&ElementView<'_>) -> bool + Send + Sync>;

/// Which elements a collection holds
#[derive(Clone)]
pub enum CollectionFilter {
    /// Elements with this local name; `"*"` matches every element
    Tag(String),
    /// Elements whose `name` attribute equals the value
    Name(String),
    Images,
    Forms,
    /// `a` and `area` elements with an `href`
    Links,
    /// `a` elements with a `name`
    Anchors,
    Scripts,
    Titles,
    Custom(Predicate),
}

impl CollectionFilter {
    pub fn custom(predicate: impl Fn(&ElementView<'_>) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, element: &ElementView<'_>) -> bool {
        match self {
            Self::Tag(tag) => tag == "*" || element.local_name().eq_ignore_ascii_case(tag),
            Self::Name(name) => element.attr("name") == Some(name.as_str()),
            Self::Images => element.kind() == ElementKind::Img,
            Self::Forms => element.kind() == ElementKind::Form,
            Self::Links => {
                matches!(element.kind(), ElementKind::Anchor | ElementKind::Area)
                    && element.attr("href").is_some()
            }
            Self::Anchors => element.kind() == ElementKind::Anchor && element.attr("name").is_some(),
            Self::Scripts => element.kind() == ElementKind::Script,
            Self::Titles => element.kind() == ElementKind::Title,
            Self::Custom(predicate) => predicate(element),
        }
    }
}

impl std::fmt::Debug for CollectionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tag(tag) => f.debug_tuple("Tag").field(tag).finish(),
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Self::Images => f.write_str("Images"),
            Self::Forms => f.write_str("Forms"),
            Self::Links => f.write_str("Links"),
            Self::Anchors => f.write_str("Anchors"),
            Self::Scripts => f.write_str("Scripts"),
            Self::Titles => f.write_str("Titles"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Items in document order plus the lookup tables for `named_item`
#[derive(Debug, Default)]
struct Populated {
    items: Vec<NodeId>,
    by_id: HashMap<String, NodeId>,
    by_name: HashMap<String, NodeId>,
}

#[derive(Debug)]
struct CollectionState {
    root: NodeId,
    filter: CollectionFilter,
    recurse_into_matches: bool,
    cache: Mutex<Option<Populated>>,
    computations: AtomicUsize,
}

impl CollectionState {
    fn lock(&self) -> MutexGuard<'_, Option<Populated>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate(&self) {
        self.lock().take();
    }

    fn populate(&self, tree: &DomTree) -> Populated {
        self.computations.fetch_add(1, Ordering::Relaxed);
        let mut populated = Populated::default();
        tree.walk(self.root, |id, node| {
            if id == self.root {
                return Walk::Continue;
            }
            if !node.is_element() {
                return Walk::SkipSubtree;
            }
            let Some(view) = tree.element(id) else {
                return Walk::Continue;
            };
            if !self.filter.matches(&view) {
                return Walk::Continue;
            }
            populated.items.push(id);
            if let Some(key) = view.id_attr() {
                populated.by_id.entry(key.to_string()).or_insert(id);
            }
            if let Some(key) = view.attr("name") {
                populated.by_name.entry(key.to_string()).or_insert(id);
            }
            if self.recurse_into_matches { Walk::Continue } else { Walk::SkipSubtree }
        });
        populated
    }
}

/// Registered with the document; holds the collection weakly
struct CollectionListener {
    state: Weak<CollectionState>,
    token: OnceLock<ListenerToken>,
}

impl DocumentListener for CollectionListener {
    fn notify(&self, document: &Document, notification: &Notification) -> Result<(), ListenerError> {
        let Some(state) = self.state.upgrade() else {
            if let Some(&token) = self.token.get() {
                document.remove_listener(token);
                tracing::trace!(?token, "Collection gone, listener deregistered");
            }
            return Ok(());
        };
        let relevant = matches!(
            notification.kind,
            NotificationKind::Structure | NotificationKind::LoadProgress
        );
        // A change reported on the document node covers every subtree
        let inside = notification.node == document.root() || document.contains(state.root, notification.node);
        if relevant && inside {
            state.invalidate();
        }
        Ok(())
    }
}

/// A cached, self-invalidating filtered view over a subtree
pub struct LiveCollection {
    document: Arc<Document>,
    state: Arc<CollectionState>,
    token: Mutex<Option<ListenerToken>>,
}

impl LiveCollection {
    /// Create a collection over the descendants of `root`. With
    /// `recurse_into_matches` off, matched elements hide their subtree.
    pub fn new(document: Arc<Document>, root: NodeId, filter: CollectionFilter, recurse_into_matches: bool) -> Self {
        let state = Arc::new(CollectionState {
            root,
            filter,
            recurse_into_matches,
            cache: Mutex::new(None),
            computations: AtomicUsize::new(0),
        });
        let listener = Arc::new(CollectionListener {
            state: Arc::downgrade(&state),
            token: OnceLock::new(),
        });
        let token = document.add_listener(listener.clone());
        let _ = listener.token.set(token);
        Self { document, state, token: Mutex::new(Some(token)) }
    }

    pub fn root(&self) -> NodeId {
        self.state.root
    }

    pub fn filter(&self) -> &CollectionFilter {
        &self.state.filter
    }

    fn with_items<R>(&self, f: impl FnOnce(&Populated) -> R) -> R {
        let mut cache = self.state.lock();
        if cache.is_none() {
            let populated = self.document.read_tree(|tree| self.state.populate(tree));
            *cache = Some(populated);
        }
        match cache.as_ref() {
            Some(populated) => f(populated),
            None => f(&Populated::default()),
        }
    }

    pub fn length(&self) -> usize {
        self.with_items(|p| p.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Item at `index`, `None` past the end
    pub fn item(&self, index: usize) -> Option<NodeId> {
        self.with_items(|p| p.items.get(index).copied())
    }

    /// First item whose id, or failing that whose name, equals `name`
    pub fn named_item(&self, name: &str) -> Option<NodeId> {
        self.with_items(|p| p.by_id.get(name).or_else(|| p.by_name.get(name)).copied())
    }

    pub fn to_vec(&self) -> Vec<NodeId> {
        self.with_items(|p| p.items.clone())
    }

    /// How many times the item list has been built
    pub fn computations(&self) -> usize {
        self.state.computations.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Stop tracking the document. The collection keeps its last contents.
    pub fn close(&self) {
        let token = self.token.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(token) = token {
            self.document.remove_listener(token);
        }
    }
}

impl Drop for LiveCollection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for LiveCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveCollection")
            .field("root", &self.state.root)
            .field("filter", &self.state.filter)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Document {
    /// Live collection of matching descendants of `root`
    pub fn collection(self: &Arc<Self>, root: NodeId, filter: CollectionFilter, recurse_into_matches: bool) -> LiveCollection {
        LiveCollection::new(Arc::clone(self), root, filter, recurse_into_matches)
    }

    pub fn get_elements_by_tag_name(self: &Arc<Self>, tag: &str) -> LiveCollection {
        self.collection(self.root(), CollectionFilter::Tag(tag.to_ascii_lowercase()), true)
    }

    pub fn get_elements_by_name(self: &Arc<Self>, name: &str) -> LiveCollection {
        self.collection(self.root(), CollectionFilter::Name(name.to_string()), true)
    }

    pub fn images(self: &Arc<Self>) -> LiveCollection {
        self.collection(self.root(), CollectionFilter::Images, true)
    }

    pub fn forms(self: &Arc<Self>) -> LiveCollection {
        self.collection(self.root(), CollectionFilter::Forms, true)
    }

    pub fn links(self: &Arc<Self>) -> LiveCollection {
        self.collection(self.root(), CollectionFilter::Links, true)
    }

    pub fn anchors(self: &Arc<Self>) -> LiveCollection {
        self.collection(self.root(), CollectionFilter::Anchors, true)
    }

    pub fn scripts(self: &Arc<Self>) -> LiveCollection {
        self.collection(self.root(), CollectionFilter::Scripts, true)
    }

    pub fn titles(self: &Arc<Self>) -> LiveCollection {
        self.collection(self.root(), CollectionFilter::Titles, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentConfig;

    #[test]
    fn test_filter_matching() {
        let doc = Document::new(DocumentConfig::default());
        let a = doc.create_element("a");
        doc.set_attribute(a, "href", "/x").unwrap();
        let matches = |filter: CollectionFilter| doc.read_tree(|tree| filter.matches(&tree.element(a).unwrap()));
        assert!(matches(CollectionFilter::Links));
        assert!(!matches(CollectionFilter::Anchors));
        assert!(matches(CollectionFilter::Tag("A".into())));
        assert!(matches(CollectionFilter::Tag("*".into())));
        assert!(matches(CollectionFilter::custom(|e| e.attr("href") == Some("/x"))));
    }

    #[test]
    fn test_orphaned_listener_deregisters() {
        let doc = Document::new(DocumentConfig::default());
        let state = Arc::new(CollectionState {
            root: doc.root(),
            filter: CollectionFilter::Images,
            recurse_into_matches: true,
            cache: Mutex::new(None),
            computations: AtomicUsize::new(0),
        });
        let listener = Arc::new(CollectionListener {
            state: Arc::downgrade(&state),
            token: OnceLock::new(),
        });
        let token = doc.add_listener(listener.clone());
        listener.token.set(token).unwrap();
        drop(state);

        assert_eq!(doc.listener_count(), 1);
        doc.invalidate(doc.root(), NotificationKind::Generic);
        assert_eq!(doc.listener_count(), 0);
    }

    #[test]
    fn test_recurse_into_matches() {
        let doc = Document::new(DocumentConfig::default());
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(doc.root(), outer).unwrap();
        doc.append_child(outer, inner).unwrap();

        let flat = doc.collection(doc.root(), CollectionFilter::Tag("div".into()), false);
        let deep = doc.collection(doc.root(), CollectionFilter::Tag("div".into()), true);
        assert_eq!(flat.to_vec(), vec![outer]);
        assert_eq!(deep.to_vec(), vec![outer, inner]);
    }

    #[test]
    fn test_named_item_prefers_id() {
        let doc = Document::new(DocumentConfig::default());
        let form = doc.create_element("form");
        doc.append_child(doc.root(), form).unwrap();
        let by_name = doc.create_element("input");
        let by_id = doc.create_element("input");
        doc.append_child(form, by_name).unwrap();
        doc.append_child(form, by_id).unwrap();
        doc.set_attribute(by_name, "name", "q").unwrap();
        doc.set_attribute(by_id, "id", "q").unwrap();

        let inputs = doc.get_elements_by_tag_name("input");
        assert_eq!(inputs.named_item("q"), Some(by_id));
        assert_eq!(inputs.named_item("missing"), None);
    }

    #[test]
    fn test_close_deregisters() {
        let doc = Document::new(DocumentConfig::default());
        let images = doc.images();
        assert_eq!(doc.listener_count(), 1);
        images.close();
        assert!(images.is_closed());
        assert_eq!(doc.listener_count(), 0);
        drop(images);
        assert_eq!(doc.listener_count(), 0);
    }
}
