//! Document - root coordinator
//!
//! Owns the node arena behind the tree-lock together with the id and name
//! indexes, the stylesheet list and the style-rule cache. The listener
//! registry, load tracker and pending fetches live beside it with their own
//! synchronisation. Every notification is dispatched after the tree-lock
//! has been released.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use url::Url;

use crate::behavior::{BehaviorRegistry, ElementKind};
use crate::config::DocumentConfig;
use crate::load::{LoadObserver, LoadTracker};
use crate::node::{ElementData, Node, NodeData};
use crate::notify::{DocumentListener, ListenerRegistry, ListenerToken, Notification, NotificationKind};
use crate::operations::{DomError, DomResult};
use crate::render::{Rect, RenderHandle};
use crate::resource::{PendingLoads, ResourceFetcher, ResourceKind};
use crate::style::{clear_subtree_styles, CascadeEngine, NoCascade, RuleIndex};
use crate::tree::DomTree;
use crate::NodeId;

static NEXT_DOCUMENT: AtomicU32 = AtomicU32::new(1);

/// Parsing collaborator used by the document stream.
///
/// Implementations build the tree through the public API: an element is
/// appended to its (attached) parent before its attributes are set, so the
/// id and name indexes see it.
pub trait MarkupParser: Send + Sync {
    fn parse_into(&self, document: &Document, markup: &str) -> DomResult<()>;
}

/// Everything a document talks to, installed at construction
#[derive(Clone)]
pub struct Collaborators {
    pub cascade: Arc<dyn CascadeEngine>,
    pub parser: Option<Arc<dyn MarkupParser>>,
    pub fetcher: Option<Arc<dyn ResourceFetcher>>,
    pub behaviors: Arc<BehaviorRegistry>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            cascade: Arc::new(NoCascade),
            parser: None,
            fetcher: None,
            behaviors: BehaviorRegistry::shared(),
        }
    }
}

impl Collaborators {
    pub fn with_cascade(mut self, cascade: Arc<dyn CascadeEngine>) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn MarkupParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_behaviors(mut self, behaviors: Arc<BehaviorRegistry>) -> Self {
        self.behaviors = behaviors;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("parser", &self.parser.is_some())
            .field("fetcher", &self.fetcher.is_some())
            .finish()
    }
}

/// Document loading phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

/// Key -> element index with first-writer-wins semantics
#[derive(Debug, Default)]
pub(crate) struct NamedIndex {
    entries: HashMap<String, NodeId>,
}

impl NamedIndex {
    /// Returns false when another element already owns the key
    pub(crate) fn insert(&mut self, key: &str, node: NodeId) -> bool {
        if key.is_empty() {
            return false;
        }
        match self.entries.get(key) {
            Some(&owner) => owner == node,
            None => {
                self.entries.insert(key.to_string(), node);
                true
            }
        }
    }

    /// Remove `key` only if `node` owns it
    pub(crate) fn remove(&mut self, key: &str, node: NodeId) {
        if self.entries.get(key) == Some(&node) {
            self.entries.remove(key);
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<NodeId> {
        self.entries.get(key).copied()
    }

    pub(crate) fn remove_owned_by(&mut self, nodes: &HashSet<NodeId>) {
        self.entries.retain(|_, owner| !nodes.contains(owner));
    }

}

/// Everything guarded by the tree-lock
#[derive(Debug)]
pub(crate) struct TreeState {
    pub(crate) tree: DomTree,
    pub(crate) ids: NamedIndex,
    pub(crate) names: NamedIndex,
    pub(crate) stylesheets: Vec<Arc<str>>,
    /// Classified form of `stylesheets`, built on first style query
    pub(crate) rules: Option<RuleIndex>,
    pub(crate) focused: Option<NodeId>,
}

impl TreeState {
    pub(crate) fn set_element_by_id(&mut self, id: &str, node: NodeId) {
        if !self.ids.insert(id, node) {
            tracing::debug!(id, "Duplicate id ignored, first element keeps it");
        }
    }

    pub(crate) fn remove_element_by_id(&mut self, id: &str, node: NodeId) {
        self.ids.remove(id, node);
    }

    pub(crate) fn set_named_item(&mut self, name: &str, node: NodeId) {
        self.names.insert(name, node);
    }

    pub(crate) fn remove_named_item(&mut self, name: &str, node: NodeId) {
        self.names.remove(name, node);
    }
}

/// A resource fetch an attachment or attribute change asked for
#[derive(Debug)]
pub(crate) struct LoadStart {
    pub(crate) node: NodeId,
    pub(crate) kind: ResourceKind,
    pub(crate) src: String,
    pub(crate) layout_blocking: bool,
}

/// Side effects collected under the tree-lock, applied after release
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub(crate) notifications: Vec<Notification>,
    pub(crate) loads: Vec<LoadStart>,
}

impl Effects {
    pub(crate) fn notify(&mut self, node: NodeId, kind: NotificationKind) {
        self.notifications.push(Notification::new(kind, node));
    }
}

type LoadHandler = Box<dyn FnOnce(&Document) + Send>;

/// HTML Document
pub struct Document {
    state: Mutex<TreeState>,
    root: NodeId,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) jobs: LoadTracker,
    pub(crate) pending: PendingLoads,
    pub(crate) config: DocumentConfig,
    base_url: Option<Url>,
    pub(crate) cascade: Arc<dyn CascadeEngine>,
    parser: Option<Arc<dyn MarkupParser>>,
    pub(crate) fetcher: Option<Arc<dyn ResourceFetcher>>,
    pub(crate) behaviors: Arc<BehaviorRegistry>,
    ready_state: Mutex<ReadyState>,
    /// Markup buffered between `open` and `close`
    stream: Mutex<Option<String>>,
    load_handlers: Mutex<Vec<LoadHandler>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Document {
    /// Create an empty document with the default collaborators
    pub fn new(config: DocumentConfig) -> Arc<Self> {
        Self::with_collaborators(config, Collaborators::default())
    }

    pub fn with_collaborators(config: DocumentConfig, collaborators: Collaborators) -> Arc<Self> {
        let base_url = config.url.as_deref().and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(url = raw, "Malformed document URL, continuing without a base: {e}");
                None
            }
        });

        let tree = DomTree::new(NEXT_DOCUMENT.fetch_add(1, Ordering::Relaxed));
        let root = tree.root();

        Arc::new_cyclic(|weak: &Weak<Document>| {
            let observer: Weak<dyn LoadObserver> = weak.clone();
            Document {
                state: Mutex::new(TreeState {
                    tree,
                    ids: NamedIndex::default(),
                    names: NamedIndex::default(),
                    stylesheets: Vec::new(),
                    rules: None,
                    focused: None,
                }),
                root,
                listeners: ListenerRegistry::new(),
                jobs: LoadTracker::new(config.job_worker_name.clone(), observer),
                pending: PendingLoads::new(),
                base_url,
                cascade: collaborators.cascade,
                parser: collaborators.parser,
                fetcher: collaborators.fetcher,
                behaviors: collaborators.behaviors,
                ready_state: Mutex::new(ReadyState::Loading),
                stream: Mutex::new(None),
                load_handlers: Mutex::new(Vec::new()),
                config,
            }
        })
    }

    /// Acquire the tree-lock
    pub(crate) fn lock_tree(&self) -> MutexGuard<'_, TreeState> {
        lock(&self.state)
    }

    /// Document node
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Base URL, absent when none was given or it failed to parse
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Resolve a reference against the base URL. Absolute references
    /// resolve even without a base.
    pub fn resolve_url(&self, reference: &str) -> Option<Url> {
        match &self.base_url {
            Some(base) => base.join(reference).ok(),
            None => Url::parse(reference).ok(),
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        *lock(&self.ready_state)
    }

    fn set_ready_state(&self, state: ReadyState) {
        *lock(&self.ready_state) = state;
        tracing::debug!(?state, "Ready state changed");
    }

    /// Number of live nodes in the arena
    pub fn node_count(&self) -> usize {
        self.lock_tree().tree.len()
    }

    // ---------------------------------------------------------------
    // Factories
    // ---------------------------------------------------------------

    /// Create a detached element. The tag is lower-cased.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let kind = self.behaviors.kind_for_tag(&tag);
        self.alloc(NodeData::Element(ElementData::new(tag, kind)))
    }

    pub fn create_text_node(&self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        self.alloc(NodeData::Comment(text.to_string()))
    }

    pub fn create_document_fragment(&self) -> NodeId {
        self.alloc(NodeData::DocumentFragment)
    }

    pub fn create_doctype(&self, name: &str, public_id: &str, system_id: &str) -> NodeId {
        self.alloc(NodeData::Doctype {
            name: name.to_string(),
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
        })
    }

    pub fn create_processing_instruction(&self, target: &str, data: &str) -> NodeId {
        self.alloc(NodeData::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    fn alloc(&self, data: NodeData) -> NodeId {
        self.lock_tree().tree.alloc(Node::new(data))
    }

    pub fn create_element_ns(&self, _namespace: &str, _qualified_name: &str) -> DomResult<NodeId> {
        Err(DomError::UnsupportedOperation("namespaces"))
    }

    // ---------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let state = self.lock_tree();
        state.tree.get(node)?.as_element()?.attribute(name).map(str::to_owned)
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.get_attribute(node, name).is_some()
    }

    /// Attribute names, sorted
    pub fn attribute_names(&self, node: NodeId) -> Vec<String> {
        let state = self.lock_tree();
        state
            .tree
            .get(node)
            .and_then(Node::as_element)
            .map(|e| e.attribute_names().into_iter().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        self.change_attribute(node, name, Some(value))
    }

    /// Removing an absent attribute is a no-op
    pub fn remove_attribute(&self, node: NodeId, name: &str) -> DomResult<()> {
        self.change_attribute(node, name, None)
    }

    pub fn get_attribute_ns(&self, _node: NodeId, _namespace: &str, _name: &str) -> DomResult<Option<String>> {
        Err(DomError::UnsupportedOperation("namespaces"))
    }

    pub fn set_attribute_ns(&self, _node: NodeId, _namespace: &str, _name: &str, _value: &str) -> DomResult<()> {
        Err(DomError::UnsupportedOperation("namespaces"))
    }

    fn change_attribute(&self, node: NodeId, name: &str, value: Option<&str>) -> DomResult<()> {
        let name = name.to_ascii_lowercase();
        let mut effects = Effects::default();
        {
            let mut guard = self.lock_tree();
            let state = &mut *guard;
            state.tree.check_owner(node)?;
            let attached = state.tree.node(node)?.attached;
            let element = state.tree.element_mut(node)?;
            let old_style = element.styles.base();
            let old = match value {
                Some(v) => element.attrs.insert(name.clone(), v.to_string()),
                None => element.attrs.remove(&name),
            };
            if value.is_none() && old.is_none() {
                return Ok(());
            }
            let kind = element.kind;

            // Index maintenance only while attached; see `NamedIndex`
            if attached {
                match name.as_str() {
                    "id" => {
                        if let Some(old) = &old {
                            state.remove_element_by_id(old, node);
                        }
                        if let Some(v) = value {
                            state.set_element_by_id(v, node);
                        }
                    }
                    "name" => {
                        if let Some(old) = &old {
                            state.remove_named_item(old, node);
                        }
                        if let Some(v) = value {
                            state.set_named_item(v, node);
                        }
                    }
                    _ => {}
                }
            }

            clear_subtree_styles(&mut state.tree, node);
            let notification = match (name.as_str(), old_style) {
                ("style", Some(old_style)) => {
                    let new_style = self.resolve_style_locked(state, node, None)?;
                    if old_style.layout_differs(&new_style) {
                        NotificationKind::Structure
                    } else {
                        NotificationKind::Look
                    }
                }
                _ => NotificationKind::Structure,
            };
            effects.notify(node, notification);

            if name == "src" && attached {
                let behavior = self.behaviors.behavior(kind);
                if let (Some(resource), Some(src)) = (behavior.resource, value) {
                    effects.loads.push(LoadStart {
                        node,
                        kind: resource,
                        src: src.to_string(),
                        layout_blocking: behavior.layout_blocking,
                    });
                }
            }
        }
        self.apply(effects);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Id / name indexes
    // ---------------------------------------------------------------

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.lock_tree().ids.get(id)
    }

    /// Element registered under a `name` attribute
    pub fn get_named_item(&self, name: &str) -> Option<NodeId> {
        self.lock_tree().names.get(name)
    }

    // ---------------------------------------------------------------
    // Script-facing properties
    // ---------------------------------------------------------------

    /// Read a script property through the element kind's property table
    pub fn get_property(&self, node: NodeId, name: &str) -> DomResult<Option<String>> {
        let state = self.lock_tree();
        state.tree.check_owner(node)?;
        let view = match state.tree.element(node) {
            Some(view) => view,
            None => {
                state.tree.node(node)?;
                return Err(DomError::InvalidNodeType);
            }
        };
        let property = self.behaviors.behavior(view.kind()).property(name).ok_or(DomError::NotFound)?;
        Ok(property.get(&view))
    }

    /// Write a script property. Read-only properties are rejected.
    pub fn set_property(&self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        let kind = {
            let state = self.lock_tree();
            state.tree.check_owner(node)?;
            state.tree.node(node)?.as_element().ok_or(DomError::InvalidNodeType)?.kind
        };
        let property = self.behaviors.behavior(kind).property(name).ok_or(DomError::NotFound)?;
        let setter = property
            .setter()
            .ok_or(DomError::UnsupportedOperation("read-only property"))?;
        setter(self, node, value)
    }

    // ---------------------------------------------------------------
    // Well-known elements
    // ---------------------------------------------------------------

    /// The root element
    pub fn document_element(&self) -> Option<NodeId> {
        let state = self.lock_tree();
        let root = state.tree.get(self.root)?;
        root.children.iter().copied().find(|&c| state.tree.element(c).is_some())
    }

    pub fn head(&self) -> Option<NodeId> {
        self.root_child_of_kind(ElementKind::Head)
    }

    pub fn body(&self) -> Option<NodeId> {
        self.root_child_of_kind(ElementKind::Body)
    }

    fn root_child_of_kind(&self, kind: ElementKind) -> Option<NodeId> {
        let html = self.document_element()?;
        let state = self.lock_tree();
        state
            .tree
            .get(html)?
            .children
            .iter()
            .copied()
            .find(|&c| state.tree.element(c).is_some_and(|e| e.kind() == kind))
    }

    /// Text of the first `<title>`, whitespace collapsed
    pub fn title(&self) -> Option<String> {
        let state = self.lock_tree();
        let title = state.tree.find(self.root, |_, n| {
            n.as_element().is_some_and(|e| e.kind() == ElementKind::Title)
        })?;
        let text = state.tree.text_content(title);
        Some(text.split_ascii_whitespace().collect::<Vec<_>>().join(" "))
    }

    // ---------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------

    pub fn add_listener(&self, listener: Arc<dyn DocumentListener>) -> ListenerToken {
        self.listeners.add(listener)
    }

    /// Returns false if the token was already removed
    pub fn remove_listener(&self, token: ListenerToken) -> bool {
        self.listeners.remove(token)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Drop notifications until resumed (bulk parse)
    pub fn suspend_notifications(&self) {
        self.listeners.set_suspended(true);
    }

    /// Resume delivery. Whatever changed meanwhile is announced as one
    /// `Structure` notification on the document node.
    pub fn resume_notifications(&self) {
        if self.listeners.set_suspended(false) {
            self.dispatch(self.root, NotificationKind::Structure);
        }
    }

    /// Raise a notification on behalf of a collaborator. `Look` also asks
    /// the node's render handle to repaint.
    pub fn invalidate(&self, node: NodeId, kind: NotificationKind) {
        if kind == NotificationKind::Look {
            if let Some(handle) = self.render_handle(node) {
                handle.repaint();
            }
        }
        self.dispatch(node, kind);
    }

    /// Deliver a notification to a snapshot of the listeners. Must be
    /// called with neither lock held.
    pub(crate) fn dispatch(&self, node: NodeId, kind: NotificationKind) {
        if self.listeners.is_suspended() {
            return;
        }
        let notification = Notification::new(kind, node);
        for (token, listener) in self.listeners.snapshot() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.notify(self, &notification))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(?token, ?kind, "Listener error: {e}"),
                Err(_) => tracing::error!(?token, ?kind, "Listener panicked"),
            }
        }
    }

    pub(crate) fn apply(&self, effects: Effects) {
        for load in effects.loads {
            self.start_resource_load(load.node, load.kind, load.src, load.layout_blocking);
        }
        for notification in effects.notifications {
            self.invalidate(notification.node, notification.kind);
        }
    }

    // ---------------------------------------------------------------
    // Renderer
    // ---------------------------------------------------------------

    pub fn set_render_handle(&self, node: NodeId, handle: Arc<dyn RenderHandle>) -> DomResult<()> {
        let mut state = self.lock_tree();
        state.tree.check_owner(node)?;
        state.tree.node_mut(node)?.render = Some(handle);
        Ok(())
    }

    pub fn clear_render_handle(&self, node: NodeId) {
        if let Some(n) = self.lock_tree().tree.get_mut(node) {
            n.render = None;
        }
    }

    pub fn render_handle(&self, node: NodeId) -> Option<Arc<dyn RenderHandle>> {
        self.lock_tree().tree.get(node)?.render.clone()
    }

    /// Rendered bounds, `None` until the renderer installed a handle
    pub fn bounds(&self, node: NodeId) -> Option<Rect> {
        self.render_handle(node).map(|h| h.bounds())
    }

    // ---------------------------------------------------------------
    // Focus
    // ---------------------------------------------------------------

    pub fn focused_element(&self) -> Option<NodeId> {
        self.lock_tree().focused
    }

    /// Move focus to an attached element
    pub fn focus(&self, node: NodeId) -> DomResult<()> {
        let (previous, handles) = {
            let mut state = self.lock_tree();
            state.tree.check_owner(node)?;
            let target = state.tree.node(node)?;
            if !target.is_element() {
                return Err(DomError::InvalidNodeType);
            }
            if !target.attached {
                return Err(DomError::NotFound);
            }
            let new_handle = target.render.clone();
            let previous = state.focused.replace(node);
            if previous == Some(node) {
                return Ok(());
            }
            let old_handle = previous.and_then(|p| state.tree.get(p)).and_then(|n| n.render.clone());
            if let Some(p) = previous {
                clear_subtree_styles(&mut state.tree, p);
            }
            clear_subtree_styles(&mut state.tree, node);
            (previous, (old_handle, new_handle))
        };

        if let Some(old) = handles.0 {
            old.blur();
        }
        if let Some(new) = handles.1 {
            new.focus();
        }
        if let Some(p) = previous {
            self.invalidate(p, NotificationKind::Look);
        }
        self.invalidate(node, NotificationKind::Look);
        Ok(())
    }

    /// Drop focus, if any element holds it
    pub fn blur(&self) {
        let (node, handle) = {
            let mut state = self.lock_tree();
            let Some(node) = state.focused.take() else {
                return;
            };
            clear_subtree_styles(&mut state.tree, node);
            (node, state.tree.get(node).and_then(|n| n.render.clone()))
        };
        if let Some(handle) = handle {
            handle.blur();
        }
        self.invalidate(node, NotificationKind::Look);
    }

    // ---------------------------------------------------------------
    // Document stream
    // ---------------------------------------------------------------

    pub fn is_open(&self) -> bool {
        lock(&self.stream).is_some()
    }

    /// Discard the current content and start a new parse.
    ///
    /// Notifications are suspended until `close` and the parse counts as
    /// one layout-blocking job.
    pub fn open(&self) -> DomResult<()> {
        if self.is_open() {
            return Ok(());
        }
        self.detach_all_children();
        self.listeners.set_suspended(true);
        self.set_ready_state(ReadyState::Loading);
        self.jobs.rearm();
        self.jobs.register_jobs(1, true);
        *lock(&self.stream) = Some(String::new());
        tracing::debug!("Document stream opened");
        Ok(())
    }

    /// Buffer markup, opening the stream first if needed
    pub fn write(&self, markup: &str) -> DomResult<()> {
        if !self.is_open() {
            self.open()?;
        }
        if let Some(buffer) = lock(&self.stream).as_mut() {
            buffer.push_str(markup);
        }
        Ok(())
    }

    /// Parse the buffered markup and finish the parse job
    pub fn close(&self) -> DomResult<()> {
        let parser = self
            .parser
            .clone()
            .ok_or(DomError::UnsupportedOperation("document stream without a markup parser"))?;
        let Some(markup) = lock(&self.stream).take() else {
            return Ok(());
        };

        let result = parser.parse_into(self, &markup);
        if let Err(e) = &result {
            tracing::warn!("Markup parse failed: {e}");
        }

        self.resume_notifications();
        self.set_ready_state(ReadyState::Interactive);
        tracing::debug!(bytes = markup.len(), "Document stream closed");
        self.jobs.mark_jobs_finished(1, true);
        result
    }

    fn detach_all_children(&self) {
        let mut effects = Effects::default();
        {
            let mut state = self.lock_tree();
            let children = state.tree.get(self.root).map(|n| n.children.clone()).unwrap_or_default();
            for child in children {
                self.detach_locked(&mut state, child);
            }
            effects.notify(self.root, NotificationKind::Structure);
        }
        self.apply(effects);
    }

    // ---------------------------------------------------------------
    // Load
    // ---------------------------------------------------------------

    /// Run `handler` once the load signal fires, or now if it already has
    pub fn on_load(&self, handler: impl FnOnce(&Document) + Send + 'static) {
        let mut handlers = lock(&self.load_handlers);
        if self.jobs.is_loaded() {
            drop(handlers);
            handler(self);
        } else {
            handlers.push(Box::new(handler));
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.jobs.is_loaded()
    }

    /// Queue a job on the document's drain worker
    pub fn add_job(&self, job: impl FnOnce() + Send + 'static, layout_blocking: bool) -> DomResult<()> {
        self.jobs.add_job(job, layout_blocking)
    }

    /// Count deferred work a collaborator performs for the document
    pub fn register_jobs(&self, count: i64, layout_blocking: bool) {
        self.jobs.register_jobs(count, layout_blocking);
    }

    pub fn mark_jobs_finished(&self, count: i64, layout_blocking: bool) {
        self.jobs.mark_jobs_finished(count, layout_blocking);
    }

    pub fn registered_jobs(&self) -> i64 {
        self.jobs.registered_jobs()
    }

    pub fn layout_blocking_jobs(&self) -> i64 {
        self.jobs.layout_blocking_jobs()
    }

    /// Stop the job worker; see [`LoadTracker::stop_everything`]
    pub fn stop_everything(&self) {
        self.jobs.stop_everything();
    }

    pub fn is_stopped(&self) -> bool {
        self.jobs.is_stopped()
    }
}

impl LoadObserver for Document {
    fn layout_unblocked(&self) {
        self.dispatch(self.root, NotificationKind::Generic);
    }

    fn load_complete(&self) {
        self.set_ready_state(ReadyState::Complete);
        let handlers = std::mem::take(&mut *lock(&self.load_handlers));
        for handler in handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(self))).is_err() {
                tracing::error!("Load handler panicked");
            }
        }
        self.dispatch(self.root, NotificationKind::LoadProgress);
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.root)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("listeners", &self.listeners)
            .field("jobs", &self.jobs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_index_first_writer_wins() {
        let doc = Document::new(DocumentConfig::default());
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        let mut index = NamedIndex::default();
        assert!(index.insert("x", a));
        assert!(!index.insert("x", b));
        assert_eq!(index.get("x"), Some(a));

        index.remove("x", b);
        assert_eq!(index.get("x"), Some(a));
        index.remove("x", a);
        assert_eq!(index.get("x"), None);
        assert!(!index.insert("", a));
        assert_eq!(index.get(""), None);
    }

    #[test]
    fn test_malformed_url_degrades() {
        let doc = Document::new(DocumentConfig::default().with_url("not a url"));
        assert!(doc.base_url().is_none());
        assert_eq!(
            doc.resolve_url("https://example.com/a.png").map(|u| u.to_string()),
            Some("https://example.com/a.png".to_string())
        );
        assert!(doc.resolve_url("a.png").is_none());
    }

    #[test]
    fn test_resolve_relative_url() {
        let doc = Document::new(DocumentConfig::default().with_url("https://example.com/dir/page.html"));
        let url = doc.resolve_url("img/a.png").unwrap();
        assert_eq!(url.as_str(), "https://example.com/dir/img/a.png");
    }

    #[test]
    fn test_create_element_lowercases() {
        let doc = Document::new(DocumentConfig::default());
        let img = doc.create_element("IMG");
        assert_eq!(doc.node_name(img).as_deref(), Some("IMG"));
        assert_eq!(doc.get_property(img, "tagName"), Ok(Some("IMG".to_string())));
    }

    #[test]
    fn test_namespace_operations_unsupported() {
        let doc = Document::new(DocumentConfig::default());
        let div = doc.create_element("div");
        assert_eq!(
            doc.create_element_ns("http://www.w3.org/2000/svg", "svg"),
            Err(DomError::UnsupportedOperation("namespaces"))
        );
        assert!(doc.get_attribute_ns(div, "", "id").is_err());
        assert!(doc.set_attribute_ns(div, "", "id", "x").is_err());
    }

    #[test]
    fn test_close_without_parser() {
        let doc = Document::new(DocumentConfig::default());
        doc.write("<p>").unwrap();
        assert!(doc.is_open());
        assert_eq!(doc.close(), Err(DomError::UnsupportedOperation("document stream without a markup parser")));
        assert!(doc.is_open());
    }
}
