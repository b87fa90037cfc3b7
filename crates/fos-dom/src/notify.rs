//! Notification bus
//!
//! Invalidation fan-out from any node to every registered listener. The
//! registry has its own lock, separate from the tree-lock, and listeners
//! always run with neither lock held so they may re-enter the document.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::document::Document;
use crate::NodeId;

/// What kind of change a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// Child list changed, or a change that needs relayout
    Structure,
    /// Size changed
    Size,
    /// Cosmetic change only; repaint without relayout
    Look,
    /// Position within the parent changed
    Position,
    /// Everything may have changed
    Generic,
    /// Node finished loading, or an external script started loading
    LoadProgress,
}

/// A single invalidation signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Originating node
    pub node: NodeId,
}

impl Notification {
    pub fn new(kind: NotificationKind, node: NodeId) -> Self {
        Self { kind, node }
    }
}

/// Error returned by a listener callback
#[derive(Debug, Clone, thiserror::Error)]
#[error("listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives every notification raised by a document
pub trait DocumentListener: Send + Sync {
    fn notify(&self, document: &Document, notification: &Notification) -> Result<(), ListenerError>;
}

impl<F> DocumentListener for F
where
    F: Fn(&Document, &Notification) -> Result<(), ListenerError> + Send + Sync,
{
    fn notify(&self, document: &Document, notification: &Notification) -> Result<(), ListenerError> {
        self(document, notification)
    }
}

/// Handle returned by registration, used to deregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

type Entry = (ListenerToken, Arc<dyn DocumentListener>);

/// Append-ordered listener registry guarded by the listener-lock
pub(crate) struct ListenerRegistry {
    next: AtomicU64,
    entries: Mutex<Vec<Entry>>,
    suspended: AtomicBool,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
            suspended: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add(&self, listener: Arc<dyn DocumentListener>) -> ListenerToken {
        let token = ListenerToken(self.next.fetch_add(1, Ordering::Relaxed));
        self.lock().push((token, listener));
        token
    }

    pub(crate) fn remove(&self, token: ListenerToken) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|(t, _)| *t == token) {
            Some(pos) => {
                entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Copy of the current list; the lock is released on return
    pub(crate) fn snapshot(&self) -> Vec<Entry> {
        self.lock().clone()
    }

    /// Returns the previous state
    pub(crate) fn set_suspended(&self, suspended: bool) -> bool {
        self.suspended.swap(suspended, Ordering::SeqCst)
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn DocumentListener> {
        Arc::new(|_: &Document, _: &Notification| Ok::<(), ListenerError>(()))
    }

    #[test]
    fn test_tokens_are_unique() {
        let registry = ListenerRegistry::new();
        let a = registry.add(noop());
        let b = registry.add(noop());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_once() {
        let registry = ListenerRegistry::new();
        let a = registry.add(noop());
        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_snapshot_is_detached_from_registry() {
        let registry = ListenerRegistry::new();
        let a = registry.add(noop());
        let snapshot = registry.snapshot();
        registry.remove(a);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 0);
    }
}
