//! Resource loading bookkeeping
//!
//! The document does not fetch anything itself. It hands requests to a
//! [`ResourceFetcher`] and counts each one as a load job until the network
//! layer reports back through the `*_loaded`/`*_aborted` callbacks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use url::Url;

use crate::document::Document;
use crate::notify::NotificationKind;
use crate::NodeId;

/// What an element is fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Script,
}

impl ResourceKind {
    fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Script => "script",
        }
    }
}

/// Request identity, echoed back in completion events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A fetch handed to the network layer
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    pub id: RequestId,
    pub kind: ResourceKind,
    /// Element that asked for the resource
    pub node: NodeId,
    /// The `src` attribute as written
    pub src: String,
    /// `src` resolved against the document base, when possible
    pub url: Option<Url>,
}

/// Completion event delivered by the network layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEvent {
    pub request: RequestId,
}

impl ResourceEvent {
    pub fn new(request: RequestId) -> Self {
        Self { request }
    }
}

/// Network collaborator. Must not block; completion is reported later.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, request: ResourceRequest);
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: ResourceKind,
    node: NodeId,
    layout_blocking: bool,
}

/// Requests started but not yet reported back
#[derive(Debug)]
pub(crate) struct PendingLoads {
    next: AtomicU64,
    requests: Mutex<HashMap<RequestId, Pending>>,
}

impl PendingLoads {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            requests: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Pending>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, kind: ResourceKind, node: NodeId, layout_blocking: bool) -> RequestId {
        let id = RequestId(self.next.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, Pending { kind, node, layout_blocking });
        id
    }

    fn take(&self, id: RequestId, kind: ResourceKind) -> Option<Pending> {
        let mut requests = self.lock();
        match requests.get(&id) {
            Some(pending) if pending.kind == kind => requests.remove(&id),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

impl Document {
    /// Start fetching what `node` points at. Called once the element is
    /// attached, and again whenever its `src` changes while attached.
    pub(crate) fn start_resource_load(&self, node: NodeId, kind: ResourceKind, src: String, layout_blocking: bool) {
        let enabled = match kind {
            ResourceKind::Image => self.config.enable_images,
            ResourceKind::Script => self.config.enable_scripts,
        };
        if !enabled {
            tracing::debug!(kind = kind.as_str(), src = %src, "Resource kind disabled, not loading");
            return;
        }

        let id = self.pending.start(kind, node, layout_blocking);
        self.jobs.register_jobs(1, layout_blocking);
        tracing::debug!(kind = kind.as_str(), request = id.value(), src = %src, "Resource load started");

        if kind == ResourceKind::Script {
            self.dispatch(node, NotificationKind::LoadProgress);
        }

        let url = self.resolve_url(&src);
        match &self.fetcher {
            Some(fetcher) => fetcher.fetch(ResourceRequest { id, kind, node, src, url }),
            None => tracing::debug!(request = id.value(), "No fetcher installed, request stays pending"),
        }
    }

    /// Network layer: an image finished loading
    pub fn image_loaded(&self, event: ResourceEvent) {
        self.finish_request(event, ResourceKind::Image, true);
    }

    /// Network layer: an image load failed or was cancelled
    pub fn image_aborted(&self, event: ResourceEvent) {
        self.finish_request(event, ResourceKind::Image, false);
    }

    pub fn script_loaded(&self, event: ResourceEvent) {
        self.finish_request(event, ResourceKind::Script, true);
    }

    pub fn script_aborted(&self, event: ResourceEvent) {
        self.finish_request(event, ResourceKind::Script, false);
    }

    /// Number of requests still waiting on the network layer
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn finish_request(&self, event: ResourceEvent, kind: ResourceKind, success: bool) {
        let Some(pending) = self.pending.take(event.request, kind) else {
            tracing::debug!(request = event.request.value(), kind = kind.as_str(), "Completion for unknown request ignored");
            return;
        };
        if success {
            self.dispatch(pending.node, NotificationKind::LoadProgress);
        } else {
            tracing::warn!(request = event.request.value(), kind = kind.as_str(), "Resource load aborted");
        }
        self.jobs.mark_jobs_finished(1, pending.layout_blocking);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeId {
        NodeId { document: 1, index: 7, generation: crate::generation::Generation::INITIAL }
    }

    #[test]
    fn test_pending_take_checks_kind() {
        let pending = PendingLoads::new();
        let id = pending.start(ResourceKind::Image, node(), false);
        assert!(pending.take(id, ResourceKind::Script).is_none());
        assert!(pending.take(id, ResourceKind::Image).is_some());
        assert!(pending.take(id, ResourceKind::Image).is_none());
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_request_ids_increase() {
        let pending = PendingLoads::new();
        let a = pending.start(ResourceKind::Image, node(), false);
        let b = pending.start(ResourceKind::Script, node(), true);
        assert!(b > a);
        assert_eq!(pending.len(), 2);
    }
}
