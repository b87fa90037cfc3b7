//! Renderer handle
//!
//! The renderer may attach a handle to any node. The document calls it
//! opportunistically; a node without a handle is simply not rendered yet.

/// Axis-aligned box in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

/// Per-node renderer state. Calls must not block.
pub trait RenderHandle: Send + Sync {
    /// Current border box
    fn bounds(&self) -> Rect;
    /// Schedule a repaint of this node
    fn repaint(&self);
    fn focus(&self);
    fn blur(&self);
}
