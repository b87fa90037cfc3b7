//! Slot generations
//!
//! Every arena slot carries a generation that is bumped when the slot is
//! released. A `NodeId` remembers the generation it was issued with, so a
//! handle to a released node can never alias the node that reuses its slot.

/// Generation counter for one arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Generation(u32);

impl Generation {
    /// Generation of a freshly allocated slot
    pub const INITIAL: Self = Generation(0);

    /// Get the raw value
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Get the next generation
    #[inline]
    pub const fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::INITIAL
    }
}
