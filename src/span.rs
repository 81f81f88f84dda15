//! Solid spans: vertically contiguous runs of obstructed voxel cells.
//!
//! Spans are stored in a single [`slotmap::SlotMap`] arena rather than as
//! individually heap-allocated nodes, so the ascending per-column linked
//! list is a chain of `SpanKey`s instead of boxed pointers.

use slotmap::SlotMap;

slotmap::new_key_type! {
    /// A key for a [`HeightSpan`] in a [`SolidHeightfield`](crate::heightfield::SolidHeightfield).
    pub struct SpanKey;
}

/// An identifier for the area type of a span or triangle.
///
/// `0` ([`AreaType::NOT_WALKABLE`]) is reserved. All other values are
/// walkable; when two spans merge, the resulting area type is the maximum
/// of the two (higher area ids take resolution priority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AreaType(pub u8);

impl AreaType {
    /// Not walkable; the null area.
    pub const NOT_WALKABLE: Self = Self(0);
    /// The default walkable area assigned by slope classification.
    pub const WALKABLE: Self = Self(u8::MAX);

    /// Whether this area type is walkable (anything but [`Self::NOT_WALKABLE`]).
    #[inline]
    pub fn is_walkable(&self) -> bool {
        *self != Self::NOT_WALKABLE
    }
}

impl Default for AreaType {
    fn default() -> Self {
        Self::NOT_WALKABLE
    }
}

bitflags::bitflags! {
    /// Per-span flags produced by the rasterization and post-filter passes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct SpanFlags: u8 {
        /// Set when the triangle(s) contributing this span's top surface
        /// pass the slope test. Cleared by the low-height and ledge filters.
        const WALKABLE = 1 << 0;
    }
}

/// A vertical run of solid (obstructed) voxel cells in one column of the
/// [`SolidHeightfield`](crate::heightfield::SolidHeightfield).
///
/// Invariant: within a column, spans are strictly ascending and separated
/// by at least one empty cell: `next.min >= self.max + 2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightSpan {
    min: u16,
    max: u16,
    flags: SpanFlags,
    next: Option<SpanKey>,
}

impl HeightSpan {
    /// Creates a new span. `min <= max` must hold.
    pub fn new(min: u16, max: u16, flags: SpanFlags) -> Self {
        debug_assert!(min <= max, "span min must not exceed max");
        Self {
            min,
            max,
            flags,
            next: None,
        }
    }

    /// The inclusive lower height index.
    #[inline]
    pub fn min(&self) -> u16 {
        self.min
    }

    /// Sets the inclusive lower height index.
    #[inline]
    pub fn set_min(&mut self, min: u16) {
        self.min = min;
    }

    /// The inclusive upper height index.
    #[inline]
    pub fn max(&self) -> u16 {
        self.max
    }

    /// Sets the inclusive upper height index.
    #[inline]
    pub fn set_max(&mut self, max: u16) {
        self.max = max;
    }

    /// This span's flags.
    #[inline]
    pub fn flags(&self) -> SpanFlags {
        self.flags
    }

    /// Sets this span's flags.
    #[inline]
    pub fn set_flags(&mut self, flags: SpanFlags) {
        self.flags = flags;
    }

    /// The key of the next-higher span in the same column.
    #[inline]
    pub fn next(&self) -> Option<SpanKey> {
        self.next
    }

    /// Sets the key of the next-higher span in the same column.
    #[inline]
    pub fn set_next(&mut self, next: Option<SpanKey>) {
        self.next = next;
    }
}

/// The arena backing every [`HeightSpan`] in a single heightfield build.
pub type Spans = SlotMap<SpanKey, HeightSpan>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_ordering_picks_higher_resolution_priority() {
        assert!(AreaType::WALKABLE > AreaType::NOT_WALKABLE);
        assert_eq!(AreaType::NOT_WALKABLE.max(AreaType(3)), AreaType(3));
    }

    #[test]
    fn not_walkable_is_not_walkable() {
        assert!(!AreaType::NOT_WALKABLE.is_walkable());
        assert!(AreaType::WALKABLE.is_walkable());
        assert!(AreaType(1).is_walkable());
    }
}
