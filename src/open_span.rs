//! Open (walkable) spans: one per solid span in the [`SolidHeightfield`](crate::heightfield::SolidHeightfield),
//! inverted into floor+clearance form.

use crate::region::RegionId;

/// A walkable run in one column of the [`OpenHeightfield`](crate::open_heightfield::OpenHeightfield).
///
/// `height` is [`u16::MAX`] when the clearance above the floor is
/// unbounded (the topmost span in a column). The ceiling is
/// `floor + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct OpenHeightSpan {
    /// The solid-surface top this span rests on.
    pub floor: u16,
    /// Clearance above the floor. [`u16::MAX`] means unbounded.
    pub height: u16,
    /// The 4-direction axis neighbor links, as `(layer_offset within the
    /// neighbor cell)`, or `None` if there is no walkable neighbor in that
    /// direction.
    neighbors: [Option<u8>; 4],
    /// `0` ([`RegionId::NULL`]) until the watershed assigns a region.
    pub region: RegionId,
    /// Distance to the nearest border span.
    pub distance_to_border: u16,
    /// Distance to this span's region's flood-fill core (set during region
    /// growth).
    pub distance_to_region_core: u16,
}

impl OpenHeightSpan {
    /// `u16::MAX` height sentinel for "no ceiling above this span".
    pub const UNBOUNDED_HEIGHT: u16 = u16::MAX;

    /// The span's ceiling: `floor + height`, saturating if unbounded.
    #[inline]
    pub fn ceiling(&self) -> u32 {
        self.floor as u32 + self.height.min(u16::MAX - 1) as u32
    }

    /// Returns the neighbor layer-offset link for `direction` (0..4).
    #[inline]
    pub fn neighbor(&self, direction: u8) -> Option<u8> {
        self.neighbors[direction as usize & 0x3]
    }

    /// Sets the neighbor layer-offset link for `direction` (0..4).
    #[inline]
    pub fn set_neighbor(&mut self, direction: u8, neighbor: Option<u8>) {
        self.neighbors[direction as usize & 0x3] = neighbor;
    }
}

/// A transient, process-local scratch bit per span, used by the detail
/// mesh's height-patch flood (see [`crate::detail_mesh`]). Stored as a
/// parallel buffer rather than a field of [`OpenHeightSpan`] itself, so
/// callers borrow it explicitly instead of aliasing a mutable scratch field
/// next to otherwise-immutable span data.
///
/// Contract: every algorithm that borrows this buffer finds every entry it
/// touches at `false` on entry and restores it to `false` on exit.
#[derive(Debug, Clone, Default)]
pub struct SpanVisited(pub Vec<bool>);

impl SpanVisited {
    /// Creates a zeroed buffer sized for `span_count` spans.
    pub fn new(span_count: usize) -> Self {
        Self(vec![false; span_count])
    }

    /// Asserts every entry is `false`. Debug-only; call on entry to an
    /// algorithm that borrows this buffer.
    pub fn debug_assert_clear(&self) {
        debug_assert!(self.0.iter().all(|&v| !v), "scratch flags not clear on entry");
    }
}
