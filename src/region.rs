//! Region identifiers and region-builder bookkeeping.

/// An identifier for a watershed region. `0` is the reserved null region.
///
/// The top bit ([`RegionId::BORDER`]) marks a heightfield-border region
/// during region growth; such regions are treated as un-walkable for
/// purposes of flood adjacency but still carry a distinct id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionId(u16);

impl RegionId {
    /// The null region: unassigned or non-walkable spans.
    pub const NULL: Self = Self(0);
    /// Flag bit marking a heightfield-border region.
    pub const BORDER: u16 = 0x8000;

    /// Creates a region id from a raw value (masking out the border bit
    /// is the caller's responsibility if that distinction matters).
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    /// The raw bit pattern, border flag included.
    pub fn raw(self) -> u16 {
        self.0
    }

    /// The id with the border flag masked off.
    pub fn id(self) -> u16 {
        self.0 & !Self::BORDER
    }

    /// Whether this is the null (unassigned) region.
    pub fn is_null(self) -> bool {
        self.id() == 0
    }

    /// Whether this id carries the border flag.
    pub fn is_border(self) -> bool {
        self.0 & Self::BORDER != 0
    }

    /// Returns the same region id with the border flag set.
    pub fn with_border(self) -> Self {
        Self(self.0 | Self::BORDER)
    }

    /// Returns the same region id with the border flag cleared.
    pub fn without_border(self) -> Self {
        Self(self.0 & !Self::BORDER)
    }

    /// Returns the next region id (raw value + 1), border flag cleared.
    pub fn next(self) -> Self {
        Self(self.id() + 1)
    }
}

impl Default for RegionId {
    fn default() -> Self {
        Self::NULL
    }
}

/// Builder-local bookkeeping for one region, accumulated during
/// [`CompactHeightfield::build_regions`](crate::open_heightfield::OpenHeightfield)
/// and consumed by the null-border cleanup and small-region filter passes.
#[derive(Debug, Clone, Default)]
pub struct Region {
    /// This region's id.
    pub id: RegionId,
    /// The number of spans currently assigned to this region.
    pub span_count: u32,
    /// Neighbor region ids in the order they were encountered walking this
    /// region's boundary. May contain repeats; a "connection run" is a
    /// maximal run of identical consecutive entries.
    pub connections: Vec<RegionId>,
    /// Region ids that overlap this region vertically (same xz footprint,
    /// different floor height), making them ineligible to merge together.
    pub overlaps: Vec<RegionId>,
    /// Set during compaction when this region has been merged away and
    /// should be skipped / remapped.
    pub remap: bool,
}

impl Region {
    /// Creates an empty region bookkeeping entry for `id`.
    pub fn new(id: RegionId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Records `neighbor` as adjacent to this region if it isn't already
    /// the most-recently recorded neighbor (collapsing consecutive repeats
    /// into a single connection run, as required for the "single shared
    /// portal" mergeability test region_filter.rs applies).
    pub fn add_unique_connection(&mut self, neighbor: RegionId) {
        if self.connections.last() != Some(&neighbor) {
            self.connections.push(neighbor);
        }
    }

    /// Removes consecutive duplicate connections, and collapses a
    /// wraparound duplicate between the first and last entries (the
    /// sequence is cyclic, having been built by walking a closed contour).
    pub fn normalize_connections(&mut self) {
        if self.connections.len() > 1 && self.connections.first() == self.connections.last() {
            self.connections.pop();
        }
    }

    /// The number of distinct maximal runs of `neighbor` in the boundary
    /// sequence (i.e. the number of separate portals shared with
    /// `neighbor`).
    pub fn connection_runs_with(&self, neighbor: RegionId) -> usize {
        let n = self.connections.len();
        if n == 0 {
            return 0;
        }
        let mut runs = 0;
        for i in 0..n {
            let prev = self.connections[(i + n - 1) % n];
            if self.connections[i] == neighbor && prev != neighbor {
                runs += 1;
            }
        }
        runs
    }

    /// Whether this region overlaps `other` vertically.
    pub fn overlaps(&self, other: RegionId) -> bool {
        self.overlaps.contains(&other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_flag_round_trips() {
        let id = RegionId::new(5).with_border();
        assert!(id.is_border());
        assert_eq!(id.id(), 5);
        assert_eq!(id.without_border().raw(), 5);
    }

    #[test]
    fn null_region_has_id_zero() {
        assert!(RegionId::NULL.is_null());
        assert!(!RegionId::new(1).is_null());
    }

    #[test]
    fn connection_runs_counts_maximal_runs_cyclically() {
        let mut region = Region::new(RegionId::new(1));
        let a = RegionId::new(2);
        let b = RegionId::new(3);
        // a, a, b, a -> cyclically, the last `a` joins the first `a` run: 2 runs of `a`, 1 of `b`.
        region.connections = vec![a, a, b, a];
        assert_eq!(region.connection_runs_with(a), 2);
        assert_eq!(region.connection_runs_with(b), 1);
    }
}
