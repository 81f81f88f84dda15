//! The solid heightfield: a voxel grid of strictly-ascending solid spans
//! produced by rasterizing input triangles, with merge-on-overlap ADD
//! semantics for newly inserted spans.

use thiserror::Error;

use crate::{
    math::Aabb3d,
    span::{HeightSpan, SpanFlags, SpanKey, Spans},
};

/// Width/depth extents, cell sizing, and world bounds shared by every
/// heightfield stage.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundedField {
    /// Grid extent along the x-axis, in cells.
    pub width: u16,
    /// Grid extent along the z-axis, in cells.
    pub depth: u16,
    /// The xz sampling resolution, in world units.
    pub cell_size: f32,
    /// The y sampling resolution, in world units.
    pub cell_height: f32,
    /// The world-space bounds of the field.
    pub aabb: Aabb3d,
}

impl BoundedField {
    /// Converts a voxel-space column coordinate to the world-space xz
    /// position of its center.
    pub fn column_to_world_center(&self, x: u16, z: u16) -> (f32, f32) {
        let wx = self.aabb.min.x + (x as f32 + 0.5) * self.cell_size;
        let wz = self.aabb.min.z + (z as f32 + 0.5) * self.cell_size;
        (wx, wz)
    }

    /// Converts a height index to its world-space y coordinate.
    pub fn height_to_world(&self, height: u16) -> f32 {
        self.aabb.min.y + height as f32 * self.cell_height
    }

    /// The number of columns in the grid (`width * depth`).
    pub fn column_count(&self) -> usize {
        self.width as usize * self.depth as usize
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains_column(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width as i32 && z >= 0 && z < self.depth as i32
    }
}

/// A voxel grid of solid (obstructed) spans, one ascending chain per column.
///
/// Built by [`HeightfieldBuilder`] and populated by rasterizing triangles
/// (see `crate::rasterize`).
#[derive(Debug, Clone)]
pub struct SolidHeightfield {
    /// The shared grid geometry.
    pub field: BoundedField,
    /// The key of the lowest span in each column, in `width * depth` order.
    spans_head: Vec<Option<SpanKey>>,
    /// All spans allocated for this field.
    spans: Spans,
}

impl SolidHeightfield {
    /// The grid geometry.
    pub fn field(&self) -> &BoundedField {
        &self.field
    }

    /// Returns the key of the lowest span in the given column.
    pub fn column_head(&self, x: u16, z: u16) -> Option<SpanKey> {
        self.spans_head[self.field.column_index(x, z)]
    }

    /// Returns the span for a given key.
    pub fn span(&self, key: SpanKey) -> &HeightSpan {
        &self.spans[key]
    }

    /// Returns an iterator over the ascending spans of one column.
    pub fn column_spans(&self, x: u16, z: u16) -> ColumnSpanIter<'_> {
        ColumnSpanIter {
            field: self,
            next: self.column_head(x, z),
        }
    }

    /// Inserts `[min, max]` with `flags` into the column at `(x, z)`,
    /// merging with any spans it overlaps or directly abuts.
    ///
    /// # Errors
    /// Returns [`SpanInsertionError::ColumnOutOfBounds`] if `(x, z)` is
    /// outside the field.
    pub fn add_span(
        &mut self,
        x: u16,
        z: u16,
        min: u16,
        max: u16,
        flags: SpanFlags,
    ) -> Result<(), SpanInsertionError> {
        debug_assert!(min <= max);
        if x >= self.field.width || z >= self.field.depth {
            return Err(SpanInsertionError::ColumnOutOfBounds { x, z });
        }
        let column = self.field.column_index(x, z);

        let mut new_min = min;
        let mut new_max = max;
        let mut new_flags = flags;

        let mut prev: Option<SpanKey> = None;
        let mut cur = self.spans_head[column];

        // Walk past spans strictly below the new span (separated by a gap).
        while let Some(cur_key) = cur {
            let cur_span = &self.spans[cur_key];
            if cur_span.min() > new_max + 1 {
                // Current span starts after the new span ends (with a gap): insert before it.
                break;
            }
            if cur_span.max() + 1 < new_min {
                // Current span ends before the new span starts (with a gap): keep walking up.
                prev = cur;
                cur = cur_span.next();
                continue;
            }

            // Overlaps or directly abuts: absorb it.
            let absorbed_min = cur_span.min();
            let absorbed_max = cur_span.max();
            let absorbed_flags = cur_span.flags();
            let next_key = cur_span.next();

            new_min = new_min.min(absorbed_min);
            if max == absorbed_max {
                new_flags = flags | absorbed_flags;
            } else if max > absorbed_max {
                new_flags = flags;
            } else {
                new_flags = absorbed_flags;
            }
            new_max = new_max.max(absorbed_max);

            self.spans.remove(cur_key);
            if let Some(prev_key) = prev {
                self.spans_mut_next(prev_key, next_key);
            } else {
                self.spans_head[column] = next_key;
            }
            cur = next_key;
        }

        let mut new_span = HeightSpan::new(new_min, new_max, new_flags);
        new_span.set_next(cur);
        let new_key = self.spans.insert(new_span);
        if let Some(prev_key) = prev {
            self.spans_mut_next(prev_key, Some(new_key));
        } else {
            self.spans_head[column] = Some(new_key);
        }
        Ok(())
    }

    fn spans_mut_next(&mut self, key: SpanKey, next: Option<SpanKey>) {
        self.spans[key].set_next(next);
    }

    /// Clears the walkable flag of the span with the given key.
    pub fn clear_walkable_flag(&mut self, key: SpanKey) {
        let mut flags = self.spans[key].flags();
        flags.remove(SpanFlags::WALKABLE);
        self.spans[key].set_flags(flags);
    }

    /// Applies `f` to every span in the field, in column-major order.
    pub fn for_each_span_mut(&mut self, mut f: impl FnMut(u16, u16, &mut HeightSpan)) {
        for z in 0..self.field.depth {
            for x in 0..self.field.width {
                let mut next = self.column_head(x, z);
                while let Some(key) = next {
                    next = self.spans[key].next();
                    f(x, z, &mut self.spans[key]);
                }
            }
        }
    }
}

/// Iterates the ascending spans of a single column.
pub struct ColumnSpanIter<'a> {
    field: &'a SolidHeightfield,
    next: Option<SpanKey>,
}

impl<'a> Iterator for ColumnSpanIter<'a> {
    type Item = (SpanKey, &'a HeightSpan);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.next?;
        let span = self.field.span(key);
        self.next = span.next();
        Some((key, span))
    }
}

/// Builds a [`SolidHeightfield`] for a world-space AABB and cell sizing.
pub struct HeightfieldBuilder {
    /// The world-space AABB the field should cover.
    pub aabb: Aabb3d,
    /// The xz sampling resolution, in world units.
    pub cell_size: f32,
    /// The y sampling resolution, in world units.
    pub cell_height: f32,
}

impl HeightfieldBuilder {
    /// Builds the heightfield.
    ///
    /// # Errors
    /// Returns [`HeightfieldBuilderError::ColumnCountTooLarge`] if the
    /// resulting column count would overflow `usize`.
    pub fn build(self) -> Result<SolidHeightfield, HeightfieldBuilderError> {
        let width = (self.aabb.max.x - self.aabb.min.x) / self.cell_size + 0.5;
        let depth = (self.aabb.max.z - self.aabb.min.z) / self.cell_size + 0.5;
        let column_count = width as u128 * depth as u128;
        if column_count > usize::MAX as u128 || width >= u16::MAX as f32 || depth >= u16::MAX as f32
        {
            return Err(HeightfieldBuilderError::ColumnCountTooLarge { width, depth });
        }
        let column_count = column_count as usize;
        Ok(SolidHeightfield {
            field: BoundedField {
                width: width as u16,
                depth: depth as u16,
                cell_size: self.cell_size,
                cell_height: self.cell_height,
                aabb: self.aabb,
            },
            spans_head: vec![None; column_count],
            spans: Spans::with_capacity_and_key(column_count.max(1024)),
        })
    }
}

/// Errors that can occur building a [`SolidHeightfield`].
#[derive(Error, Debug)]
pub enum HeightfieldBuilderError {
    /// The requested grid is too large to represent.
    #[error("heightfield grid is too large: width={width}, depth={depth}")]
    ColumnCountTooLarge {
        /// The computed width in cells.
        width: f32,
        /// The computed depth in cells.
        depth: f32,
    },
}

/// Errors that can occur inserting a span into a [`SolidHeightfield`].
#[derive(Error, Debug)]
pub enum SpanInsertionError {
    /// The given column lies outside the field.
    #[error("column ({x}, {z}) is out of bounds")]
    ColumnOutOfBounds {
        /// The x coordinate of the offending column.
        x: u16,
        /// The z coordinate of the offending column.
        z: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3A;

    fn field() -> SolidHeightfield {
        HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::ZERO, Vec3A::new(5.0, 5.0, 5.0)),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn add_span_inserts_into_empty_column() {
        let mut hf = field();
        hf.add_span(1, 3, 2, 4, SpanFlags::WALKABLE).unwrap();
        let span = hf.span(hf.column_head(1, 3).unwrap());
        assert_eq!((span.min(), span.max()), (2, 4));
        assert!(hf.column_head(3, 1).is_none());
    }

    #[test]
    fn add_span_keeps_non_overlapping_spans_separate_and_ascending() {
        let mut hf = field();
        hf.add_span(1, 3, 2, 4, SpanFlags::WALKABLE).unwrap();
        hf.add_span(1, 3, 7, 9, SpanFlags::WALKABLE).unwrap();
        let spans: Vec<_> = hf.column_spans(1, 3).map(|(_, s)| (s.min(), s.max())).collect();
        assert_eq!(spans, vec![(2, 4), (7, 9)]);
    }

    #[test]
    fn add_span_merges_overlapping_spans() {
        let mut hf = field();
        hf.add_span(1, 3, 2, 4, SpanFlags::WALKABLE).unwrap();
        hf.add_span(1, 3, 4, 7, SpanFlags::empty()).unwrap();
        let spans: Vec<_> = hf.column_spans(1, 3).map(|(_, s)| (s.min(), s.max())).collect();
        assert_eq!(spans, vec![(2, 7)]);
    }

    #[test]
    fn add_span_merges_adjacent_spans_separated_by_exactly_one_gap_cell() {
        // max=4, min=6: gap is cell 5 only, still within the "at least one empty cell"
        // boundary (`next.min >= curr.max + 2` is violated by min=5, satisfied at min=6).
        let mut hf = field();
        hf.add_span(1, 3, 2, 4, SpanFlags::WALKABLE).unwrap();
        hf.add_span(1, 3, 5, 7, SpanFlags::empty()).unwrap();
        let spans: Vec<_> = hf.column_spans(1, 3).map(|(_, s)| (s.min(), s.max())).collect();
        assert_eq!(spans, vec![(2, 7)], "spans abutting with a single gap cell should merge");
    }

    #[test]
    fn add_span_flag_merge_rule_ties_or_new_max_exceeds_adopts_new_max_keeps_old() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 4, SpanFlags::WALKABLE).unwrap();
        // New data's max (4) ties the existing max (4): OR flags (both empty | walkable = walkable).
        hf.add_span(0, 0, 0, 4, SpanFlags::empty()).unwrap();
        let top = hf.span(hf.column_head(0, 0).unwrap());
        assert!(top.flags().contains(SpanFlags::WALKABLE));

        let mut hf = field();
        hf.add_span(0, 0, 0, 4, SpanFlags::WALKABLE).unwrap();
        // New data's max (6) strictly exceeds the existing max (4): adopt new flags (empty).
        hf.add_span(0, 0, 0, 6, SpanFlags::empty()).unwrap();
        let top = hf.span(hf.column_head(0, 0).unwrap());
        assert!(!top.flags().contains(SpanFlags::WALKABLE));

        let mut hf = field();
        hf.add_span(0, 0, 0, 6, SpanFlags::WALKABLE).unwrap();
        // New data's max (4) lies strictly below the existing max (6): keep old flags (walkable).
        hf.add_span(0, 0, 0, 4, SpanFlags::empty()).unwrap();
        let top = hf.span(hf.column_head(0, 0).unwrap());
        assert!(top.flags().contains(SpanFlags::WALKABLE));
    }

    #[test]
    fn column_out_of_bounds_is_rejected() {
        let mut hf = field();
        let err = hf.add_span(100, 100, 0, 1, SpanFlags::empty());
        assert!(err.is_err());
    }
}
