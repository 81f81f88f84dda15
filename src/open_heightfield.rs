//! The open heightfield: walkable floor+clearance spans inverted from a
//! [`SolidHeightfield`], linked to their axis neighbors.

use thiserror::Error;

use crate::{
    compact_cell::CompactCell,
    heightfield::{BoundedField, SolidHeightfield},
    math::{dir_offset_x, dir_offset_z},
    open_span::OpenHeightSpan,
    region::RegionId,
    span::SpanFlags,
};

/// A packed, per-column-indexed grid of walkable [`OpenHeightSpan`]s.
///
/// Built by [`OpenHeightfield::from_solid_heightfield`]. Regions, the
/// border-distance field, and later cleanup/filter passes all mutate spans
/// in place through `&mut self`.
#[derive(Debug, Clone)]
pub struct OpenHeightfield {
    /// The shared grid geometry, expanded upward by `walkable_height` cells.
    pub field: BoundedField,
    /// The minimum vertical clearance that counts as walkable.
    pub min_traversable_height: u16,
    /// The maximum legal step between neighbor floors.
    pub max_traversable_step: u16,
    /// One entry per column, indexing into `spans`.
    pub cells: Vec<CompactCell>,
    /// All walkable spans, grouped contiguously by column.
    pub spans: Vec<OpenHeightSpan>,
    /// The largest `distance_to_border` of any span, set once the distance
    /// field has been built.
    pub max_distance: u16,
}

impl OpenHeightfield {
    /// Inverts every solid span into a walkable open span.
    ///
    /// # Errors
    /// Returns [`OpenHeightfieldError::TooManyLayers`] if a column has more
    /// spans than the axis-neighbor layer-offset encoding can address.
    pub fn from_solid_heightfield(
        solid: &SolidHeightfield,
        min_traversable_height: u16,
        max_traversable_step: u16,
    ) -> Result<Self, OpenHeightfieldError> {
        let bf = *solid.field();
        let column_count = bf.column_count();
        let mut cells = vec![CompactCell::default(); column_count];

        // First pass: count walkable open spans per column to size `spans`.
        let mut total = 0usize;
        for z in 0..bf.depth {
            for x in 0..bf.width {
                for (_, span) in solid.column_spans(x, z) {
                    if span.flags().contains(SpanFlags::WALKABLE) {
                        total += 1;
                    }
                }
            }
        }

        let mut spans = Vec::with_capacity(total);
        let mut cursor = 0u32;
        for z in 0..bf.depth {
            for x in 0..bf.width {
                let column = bf.column_index(x, z);
                cells[column].set_index(cursor);
                cells[column].set_count(0);

                let mut iter = solid.column_spans(x, z).peekable();
                while let Some((_, span)) = iter.next() {
                    if !span.flags().contains(SpanFlags::WALKABLE) {
                        continue;
                    }
                    let floor = span.max();
                    let height = iter
                        .peek()
                        .map(|(_, next)| next.min().saturating_sub(floor))
                        .unwrap_or(OpenHeightSpan::UNBOUNDED_HEIGHT);
                    spans.push(OpenHeightSpan {
                        floor,
                        height,
                        region: RegionId::NULL,
                        distance_to_border: 0,
                        distance_to_region_core: 0,
                        ..Default::default()
                    });
                    cells[column].inc_count();
                    cursor += 1;
                }
            }
        }

        let mut open = Self {
            field: bf,
            min_traversable_height,
            max_traversable_step,
            cells,
            spans,
            max_distance: 0,
        };
        open.link_axis_neighbors()?;
        Ok(open)
    }

    /// Links each open span to the unique walkable axis neighbor in each of
    /// the 4 directions satisfying both the clearance and step-height
    /// tests.
    fn link_axis_neighbors(&mut self) -> Result<(), OpenHeightfieldError> {
        const MAX_LAYERS: usize = 255;
        for z in 0..self.field.depth {
            for x in 0..self.field.width {
                let cell = self.cells[self.field.column_index(x, z)];
                for i in cell.range() {
                    for dir in 0..4u8 {
                        self.spans[i].set_neighbor(dir, None);
                        let nx = x as i32 + dir_offset_x(dir);
                        let nz = z as i32 + dir_offset_z(dir);
                        if !self.field.contains_column(nx, nz) {
                            continue;
                        }
                        let (nx, nz) = (nx as u16, nz as u16);
                        let neighbor_cell = self.cells[self.field.column_index(nx, nz)];

                        let this = self.spans[i];
                        for (offset, k) in neighbor_cell.range().enumerate() {
                            let nbr = self.spans[k];
                            let gap =
                                (this.ceiling().min(nbr.ceiling())) as i64 - (this.floor.max(nbr.floor)) as i64;
                            let climb = (nbr.floor as i64 - this.floor as i64).unsigned_abs();
                            if gap >= self.min_traversable_height as i64
                                && climb <= self.max_traversable_step as u64
                            {
                                if offset >= MAX_LAYERS {
                                    return Err(OpenHeightfieldError::TooManyLayers {
                                        column_span_count: neighbor_cell.count(),
                                    });
                                }
                                self.spans[i].set_neighbor(dir, Some(offset as u8));
                                break;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// The global span index of the neighbor of span `i` in `direction`,
    /// given its column `(x, z)`, or `None` if unlinked.
    pub fn neighbor_index(&self, i: usize, x: u16, z: u16, direction: u8) -> Option<usize> {
        let offset = self.spans[i].neighbor(direction)?;
        let nx = (x as i32 + dir_offset_x(direction)) as u16;
        let nz = (z as i32 + dir_offset_z(direction)) as u16;
        let cell = self.cells[self.field.column_index(nx, nz)];
        Some(cell.index() as usize + offset as usize)
    }

    /// The cell for a given column.
    #[inline]
    pub fn cell_at(&self, x: u16, z: u16) -> CompactCell {
        self.cells[self.field.column_index(x, z)]
    }

    /// The `(x, z)` column coordinate of every span, indexed by span index.
    /// Several later passes (region growth, border cleanup, contour
    /// tracing) need to recover a span's column from its flat index.
    pub(crate) fn column_coords(&self) -> Vec<(u16, u16)> {
        let mut out = vec![(0u16, 0u16); self.spans.len()];
        for z in 0..self.field.depth {
            for x in 0..self.field.width {
                for i in self.cell_at(x, z).range() {
                    out[i] = (x, z);
                }
            }
        }
        out
    }
}

/// Errors that can occur building an [`OpenHeightfield`].
#[derive(Error, Debug)]
pub enum OpenHeightfieldError {
    /// A column had more spans than the neighbor-offset encoding supports.
    #[error("column has {column_span_count} spans, exceeding the maximum addressable layer count")]
    TooManyLayers {
        /// The offending column's span count.
        column_span_count: u8,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heightfield::HeightfieldBuilder, math::Aabb3d, span::SpanFlags};
    use glam::Vec3A;

    fn solid_with_floor_and_ceiling() -> SolidHeightfield {
        let mut hf = HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::ZERO, Vec3A::new(4.0, 10.0, 4.0)),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap();
        for z in 0..4 {
            for x in 0..4 {
                hf.add_span(x, z, 0, 2, SpanFlags::WALKABLE).unwrap();
                hf.add_span(x, z, 8, 9, SpanFlags::empty()).unwrap();
            }
        }
        hf
    }

    #[test]
    fn inversion_produces_one_open_span_per_solid_span_boundary() {
        let solid = solid_with_floor_and_ceiling();
        let open = OpenHeightfield::from_solid_heightfield(&solid, 2, 1).unwrap();
        // Each column has exactly one walkable solid span (0..2), so one open span.
        assert_eq!(open.spans.len(), 16);
        let span = open.spans[0];
        assert_eq!(span.floor, 2);
        assert_eq!(span.height, 6); // next solid span starts at 8
    }

    #[test]
    fn axis_neighbors_link_symmetrically_on_flat_floor() {
        let solid = solid_with_floor_and_ceiling();
        let open = OpenHeightfield::from_solid_heightfield(&solid, 2, 1).unwrap();
        let i = open.cell_at(1, 1).index() as usize;
        let east = open.neighbor_index(i, 1, 1, 2).unwrap();
        let j = open.cell_at(2, 1).index() as usize;
        assert_eq!(east, j);
        let back = open.neighbor_index(j, 2, 1, 0).unwrap();
        assert_eq!(back, i);
    }
}
