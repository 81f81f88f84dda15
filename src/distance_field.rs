//! Border-distance field construction and smoothing.

use crate::{
    math::{dir_offset_x, dir_offset_z},
    open_heightfield::OpenHeightfield,
};

impl OpenHeightfield {
    /// A span is a border if any of its 4 axis neighbors, or any of the 4
    /// diagonals formed by composing two axis neighbors, is missing.
    fn is_border_span(&self, i: usize, x: u16, z: u16) -> bool {
        for dir in 0..4u8 {
            let Some(nidx) = self.neighbor_index(i, x, z, dir) else {
                return true;
            };
            let diag_dir = (dir + 1) & 0x3;
            let nx = (x as i32 + dir_offset_x(dir)) as u16;
            let nz = (z as i32 + dir_offset_z(dir)) as u16;
            if self.neighbor_index(nidx, nx, nz, diag_dir).is_none() {
                return true;
            }
        }
        false
    }

    /// Builds the border-distance field: zero at every border span, a
    /// Chebyshev-style propagated minimum elsewhere.
    pub fn build_distance_field(&mut self) {
        let w = self.field.width;
        let d = self.field.depth;
        let n = self.spans.len();
        let mut dist = vec![u16::MAX; n];

        for z in 0..d {
            for x in 0..w {
                let cell = self.cell_at(x, z);
                for i in cell.range() {
                    if self.is_border_span(i, x, z) {
                        dist[i] = 0;
                    }
                }
            }
        }

        // Forward pass: propagate from the W and S axis neighbors (and the
        // SW/SE diagonals reached through them).
        for z in 0..d {
            for x in 0..w {
                let cell = self.cell_at(x, z);
                for i in cell.range() {
                    self.relax_distance(i, x, z, 0, 3, &mut dist);
                    self.relax_distance(i, x, z, 3, 2, &mut dist);
                }
            }
        }

        // Reverse pass: propagate from the E and N axis neighbors (and the
        // NE/NW diagonals reached through them).
        for z in (0..d).rev() {
            for x in (0..w).rev() {
                let cell = self.cell_at(x, z);
                for i in cell.range().rev() {
                    self.relax_distance(i, x, z, 2, 1, &mut dist);
                    self.relax_distance(i, x, z, 1, 0, &mut dist);
                }
            }
        }

        self.max_distance = dist.iter().copied().max().unwrap_or(0);
        for (span, d) in self.spans.iter_mut().zip(dist) {
            span.distance_to_border = d;
        }
    }

    /// Relaxes `dist[i]` against the axis neighbor in `axis_dir` (step +2)
    /// and the diagonal reached by then stepping `diag_dir` from that
    /// neighbor (step +3).
    fn relax_distance(&self, i: usize, x: u16, z: u16, axis_dir: u8, diag_dir: u8, dist: &mut [u16]) {
        let Some(ai) = self.neighbor_index(i, x, z, axis_dir) else {
            return;
        };
        dist[i] = dist[i].min(dist[ai].saturating_add(2));

        let ax = (x as i32 + dir_offset_x(axis_dir)) as u16;
        let az = (z as i32 + dir_offset_z(axis_dir)) as u16;
        if let Some(di) = self.neighbor_index(ai, ax, az, diag_dir) {
            dist[i] = dist[i].min(dist[di].saturating_add(3));
        }
    }

    /// Smooths the distance field: every span whose distance exceeds
    /// `threshold` is replaced by `(sum + 5) / 9` over itself, its 4 axis
    /// neighbors, and its 4 diagonal neighbors (absent axis neighbors
    /// contribute the span's own distance twice, absent diagonals once).
    /// Spans at or below `threshold` are left untouched.
    ///
    /// A `threshold` of `0` disables smoothing.
    pub fn smooth_distance_field(&mut self, threshold: u16) {
        if threshold == 0 {
            return;
        }
        let w = self.field.width;
        let d = self.field.depth;
        let original: Vec<u16> = self.spans.iter().map(|s| s.distance_to_border).collect();
        let mut smoothed = original.clone();

        for z in 0..d {
            for x in 0..w {
                let cell = self.cell_at(x, z);
                for i in cell.range() {
                    let own = original[i];
                    if own <= threshold {
                        continue;
                    }
                    let mut sum = own;
                    for dir in 0..4u8 {
                        match self.neighbor_index(i, x, z, dir) {
                            Some(ni) => {
                                sum += original[ni];
                                let nx = (x as i32 + dir_offset_x(dir)) as u16;
                                let nz = (z as i32 + dir_offset_z(dir)) as u16;
                                let diag_dir = (dir + 1) & 0x3;
                                match self.neighbor_index(ni, nx, nz, diag_dir) {
                                    Some(di) => sum += original[di],
                                    None => sum += own,
                                }
                            }
                            None => sum += own * 2,
                        }
                    }
                    smoothed[i] = (sum + 5) / 9;
                }
            }
        }

        for (span, d) in self.spans.iter_mut().zip(smoothed) {
            span.distance_to_border = d;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heightfield::HeightfieldBuilder, math::Aabb3d, span::SpanFlags};
    use glam::Vec3A;

    fn flat_open_field(size: u16) -> OpenHeightfield {
        let mut hf = HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::ZERO, Vec3A::new(size as f32, 10.0, size as f32)),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap();
        for z in 0..size {
            for x in 0..size {
                hf.add_span(x, z, 0, 2, SpanFlags::WALKABLE).unwrap();
                hf.add_span(x, z, 8, 9, SpanFlags::empty()).unwrap();
            }
        }
        OpenHeightfield::from_solid_heightfield(&hf, 2, 1).unwrap()
    }

    #[test]
    fn border_spans_have_zero_distance() {
        let mut open = flat_open_field(5);
        open.build_distance_field();
        let i = open.cell_at(0, 0).index() as usize;
        assert_eq!(open.spans[i].distance_to_border, 0);
    }

    #[test]
    fn interior_span_has_larger_distance_than_border() {
        let mut open = flat_open_field(7);
        open.build_distance_field();
        let border = open.spans[open.cell_at(0, 0).index() as usize].distance_to_border;
        let interior = open.spans[open.cell_at(3, 3).index() as usize].distance_to_border;
        assert!(interior > border);
    }

    #[test]
    fn smoothing_below_threshold_is_a_no_op() {
        let mut open = flat_open_field(5);
        open.build_distance_field();
        let before: Vec<u16> = open.spans.iter().map(|s| s.distance_to_border).collect();
        open.smooth_distance_field(0);
        let after: Vec<u16> = open.spans.iter().map(|s| s.distance_to_border).collect();
        assert_eq!(before, after);
    }
}
