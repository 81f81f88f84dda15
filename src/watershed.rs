//! Watershed region growth.

use crate::{
    math::{dir_offset_x, dir_offset_z},
    open_heightfield::OpenHeightfield,
    region::RegionId,
};

impl OpenHeightfield {
    /// Grows watershed regions over every walkable span.
    ///
    /// `border_size` both caps the expansion-phase iteration count
    /// (`4 + 2 * border_size`) and folds into the stopping distance
    /// `min_d` alongside `min_border_distance`. `use_conservative_expansion`
    /// enables the narrow-neck check during the expansion phase: a
    /// candidate neighbor is only adopted from if at least two of its own
    /// axis neighbors already share its region.
    pub fn build_regions(&mut self, border_size: u16, min_border_distance: u16, use_conservative_expansion: bool) {
        for span in &mut self.spans {
            span.region = RegionId::NULL;
            span.distance_to_region_core = 0;
        }

        let columns = self.column_coords();
        let n = self.spans.len();
        let mut next_id: u16 = 1;
        let min_d = border_size + min_border_distance;
        let mut d = self.max_distance.saturating_sub(1) & !1u16;

        let mut working_set: Vec<usize> = Vec::new();
        while d > min_d {
            working_set.clear();
            for i in 0..n {
                if self.spans[i].region.is_null() && self.spans[i].distance_to_border >= d {
                    working_set.push(i);
                }
            }

            self.expand_regions(&working_set, &columns, 4 + 2 * border_size, use_conservative_expansion);

            let fill_to = d.saturating_sub(2).max(min_d);
            for &i in &working_set {
                if !self.spans[i].region.is_null() {
                    continue;
                }
                let (x, z) = columns[i];
                if self.flood_new_region(i, x, z, next_id, fill_to, &columns) {
                    next_id += 1;
                }
            }

            d = d.saturating_sub(2);
        }

        // Final unbounded expansion over whatever remains unassigned.
        working_set.clear();
        for i in 0..n {
            if self.spans[i].region.is_null() {
                working_set.push(i);
            }
        }
        self.expand_regions(&working_set, &columns, u16::MAX, use_conservative_expansion);
    }

    /// Iteratively grows already-assigned regions into `working_set`,
    /// picking for each span the neighbor region with the smallest
    /// `distance_to_region_core + 2`, for at most `max_iter` passes or
    /// until a pass makes no progress.
    fn expand_regions(
        &mut self,
        working_set: &[usize],
        columns: &[(u16, u16)],
        max_iter: u16,
        use_conservative_expansion: bool,
    ) {
        let mut remaining: Vec<usize> = working_set
            .iter()
            .copied()
            .filter(|&i| self.spans[i].region.is_null())
            .collect();

        let mut iter = 0u16;
        loop {
            if remaining.is_empty() || iter >= max_iter {
                break;
            }

            let mut next_round = Vec::with_capacity(remaining.len());
            let mut assignments: Vec<(usize, RegionId, u16)> = Vec::new();

            for &i in &remaining {
                let (x, z) = columns[i];
                let mut best: Option<(RegionId, u16)> = None;
                for dir in 0..4u8 {
                    let Some(ni) = self.neighbor_index(i, x, z, dir) else {
                        continue;
                    };
                    let nregion = self.spans[ni].region;
                    if nregion.is_null() {
                        continue;
                    }
                    if use_conservative_expansion && !self.has_min_same_region_neighbors(ni, columns, nregion, 2) {
                        continue;
                    }
                    let candidate_dist = self.spans[ni].distance_to_region_core.saturating_add(2);
                    if best.is_none_or(|(_, d)| candidate_dist < d) {
                        best = Some((nregion, candidate_dist));
                    }
                }
                match best {
                    Some((region, dist)) => assignments.push((i, region, dist)),
                    None => next_round.push(i),
                }
            }

            if assignments.is_empty() {
                break;
            }
            for (i, region, dist) in assignments {
                self.spans[i].region = region;
                self.spans[i].distance_to_region_core = dist;
            }
            remaining = next_round;
            iter += 1;
        }
    }

    fn has_min_same_region_neighbors(
        &self,
        i: usize,
        columns: &[(u16, u16)],
        region: RegionId,
        min_count: usize,
    ) -> bool {
        let (x, z) = columns[i];
        let mut count = 0;
        for dir in 0..4u8 {
            if let Some(ni) = self.neighbor_index(i, x, z, dir) {
                if self.spans[ni].region == region {
                    count += 1;
                }
            }
        }
        count >= min_count
    }

    /// Attempts to seed a new region at `seed` via a bounded flood,
    /// returning `true` iff at least one span was committed to it.
    fn flood_new_region(
        &mut self,
        seed: usize,
        seed_x: u16,
        seed_z: u16,
        candidate_id: u16,
        fill_to: u16,
        columns: &[(u16, u16)],
    ) -> bool {
        let region = RegionId::new(candidate_id);
        let mut stack = vec![(seed, seed_x, seed_z)];
        self.spans[seed].region = region;
        let mut count = 0usize;

        while let Some((i, x, z)) = stack.pop() {
            if self.spans[i].region != region {
                // Rolled back (or never actually ours) by an earlier pop.
                continue;
            }

            let mut conflict = false;
            'dirs: for dir in 0..4u8 {
                let Some(ni) = self.neighbor_index(i, x, z, dir) else {
                    continue;
                };
                let nr = self.spans[ni].region;
                if !nr.is_null() && nr != region {
                    conflict = true;
                    break 'dirs;
                }
                let diag_dir = (dir + 1) & 0x3;
                let nx = (x as i32 + dir_offset_x(dir)) as u16;
                let nz = (z as i32 + dir_offset_z(dir)) as u16;
                if let Some(di) = self.neighbor_index(ni, nx, nz, diag_dir) {
                    let dr = self.spans[di].region;
                    if !dr.is_null() && dr != region {
                        conflict = true;
                        break 'dirs;
                    }
                }
            }

            if conflict {
                self.spans[i].region = RegionId::NULL;
                continue;
            }

            count += 1;
            for dir in 0..4u8 {
                let Some(ni) = self.neighbor_index(i, x, z, dir) else {
                    continue;
                };
                if self.spans[ni].region.is_null() && self.spans[ni].distance_to_border >= fill_to {
                    let (nx, nz) = columns[ni];
                    self.spans[ni].region = region;
                    stack.push((ni, nx, nz));
                }
            }
        }

        count > 0
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
            }
        }
        let mut open = OpenHeightfield::from_solid_heightfield(&hf, 2, 1).unwrap();
        open.build_distance_field();
        open
    }

    #[test]
    fn flat_square_grows_a_single_region() {
        let mut open = flat_open_field(8);
        open.build_regions(0, 0, true);
        let assigned: Vec<RegionId> = open.spans.iter().map(|s| s.region).collect();
        assert!(assigned.iter().all(|r| !r.is_null()), "every span should end up assigned");
        let first = assigned[0];
        assert!(assigned.iter().all(|&r| r == first), "a flat square should grow one region");
    }

    #[test]
    fn tiny_field_still_gets_assigned_by_final_pass() {
        let mut open = flat_open_field(2);
        open.build_regions(0, 0, false);
        assert!(open.spans.iter().all(|s| !s.region.is_null()));
    }
}
