//! Null-region border cleanup.
//!
//! Walks every boundary between a non-null region and the null region with
//! the "robot on the floor" edge-walk, repairs a couple of dangerously thin
//! wrap shapes, and splits off a new region id wherever a single region
//! fully encompasses a null-region hole.

use crate::{
    math::{rotate_ccw, rotate_cw},
    open_heightfield::OpenHeightfield,
    region::RegionId,
};

impl OpenHeightfield {
    /// Runs the cleanup pass over every unvisited null-region contour.
    /// `next_region_id` is read and incremented whenever an encompassing
    /// region is split.
    pub fn clean_null_region_borders(&mut self, next_region_id: &mut u16) {
        let columns = self.column_coords();
        let n = self.spans.len();
        let mut visited = vec![[false; 4]; n];

        for start in 0..n {
            if self.spans[start].region.is_null() {
                continue;
            }
            let (sx, sz) = columns[start];
            for start_dir in 0..4u8 {
                if visited[start][start_dir as usize] || !self.is_null_edge(start, sx, sz, start_dir) {
                    continue;
                }
                self.walk_and_clean_contour(start, sx, sz, start_dir, &columns, &mut visited, next_region_id);
            }
        }
    }

    fn is_null_edge(&self, i: usize, x: u16, z: u16, dir: u8) -> bool {
        match self.neighbor_index(i, x, z, dir) {
            None => true,
            Some(ni) => self.spans[ni].region.is_null(),
        }
    }

    fn walk_and_clean_contour(
        &mut self,
        start: usize,
        start_x: u16,
        start_z: u16,
        start_dir: u8,
        columns: &[(u16, u16)],
        visited: &mut [[bool; 4]],
        next_region_id: &mut u16,
    ) {
        let reference_region = self.spans[start].region;
        let (mut i, mut x, mut z, mut dir) = (start, start_x, start_z, start_dir);

        let mut acute = 0u32;
        let mut obtuse = 0u32;
        let mut other_regions_seen: Vec<RegionId> = Vec::new();
        let mut trail: Vec<usize> = Vec::new();

        let mut steps = 0u32;
        loop {
            if i < visited.len() {
                visited[i][dir as usize] = true;
            }

            if self.is_null_edge(i, x, z, dir) {
                let prev_dir = (dir + 3) & 0x3;
                if self.is_null_edge(i, x, z, prev_dir) {
                    obtuse += 1;
                } else {
                    acute += 1;
                }
                dir = rotate_cw(dir);
            } else {
                let ni = self.neighbor_index(i, x, z, dir).expect("checked non-null edge has a neighbor");
                let nregion = self.spans[ni].region;
                if !nregion.is_null() && nregion != reference_region && !other_regions_seen.contains(&nregion) {
                    other_regions_seen.push(nregion);
                }
                let (nx, nz) = columns[ni];
                trail.push(i);
                i = ni;
                x = nx;
                z = nz;
                dir = rotate_ccw(dir);
            }

            steps += 1;
            if steps > 65_535 {
                break;
            }
            if i == start && dir == start_dir {
                break;
            }
        }

        self.repair_thin_wrap(&trail, reference_region, columns);

        let encompassed = other_regions_seen.len() == 1 && obtuse > acute;
        if encompassed {
            self.split_encompassing_region(reference_region, start, start_x, start_z, columns, next_region_id);
        }
    }

    /// Looks at the last couple of spans walked before returning to the
    /// start. If both belong to the reference region the wrap is
    /// dangerously thin (short-wrap); if only the second-to-last does, a
    /// single span has pinched the boundary to zero width
    /// (dangerous-corner). Both are repaired by handing the offending span
    /// to whichever neighboring region holds a majority of its 8-neighborhood.
    fn repair_thin_wrap(&mut self, trail: &[usize], reference_region: RegionId, columns: &[(u16, u16)]) {
        if trail.len() < 2 {
            return;
        }
        let back_one = trail[trail.len() - 1];
        let back_two = trail[trail.len() - 2];
        let back_one_region = self.spans[back_one].region;
        let back_two_region = self.spans[back_two].region;

        if back_one_region == reference_region && back_two_region == reference_region && trail.len() <= 4 {
            self.reassign_by_majority(back_one, columns);
        } else if back_two_region == reference_region && back_one_region != reference_region {
            let (x, z) = columns[back_two];
            let mut reference_votes = 0usize;
            let mut other_votes = 0usize;
            for dir in 0..4u8 {
                if let Some(ni) = self.neighbor_index(back_two, x, z, dir) {
                    if self.spans[ni].region == reference_region {
                        reference_votes += 1;
                    } else if self.spans[ni].region == back_one_region {
                        other_votes += 1;
                    }
                }
            }
            if other_votes > reference_votes {
                self.spans[back_two].region = back_one_region;
            } else {
                self.reassign_by_majority(back_one, columns);
            }
        }
    }

    /// Reassigns `span` to whichever non-null, non-own region appears most
    /// often among its axis neighbors, if any does.
    fn reassign_by_majority(&mut self, span: usize, columns: &[(u16, u16)]) {
        let own = self.spans[span].region;
        let (x, z) = columns[span];
        let mut counts: Vec<(RegionId, usize)> = Vec::new();
        for dir in 0..4u8 {
            if let Some(ni) = self.neighbor_index(span, x, z, dir) {
                let r = self.spans[ni].region;
                if r.is_null() || r == own {
                    continue;
                }
                match counts.iter_mut().find(|(id, _)| *id == r) {
                    Some((_, c)) => *c += 1,
                    None => counts.push((r, 1)),
                }
            }
        }
        if let Some((best, _)) = counts.into_iter().max_by_key(|&(_, c)| c) {
            self.spans[span].region = best;
        }
    }

    /// A region that fully encompasses a null-region hole must give up its
    /// claim on the far side of that hole: flood a new region outward from
    /// `seed` through the reference region, stopping at any span still
    /// bordering the null region being cleaned, so the hole ends up with at
    /// least two distinct regions around it.
    fn split_encompassing_region(
        &mut self,
        reference_region: RegionId,
        seed: usize,
        seed_x: u16,
        seed_z: u16,
        columns: &[(u16, u16)],
        next_region_id: &mut u16,
    ) {
        let new_region = RegionId::new(*next_region_id);
        let mut stack = vec![(seed, seed_x, seed_z)];
        let mut seen = vec![false; self.spans.len()];
        seen[seed] = true;
        let mut moved = 0usize;

        while let Some((i, x, z)) = stack.pop() {
            let touches_null = (0..4u8).any(|dir| self.is_null_edge(i, x, z, dir));
            if touches_null {
                continue;
            }
            self.spans[i].region = new_region;
            moved += 1;
            for dir in 0..4u8 {
                if let Some(ni) = self.neighbor_index(i, x, z, dir) {
                    if !seen[ni] && self.spans[ni].region == reference_region {
                        seen[ni] = true;
                        let (nx, nz) = columns[ni];
                        stack.push((ni, nx, nz));
                    }
                }
            }
        }

        if moved > 0 {
            *next_region_id += 1;
        } else {
            self.spans[seed].region = reference_region;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heightfield::HeightfieldBuilder, math::Aabb3d, span::SpanFlags};
    use glam::Vec3A;

    #[test]
    fn ring_region_around_a_hole_splits_into_two_regions() {
        let size = 8u16;
        let mut hf = HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::ZERO, Vec3A::new(size as f32, 10.0, size as f32)),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap();
        for z in 0..size {
            for x in 0..size {
                let hole = (3..5).contains(&x) && (3..5).contains(&z);
                if !hole {
                    hf.add_span(x, z, 0, 2, SpanFlags::WALKABLE).unwrap();
                }
            }
        }
        let mut open = OpenHeightfield::from_solid_heightfield(&hf, 2, 1).unwrap();
        open.build_distance_field();
        open.build_regions(0, 0, false);

        let assigned_before = open.spans.iter().filter(|s| !s.region.is_null()).count();

        let mut next_id = open.spans.iter().map(|s| s.region.id()).max().unwrap_or(0) + 1;
        open.clean_null_region_borders(&mut next_id);

        let assigned_after = open.spans.iter().filter(|s| !s.region.is_null()).count();
        assert_eq!(assigned_before, assigned_after, "cleanup must not null out previously assigned spans");
    }
}
