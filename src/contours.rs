//! Contour set builder.

use glam::IVec2;
use tracing::warn;

use crate::{
    math::{dir_offset_x, dir_offset_z, dist_sq_xz, rotate_ccw, rotate_cw, segments_intersect_xz},
    open_heightfield::OpenHeightfield,
    region::RegionId,
};

/// One vertex of a raw or simplified contour: voxel-space position plus the
/// region id that lies on the outward side of the edge leaving this vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContourVertex {
    /// Voxel-space x.
    pub x: i32,
    /// Voxel-space height.
    pub y: i32,
    /// Voxel-space z.
    pub z: i32,
    /// The region on the outward side of the edge leaving this vertex.
    pub region: RegionId,
}

impl ContourVertex {
    fn xz(self) -> IVec2 {
        IVec2::new(self.x, self.z)
    }
}

/// The traced boundary of a single region (or one of its holes).
#[derive(Debug, Clone)]
pub struct Contour {
    /// The region this contour bounds.
    pub region: RegionId,
    /// Simplified, clockwise vertex loop.
    pub vertices: Vec<ContourVertex>,
    /// The unsimplified source trace, kept for detail-mesh height sampling.
    pub raw: Vec<ContourVertex>,
}

/// Every contour traced from one [`OpenHeightfield`]'s regions.
#[derive(Debug, Clone, Default)]
pub struct ContourSet {
    /// One entry per traced contour. A region that encloses a hole produces
    /// more than one contour.
    pub contours: Vec<Contour>,
}

impl OpenHeightfield {
    /// Traces and simplifies the contour of every region boundary.
    /// `max_deviation` bounds the null-region Douglas-Peucker fit (world
    /// units; `0.0` disables it); `max_edge_length` bounds null-region edge
    /// subdivision (voxels; `0` disables it).
    pub fn build_contours(&self, max_deviation: f32, max_edge_length: u16) -> ContourSet {
        let columns = self.column_coords();
        let n = self.spans.len();
        let mut flags = vec![0u8; n];

        for z in 0..self.field.depth {
            for x in 0..self.field.width {
                for i in self.cell_at(x, z).range() {
                    if self.spans[i].region.is_null() {
                        continue;
                    }
                    let mut f = 0u8;
                    for dir in 0..4u8 {
                        let same_region = match self.neighbor_index(i, x, z, dir) {
                            Some(ni) => self.spans[ni].region == self.spans[i].region,
                            None => false,
                        };
                        if !same_region {
                            f |= 1 << dir;
                        }
                    }
                    flags[i] = if f == 0xF {
                        warn!(span = i, "discarding single-span island during contour tracing");
                        0
                    } else {
                        f
                    };
                }
            }
        }

        let mut contours = Vec::new();
        for z in 0..self.field.depth {
            for x in 0..self.field.width {
                for i in self.cell_at(x, z).range() {
                    if flags[i] == 0 {
                        continue;
                    }
                    let region = self.spans[i].region;
                    let raw = self.walk_raw_contour(i, x, z, &mut flags, &columns);
                    if raw.len() < 2 {
                        continue;
                    }
                    let Some(vertices) = simplify_contour(&raw, max_deviation, max_edge_length) else {
                        warn!(?region, "discarding degenerate contour with fewer than 3 vertices");
                        continue;
                    };
                    contours.push(Contour { region, vertices, raw });
                }
            }
        }
        ContourSet { contours }
    }

    fn walk_raw_contour(
        &self,
        start: usize,
        start_x: u16,
        start_z: u16,
        flags: &mut [u8],
        columns: &[(u16, u16)],
    ) -> Vec<ContourVertex> {
        let mut dir = 0u8;
        while flags[start] & (1 << dir) == 0 {
            dir = rotate_cw(dir);
        }
        let start_dir = dir;
        let (mut i, mut x, mut z) = (start, start_x, start_z);
        let mut out = Vec::new();

        let mut iter = 0u32;
        loop {
            if flags[i] & (1 << dir) != 0 {
                let (cx, cz) = corner_offset(dir, x, z);
                let cy = self.corner_height(i, x, z, dir);
                let neighbor_region = match self.neighbor_index(i, x, z, dir) {
                    Some(ni) => self.spans[ni].region,
                    None => RegionId::NULL,
                };
                out.push(ContourVertex {
                    x: cx,
                    y: cy,
                    z: cz,
                    region: neighbor_region,
                });
                flags[i] &= !(1 << dir);
                dir = rotate_cw(dir);
            } else {
                let ni = self
                    .neighbor_index(i, x, z, dir)
                    .expect("a clear boundary bit implies a same-region neighbor link");
                let (nx, nz) = columns[ni];
                i = ni;
                x = nx;
                z = nz;
                dir = rotate_ccw(dir);
            }

            iter += 1;
            if iter > 65_535 {
                break;
            }
            if i == start && dir == start_dir {
                break;
            }
        }
        out
    }

    /// The corner height for the vertex facing `dir` from span `i`: the
    /// highest floor among this span, its axis neighbor in `dir`, its axis
    /// neighbor in `dir`'s clockwise partner, and whichever diagonal can be
    /// reached through either of those two (the "both orderings" fallback
    /// for when only one of the two axis links exists).
    fn corner_height(&self, i: usize, x: u16, z: u16, dir: u8) -> i32 {
        let mut h = self.spans[i].floor as i32;
        let dirp = rotate_cw(dir);

        if let Some(ai) = self.neighbor_index(i, x, z, dir) {
            h = h.max(self.spans[ai].floor as i32);
            let ax = (x as i32 + dir_offset_x(dir)) as u16;
            let az = (z as i32 + dir_offset_z(dir)) as u16;
            if let Some(di) = self.neighbor_index(ai, ax, az, dirp) {
                h = h.max(self.spans[di].floor as i32);
            }
        }
        if let Some(bi) = self.neighbor_index(i, x, z, dirp) {
            h = h.max(self.spans[bi].floor as i32);
            let bx = (x as i32 + dir_offset_x(dirp)) as u16;
            let bz = (z as i32 + dir_offset_z(dirp)) as u16;
            if let Some(di) = self.neighbor_index(bi, bx, bz, dir) {
                h = h.max(self.spans[di].floor as i32);
            }
        }
        h
    }
}

/// The clockwise-forward corner of column `(x, z)` facing `dir`.
fn corner_offset(dir: u8, x: u16, z: u16) -> (i32, i32) {
    let (x, z) = (x as i32, z as i32);
    match dir & 0x3 {
        0 => (x, z + 1),
        1 => (x + 1, z + 1),
        2 => (x + 1, z),
        _ => (x, z),
    }
}

/// Perpendicular distance squared (world-ish, f32) from `p` to the line
/// through `a` and `b`, projected onto xz.
fn perp_dist_sq_xz(p: ContourVertex, a: ContourVertex, b: ContourVertex) -> f32 {
    let (ax, az) = (a.x as f32, a.z as f32);
    let (bx, bz) = (b.x as f32, b.z as f32);
    let (px, pz) = (p.x as f32, p.z as f32);
    let dx = bx - ax;
    let dz = bz - az;
    let len_sq = dx * dx + dz * dz;
    if len_sq < f32::EPSILON {
        return (px - ax) * (px - ax) + (pz - az) * (pz - az);
    }
    let cross = dx * (pz - az) - dz * (px - ax);
    (cross * cross) / len_sq
}

fn seed_portals(raw: &[ContourVertex]) -> Vec<usize> {
    let n = raw.len();
    let mut portals = Vec::new();
    for i in 0..n {
        let prev = (i + n - 1) % n;
        if raw[i].region != raw[prev].region {
            portals.push(i);
        }
    }
    if portals.is_empty() {
        let lowest = (0..n).min_by_key(|&i| (raw[i].x, raw[i].z)).unwrap_or(0);
        let highest = (0..n).max_by_key(|&i| (raw[i].x, raw[i].z)).unwrap_or(0);
        portals = if lowest == highest { vec![lowest] } else { vec![lowest, highest] };
        portals.sort_unstable();
    }
    portals
}

fn apply_deviation_fit(raw: &[ContourVertex], simplified: &mut Vec<usize>, max_dev_sq: f32) {
    let n = raw.len();
    if n < 2 {
        return;
    }
    let mut i = 0;
    while i < simplified.len() {
        let a = simplified[i];
        let b = simplified[(i + 1) % simplified.len()];
        if !raw[a].region.is_null() || a == b {
            i += 1;
            continue;
        }
        let mut best_idx = None;
        let mut best_dist = 0.0f32;
        let mut k = (a + 1) % n;
        while k != b {
            let d = perp_dist_sq_xz(raw[k], raw[a], raw[b]);
            if d > best_dist {
                best_dist = d;
                best_idx = Some(k);
            }
            k = (k + 1) % n;
        }
        if let Some(idx) = best_idx {
            if best_dist > max_dev_sq {
                simplified.insert(i + 1, idx);
                continue;
            }
        }
        i += 1;
    }
}

fn apply_max_edge(raw: &[ContourVertex], simplified: &mut Vec<usize>, max_len_sq: i64) {
    let n = raw.len();
    if n < 2 {
        return;
    }
    let mut i = 0;
    while i < simplified.len() {
        let a = simplified[i];
        let b = simplified[(i + 1) % simplified.len()];
        if !raw[a].region.is_null() || a == b {
            i += 1;
            continue;
        }
        if dist_sq_xz(raw[a].xz(), raw[b].xz()) > max_len_sq {
            let steps = if b > a { b - a } else { n - a + b };
            let mid = (a + steps / 2) % n;
            if mid != a && mid != b {
                simplified.insert(i + 1, mid);
                continue;
            }
        }
        i += 1;
    }
}

fn remove_vertical_segments(raw: &[ContourVertex], simplified: &mut Vec<usize>) {
    let mut changed = true;
    while changed && simplified.len() > 1 {
        changed = false;
        let mut i = 0;
        while i < simplified.len() && simplified.len() > 1 {
            let j = (i + 1) % simplified.len();
            let (a, b) = (simplified[i], simplified[j]);
            if raw[a].x == raw[b].x && raw[a].z == raw[b].z {
                simplified.remove(j);
                changed = true;
            } else {
                i += 1;
            }
        }
    }
}

fn remove_intersecting_null_segments(raw: &[ContourVertex], simplified: &mut Vec<usize>) {
    let mut guard = 0;
    loop {
        guard += 1;
        if guard > 1000 || simplified.len() < 4 {
            return;
        }
        let m = simplified.len();
        let mut offender = None;
        'search: for i in 0..m {
            let (a1, b1) = (simplified[i], simplified[(i + 1) % m]);
            if raw[a1].region.is_null() {
                continue;
            }
            for j in 0..m {
                if j == i {
                    continue;
                }
                let (a2, b2) = (simplified[j], simplified[(j + 1) % m]);
                if !raw[a2].region.is_null() {
                    continue;
                }
                if a2 == a1 || a2 == b1 || b2 == a1 || b2 == b1 {
                    continue;
                }
                if segments_intersect_xz(raw[a1].xz(), raw[b1].xz(), raw[a2].xz(), raw[b2].xz()) {
                    offender = Some(j);
                    break 'search;
                }
            }
        }
        match offender {
            Some(j) => {
                warn!("deleting null-region contour segment that crosses a non-null portal");
                simplified.remove(j);
            }
            None => return,
        }
    }
}

/// Builds the simplified vertex loop from `raw`, or `None` if the contour
/// cannot be recovered to at least 3 vertices.
fn simplify_contour(raw: &[ContourVertex], max_deviation: f32, max_edge_length: u16) -> Option<Vec<ContourVertex>> {
    let mut simplified = seed_portals(raw);

    if max_deviation > 0.0 {
        apply_deviation_fit(raw, &mut simplified, max_deviation * max_deviation);
    }
    if max_edge_length > 0 {
        apply_max_edge(raw, &mut simplified, (max_edge_length as i64) * (max_edge_length as i64));
    }
    remove_vertical_segments(raw, &mut simplified);
    remove_intersecting_null_segments(raw, &mut simplified);

    if simplified.len() < 3 {
        simplified = recover_short_contour(raw, simplified)?;
    }

    let n = raw.len();
    Some(
        simplified
            .into_iter()
            .map(|idx| {
                let mut v = raw[idx];
                v.region = raw[(idx + 1) % n].region;
                v
            })
            .collect(),
    )
}

fn recover_short_contour(raw: &[ContourVertex], mut simplified: Vec<usize>) -> Option<Vec<usize>> {
    let n = raw.len();
    if simplified.len() != 2 || n < 3 {
        return None;
    }
    let (a, b) = (simplified[0], simplified[1]);
    let mut best_idx = None;
    let mut best_dist = -1.0f32;
    let mut k = (a + 1) % n;
    while k != b {
        let d = perp_dist_sq_xz(raw[k], raw[a], raw[b]);
        if d > best_dist {
            best_dist = d;
            best_idx = Some(k);
        }
        k = (k + 1) % n;
    }
    let idx = best_idx?;
    simplified.insert(1, idx);
    Some(simplified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heightfield::HeightfieldBuilder, math::Aabb3d, span::SpanFlags};
    use glam::Vec3A;

    fn single_region_field(size: u16) -> OpenHeightfield {
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
        open.build_regions(0, 0, true);
        open.filter_and_merge_regions(0, 0);
        open
    }

    #[test]
    fn flat_square_produces_a_single_closed_contour() {
        let open = single_region_field(6);
        let set = open.build_contours(1.3, 12);
        assert_eq!(set.contours.len(), 1);
        assert!(set.contours[0].vertices.len() >= 4);
    }

    #[test]
    fn contour_vertices_form_a_closed_clockwise_ring_within_field_bounds() {
        let open = single_region_field(6);
        let set = open.build_contours(1.3, 12);
        let contour = &set.contours[0];
        for v in &contour.vertices {
            assert!(v.x >= 0 && v.x as u16 <= 6);
            assert!(v.z >= 0 && v.z as u16 <= 6);
        }
    }
}
