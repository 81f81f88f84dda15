//! Detail mesh builder: per-polygon height patch sampling, edge/inner
//! sampling, and incremental Delaunay-style triangulation.

use std::collections::VecDeque;

use glam::{UVec3, Vec3, Vec3A};
use tracing::warn;

use crate::{
    open_heightfield::OpenHeightfield,
    open_span::SpanVisited,
    poly_mesh::PolyMeshField,
    region::RegionId,
    trimesh::TriangleMesh,
};

/// Hard cap on detail vertices contributed by a single polygon, matching
/// the addressable range a triangle index needs to stay small. Mirrors the
/// 127-vertex ceiling real navmesh generators use for detail submeshes.
const MAX_VERTS_PER_POLY: usize = 127;
const MAX_VERTS_PER_EDGE: usize = 32;

/// A rectangular subgrid of floor heights covering one polygon's xz bounds,
/// expanded by one cell on each side.
struct HeightPatch {
    xmin: u16,
    zmin: u16,
    width: u16,
    height: u16,
    data: Vec<u16>,
}

impl HeightPatch {
    const UNSET: u16 = u16::MAX;

    fn new(xmin: u16, zmin: u16, width: u16, height: u16) -> Self {
        Self { xmin, zmin, width, height, data: vec![Self::UNSET; width as usize * height as usize] }
    }

    fn local_index(&self, x: u16, z: u16) -> Option<usize> {
        if x < self.xmin || z < self.zmin {
            return None;
        }
        let (dx, dz) = (x - self.xmin, z - self.zmin);
        if dx >= self.width || dz >= self.height {
            return None;
        }
        Some(dx as usize + dz as usize * self.width as usize)
    }

    /// The floor height at voxel column `(x, z)`. Falls back to an
    /// expanding-ring average of whichever neighbor cells already hold a
    /// value if this one is still [`Self::UNSET`].
    fn height_at(&self, x: u16, z: u16) -> Option<f32> {
        let idx = self.local_index(x, z)?;
        if self.data[idx] != Self::UNSET {
            return Some(self.data[idx] as f32);
        }
        let max_radius = self.width.max(self.height) as i32;
        let mut radius = 1;
        while radius <= max_radius {
            let mut sum = 0u32;
            let mut count = 0u32;
            for dz in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs() != radius && dz.abs() != radius {
                        continue;
                    }
                    let nx = x as i32 + dx;
                    let nz = z as i32 + dz;
                    if nx < 0 || nz < 0 {
                        continue;
                    }
                    if let Some(i) = self.local_index(nx as u16, nz as u16) {
                        if self.data[i] != Self::UNSET {
                            sum += self.data[i] as u32;
                            count += 1;
                        }
                    }
                }
            }
            if count > 0 {
                return Some(sum as f32 / count as f32);
            }
            radius += 1;
        }
        None
    }
}

/// Locates the best open span to seed the flood from for one polygon
/// vertex: the zero-offset column's span closest to the vertex's height if
/// it lands within one voxel, otherwise the closest floor across all 9
/// candidate columns.
fn locate_seed_span(open: &OpenHeightfield, vx: i32, vz: i32, vy: i32) -> Option<usize> {
    let mut center_best: Option<(usize, i32)> = None;
    let mut global_best: Option<(usize, i32)> = None;
    for dz in -1i32..=1 {
        for dx in -1i32..=1 {
            let (nx, nz) = (vx + dx, vz + dz);
            if !open.field.contains_column(nx, nz) {
                continue;
            }
            let (nx, nz) = (nx as u16, nz as u16);
            for i in open.cell_at(nx, nz).range() {
                let diff = (open.spans[i].floor as i32 - vy).abs();
                if dx == 0 && dz == 0 && center_best.is_none_or(|(_, d)| diff < d) {
                    center_best = Some((i, diff));
                }
                if global_best.is_none_or(|(_, d)| diff < d) {
                    global_best = Some((i, diff));
                }
            }
        }
    }
    if let Some((i, diff)) = center_best {
        if diff <= 1 {
            return Some(i);
        }
    }
    global_best.map(|(i, _)| i)
}

/// Floods `patch` from seeds at every polygon vertex, walking the open
/// heightfield's axis links. `visited` is a scratch buffer borrowed and
/// restored to all-`false` on return.
fn fill_height_patch(
    open: &OpenHeightfield,
    columns: &[(u16, u16)],
    poly_verts_voxel: &[(i32, i32, i32)],
    patch: &mut HeightPatch,
    visited: &mut SpanVisited,
) {
    let mut queue: VecDeque<usize> = VecDeque::new();
    let mut touched: Vec<usize> = Vec::new();

    for &(vx, vy, vz) in poly_verts_voxel {
        let Some(seed) = locate_seed_span(open, vx, vz, vy) else {
            continue;
        };
        if !visited.0[seed] {
            visited.0[seed] = true;
            touched.push(seed);
            queue.push_back(seed);
        }
    }

    while let Some(i) = queue.pop_front() {
        let (x, z) = columns[i];
        if let Some(idx) = patch.local_index(x, z) {
            if patch.data[idx] == HeightPatch::UNSET {
                patch.data[idx] = open.spans[i].floor;
            }
        }
        for dir in 0..4u8 {
            let Some(ni) = open.neighbor_index(i, x, z, dir) else {
                continue;
            };
            if visited.0[ni] {
                continue;
            }
            let (nx, nz) = columns[ni];
            let Some(idx) = patch.local_index(nx, nz) else {
                continue;
            };
            if patch.data[idx] != HeightPatch::UNSET {
                continue;
            }
            visited.0[ni] = true;
            touched.push(ni);
            queue.push_back(ni);
        }
    }

    for i in touched {
        visited.0[i] = false;
    }
}

fn prev(i: usize, n: usize) -> usize {
    (i + n - 1) % n
}

fn next(i: usize, n: usize) -> usize {
    (i + 1) % n
}

fn distance_pt_seg(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let ap = p - a;
    let denom = ab.length_squared();
    let t = if denom > 0.0 { (ap.dot(ab) / denom).clamp(0.0, 1.0) } else { 0.0 };
    let closest = a + ab * t;
    (p - closest).length_squared()
}

/// Signed xz distance from `p` to the polygon boundary: negative when
/// inside (even-odd rule), used to accept or reject interior samples.
fn signed_dist_to_poly_xz(poly: &[Vec3], p: Vec3) -> f32 {
    let n = poly.len();
    let mut min_dist = f32::MAX;
    let mut inside = false;
    for i in 0..n {
        let vi = poly[i];
        let vj = poly[prev(i, n)];
        if (vi.z > p.z) != (vj.z > p.z) && p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x {
            inside = !inside;
        }
        min_dist = min_dist.min(distance_pt_seg(p, vj, vi).sqrt());
    }
    if inside { -min_dist } else { min_dist }
}

/// Vertical distance from `p` to the triangle `(a, b, c)`'s xz footprint
/// via barycentric projection, or `None` if `p` falls outside it.
fn dist_point_to_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;
    let dot00 = v0.x * v0.x + v0.z * v0.z;
    let dot01 = v0.x * v1.x + v0.z * v1.z;
    let dot02 = v0.x * v2.x + v0.z * v2.z;
    let dot11 = v1.x * v1.x + v1.z * v1.z;
    let dot12 = v1.x * v2.x + v1.z * v2.z;
    let denom = dot00 * dot11 - dot01 * dot01;
    if denom.abs() < f32::EPSILON {
        return None;
    }
    let inv_denom = 1.0 / denom;
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;
    const EPS: f32 = 1e-4;
    if u >= -EPS && v >= -EPS && (u + v) <= 1.0 + EPS {
        let y = a.y + u * v0.y + v * v1.y;
        Some((y - p.y).abs())
    } else {
        None
    }
}

fn dist_to_tri_mesh(p: Vec3, verts: &[Vec3], triangles: &[[u32; 3]]) -> Option<f32> {
    let mut best: Option<f32> = None;
    for &[a, b, c] in triangles {
        if let Some(d) = dist_point_to_triangle(p, verts[a as usize], verts[b as usize], verts[c as usize]) {
            if best.is_none_or(|b| d < b) {
                best = Some(d);
            }
        }
    }
    best
}

fn vcross2(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let u1 = b.x - a.x;
    let v1 = b.z - a.z;
    let u2 = c.x - a.x;
    let v2 = c.z - a.z;
    u1 * v2 - v1 * u2
}

fn circumcircle(a: Vec3, b: Vec3, c: Vec3) -> Option<(Vec3, f32)> {
    const EPS: f32 = 1e-6;
    let v2 = b - a;
    let v3 = c - a;
    let cp = vcross2(Vec3::ZERO, v2, v3);
    if cp.abs() <= EPS {
        return None;
    }
    let v2_sq = v2.x * v2.x + v2.z * v2.z;
    let v3_sq = v3.x * v3.x + v3.z * v3.z;
    let cx = (v2_sq * v3.z - v3_sq * v2.z) / (2.0 * cp);
    let cz = (v3_sq * v2.x - v2_sq * v3.x) / (2.0 * cp);
    let center = a + Vec3::new(cx, 0.0, cz);
    let radius = ((center.x - a.x).powi(2) + (center.z - a.z).powi(2)).sqrt();
    Some((center, radius))
}

fn overlap_seg_seg_xz(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> bool {
    let a1 = vcross2(a, b, d);
    let a2 = vcross2(a, b, c);
    if a1 * a2 < 0.0 {
        let a3 = vcross2(c, d, a);
        let a4 = a3 + a2 - a1;
        if a3 * a4 < 0.0 {
            return true;
        }
    }
    false
}

/// Edges as `(s, t, left_face, right_face)`; `u32::MAX` marks hull/unset.
type EdgeTable = Vec<[u32; 4]>;

fn find_edge(edges: &EdgeTable, s: u32, t: u32) -> Option<usize> {
    edges.iter().position(|e| (e[0] == s && e[1] == t) || (e[0] == t && e[1] == s))
}

fn add_edge(edges: &mut EdgeTable, s: u32, t: u32, left: u32, right: u32) {
    if find_edge(edges, s, t).is_none() {
        edges.push([s, t, left, right]);
    }
}

fn update_left_face(edge: &mut [u32; 4], s: u32, t: u32, face: u32) {
    if edge[0] == s && edge[1] == t && edge[2] == u32::MAX {
        edge[2] = face;
    } else if edge[1] == s && edge[0] == t && edge[3] == u32::MAX {
        edge[3] = face;
    }
}

fn overlap_edges(verts: &[Vec3], edges: &EdgeTable, s1: u32, t1: u32) -> bool {
    for e in edges {
        let (s0, t0) = (e[0], e[1]);
        if s0 == s1 || s0 == t1 || t0 == s1 || t0 == t1 {
            continue;
        }
        if overlap_seg_seg_xz(verts[s0 as usize], verts[t0 as usize], verts[s1 as usize], verts[t1 as usize]) {
            return true;
        }
    }
    false
}

/// Tries to complete the face left of edge `e`'s unresolved side(s) by
/// finding the candidate vertex whose circumcircle holds no other
/// candidate, within a small tolerance envelope.
fn complete_facet(verts: &[Vec3], edges: &mut EdgeTable, num_faces: &mut u32, e: usize) {
    const TOL: f32 = 0.001;
    let (s, t) = {
        let edge = edges[e];
        if edge[2] == u32::MAX {
            (edge[0], edge[1])
        } else if edge[3] == u32::MAX {
            (edge[1], edge[0])
        } else {
            return;
        }
    };

    let mut pick: Option<usize> = None;
    let mut center = Vec3::ZERO;
    let mut radius = -1.0f32;
    for u in 0..verts.len() {
        if u == s as usize || u == t as usize {
            continue;
        }
        if vcross2(verts[s as usize], verts[t as usize], verts[u]) <= 1e-6 {
            continue;
        }
        if radius < 0.0 {
            if let Some((c, r)) = circumcircle(verts[s as usize], verts[t as usize], verts[u]) {
                pick = Some(u);
                center = c;
                radius = r;
            }
            continue;
        }
        let d = ((center.x - verts[u].x).powi(2) + (center.z - verts[u].z).powi(2)).sqrt();
        if d > radius * (1.0 + TOL) {
            continue;
        } else if d < radius * (1.0 - TOL) {
            if let Some((c, r)) = circumcircle(verts[s as usize], verts[t as usize], verts[u]) {
                pick = Some(u);
                center = c;
                radius = r;
            }
        } else {
            if overlap_edges(verts, edges, s, u as u32) || overlap_edges(verts, edges, t, u as u32) {
                continue;
            }
            if let Some((c, r)) = circumcircle(verts[s as usize], verts[t as usize], verts[u]) {
                pick = Some(u);
                center = c;
                radius = r;
            }
        }
    }

    match pick {
        Some(pt) => {
            let pt = pt as u32;
            update_left_face(&mut edges[e], s, t, *num_faces);
            match find_edge(edges, pt, s) {
                Some(ei) => update_left_face(&mut edges[ei], pt, s, *num_faces),
                None => add_edge(edges, pt, s, *num_faces, u32::MAX),
            }
            match find_edge(edges, t, pt) {
                Some(ei) => update_left_face(&mut edges[ei], t, pt, *num_faces),
                None => add_edge(edges, t, pt, *num_faces, u32::MAX),
            }
            *num_faces += 1;
        }
        None => update_left_face(&mut edges[e], s, t, u32::MAX),
    }
}

/// Incrementally completes a Delaunay-style triangulation with `hull`'s
/// edges as mandatory boundary constraints.
fn delaunay_hull(verts: &[Vec3], hull: &[usize]) -> Vec<[u32; 3]> {
    let mut edges: EdgeTable = Vec::with_capacity(hull.len() * 2);
    let mut num_faces = 0u32;

    for i in 0..hull.len() {
        let j = prev(i, hull.len());
        add_edge(&mut edges, hull[j] as u32, hull[i] as u32, u32::MAX, u32::MAX);
    }

    let mut i = 0;
    while i < edges.len() {
        if edges[i][2] == u32::MAX {
            complete_facet(verts, &mut edges, &mut num_faces, i);
        }
        if edges[i][3] == u32::MAX {
            complete_facet(verts, &mut edges, &mut num_faces, i);
        }
        i += 1;
    }

    let mut triangles = vec![[u32::MAX; 3]; num_faces as usize];
    for e in &edges {
        let (s, t, left, right) = (e[0], e[1], e[2], e[3]);
        if left != u32::MAX {
            let tri = &mut triangles[left as usize];
            if tri[0] == u32::MAX {
                tri[0] = s;
                tri[1] = t;
            } else if tri[0] == t {
                tri[2] = s;
            } else if tri[1] == s {
                tri[2] = t;
            }
        }
        if right != u32::MAX {
            let tri = &mut triangles[right as usize];
            if tri[0] == u32::MAX {
                tri[0] = t;
                tri[1] = s;
            } else if tri[0] == s {
                tri[2] = t;
            } else if tri[1] == t {
                tri[2] = s;
            }
        }
    }
    triangles.retain(|t| t[0] != u32::MAX && t[1] != u32::MAX && t[2] != u32::MAX);
    triangles
}

/// Fan triangulation of the hull loop, starting from the ear with the
/// shortest perimeter, used for the `sample_distance == 0` case and as a
/// fallback whenever the Delaunay pass yields nothing.
fn triangulate_hull(verts: &[Vec3], hull: &[usize], poly_vert_count: usize) -> Vec<[u32; 3]> {
    let n = hull.len();
    if n < 3 {
        return Vec::new();
    }
    let mut start = 0;
    let mut left = 1 % n;
    let mut right = n - 1;
    let mut min_perimeter = f32::MAX;
    for i in 0..n {
        if hull[i] >= poly_vert_count {
            continue;
        }
        let pi = prev(i, n);
        let ni = next(i, n);
        let perimeter = verts[hull[pi]].xz().distance(verts[hull[i]].xz())
            + verts[hull[i]].xz().distance(verts[hull[ni]].xz())
            + verts[hull[ni]].xz().distance(verts[hull[pi]].xz());
        if perimeter < min_perimeter {
            start = i;
            left = ni;
            right = pi;
            min_perimeter = perimeter;
        }
    }

    let mut triangles = vec![[hull[start] as u32, hull[left] as u32, hull[right] as u32]];
    while next(left, n) != right {
        let nleft = next(left, n);
        let nright = prev(right, n);
        let d_left = verts[hull[left]].xz().distance(verts[hull[nleft]].xz())
            + verts[hull[nleft]].xz().distance(verts[hull[right]].xz());
        let d_right = verts[hull[right]].xz().distance(verts[hull[nright]].xz())
            + verts[hull[left]].xz().distance(verts[hull[nright]].xz());
        if d_left < d_right {
            triangles.push([hull[left] as u32, hull[nleft] as u32, hull[right] as u32]);
            left = nleft;
        } else {
            triangles.push([hull[left] as u32, hull[nright] as u32, hull[right] as u32]);
            right = nright;
        }
    }
    triangles
}

trait XzExt {
    fn xz(self) -> glam::Vec2;
}
impl XzExt for Vec3 {
    fn xz(self) -> glam::Vec2 {
        glam::Vec2::new(self.x, self.z)
    }
}

fn patch_height_or_self(patch: &HeightPatch, x: f32, z: f32, fallback: f32) -> f32 {
    let (xi, zi) = (x.round().clamp(0.0, u16::MAX as f32) as u16, z.round().clamp(0.0, u16::MAX as f32) as u16);
    patch.height_at(xi, zi).unwrap_or(fallback)
}

/// Edge sampling: subdivides each polygon edge and retains samples whose
/// deviation from the simplified chord exceeds `max_deviation_sq`,
/// producing the mandatory hull.
fn sample_edges(
    poly: &[Vec3],
    patch: &HeightPatch,
    sample_distance: f32,
    max_deviation_sq: f32,
) -> (Vec<Vec3>, Vec<usize>) {
    let mut verts: Vec<Vec3> = poly.to_vec();
    let mut hull = Vec::new();
    let n = poly.len();

    for i in 0..n {
        let j = prev(i, n);
        let (mut vj, mut vi) = (poly[j], poly[i]);
        let mut swapped = false;
        if (vj.x - vi.x).abs() < f32::EPSILON {
            if vj.z > vi.z {
                std::mem::swap(&mut vj, &mut vi);
                swapped = true;
            }
        } else if vj.x > vi.x {
            std::mem::swap(&mut vj, &mut vi);
            swapped = true;
        }

        let delta = vi - vj;
        let d = (delta.x * delta.x + delta.z * delta.z).sqrt();
        let nn = if sample_distance > 0.0 {
            (1 + (d / sample_distance).floor() as usize).min(MAX_VERTS_PER_EDGE - 1)
        } else {
            1
        };

        let mut edge = vec![Vec3::ZERO; nn + 1];
        for (k, slot) in edge.iter_mut().enumerate() {
            let t = k as f32 / nn as f32;
            let mut p = vj.lerp(vi, t);
            p.y = patch_height_or_self(patch, p.x, p.z, p.y);
            *slot = p;
        }

        let mut idx = vec![0usize, nn];
        let mut k = 0;
        while k + 1 < idx.len() {
            let (a, b) = (idx[k], idx[k + 1]);
            let mut max_dev = 0.0f32;
            let mut max_at = None;
            for m in (a + 1)..b {
                let dev = distance_pt_seg(edge[m], edge[a], edge[b]);
                if dev > max_dev {
                    max_dev = dev;
                    max_at = Some(m);
                }
            }
            match max_at {
                Some(m) if max_dev > max_deviation_sq => idx.insert(k + 1, m),
                _ => k += 1,
            }
        }

        hull.push(j);
        let take = idx.len().saturating_sub(2);
        if swapped {
            for &k in idx.iter().rev().skip(1).take(take) {
                verts.push(edge[k]);
                hull.push(verts.len() - 1);
            }
        } else {
            for &k in idx.iter().skip(1).take(take) {
                verts.push(edge[k]);
                hull.push(verts.len() - 1);
            }
        }
    }

    (verts, hull)
}

fn poly_min_extent(poly: &[Vec3]) -> f32 {
    let n = poly.len();
    let mut min_extent = f32::MAX;
    for i in 0..n {
        let ni = next(i, n);
        let mut max_edge = 0.0f32;
        for (j, &p) in poly.iter().enumerate() {
            if j == i || j == ni {
                continue;
            }
            max_edge = max_edge.max(distance_pt_seg(p, poly[i], poly[ni]).sqrt());
        }
        min_extent = min_extent.min(max_edge);
    }
    min_extent
}

/// Triangulates one polygon's surface against its height patch. Returns
/// detail vertices (local space) and triangles, or an empty vertex list if
/// the polygon could not be recovered to at least 3 vertices.
fn build_poly_detail(
    poly: &[Vec3],
    patch: &HeightPatch,
    sample_distance: f32,
    max_deviation: f32,
) -> (Vec<Vec3>, Vec<[u32; 3]>) {
    if sample_distance <= 0.0 {
        let (verts, hull) = sample_edges(poly, patch, 0.0, max_deviation * max_deviation);
        let triangles = triangulate_hull(&verts, &hull, poly.len());
        return (verts, triangles);
    }

    let (mut verts, hull) = sample_edges(poly, patch, sample_distance, max_deviation * max_deviation);
    let min_extent = poly_min_extent(poly);

    let mut triangles = delaunay_hull(&verts, &hull);
    if triangles.is_empty() {
        triangles = triangulate_hull(&verts, &hull, poly.len());
    }

    if min_extent >= sample_distance * 2.0 && !triangles.is_empty() {
        let (mut min_b, mut max_b) = (poly[0], poly[0]);
        for &p in &poly[1..] {
            min_b = min_b.min(p);
            max_b = max_b.max(p);
        }

        let mut samples = Vec::new();
        let mut z = min_b.z;
        while z < max_b.z {
            let mut x = min_b.x;
            while x < max_b.x {
                let mut p = Vec3::new(x, (min_b.y + max_b.y) * 0.5, z);
                let dist = signed_dist_to_poly_xz(poly, p);
                if dist <= -sample_distance / 2.0 {
                    p.y = patch_height_or_self(patch, p.x, p.z, p.y);
                    samples.push(p);
                }
                x += sample_distance;
            }
            z += sample_distance;
        }

        if samples.is_empty() {
            let mut center = Vec3::ZERO;
            for &p in poly {
                center += p;
            }
            center /= poly.len() as f32;
            center.y = patch_height_or_self(patch, center.x, center.z, center.y);
            samples.push(center);
        }

        let max_iterations = samples.len().min(MAX_VERTS_PER_POLY.saturating_sub(verts.len()));
        for _ in 0..max_iterations {
            if verts.len() >= MAX_VERTS_PER_POLY {
                break;
            }
            let mut best_i = None;
            let mut best_dist = max_deviation;
            for (i, &s) in samples.iter().enumerate() {
                let Some(d) = dist_to_tri_mesh(s, &verts, &triangles) else {
                    continue;
                };
                if d > best_dist {
                    best_dist = d;
                    best_i = Some(i);
                }
            }
            let Some(best_i) = best_i else {
                break;
            };
            let sample = samples.swap_remove(best_i);
            verts.push(sample);
            triangles = delaunay_hull(&verts, &hull);
        }
    }

    if triangles.is_empty() {
        triangles = triangulate_hull(&verts, &hull, poly.len());
    }
    (verts, triangles)
}

/// Builds the final world-space detail mesh from a [`PolyMeshField`] and
/// the [`OpenHeightfield`] it was traced from. `sample_distance` and
/// `max_deviation` are world units; `0.0` for `sample_distance` emits a
/// straight per-polygon fan triangulation with no extra sampling.
pub fn build_detail_mesh(
    open: &OpenHeightfield,
    poly_mesh: &PolyMeshField,
    sample_distance: f32,
    max_deviation: f32,
) -> TriangleMesh {
    let columns = open.column_coords();
    let mut visited = SpanVisited::new(open.spans.len());

    let sample_distance_voxels = if open.field.cell_size > 0.0 { sample_distance / open.field.cell_size } else { 0.0 };
    let max_deviation_voxels = if open.field.cell_height > 0.0 { max_deviation / open.field.cell_height } else { 0.0 };

    let mut out = TriangleMesh::default();

    for polygon in &poly_mesh.polygons {
        if polygon.vertices.len() < 3 {
            continue;
        }

        let poly_voxel: Vec<(i32, i32, i32)> = polygon
            .vertices
            .iter()
            .map(|&vi| {
                let v = poly_mesh.vertices[vi as usize];
                (v.x, v.y, v.z)
            })
            .collect();
        let poly_local: Vec<Vec3> = poly_voxel.iter().map(|&(x, y, z)| Vec3::new(x as f32, y as f32, z as f32)).collect();

        let (mut xmin, mut xmax, mut zmin, mut zmax) = (u16::MAX, 0u16, u16::MAX, 0u16);
        for &(x, _, z) in &poly_voxel {
            xmin = xmin.min(x as u16);
            xmax = xmax.max(x as u16);
            zmin = zmin.min(z as u16);
            zmax = zmax.max(z as u16);
        }
        let xmin = xmin.saturating_sub(1);
        let zmin = zmin.saturating_sub(1);
        let xmax = (xmax + 1).min(open.field.width);
        let zmax = (zmax + 1).min(open.field.depth);
        if xmin >= xmax || zmin >= zmax {
            warn!(region = polygon.region.raw(), "skipping degenerate polygon with empty height-patch bounds");
            continue;
        }

        let mut patch = HeightPatch::new(xmin, zmin, xmax - xmin, zmax - zmin);
        fill_height_patch(open, &columns, &poly_voxel, &mut patch, &mut visited);

        let (detail_verts, detail_tris) =
            build_poly_detail(&poly_local, &patch, sample_distance_voxels, max_deviation_voxels);

        if detail_verts.len() < 3 || detail_tris.is_empty() {
            warn!(region = polygon.region.raw(), "discarding polygon whose detail triangulation yielded fewer than 3 vertices");
            continue;
        }

        let base = out.vertices.len() as u32;
        for v in &detail_verts {
            let wx = open.field.aabb.min.x + v.x * open.field.cell_size;
            let wy = open.field.aabb.min.y + v.y * open.field.cell_height;
            let wz = open.field.aabb.min.z + v.z * open.field.cell_size;
            out.vertices.push(Vec3A::new(wx, wy, wz));
        }
        for tri in &detail_tris {
            out.indices.push(UVec3::new(base + tri[0], base + tri[1], base + tri[2]));
            out.region_ids.push(polygon.region);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heightfield::HeightfieldBuilder, math::Aabb3d, span::SpanFlags};

    fn flat_poly_mesh_and_field(size: u16) -> (OpenHeightfield, PolyMeshField) {
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
        let contours = open.build_contours(1.3, 12);
        let poly_mesh = crate::poly_mesh::build_poly_mesh(&contours, 6).unwrap();
        (open, poly_mesh)
    }

    #[test]
    fn zero_sample_distance_fan_triangulates_each_polygon() {
        let (open, poly_mesh) = flat_poly_mesh_and_field(6);
        let mesh = build_detail_mesh(&open, &poly_mesh, 0.0, 1.0);
        assert!(!mesh.vertices.is_empty());
        assert!(!mesh.indices.is_empty());
        assert_eq!(mesh.indices.len(), mesh.region_ids.len());
    }

    #[test]
    fn detail_triangle_indices_stay_within_vertex_bounds() {
        let (open, poly_mesh) = flat_poly_mesh_and_field(6);
        let mesh = build_detail_mesh(&open, &poly_mesh, 1.0, 1.0);
        let n = mesh.vertices.len() as u32;
        for tri in &mesh.indices {
            assert!(tri.x < n && tri.y < n && tri.z < n);
        }
    }

    #[test]
    fn height_patch_interpolates_unset_cells_from_neighbors() {
        let mut patch = HeightPatch::new(0, 0, 3, 3);
        patch.data[0] = 4;
        let h = patch.height_at(1, 1).expect("center should interpolate from the filled corner");
        assert!((h - 4.0).abs() < f32::EPSILON);
    }
}
