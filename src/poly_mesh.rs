//! Polygon mesh builder: per-contour ear-clipping, triangle-to-polygon
//! merging, global vertex dedup, and adjacency recovery.

use std::collections::HashMap;

use glam::IVec2;
use thiserror::Error;
use tracing::warn;

use crate::{
    contours::ContourSet,
    math::{dist_sq_xz, left_on_xz, left_xz, segments_intersect_xz},
    region::RegionId,
};

/// A deduplicated polygon-mesh vertex in voxel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PolyVertex {
    /// Voxel-space x.
    pub x: i32,
    /// Voxel-space height.
    pub y: i32,
    /// Voxel-space z.
    pub z: i32,
}

/// A convex polygon: a loop of global vertex indices plus, per edge, the
/// neighboring polygon sharing it (`None` at the mesh boundary).
#[derive(Debug, Clone)]
pub struct Polygon {
    /// Global vertex indices, clockwise.
    pub vertices: Vec<u32>,
    /// `neighbors[i]` is the polygon across the edge `(vertices[i],
    /// vertices[i+1])`, if any.
    pub neighbors: Vec<Option<u32>>,
    /// The source region this polygon was built from.
    pub region: RegionId,
}

/// The complete set of convex polygons recovered from a [`ContourSet`].
#[derive(Debug, Clone, Default)]
pub struct PolyMeshField {
    /// Global, deduplicated vertex pool.
    pub vertices: Vec<PolyVertex>,
    /// Every polygon, with cross-contour adjacency resolved.
    pub polygons: Vec<Polygon>,
}

/// Errors that can occur building a [`PolyMeshField`].
#[derive(Error, Debug)]
pub enum PolyMeshError {
    /// The aggregate source vertex count exceeded the addressable range.
    #[error("aggregate source vertex count exceeds the 0x0FFFFFFF limit")]
    TooManyVertices,
}

const MAX_SOURCE_VERTICES: u64 = 0x0FFF_FFFF;

/// Builds a [`PolyMeshField`] from every contour in `contours`. A contour
/// whose triangulation fails is dropped (logged); the rest still produce a
/// mesh. `max_verts_per_poly` caps how large a merged polygon may grow.
pub fn build_poly_mesh(contours: &ContourSet, max_verts_per_poly: usize) -> Result<PolyMeshField, PolyMeshError> {
    let mut total_source_vertices: u64 = 0;
    let mut vertex_lookup: HashMap<(i32, i32, i32), u32> = HashMap::new();
    let mut vertices: Vec<PolyVertex> = Vec::new();
    let mut polygons: Vec<Polygon> = Vec::new();

    for contour in &contours.contours {
        total_source_vertices += contour.vertices.len() as u64;
        if total_source_vertices > MAX_SOURCE_VERTICES {
            return Err(PolyMeshError::TooManyVertices);
        }
        if contour.vertices.len() < 3 {
            continue;
        }

        let verts_xz: Vec<IVec2> = contour.vertices.iter().map(|v| IVec2::new(v.x, v.z)).collect();
        let Some(triangles) = triangulate_contour(&verts_xz) else {
            warn!(region = contour.region.raw(), "dropping contour whose triangulation failed");
            continue;
        };

        let merged = merge_triangles_into_polygons(triangles, &verts_xz, max_verts_per_poly);

        for local_poly in merged {
            let mut global_indices = Vec::with_capacity(local_poly.len());
            for local_idx in local_poly {
                let v = contour.vertices[local_idx];
                let key = (v.x, v.y, v.z);
                let global = *vertex_lookup.entry(key).or_insert_with(|| {
                    vertices.push(PolyVertex { x: v.x, y: v.y, z: v.z });
                    (vertices.len() - 1) as u32
                });
                global_indices.push(global);
            }
            let n = global_indices.len();
            polygons.push(Polygon {
                vertices: global_indices,
                neighbors: vec![None; n],
                region: contour.region,
            });
        }
    }

    recover_adjacency(&mut polygons);

    Ok(PolyMeshField { vertices, polygons })
}

fn next(i: usize, n: usize) -> usize {
    if i + 1 == n { 0 } else { i + 1 }
}

fn prev(i: usize, n: usize) -> usize {
    if i == 0 { n - 1 } else { i - 1 }
}

fn coords_equal(a: IVec2, b: IVec2) -> bool {
    a == b
}

/// Whether the diagonal `ring[i] -> ring[j]` lies within the polygon's
/// internal angle at `ring[i]` (reflex vertices get the flipped test).
fn in_cone(ring: &[usize], verts: &[IVec2], i: usize, j: usize) -> bool {
    let n = ring.len();
    let pi = verts[ring[i]];
    let pj = verts[ring[j]];
    let pi1 = verts[ring[next(i, n)]];
    let pin1 = verts[ring[prev(i, n)]];
    if left_on_xz(pin1, pi, pi1) {
        left_xz(pi, pj, pin1) && left_xz(pj, pi, pi1)
    } else {
        !(left_on_xz(pi, pj, pi1) && left_on_xz(pj, pi, pin1))
    }
}

/// Whether the diagonal `ring[i] -> ring[j]` crosses any polygon edge it
/// isn't connected to (shared-endpoint edges are skipped by coordinate
/// comparison, since dedup hasn't happened yet at this stage).
fn diagonal_is_clear(ring: &[usize], verts: &[IVec2], i: usize, j: usize) -> bool {
    let n = ring.len();
    let d0 = verts[ring[i]];
    let d1 = verts[ring[j]];
    for k in 0..n {
        let k1 = next(k, n);
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = verts[ring[k]];
        let p1 = verts[ring[k1]];
        if coords_equal(d0, p0) || coords_equal(d1, p0) || coords_equal(d0, p1) || coords_equal(d1, p1) {
            continue;
        }
        if segments_intersect_xz(d0, d1, p0, p1) {
            return false;
        }
    }
    true
}

fn is_valid_partition(ring: &[usize], verts: &[IVec2], i: usize, j: usize) -> bool {
    in_cone(ring, verts, i, j) && diagonal_is_clear(ring, verts, i, j)
}

/// Ear-clipping triangulation of a simple, clockwise, possibly concave
/// polygon. Returns triangles as index triples into `verts`' positions, or
/// `None` if no valid partition remains before the ring is fully consumed.
fn triangulate_contour(verts: &[IVec2]) -> Option<Vec<[usize; 3]>> {
    let n0 = verts.len();
    if n0 < 3 {
        return None;
    }
    let mut ring: Vec<usize> = (0..n0).collect();
    let mut is_ear: Vec<bool> = (0..n0)
        .map(|i| is_valid_partition(&ring, verts, i, (i + 2) % n0))
        .collect();

    let mut triangles = Vec::with_capacity(n0 - 2);

    while ring.len() > 3 {
        let n = ring.len();
        let mut best: Option<(usize, i64)> = None;
        for i in 0..n {
            let i1 = next(i, n);
            if !is_ear[i] {
                continue;
            }
            let i2 = next(i1, n);
            let len_sq = dist_sq_xz(verts[ring[i]], verts[ring[i2]]);
            if best.is_none_or(|(_, best_len)| len_sq < best_len) {
                best = Some((i, len_sq));
            }
        }
        let Some((i, _)) = best else {
            return None;
        };

        let i1 = next(i, n);
        let i2 = next(i1, n);
        triangles.push([ring[i], ring[i1], ring[i2]]);

        ring.remove(i1);
        is_ear.remove(i1);
        let n = ring.len();

        let i1 = if i1 >= n { 0 } else { i1 };
        let i_prev = prev(i1, n);
        is_ear[i_prev] = is_valid_partition(&ring, verts, i_prev, (i_prev + 2) % n);
        is_ear[i1] = is_valid_partition(&ring, verts, i1, (i1 + 2) % n);
    }

    triangles.push([ring[0], ring[1], ring[2]]);
    Some(triangles)
}

fn shared_edge(pa: &[usize], pb: &[usize]) -> Option<(usize, usize)> {
    let na = pa.len();
    let nb = pb.len();
    for ea in 0..na {
        let (a0, a1) = (pa[ea], pa[next(ea, na)]);
        for eb in 0..nb {
            let (b0, b1) = (pb[eb], pb[next(eb, nb)]);
            if a0 == b1 && a1 == b0 {
                return Some((ea, eb));
            }
        }
    }
    None
}

/// Checks convexity is preserved at the two shared-edge endpoints after
/// merging `pa` and `pb` along `(ea, eb)`.
fn merge_preserves_convexity(pa: &[usize], pb: &[usize], ea: usize, eb: usize, verts: &[IVec2]) -> bool {
    let na = pa.len();
    let nb = pb.len();

    let va = verts[pa[prev(ea, na)]];
    let vb = verts[pa[ea]];
    let vc = verts[pb[(eb + 2) % nb]];
    if !left_xz(va, vb, vc) {
        return false;
    }

    let va2 = verts[pb[prev(eb, nb)]];
    let vb2 = verts[pb[eb]];
    let vc2 = verts[pa[(ea + 2) % na]];
    left_xz(va2, vb2, vc2)
}

fn merge_at(pa: &[usize], pb: &[usize], ea: usize, eb: usize) -> Vec<usize> {
    let na = pa.len();
    let nb = pb.len();
    let mut out = Vec::with_capacity(na + nb - 2);
    for i in 0..na - 1 {
        out.push(pa[(ea + 1 + i) % na]);
    }
    for i in 0..nb - 1 {
        out.push(pb[(eb + 1 + i) % nb]);
    }
    out
}

/// Hertel-Mehlhorn-style merging: repeatedly fuses the pair of polygons
/// sharing the longest edge whose merge is both convex and within
/// `max_verts_per_poly`, until no legal merge remains.
fn merge_triangles_into_polygons(
    triangles: Vec<[usize; 3]>,
    verts: &[IVec2],
    max_verts_per_poly: usize,
) -> Vec<Vec<usize>> {
    let mut polys: Vec<Vec<usize>> = triangles.into_iter().map(|t| t.to_vec()).collect();

    loop {
        let mut best: Option<(usize, usize, usize, usize, i64)> = None;
        for a in 0..polys.len() {
            for b in (a + 1)..polys.len() {
                if polys[a].len() + polys[b].len() - 2 > max_verts_per_poly {
                    continue;
                }
                let Some((ea, eb)) = shared_edge(&polys[a], &polys[b]) else {
                    continue;
                };
                if !merge_preserves_convexity(&polys[a], &polys[b], ea, eb, verts) {
                    continue;
                }
                let p0 = verts[polys[a][ea]];
                let p1 = verts[polys[a][next(ea, polys[a].len())]];
                let len_sq = dist_sq_xz(p0, p1);
                if best.is_none_or(|(_, _, _, _, best_len)| len_sq > best_len) {
                    best = Some((a, b, ea, eb, len_sq));
                }
            }
        }
        match best {
            Some((a, b, ea, eb, _)) => {
                let merged = merge_at(&polys[a], &polys[b], ea, eb);
                polys[a] = merged;
                polys.remove(b);
            }
            None => break,
        }
    }

    polys
}

struct EdgeEntry {
    v_b: u32,
    poly_a: u32,
    offset_a: u32,
    poly_b: Option<(u32, u32)>,
}

/// Two-pass edge-table adjacency recovery: edges with `v_a < v_b` are
/// cataloged keyed by `v_a` in the first pass; edges with `v_a > v_b` look
/// up the chain at `v_b` in the second pass and claim the first unclaimed
/// match.
fn recover_adjacency(polygons: &mut [Polygon]) {
    let mut table: HashMap<u32, Vec<EdgeEntry>> = HashMap::new();

    for (pi, poly) in polygons.iter().enumerate() {
        let n = poly.vertices.len();
        for offset in 0..n {
            let a = poly.vertices[offset];
            let b = poly.vertices[(offset + 1) % n];
            if a < b {
                table.entry(a).or_default().push(EdgeEntry {
                    v_b: b,
                    poly_a: pi as u32,
                    offset_a: offset as u32,
                    poly_b: None,
                });
            }
        }
    }

    for (pi, poly) in polygons.iter().enumerate() {
        let n = poly.vertices.len();
        for offset in 0..n {
            let a = poly.vertices[offset];
            let b = poly.vertices[(offset + 1) % n];
            if a > b {
                if let Some(entries) = table.get_mut(&b) {
                    if let Some(entry) = entries.iter_mut().find(|e| e.v_b == a && e.poly_b.is_none()) {
                        entry.poly_b = Some((pi as u32, offset as u32));
                    }
                }
            }
        }
    }

    let mut assignments = Vec::new();
    for entries in table.values() {
        for e in entries {
            if let Some((pb, offb)) = e.poly_b {
                assignments.push((e.poly_a, e.offset_a, pb, offb));
            }
        }
    }
    for (pa, offa, pb, offb) in assignments {
        polygons[pa as usize].neighbors[offa as usize] = Some(pb);
        polygons[pb as usize].neighbors[offb as usize] = Some(pa);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contours::{Contour, ContourVertex};

    fn square_contour(region: u16, size: i32) -> Contour {
        let r = RegionId::new(region);
        let verts = vec![
            ContourVertex { x: 0, y: 0, z: 0, region: RegionId::NULL },
            ContourVertex { x: 0, y: 0, z: size, region: RegionId::NULL },
            ContourVertex { x: size, y: 0, z: size, region: RegionId::NULL },
            ContourVertex { x: size, y: 0, z: 0, region: RegionId::NULL },
        ];
        Contour { region: r, vertices: verts.clone(), raw: verts }
    }

    #[test]
    fn a_square_contour_triangulates_into_two_triangles() {
        let contour = square_contour(1, 4);
        let verts_xz: Vec<IVec2> = contour.vertices.iter().map(|v| IVec2::new(v.x, v.z)).collect();
        let triangles = triangulate_contour(&verts_xz).expect("square must triangulate");
        assert_eq!(triangles.len(), 2);
    }

    #[test]
    fn a_square_contour_merges_back_into_a_single_quad() {
        let set = ContourSet { contours: vec![square_contour(1, 4)] };
        let mesh = build_poly_mesh(&set, 6).expect("build must succeed");
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.polygons.len(), 1);
        assert_eq!(mesh.polygons[0].vertices.len(), 4);
    }

    #[test]
    fn adjacent_contours_sharing_an_edge_recover_adjacency() {
        let r1 = RegionId::new(1);
        let r2 = RegionId::new(2);
        let a = vec![
            ContourVertex { x: 0, y: 0, z: 0, region: RegionId::NULL },
            ContourVertex { x: 0, y: 0, z: 4, region: RegionId::NULL },
            ContourVertex { x: 4, y: 0, z: 4, region: RegionId::NULL },
            ContourVertex { x: 4, y: 0, z: 0, region: RegionId::NULL },
        ];
        let b = vec![
            ContourVertex { x: 4, y: 0, z: 0, region: RegionId::NULL },
            ContourVertex { x: 4, y: 0, z: 4, region: RegionId::NULL },
            ContourVertex { x: 8, y: 0, z: 4, region: RegionId::NULL },
            ContourVertex { x: 8, y: 0, z: 0, region: RegionId::NULL },
        ];
        let set = ContourSet {
            contours: vec![
                Contour { region: r1, vertices: a.clone(), raw: a },
                Contour { region: r2, vertices: b.clone(), raw: b },
            ],
        };
        let mesh = build_poly_mesh(&set, 6).unwrap();
        assert_eq!(mesh.vertices.len(), 6, "the shared edge's two vertices must be deduplicated");
        assert!(mesh.polygons[0].neighbors.iter().any(|n| n.is_some()));
        assert!(mesh.polygons[1].neighbors.iter().any(|n| n.is_some()));
    }
}
