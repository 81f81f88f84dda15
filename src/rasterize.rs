//! Conservative triangle voxelization.
//!
//! Each triangle is clipped row-by-row against the z-slabs it crosses, then
//! column-by-column against the x-slabs within each row, using
//! Sutherland–Hodgman clipping on the xz axes. The clipped footprint's y
//! extent becomes a solid span in that column.

use glam::Vec3A;

use crate::{
    heightfield::{SolidHeightfield, SpanInsertionError},
    span::{AreaType, SpanFlags},
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Z,
}

impl Axis {
    #[inline]
    fn coord(self, p: Vec3A) -> f32 {
        match self {
            Axis::X => p.x,
            Axis::Z => p.z,
        }
    }
}

/// Clips a convex polygon against the half-space `axis >= value` (when
/// `keep_greater` is `true`) or `axis <= value` (otherwise).
fn clip_by_plane(poly: &[Vec3A], axis: Axis, value: f32, keep_greater: bool) -> Vec<Vec3A> {
    if poly.is_empty() {
        return Vec::new();
    }
    let inside = |p: Vec3A| {
        let c = axis.coord(p);
        if keep_greater { c >= value } else { c <= value }
    };
    let intersect = |a: Vec3A, b: Vec3A| -> Vec3A {
        let da = axis.coord(a) - value;
        let db = axis.coord(b) - value;
        let t = da / (da - db);
        a + (b - a) * t
    };

    let n = poly.len();
    let mut out = Vec::with_capacity(n + 1);
    for i in 0..n {
        let cur = poly[i];
        let prev = poly[(i + n - 1) % n];
        let cur_in = inside(cur);
        let prev_in = inside(prev);
        if cur_in {
            if !prev_in {
                out.push(intersect(prev, cur));
            }
            out.push(cur);
        } else if prev_in {
            out.push(intersect(prev, cur));
        }
    }
    out
}

/// Computes the per-triangle walkable flag from its (unnormalized) normal:
/// walkable iff the normalized normal's y component exceeds `cos(max_slope)`.
pub fn triangle_is_walkable(v0: Vec3A, v1: Vec3A, v2: Vec3A, max_slope_cos: f32) -> bool {
    let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
    normal.y > max_slope_cos
}

/// Rasterizes one triangle into `field`.
///
/// `area` is the triangle's configured area type (overridden to
/// [`AreaType::NOT_WALKABLE`] when the slope test fails);
/// `flag_merge_threshold` controls the `SolidHeightfield::add_span` gap
/// tolerance used elsewhere — rasterization itself always inserts exact
/// clipped spans.
pub fn rasterize_triangle(
    field: &mut SolidHeightfield,
    v0: Vec3A,
    v1: Vec3A,
    v2: Vec3A,
    area: AreaType,
    max_slope_cos: f32,
) -> Result<(), SpanInsertionError> {
    let bf = *field.field();
    let tri_min = v0.min(v1).min(v2);
    let tri_max = v0.max(v1).max(v2);

    // Skip if disjoint from the field bounds.
    if tri_max.x < bf.aabb.min.x
        || tri_min.x > bf.aabb.max.x
        || tri_max.y < bf.aabb.min.y
        || tri_min.y > bf.aabb.max.y
        || tri_max.z < bf.aabb.min.z
        || tri_min.z > bf.aabb.max.z
    {
        return Ok(());
    }

    let walkable = area.is_walkable() && triangle_is_walkable(v0, v1, v2, max_slope_cos);
    let flags = if walkable { SpanFlags::WALKABLE } else { SpanFlags::empty() };

    let z0 = (((tri_min.z - bf.aabb.min.z) / bf.cell_size).floor() as i32).max(0);
    let z1 = (((tri_max.z - bf.aabb.min.z) / bf.cell_size).floor() as i32).min(bf.depth as i32 - 1);
    if z0 > z1 {
        return Ok(());
    }

    let triangle = [v0, v1, v2];
    for z in z0..=z1 {
        let z_min = bf.aabb.min.z + z as f32 * bf.cell_size;
        let z_max = z_min + bf.cell_size;
        let row = clip_by_plane(&triangle, Axis::Z, z_min, true);
        let row = clip_by_plane(&row, Axis::Z, z_max, false);
        if row.len() < 3 {
            continue;
        }

        let row_min = row.iter().fold(row[0], |a, &b| a.min(b));
        let row_max = row.iter().fold(row[0], |a, &b| a.max(b));
        let x0 = (((row_min.x - bf.aabb.min.x) / bf.cell_size).floor() as i32).max(0);
        let x1 = (((row_max.x - bf.aabb.min.x) / bf.cell_size).floor() as i32).min(bf.width as i32 - 1);
        if x0 > x1 {
            continue;
        }

        for x in x0..=x1 {
            let x_min = bf.aabb.min.x + x as f32 * bf.cell_size;
            let x_max = x_min + bf.cell_size;
            let column = clip_by_plane(&row, Axis::X, x_min, true);
            let column = clip_by_plane(&column, Axis::X, x_max, false);
            if column.len() < 3 {
                continue;
            }

            let mut y_min = column[0].y;
            let mut y_max = column[0].y;
            for p in &column[1..] {
                y_min = y_min.min(p.y);
                y_max = y_max.max(p.y);
            }

            let height_min = (((y_min - bf.aabb.min.y) / bf.cell_height).floor()).max(0.0) as u16;
            let height_max_unclamped = ((y_max - bf.aabb.min.y) / bf.cell_height).ceil();
            let height_max_limit = ((bf.aabb.max.y - bf.aabb.min.y) / bf.cell_height) as u16;
            let height_max = (height_max_unclamped.max(0.0) as u16).min(height_max_limit);
            let height_max = height_max.max(height_min);

            field.add_span(x as u16, z as u16, height_min, height_max, flags)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heightfield::HeightfieldBuilder, math::Aabb3d};

    fn field() -> SolidHeightfield {
        HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::new(0.0, 0.0, 0.0), Vec3A::new(4.0, 4.0, 4.0)),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn flat_walkable_triangle_rasterizes_into_every_covered_column() {
        let mut hf = field();
        let max_slope_cos = (45f32.to_radians()).cos();
        rasterize_triangle(
            &mut hf,
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(2.0, 0.0, 0.0),
            Vec3A::new(0.0, 0.0, 2.0),
            AreaType::WALKABLE,
            max_slope_cos,
        )
        .unwrap();
        assert!(hf.column_head(0, 0).is_some());
        assert!(hf.column_head(1, 1).is_some());
        assert!(hf.column_head(3, 3).is_none());
    }

    #[test]
    fn triangle_disjoint_from_bounds_is_skipped() {
        let mut hf = field();
        rasterize_triangle(
            &mut hf,
            Vec3A::new(100.0, 0.0, 100.0),
            Vec3A::new(102.0, 0.0, 100.0),
            Vec3A::new(100.0, 0.0, 102.0),
            AreaType::WALKABLE,
            0.0,
        )
        .unwrap();
        for z in 0..4 {
            for x in 0..4 {
                assert!(hf.column_head(x, z).is_none());
            }
        }
    }

    #[test]
    fn steep_triangle_is_not_walkable() {
        assert!(!triangle_is_walkable(
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(0.0, 2.0, 0.0),
            Vec3A::new(1.0, 0.0, 0.0),
            (45f32.to_radians()).cos(),
        ));
    }
}
