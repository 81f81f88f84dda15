//! Small geometry primitives shared across pipeline stages.
//!
//! The crate intentionally keeps its own minimal `Aabb2d`/`Aabb3d` rather
//! than depending on a full geometry crate: every stage only ever needs
//! min/max extents and a handful of xz-projected predicates.

use glam::{IVec2, Vec2, Vec3A};

/// An axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3d {
    /// The minimum corner.
    pub min: Vec3A,
    /// The maximum corner.
    pub max: Vec3A,
}

impl Aabb3d {
    /// Creates a new AABB from explicit min/max corners.
    pub fn new(min: Vec3A, max: Vec3A) -> Self {
        Self { min, max }
    }

    /// Computes the AABB enclosing every given vertex. `None` if `verts` is empty.
    pub fn from_verts(verts: &[Vec3A]) -> Option<Self> {
        let mut iter = verts.iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), &v| (min.min(v), max.max(v)));
        Some(Self { min, max })
    }

    /// Whether this AABB overlaps `other` on all three axes.
    pub fn intersects(&self, other: &Aabb3d) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

/// An axis-aligned bounding box projected onto the xz-plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb2d {
    /// The minimum corner.
    pub min: Vec2,
    /// The maximum corner.
    pub max: Vec2,
}

impl Aabb2d {
    /// Projects a 3d AABB onto the xz-plane.
    pub fn from_xz(aabb: Aabb3d) -> Self {
        Self {
            min: Vec2::new(aabb.min.x, aabb.min.z),
            max: Vec2::new(aabb.max.x, aabb.max.z),
        }
    }
}

/// Gets the standard width (x-axis) offset for the specified direction.
/// Direction 0 = (-1,0), 1 = (0,+1), 2 = (+1,0), 3 = (0,-1) (width,depth).
/// This ordering is load-bearing: rotating clockwise is `(d+1) & 3`,
/// counter-clockwise is `(d+3) & 3`.
#[inline]
pub fn dir_offset_x(direction: u8) -> i32 {
    const OFFSET: [i32; 4] = [-1, 0, 1, 0];
    OFFSET[direction as usize & 0x03]
}

/// Gets the standard depth (z-axis) offset for the specified direction.
#[inline]
pub fn dir_offset_z(direction: u8) -> i32 {
    const OFFSET: [i32; 4] = [0, 1, 0, -1];
    OFFSET[direction as usize & 0x03]
}

/// Rotates a direction clockwise by one step.
#[inline]
pub fn rotate_cw(direction: u8) -> u8 {
    (direction + 1) & 0x3
}

/// Rotates a direction counter-clockwise by one step.
#[inline]
pub fn rotate_ccw(direction: u8) -> u8 {
    (direction + 3) & 0x3
}

/// Twice the signed area of the triangle `(a, b, c)` projected onto the
/// xz-plane, using exact integer arithmetic. Zero when collinear; the sign
/// flips between the two possible windings of `a, b, c`.
#[inline]
pub fn signed_area_2_xz(a: IVec2, b: IVec2, c: IVec2) -> i64 {
    let a = a.as_i64vec2();
    let b = b.as_i64vec2();
    let c = c.as_i64vec2();
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

/// Whether `c` lies strictly to the left of the directed line `a -> b` in
/// the xz-plane, per [`signed_area_2_xz`]'s sign convention.
#[inline]
pub fn left_xz(a: IVec2, b: IVec2, c: IVec2) -> bool {
    signed_area_2_xz(a, b, c) < 0
}

/// Whether `c` lies on or to the left of the directed line `a -> b`.
#[inline]
pub fn left_on_xz(a: IVec2, b: IVec2, c: IVec2) -> bool {
    signed_area_2_xz(a, b, c) <= 0
}

/// Whether `a`, `b`, `c` are collinear in the xz-plane.
#[inline]
pub fn collinear_xz(a: IVec2, b: IVec2, c: IVec2) -> bool {
    signed_area_2_xz(a, b, c) == 0
}

/// Exact integer segment-segment intersection test on the xz-plane.
/// Returns true for any overlap, including a shared endpoint or collinear
/// overlap, unless `proper_only` excludes touching-at-an-endpoint cases.
pub fn segments_intersect_xz(a: IVec2, b: IVec2, c: IVec2, d: IVec2) -> bool {
    let a1 = signed_area_2_xz(a, b, c);
    let a2 = signed_area_2_xz(a, b, d);
    let a3 = signed_area_2_xz(c, d, a);
    let a4 = signed_area_2_xz(c, d, b);

    if ((a1 > 0 && a2 < 0) || (a1 < 0 && a2 > 0)) && ((a3 > 0 && a4 < 0) || (a3 < 0 && a4 > 0)) {
        return true;
    }

    if a1 == 0 && on_segment_xz(a, b, c) {
        return true;
    }
    if a2 == 0 && on_segment_xz(a, b, d) {
        return true;
    }
    if a3 == 0 && on_segment_xz(c, d, a) {
        return true;
    }
    if a4 == 0 && on_segment_xz(c, d, b) {
        return true;
    }
    false
}

/// Whether `p` lies on the closed segment `a -> b`, assuming `a`, `b`, `p`
/// are already known to be collinear.
fn on_segment_xz(a: IVec2, b: IVec2, p: IVec2) -> bool {
    p.x.min(a.x.min(b.x)) <= p.x
        && p.x <= a.x.max(b.x)
        && p.y.min(a.y.min(b.y)) <= p.y
        && p.y <= a.y.max(b.y)
        && a.x.min(b.x) <= p.x
        && p.x <= a.x.max(b.x)
        && a.y.min(b.y) <= p.y
        && p.y <= a.y.max(b.y)
}

/// Squared xz distance between two integer points.
#[inline]
pub fn dist_sq_xz(a: IVec2, b: IVec2) -> i64 {
    let d = (a - b).as_i64vec2();
    d.x * d.x + d.y * d.y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_rotation_round_trips() {
        for d in 0..4u8 {
            assert_eq!(rotate_ccw(rotate_cw(d)), d);
        }
    }

    #[test]
    fn direction_offsets_are_unit_axis_aligned_steps() {
        for d in 0..4u8 {
            let x = dir_offset_x(d);
            let z = dir_offset_z(d);
            assert_eq!(x.abs() + z.abs(), 1);
        }
    }

    #[test]
    fn signed_area_detects_winding() {
        let a = IVec2::new(0, 0);
        let b = IVec2::new(4, 0);
        let c = IVec2::new(4, 4);
        // a -> b -> c turns left (ccw) in a right-handed xz grid.
        assert!(signed_area_2_xz(a, b, c) > 0);
        assert!(signed_area_2_xz(a, c, b) < 0);
    }

    #[test]
    fn crossing_segments_intersect() {
        let a = IVec2::new(0, 0);
        let b = IVec2::new(4, 4);
        let c = IVec2::new(0, 4);
        let d = IVec2::new(4, 0);
        assert!(segments_intersect_xz(a, b, c, d));
    }

    #[test]
    fn parallel_segments_do_not_intersect() {
        let a = IVec2::new(0, 0);
        let b = IVec2::new(4, 0);
        let c = IVec2::new(0, 1);
        let d = IVec2::new(4, 1);
        assert!(!segments_intersect_xz(a, b, c, d));
    }
}
