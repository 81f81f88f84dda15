//! Post-rasterization span filters.

use crate::{
    heightfield::SolidHeightfield,
    span::{SpanFlags, SpanKey},
};

/// Removes the walkable flag from any span whose clearance to the span
/// directly above it is at most `min_traversable_height`.
pub fn filter_low_height_spans(field: &mut SolidHeightfield, min_traversable_height: u16) {
    let bf = *field.field();
    let mut to_clear = Vec::new();
    for z in 0..bf.depth {
        for x in 0..bf.width {
            let mut iter = field.column_spans(x, z).peekable();
            while let Some((key, span)) = iter.next() {
                if !span.flags().contains(SpanFlags::WALKABLE) {
                    continue;
                }
                if let Some((_, above)) = iter.peek() {
                    let clearance = above.min().saturating_sub(span.max());
                    if clearance <= min_traversable_height {
                        to_clear.push(key);
                    }
                }
            }
        }
    }
    clear_walkable(field, &to_clear);
}

/// Removes the walkable flag from any span that sits on a "ledge": a
/// neighbor column has a reachable floor whose drop relative to this
/// span's floor exceeds `max_traversable_step`.
pub fn filter_ledge_spans(
    field: &mut SolidHeightfield,
    min_traversable_height: u16,
    max_traversable_step: u16,
) {
    let bf = *field.field();
    let mut to_clear = Vec::new();

    for z in 0..bf.depth {
        for x in 0..bf.width {
            let spans: Vec<(SpanKey, u16, u32)> = field
                .column_spans(x, z)
                .map(|(key, s)| {
                    let ceiling = s
                        .next()
                        .map(|n| field.span(n).min() as u32)
                        .unwrap_or(u32::MAX);
                    (key, s.max(), ceiling)
                })
                .collect();

            for &(key, floor, ceiling) in &spans {
                if !field.span(key).flags().contains(SpanFlags::WALKABLE) {
                    continue;
                }
                let mut is_ledge = false;
                for dir in 0..4u8 {
                    let nx = x as i32 + crate::math::dir_offset_x(dir);
                    let nz = z as i32 + crate::math::dir_offset_z(dir);
                    if !bf.contains_column(nx, nz) {
                        continue;
                    }
                    let (nx, nz) = (nx as u16, nz as u16);

                    let neighbor_gaps = neighbor_gaps(field, nx, nz, max_traversable_step);
                    for (n_floor, n_ceiling) in neighbor_gaps {
                        let overlap = (ceiling.min(n_ceiling)) as i64 - (floor as i64).max(n_floor as i64);
                        let reachable = overlap >= min_traversable_height as i64;
                        if !reachable {
                            continue;
                        }
                        let drop = (floor as i64 - n_floor as i64).unsigned_abs();
                        if drop > max_traversable_step as u64 {
                            is_ledge = true;
                        }
                        // Keep scanning remaining gaps/directions instead of an early `break`:
                        // a later gap could still clear the span even if this one is a ledge.
                    }
                }
                if is_ledge {
                    to_clear.push(key);
                }
            }
        }
    }
    clear_walkable(field, &to_clear);
}

/// Enumerates the "gap" floor/ceiling pairs for one column: one per solid
/// span (floor = span.max, ceiling = next span's min or unbounded), plus an
/// implicit gap below the lowest span representing an out-of-field drop.
fn neighbor_gaps(
    field: &SolidHeightfield,
    x: u16,
    z: u16,
    max_traversable_step: u16,
) -> Vec<(i64, i64)> {
    let mut gaps = Vec::new();
    let first_ceiling = field
        .column_head(x, z)
        .map(|k| field.span(k).min() as i64)
        .unwrap_or(i64::MAX);
    // The implicit neighbor below the column's first span: a guaranteed
    // excessive drop.
    gaps.push((-(max_traversable_step as i64) - 1, first_ceiling));

    for (_, span) in field.column_spans(x, z) {
        let ceiling = span
            .next()
            .map(|n| field.span(n).min() as i64)
            .unwrap_or(i64::MAX);
        gaps.push((span.max() as i64, ceiling));
    }
    gaps
}

fn clear_walkable(field: &mut SolidHeightfield, keys: &[SpanKey]) {
    for &key in keys {
        field.clear_walkable_flag(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heightfield::HeightfieldBuilder, math::Aabb3d};
    use glam::Vec3A;

    fn field() -> SolidHeightfield {
        HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3A::ZERO, Vec3A::new(4.0, 10.0, 4.0)),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn low_clearance_span_loses_walkable_flag() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 2, SpanFlags::WALKABLE).unwrap();
        hf.add_span(0, 0, 3, 5, SpanFlags::empty()).unwrap();
        filter_low_height_spans(&mut hf, 2);
        let bottom = hf.span(hf.column_head(0, 0).unwrap());
        assert!(!bottom.flags().contains(SpanFlags::WALKABLE));
    }

    #[test]
    fn adequate_clearance_keeps_walkable_flag() {
        let mut hf = field();
        hf.add_span(0, 0, 0, 2, SpanFlags::WALKABLE).unwrap();
        hf.add_span(0, 0, 8, 9, SpanFlags::empty()).unwrap();
        filter_low_height_spans(&mut hf, 2);
        let bottom = hf.span(hf.column_head(0, 0).unwrap());
        assert!(bottom.flags().contains(SpanFlags::WALKABLE));
    }

    #[test]
    fn span_next_to_tall_drop_is_marked_ledge() {
        let mut hf = field();
        // Current column: floor at height 5, walkable, plenty of clearance above.
        hf.add_span(1, 1, 0, 5, SpanFlags::WALKABLE).unwrap();
        // Neighbor column at (2, 1) is empty -> implicit drop is excessive.
        filter_ledge_spans(&mut hf, 2, 1);
        let span = hf.span(hf.column_head(1, 1).unwrap());
        assert!(!span.flags().contains(SpanFlags::WALKABLE));
    }
}
