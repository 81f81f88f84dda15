//! Small-region filter and merge.

use crate::{open_heightfield::OpenHeightfield, region::Region, region::RegionId};

impl OpenHeightfield {
    /// Builds per-region bookkeeping (span count, boundary connection
    /// sequence, vertical-overlap set), discards islands below
    /// `min_unconnected_region_size`, merges regions at or below
    /// `merge_region_size` into a mergeable neighbor, and finally compacts
    /// surviving region ids to a dense `1..N` range.
    pub fn filter_and_merge_regions(&mut self, min_unconnected_region_size: u32, merge_region_size: u32) {
        let columns = self.column_coords();
        let max_id = self.spans.iter().map(|s| s.region.id()).max().unwrap_or(0);
        if max_id == 0 {
            return;
        }

        let mut regions: Vec<Region> = (0..=max_id).map(|id| Region::new(RegionId::new(id))).collect();
        self.build_region_bookkeeping(&columns, &mut regions);

        for id in 1..=max_id {
            let region = &regions[id as usize];
            if region.span_count == 0 {
                continue;
            }
            let only_null = region.connections.iter().all(|c| c.is_null());
            if only_null && region.span_count < min_unconnected_region_size {
                regions[id as usize].remap = true;
                self.reassign_region(RegionId::new(id), RegionId::NULL);
            }
        }

        loop {
            let mut merged_any = false;
            for id in 1..=max_id {
                if regions[id as usize].remap || regions[id as usize].span_count == 0 {
                    continue;
                }
                if regions[id as usize].span_count > merge_region_size {
                    continue;
                }
                let Some(target) = Self::smallest_mergeable_neighbor(&regions, id) else {
                    continue;
                };
                Self::merge_region_bookkeeping(&mut regions, id, target);
                self.reassign_region(RegionId::new(id), RegionId::new(target));
                merged_any = true;
            }
            if !merged_any {
                break;
            }
        }

        self.compact_region_ids(&regions, max_id);
    }

    fn build_region_bookkeeping(&self, columns: &[(u16, u16)], regions: &mut [Region]) {
        for (i, span) in self.spans.iter().enumerate() {
            let id = span.region.id();
            if id == 0 {
                continue;
            }
            regions[id as usize].span_count += 1;

            let (x, z) = columns[i];
            for dir in 0..4u8 {
                let neighbor_region = match self.neighbor_index(i, x, z, dir) {
                    Some(ni) => self.spans[ni].region.without_border(),
                    None => RegionId::NULL,
                };
                if neighbor_region.id() != id {
                    regions[id as usize].add_unique_connection(neighbor_region);
                }
            }
        }
        for region in regions.iter_mut() {
            region.normalize_connections();
        }

        // Vertical overlap: two regions sharing an xz column but disjoint
        // in height (e.g. a floor and the underside of a ledge above it)
        // are never allowed to merge.
        let mut column_regions: std::collections::HashMap<(u16, u16), Vec<RegionId>> = std::collections::HashMap::new();
        for (i, span) in self.spans.iter().enumerate() {
            if span.region.is_null() {
                continue;
            }
            column_regions.entry(columns[i]).or_default().push(span.region.without_border());
        }
        for same_column in column_regions.values() {
            for &a in same_column {
                for &b in same_column {
                    if a != b && !regions[a.id() as usize].overlaps.contains(&b) {
                        regions[a.id() as usize].overlaps.push(b);
                    }
                }
            }
        }
    }

    /// Two regions are mergeable iff they share exactly one connection run
    /// (a single portal) and do not overlap vertically. Returns the
    /// smallest-span-count mergeable neighbor of `id`, if any.
    fn smallest_mergeable_neighbor(regions: &[Region], id: u16) -> Option<u16> {
        let region = &regions[id as usize];
        let mut best: Option<(u16, u32)> = None;
        for &neighbor in &region.connections {
            if neighbor.is_null() {
                continue;
            }
            let nid = neighbor.id();
            if nid == id || regions[nid as usize].remap || regions[nid as usize].span_count == 0 {
                continue;
            }
            if region.connection_runs_with(neighbor) != 1 {
                continue;
            }
            if regions[nid as usize].connection_runs_with(RegionId::new(id)) != 1 {
                continue;
            }
            if region.overlaps(neighbor) {
                continue;
            }
            let candidate_size = regions[nid as usize].span_count;
            if best.is_none_or(|(_, size)| candidate_size < size) {
                best = Some((nid, candidate_size));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Fuses `source`'s boundary sequence into `target`'s by splicing it in
    /// at the shared connection, drops the now-internal duplicate entry,
    /// unions the overlap sets, and sums span counts. `source` is then
    /// marked for remapping to `target`.
    fn merge_region_bookkeeping(regions: &mut [Region], source: u16, target: u16) {
        let source_id = RegionId::new(source);
        let target_id = RegionId::new(target);

        let source_connections = regions[source as usize].connections.clone();
        let source_overlaps = regions[source as usize].overlaps.clone();
        let source_span_count = regions[source as usize].span_count;

        let target_connections = &mut regions[target as usize].connections;
        if let Some(pos) = target_connections.iter().position(|&c| c == source_id) {
            let mut spliced: Vec<RegionId> = source_connections.into_iter().filter(|&c| c != target_id).collect();
            target_connections.remove(pos);
            let tail = target_connections.split_off(pos);
            target_connections.append(&mut spliced);
            target_connections.extend(tail);
        }
        regions[target as usize].normalize_connections();

        for overlap in source_overlaps {
            if overlap != target_id && !regions[target as usize].overlaps.contains(&overlap) {
                regions[target as usize].overlaps.push(overlap);
            }
        }
        regions[target as usize].span_count += source_span_count;

        regions[source as usize].remap = true;
        regions[source as usize].span_count = 0;

        for region in regions.iter_mut() {
            for c in region.connections.iter_mut() {
                if *c == source_id {
                    *c = target_id;
                }
            }
        }
    }

    fn reassign_region(&mut self, from: RegionId, to: RegionId) {
        for span in &mut self.spans {
            if span.region.without_border() == from {
                span.region = to;
            }
        }
    }

    fn compact_region_ids(&mut self, regions: &[Region], max_id: u16) {
        let mut new_id = vec![0u16; max_id as usize + 1];
        let mut next = 1u16;
        for id in 1..=max_id {
            if regions[id as usize].remap || regions[id as usize].span_count == 0 {
                continue;
            }
            new_id[id as usize] = next;
            next += 1;
        }
        for span in &mut self.spans {
            if span.region.is_null() {
                continue;
            }
            let border = span.region.is_border();
            let mapped = new_id[span.region.id() as usize];
            span.region = RegionId::new(mapped);
            if border {
                span.region = span.region.with_border();
            }
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
            }
        }
        let mut open = OpenHeightfield::from_solid_heightfield(&hf, 2, 1).unwrap();
        open.build_distance_field();
        open.build_regions(0, 0, true);
        open
    }

    #[test]
    fn region_ids_are_compacted_to_a_dense_range_starting_at_one() {
        let mut open = flat_open_field(8);
        open.filter_and_merge_regions(0, 0);
        let max_id = open.spans.iter().map(|s| s.region.id()).max().unwrap_or(0);
        let distinct: std::collections::HashSet<_> = open.spans.iter().map(|s| s.region.id()).collect();
        assert_eq!(distinct.len() as u16, max_id + 1, "ids must cover 0..=max with no gaps");
    }

    #[test]
    fn unconnected_tiny_region_is_discarded() {
        let mut open = flat_open_field(8);
        open.filter_and_merge_regions(u32::MAX, 0);
        assert!(open.spans.iter().all(|s| s.region.is_null()));
    }
}
