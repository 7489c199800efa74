//! Member-to-resource mapping algorithms: packed, spread, user-colored, and
//! affinity-preserving, plus the disjoint-affinity and k-set-intersection
//! helpers the affinity-preserving mapper needs.
//!
//! A "member" is a 0-based index into the group being split (a process,
//! thread, or whatever the caller's unit of parallelism is); a "resource" is
//! a 0-based index into the list of primary cpusets (or device affinities)
//! members are being distributed across. Everything here is pure — no
//! hwloc, no I/O — which is what makes it unit-testable.

use std::collections::{BTreeMap, BTreeSet};

use nodescope_common::Cpuset;

/// `member id -> resource id`.
#[derive(Debug, Default, Clone)]
pub struct ResourceMap {
    entries: BTreeMap<usize, usize>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mapped(&self, fid: usize) -> bool {
        self.entries.contains_key(&fid)
    }

    pub fn nmapped(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, fid: usize, rid: usize) {
        self.entries.insert(fid, rid);
    }

    pub fn get(&self, fid: usize) -> Option<usize> {
        self.entries.get(&fid).copied()
    }

    /// `result[fid] = rid`, for every mapped member in increasing fid order.
    pub fn flatten(&self) -> Vec<usize> {
        self.entries.values().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// `⌈i/k⌉`, the max items of `i` distributed evenly over `k` buckets.
fn max_per_k(i: usize, k: usize) -> usize {
    if k == 0 {
        return 0;
    }
    i.div_ceil(k)
}

/// `max_chunk`, reduced until it fits within `space_left`.
fn max_fit(max_chunk: usize, space_left: usize) -> usize {
    max_chunk.min(space_left)
}

/// Contiguous blocks: the first `⌈nfids/nres⌉` members go to resource 0, the
/// next block to resource 1, and so on.
pub fn map_packed(map: &mut ResourceMap, nfids: usize, nres: usize) {
    let maxcpr = max_per_k(nfids, nres);
    let mut fid = 0usize;
    for rid in 0..nres {
        let nmap = max_fit(maxcpr, nfids - map.nmapped());
        for _ in 0..nmap {
            if !map.is_mapped(fid) {
                map.insert(fid, rid);
                fid += 1;
            } else {
                fid += 1;
            }
        }
    }
}

/// Round-robin: member `i` goes to resource `i % nres`.
pub fn map_spread(map: &mut ResourceMap, nfids: usize, nres: usize) {
    let mut rid = 0usize;
    for fid in 0..nfids {
        if map.is_mapped(fid) {
            continue;
        }
        map.insert(fid, rid % nres);
        rid += 1;
    }
}

/// User-defined colors: members sharing a color are packed onto adjacent
/// resources. `colors[fid]` is the caller-supplied color for member `fid`.
pub fn map_colors(map: &mut ResourceMap, colors: &[i32], nres: usize) {
    let distinct: BTreeSet<i32> = colors.iter().copied().collect();
    let color_vec: Vec<i32> = distinct.into_iter().collect();
    let color_to_csi: BTreeMap<i32, usize> =
        color_vec.iter().enumerate().map(|(i, c)| (*c, i)).collect();

    let mut csi_to_rid = ResourceMap::new();
    map_packed(&mut csi_to_rid, color_vec.len(), nres);

    for (fid, color) in colors.iter().enumerate() {
        if map.is_mapped(fid) {
            continue;
        }
        let csi = color_to_csi[color];
        let rid = csi_to_rid.get(csi).expect("every csi was just packed");
        map.insert(fid, rid);
    }
}

/// `resource id -> { member ids whose affinity intersects that resource }`.
pub type SharedAffinityMap = BTreeMap<usize, BTreeSet<usize>>;

pub fn calc_shared_affinity(member_affinities: &[Cpuset], resources: &[Cpuset]) -> SharedAffinityMap {
    let mut out = SharedAffinityMap::new();
    for (rid, res) in resources.iter().enumerate() {
        for (fid, aff) in member_affinities.iter().enumerate() {
            if aff.intersects(res) {
                out.entry(rid).or_default().insert(fid);
            }
        }
    }
    out
}

/// Members present under *every* resource's shared-affinity set — the
/// "tied" members the affinity-preserving mapper has to break ties for.
pub fn k_set_intersection(smap: &SharedAffinityMap) -> BTreeSet<usize> {
    let mut iter = smap.values();
    let Some(first) = iter.next() else { return BTreeSet::new() };
    let mut result = first.clone();
    for set in iter {
        result = result.intersection(set).copied().collect();
    }
    result
}

/// Breaks ties in `samap` by keeping at most `⌈|interids|/nres|⌉` of the
/// intersecting ids per resource (round-robin), leaving non-intersecting ids
/// untouched.
pub fn make_shared_affinity_map_disjoint(samap: &mut SharedAffinityMap, interids: &BTreeSet<usize>) {
    let nres = samap.len();
    let maxcpr = max_per_k(interids.len(), nres);

    let mut dmap = SharedAffinityMap::new();
    for (rid, members) in samap.iter() {
        let disjoint: BTreeSet<usize> = members.difference(interids).copied().collect();
        dmap.insert(*rid, disjoint);
    }

    let mut remaining = interids.clone();
    for (rid, members) in samap.iter() {
        let mut n = 0usize;
        for cid in members.iter() {
            if !remaining.contains(cid) {
                continue;
            }
            dmap.entry(*rid).or_default().insert(*cid);
            remaining.remove(cid);
            n += 1;
            if n == maxcpr || remaining.is_empty() {
                break;
            }
        }
    }
    *samap = dmap;
}

pub fn map_disjoint_affinity(map: &mut ResourceMap, damap: &SharedAffinityMap) {
    for (rid, fids) in damap.iter() {
        for fid in fids.iter() {
            if !map.is_mapped(*fid) {
                map.insert(*fid, *rid);
            }
        }
    }
}

/// A callback used to place members left unassigned after the
/// affinity-preserving pass: `packed` when splitting without anchoring on a
/// specific object type, `spread` otherwise.
pub type FallbackMapper = fn(&mut ResourceMap, usize, usize);

/// Places every member of `member_affinities` onto a resource in `resources`,
/// preferring resources the member's own affinity intersects, and falling
/// back to `fallback` for members that intersect none (or for breaking ties
/// among members that intersect every resource).
pub fn map_affinity_preserving(
    map: &mut ResourceMap,
    fallback: FallbackMapper,
    member_affinities: &[Cpuset],
    resources: &[Cpuset],
) {
    let ncon = member_affinities.len();
    let nres = resources.len();
    let mut res_affinity_map = calc_shared_affinity(member_affinities, resources);
    let affinity_intersection = k_set_intersection(&res_affinity_map);

    if affinity_intersection.is_empty() {
        map_disjoint_affinity(map, &res_affinity_map);
    } else {
        make_shared_affinity_map_disjoint(&mut res_affinity_map, &affinity_intersection);
        map_disjoint_affinity(map, &res_affinity_map);
        fallback(map, ncon, nres);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cs(list: &str) -> Cpuset {
        Cpuset::parse_list_string(list).unwrap()
    }

    #[test]
    fn packed_fills_resources_in_contiguous_blocks() {
        let mut map = ResourceMap::new();
        map_packed(&mut map, 6, 3);
        assert_eq!(map.flatten(), vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn spread_round_robins_across_resources() {
        let mut map = ResourceMap::new();
        map_spread(&mut map, 6, 3);
        assert_eq!(map.flatten(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn colors_pack_same_color_members_onto_adjacent_resources() {
        let mut map = ResourceMap::new();
        map_colors(&mut map, &[5, 3, 5, 3], 2);
        assert_eq!(map.get(0), map.get(2));
        assert_eq!(map.get(1), map.get(3));
        assert_ne!(map.get(0), map.get(1));
    }

    #[test]
    fn k_set_intersection_finds_members_shared_by_every_resource() {
        let affinities = vec![cs("0-1"), cs("1-2"), cs("0-2")];
        let resources = vec![cs("0-1"), cs("1-2")];
        let smap = calc_shared_affinity(&affinities, &resources);
        let inter = k_set_intersection(&smap);
        assert_eq!(inter, BTreeSet::from([2]));
    }

    #[test]
    fn affinity_preserving_assigns_disjoint_members_directly() {
        let affinities = vec![cs("0"), cs("1")];
        let resources = vec![cs("0"), cs("1")];
        let mut map = ResourceMap::new();
        map_affinity_preserving(&mut map, map_packed_fn, &affinities, &resources);
        assert_eq!(map.get(0), Some(0));
        assert_eq!(map.get(1), Some(1));
    }

    fn map_packed_fn(map: &mut ResourceMap, nfids: usize, nres: usize) {
        map_packed(map, nfids, nres)
    }
}
