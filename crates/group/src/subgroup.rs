//! Subgroup descriptor used by backends (pthread, OpenMP) that have no
//! native notion of `(color, key)`.

/// `{color, key, rank, ncolors}`, sorted lexicographically by
/// `(color, key, rank)` to determine each member's place in the split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubgroupDescriptor {
    pub color: i32,
    pub key: i32,
    pub rank: i32,
    pub ncolors: i32,
}

impl SubgroupDescriptor {
    pub fn new(color: i32, key: i32, rank: i32) -> Self {
        Self { color, key, rank, ncolors: 0 }
    }
}

/// Sorts `descriptors` by `(color, key, rank)`, fills in `ncolors`, and
/// returns each member's `(subgroup_index, new_size, new_rank)` in the
/// *original* (unsorted) order — the bookkeeping every split-off-a-team
/// backend (pthread, OpenMP) shares.
pub fn resolve_split(descriptors: &[SubgroupDescriptor]) -> Vec<(i32, usize, usize)> {
    let mut sorted: Vec<(usize, SubgroupDescriptor)> =
        descriptors.iter().copied().enumerate().collect();
    sorted.sort_by_key(|(_, d)| (d.color, d.key, d.rank));

    let mut result = vec![(0, 0, 0); descriptors.len()];
    let mut color_start = 0usize;
    while color_start < sorted.len() {
        let color = sorted[color_start].1.color;
        let mut color_end = color_start;
        while color_end < sorted.len() && sorted[color_end].1.color == color {
            color_end += 1;
        }
        let new_size = color_end - color_start;
        for (new_rank, idx) in (color_start..color_end).enumerate() {
            let original_index = sorted[idx].0;
            result[original_index] = (color, new_size, new_rank);
        }
        color_start = color_end;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_split_groups_by_color_and_orders_by_key_then_rank() {
        let descriptors = vec![
            SubgroupDescriptor::new(1, 0, 0),
            SubgroupDescriptor::new(0, 0, 1),
            SubgroupDescriptor::new(1, 0, 2),
            SubgroupDescriptor::new(0, 0, 3),
        ];
        let resolved = resolve_split(&descriptors);
        assert_eq!(resolved[0], (1, 2, 0));
        assert_eq!(resolved[1], (0, 2, 0));
        assert_eq!(resolved[2], (1, 2, 1));
        assert_eq!(resolved[3], (0, 2, 1));
    }
}
