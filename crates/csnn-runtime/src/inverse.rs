//! Inverse adjacency: source unit -> edges it drives
//!
//! Stored in compressed-row form so that a spike fans out in O(out-degree)
//! and a rebuild is a single O(E) pass.

/// Address of one edge in a projection's forward storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeRef {
    /// Active-destination local index `i`
    pub dest: usize,
    /// Position `j` within `pre_index[i]`
    pub edge: usize,
}

/// Source-major view of a projection's edges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InverseIndex {
    offsets: Vec<usize>,
    entries: Vec<EdgeRef>,
    post_local: Vec<Option<usize>>,
}

impl InverseIndex {
    /// Derive from forward adjacency. Sources `>= pre_size` and destinations
    /// `>= post_size` must already have been rejected by the caller.
    pub fn build(
        pre_size: usize,
        post_size: usize,
        post_index: &[usize],
        pre_index: &[Vec<usize>],
    ) -> Self {
        let mut counts = vec![0usize; pre_size + 1];
        for sources in pre_index {
            for &pre in sources {
                counts[pre + 1] += 1;
            }
        }
        for s in 0..pre_size {
            counts[s + 1] += counts[s];
        }
        let offsets = counts;

        // Scan order (i, then j) is preserved inside each bucket
        let mut cursor = offsets.clone();
        let mut entries = vec![EdgeRef { dest: 0, edge: 0 }; offsets[pre_size]];
        for (dest, sources) in pre_index.iter().enumerate() {
            for (edge, &pre) in sources.iter().enumerate() {
                entries[cursor[pre]] = EdgeRef { dest, edge };
                cursor[pre] += 1;
            }
        }

        let mut post_local = vec![None; post_size];
        for (i, &post) in post_index.iter().enumerate() {
            post_local[post] = Some(i);
        }

        Self {
            offsets,
            entries,
            post_local,
        }
    }

    /// Edges driven by source `pre`. Empty for sources without edges.
    pub fn lookup(&self, pre: usize) -> &[EdgeRef] {
        match (self.offsets.get(pre), self.offsets.get(pre + 1)) {
            (Some(&start), Some(&end)) => &self.entries[start..end],
            _ => &[],
        }
    }

    /// Local index of a global destination, if it has incoming edges here
    pub fn local_of(&self, post: usize) -> Option<usize> {
        self.post_local.get(post).copied().flatten()
    }

    /// Global destination -> local index, `-1` where absent
    pub fn active_to_global_destination(&self) -> Vec<i64> {
        self.post_local
            .iter()
            .map(|slot| slot.map_or(-1, |i| i as i64))
            .collect()
    }

    /// Number of sources covered
    pub fn source_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Total number of edges across all buckets
    pub fn edge_count(&self) -> usize {
        self.entries.len()
    }

    /// Out-degree of one source
    pub fn out_degree(&self, pre: usize) -> usize {
        self.lookup(pre).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_to_all_buckets() {
        let post_index = vec![0, 1, 2];
        let pre_index = vec![vec![0, 1], vec![0, 1], vec![0, 1]];
        let inv = InverseIndex::build(2, 3, &post_index, &pre_index);

        let expected: Vec<EdgeRef> = (0..3).map(|dest| EdgeRef { dest, edge: 0 }).collect();
        assert_eq!(inv.lookup(0), expected.as_slice());
        let expected: Vec<EdgeRef> = (0..3).map(|dest| EdgeRef { dest, edge: 1 }).collect();
        assert_eq!(inv.lookup(1), expected.as_slice());
        assert_eq!(inv.edge_count(), 6);
    }

    #[test]
    fn test_lookup_miss_is_empty() {
        let inv = InverseIndex::build(4, 2, &[0, 1], &[vec![2], vec![2, 3]]);
        assert!(inv.lookup(0).is_empty());
        assert!(inv.lookup(1).is_empty());
        assert!(inv.lookup(17).is_empty());
        assert_eq!(inv.out_degree(2), 2);
        assert_eq!(inv.source_count(), 4);
    }

    #[test]
    fn test_subset_destinations() {
        let inv = InverseIndex::build(3, 5, &[4, 1], &[vec![0], vec![0, 2]]);
        assert_eq!(inv.local_of(4), Some(0));
        assert_eq!(inv.local_of(1), Some(1));
        assert_eq!(inv.local_of(0), None);
        assert_eq!(inv.local_of(99), None);
        assert_eq!(inv.active_to_global_destination(), vec![-1, 1, -1, -1, 0]);
        assert_eq!(
            inv.lookup(0),
            &[EdgeRef { dest: 0, edge: 0 }, EdgeRef { dest: 1, edge: 0 }]
        );
        assert_eq!(inv.lookup(2), &[EdgeRef { dest: 1, edge: 1 }]);
    }

    #[test]
    fn test_empty() {
        let inv = InverseIndex::build(0, 0, &[], &[]);
        assert_eq!(inv.edge_count(), 0);
        assert!(inv.lookup(0).is_empty());
        assert!(InverseIndex::default().lookup(0).is_empty());
    }
}
