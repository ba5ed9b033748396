use csnn_runtime::{build_connectivity, FixedProbability, InverseIndex, SimRng};
use proptest::prelude::*;

proptest! {
    #[test]
    fn inverse_entries_point_back_at_their_source(
        pre_size in 0usize..40,
        post_size in 0usize..40,
        p in 0.0f64..=1.0,
        seed in any::<u64>(),
    ) {
        let pattern = FixedProbability::new(p).unwrap();
        let mut rng = SimRng::new(seed);
        let conn = build_connectivity(&pattern, pre_size, post_size, &mut rng).unwrap();
        let inv = InverseIndex::build(pre_size, post_size, conn.post_index(), conn.pre_index());

        // every bucket entry refers back to its source
        for source in 0..pre_size {
            for edge in inv.lookup(source) {
                prop_assert_eq!(conn.pre_index()[edge.dest][edge.edge], source);
            }
        }

        // every edge appears in exactly one bucket
        prop_assert_eq!(inv.edge_count(), conn.edge_count());
        let total: usize = (0..pre_size).map(|s| inv.out_degree(s)).sum();
        prop_assert_eq!(total, conn.edge_count());
    }

    #[test]
    fn subset_destinations_map_back(
        post_size in 1usize..30,
        mask in proptest::collection::vec(any::<bool>(), 30),
    ) {
        let post_index: Vec<usize> = (0..post_size).filter(|&d| mask[d]).collect();
        let pre_index: Vec<Vec<usize>> = post_index.iter().map(|&d| vec![d % 3]).collect();
        let inv = InverseIndex::build(3, post_size, &post_index, &pre_index);

        let table = inv.active_to_global_destination();
        prop_assert_eq!(table.len(), post_size);
        for (global, &local) in table.iter().enumerate() {
            match post_index.iter().position(|&d| d == global) {
                Some(i) => prop_assert_eq!(local, i as i64),
                None => prop_assert_eq!(local, -1),
            }
        }
    }
}
