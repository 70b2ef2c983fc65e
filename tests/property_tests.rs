#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;
    use deepq::replay_buffer::{ReplayBuffer, Transition};
    use deepq::storage::{flatten, unflatten, Record};
    use ndarray::array;

    // Leaves of a results record
    fn leaf_strategy() -> impl Strategy<Value = Record> {
        prop_oneof![
            (-1e6f64..1e6).prop_map(Record::Scalar),
            any::<bool>().prop_map(Record::Bool),
            prop::collection::vec(-1e6f64..1e6, 0..8).prop_map(Record::Array),
        ]
    }

    // Nested records with non-empty groups
    fn group_strategy() -> impl Strategy<Value = Record> {
        let nested = leaf_strategy().prop_recursive(3, 32, 4, |inner| {
            prop::collection::btree_map("[a-z_]{1,8}", inner, 1..4).prop_map(Record::Group)
        });
        prop::collection::btree_map("[a-z_]{1,8}", nested, 1..5).prop_map(Record::Group)
    }

    proptest! {
        #[test]
        fn test_buffer_keeps_last_pushes(capacity in 1usize..20, pushes in 0usize..60) {
            let mut buffer = ReplayBuffer::new(capacity).unwrap();
            for i in 0..pushes {
                buffer.push(Transition::new(array![i as f32], 0, array![i as f32], 0.0, false));
                prop_assert!(buffer.len() <= capacity);
            }

            let kept: Vec<usize> = buffer.iter().map(|t| t.state[0] as usize).collect();
            let expected: Vec<usize> = (pushes.saturating_sub(capacity)..pushes).collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn test_sample_size_and_distinctness(occupancy in 1usize..40, seed in any::<u64>()) {
            use rand::SeedableRng;
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let mut buffer = ReplayBuffer::new(64).unwrap();
            for i in 0..occupancy {
                buffer.push(Transition::new(array![i as f32], 0, array![i as f32], 0.0, false));
            }
            let k = occupancy / 2 + 1;
            let mut states: Vec<usize> = buffer.sample(k, &mut rng).unwrap().iter().map(|t| t.state[0] as usize).collect();
            states.sort_unstable();
            states.dedup();
            prop_assert_eq!(states.len(), k);
            prop_assert!(buffer.sample(occupancy + 1, &mut rng).is_err());
        }

        #[test]
        fn test_unflatten_inverts_flatten(record in group_strategy()) {
            let leaves = flatten(&record).unwrap();
            prop_assert!(leaves.keys().all(|path| path.starts_with('/')));
            prop_assert_eq!(unflatten(&leaves).unwrap(), record);
        }
    }
}
