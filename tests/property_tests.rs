//! Property-based tests using proptest.
//!
//! These check invariants that must hold for every valid input: identity-block
//! layout, p-value bounds, and agreement of the vectorized observed statistic with
//! the direct per-feature computation.

use ndarray::Array2;
use permtest::{
    Encoding, FeatureMatrix, LabelVector, PermutationError, ShuffleMode, TestStatistic,
    build_permutation_matrix, naive_observed_statistics, permutation_test,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

const STATISTICS: [TestStatistic; 3] = [
    TestStatistic::MeanDifference,
    TestStatistic::WelchT,
    TestStatistic::OneWayF,
];

/// Binary labels with at least two samples in each group.
fn binary_labels(n: usize, ones: usize) -> LabelVector {
    let labels = (0..n).map(|i| usize::from(i < ones)).collect();
    LabelVector::new(labels).unwrap()
}

fn matrix_strategy() -> impl Strategy<Value = (usize, usize, Vec<f64>)> {
    (1usize..4, 4usize..14).prop_flat_map(|(rows, cols)| {
        (
            Just(rows),
            Just(cols),
            prop::collection::vec(-50.0f64..50.0, rows * cols),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_identity_block_is_one_hot_of_labels(
        raw in prop::collection::vec(0usize..4, 2..30),
        permutations in 0usize..20,
        chained in any::<bool>(),
        seed in 0u64..1000,
    ) {
        let labels = LabelVector::new(raw.clone());
        prop_assume!(labels.is_ok());
        let labels = labels.unwrap();
        let shuffle = if chained { ShuffleMode::Chained } else { ShuffleMode::Independent };
        let mut rng = StdRng::seed_from_u64(seed);

        let perms = build_permutation_matrix(
            &labels, permutations, Encoding::Indicator, shuffle, &mut rng,
        ).unwrap();
        let k = labels.num_categories();
        prop_assert_eq!(perms.values().ncols(), k * (permutations + 1));

        let block0 = perms.block(0);
        for (sample, &label) in raw.iter().enumerate() {
            for category in 0..k {
                let expected = if category == label { 1.0 } else { 0.0 };
                prop_assert_eq!(block0[[sample, category]], expected);
            }
        }
        for block in 0..perms.num_blocks() {
            let sums = perms.block(block).sum_axis(ndarray::Axis(1));
            prop_assert!(sums.iter().all(|&s| s == 1.0));
        }
    }

    #[test]
    fn prop_pvalues_in_unit_interval(
        (rows, cols, values) in matrix_strategy(),
        permutations in 0usize..60,
        seed in 0u64..1000,
    ) {
        let data = Array2::from_shape_vec((rows, cols), values).unwrap();
        let features = FeatureMatrix::new(data.view()).unwrap();
        let labels = binary_labels(cols, cols / 2);
        let mut rng = StdRng::seed_from_u64(seed);

        for statistic in STATISTICS {
            match permutation_test(
                statistic, &features, &labels, permutations, ShuffleMode::Independent, &mut rng,
            ) {
                Ok(outcome) => {
                    prop_assert_eq!(outcome.pvalues.len(), rows);
                    prop_assert!(outcome.pvalues.iter().all(|&p| p > 0.0 && p <= 1.0));
                    prop_assert!(outcome.excluded_blocks.iter().all(|&e| e <= permutations));
                }
                Err(PermutationError::DegenerateBlock { block, .. }) => prop_assert_eq!(block, 0),
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn prop_zero_permutations_give_unit_pvalue(
        (rows, cols, values) in matrix_strategy(),
        seed in 0u64..1000,
    ) {
        let data = Array2::from_shape_vec((rows, cols), values).unwrap();
        let features = FeatureMatrix::new(data.view()).unwrap();
        let labels = binary_labels(cols, 2);
        let mut rng = StdRng::seed_from_u64(seed);

        for statistic in STATISTICS {
            if let Ok(outcome) = permutation_test(
                statistic, &features, &labels, 0, ShuffleMode::Chained, &mut rng,
            ) {
                prop_assert!(outcome.pvalues.iter().all(|&p| p == 1.0));
            }
        }
    }

    #[test]
    fn prop_observed_statistic_matches_direct_formula(
        (rows, cols, values) in matrix_strategy(),
        seed in 0u64..1000,
    ) {
        let data = Array2::from_shape_vec((rows, cols), values).unwrap();
        let features = FeatureMatrix::new(data.view()).unwrap();
        let labels = binary_labels(cols, cols / 2);
        let mut rng = StdRng::seed_from_u64(seed);

        for statistic in STATISTICS {
            let fast = permutation_test(
                statistic, &features, &labels, 5, ShuffleMode::Independent, &mut rng,
            );
            let direct = naive_observed_statistics(statistic, &features, &labels);
            if let (Ok(fast), Ok(direct)) = (fast, direct) {
                for (a, b) in fast.statistics.iter().zip(direct.iter()) {
                    let scale = a.abs().max(b.abs()).max(1.0);
                    prop_assert!((a - b).abs() <= 1e-9 * scale, "{:?}: {} vs {}", statistic, a, b);
                }
            }
        }
    }
}
