//! Loop-based reference implementation.
//!
//! Each feature is tested on its own: the labels are reshuffled from scratch for
//! every draw and the statistic is recomputed from explicitly extracted groups.
//! It is slow, and exists to check the vectorized engines against textbook formulas.

use crate::engine::{ROUNDOFF, TestStatistic, summarize};
use crate::types::{
    BlockValue, Degeneracy, FeatureMatrix, LabelVector, PermutationError, TestOutcome,
};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::seq::SliceRandom;
use statrs::statistics::Statistics;

/// Naive permutation test; each draw is an independent shuffle of the original labels.
pub fn naive_permutation_test<R: Rng + ?Sized>(
    statistic: TestStatistic,
    features: &FeatureMatrix<'_>,
    labels: &LabelVector,
    permutations: usize,
    rng: &mut R,
) -> Result<TestOutcome, PermutationError> {
    features.check_labels(labels)?;
    statistic.validate_labels(labels)?;
    let k = labels.num_categories();

    let mut table = Array2::from_elem(
        (features.num_features(), permutations + 1),
        BlockValue::Degenerate(Degeneracy::ZeroVariance),
    );
    let mut shuffled = labels.as_slice().to_vec();
    for (feature, mut row) in table.rows_mut().into_iter().enumerate() {
        let values = features.row(feature).to_vec();
        row[0] = naive_statistic(statistic, &values, labels.as_slice(), k);
        for draw in 1..=permutations {
            shuffled.copy_from_slice(labels.as_slice());
            shuffled.shuffle(rng);
            row[draw] = naive_statistic(statistic, &values, &shuffled, k);
        }
    }
    summarize(&table)
}

/// Statistics of every feature under the true labels, computed directly.
pub fn naive_observed_statistics(
    statistic: TestStatistic,
    features: &FeatureMatrix<'_>,
    labels: &LabelVector,
) -> Result<Array1<f64>, PermutationError> {
    features.check_labels(labels)?;
    statistic.validate_labels(labels)?;
    let k = labels.num_categories();
    let table = Array2::from_shape_fn((features.num_features(), 1), |(feature, _)| {
        let values = features.row(feature).to_vec();
        naive_statistic(statistic, &values, labels.as_slice(), k)
    });
    Ok(summarize(&table)?.statistics)
}

/// One statistic for one feature under one labelling.
pub fn naive_statistic(
    statistic: TestStatistic,
    values: &[f64],
    labels: &[usize],
    num_categories: usize,
) -> BlockValue {
    let mut groups: Vec<Vec<f64>> = vec![Vec::new(); num_categories];
    for (&value, &label) in values.iter().zip(labels) {
        groups[label].push(value);
    }
    if let Some(category) = groups.iter().position(|g| g.is_empty()) {
        return BlockValue::Degenerate(Degeneracy::EmptyCategory { category });
    }

    match statistic {
        TestStatistic::MeanDifference => {
            BlockValue::Defined((groups[0].iter().mean() - groups[1].iter().mean()).abs())
        }
        TestStatistic::WelchT => welch_t(&groups[0], &groups[1]),
        TestStatistic::OneWayF => one_way_f(&groups),
    }
}

fn welch_t(g0: &[f64], g1: &[f64]) -> BlockValue {
    for (category, group) in [g0, g1].into_iter().enumerate() {
        if group.len() == 1 {
            return BlockValue::Degenerate(Degeneracy::SingletonCategory { category });
        }
    }
    let (n0, n1) = (g0.len() as f64, g1.len() as f64);
    let denom = (g0.iter().variance() / n0 + g1.iter().variance() / n1).sqrt();
    if denom == 0.0 {
        return BlockValue::Degenerate(Degeneracy::ZeroVariance);
    }
    BlockValue::Defined((g1.iter().mean() - g0.iter().mean()).abs() / denom)
}

fn one_way_f(groups: &[Vec<f64>]) -> BlockValue {
    let k = groups.len();
    let n: usize = groups.iter().map(Vec::len).sum();
    if n <= k {
        return BlockValue::Degenerate(Degeneracy::NoErrorDegreesOfFreedom);
    }
    let grand_mean = groups.iter().flatten().mean();
    let total: f64 = groups
        .iter()
        .flatten()
        .map(|x| (x - grand_mean).powi(2))
        .sum();

    let mut between = 0.0;
    let mut within = 0.0;
    for group in groups {
        let mean = group.iter().mean();
        between += group.len() as f64 * (mean - grand_mean).powi(2);
        within += group.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
    }
    if within <= ROUNDOFF * total {
        return BlockValue::Degenerate(Degeneracy::ZeroVariance);
    }
    let dftrt = (k - 1) as f64;
    let dferr = (n - k) as f64;
    BlockValue::Defined((between / dftrt) / (within / dferr))
}
