//! Vectorized permutation statistics.
//!
//! Every variant reduces `features × permutation matrix` to an `features × blocks`
//! table of [`BlockValue`]s with a handful of dense products. [`summarize`] then turns
//! that table into observed statistics and p-values under one shared policy.

pub mod anova;
pub mod mean;
pub mod welch;

use crate::design::{Encoding, PermutationMatrix, ShuffleMode, build_permutation_matrix};
use crate::pvalue::tail_probability;
use crate::types::{BlockValue, FeatureMatrix, LabelVector, PermutationError, TestOutcome};
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use rand::Rng;

/// Relative tolerance under which a variance-like quantity is treated as exactly zero.
pub(crate) const ROUNDOFF: f64 = 64.0 * f64::EPSILON;

/// The closed set of supported group statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatistic {
    /// `|mean_1 − mean_0|`, two categories.
    MeanDifference,
    /// Welch's unequal-variance t, two categories.
    WelchT,
    /// One-way ANOVA F, any K ≥ 2.
    OneWayF,
}

impl TestStatistic {
    pub fn name(self) -> &'static str {
        match self {
            TestStatistic::MeanDifference => "mean difference",
            TestStatistic::WelchT => "Welch t",
            TestStatistic::OneWayF => "one-way F",
        }
    }

    /// The column encoding this statistic's reduction expects.
    pub fn encoding(self) -> Encoding {
        match self {
            TestStatistic::MeanDifference => Encoding::Reciprocal,
            TestStatistic::WelchT | TestStatistic::OneWayF => Encoding::Indicator,
        }
    }

    pub fn validate_labels(self, labels: &LabelVector) -> Result<(), PermutationError> {
        match self {
            TestStatistic::MeanDifference | TestStatistic::WelchT => labels.require_binary(),
            TestStatistic::OneWayF => Ok(()),
        }
    }

    /// Reduces every feature under every block to its statistic.
    pub fn block_statistics(
        self,
        features: &FeatureMatrix<'_>,
        perms: &PermutationMatrix,
    ) -> Result<Array2<BlockValue>, PermutationError> {
        check_compatible(self, features, perms)?;
        log::debug!(
            "Reducing {} features over {} blocks with the {} statistic",
            features.num_features(),
            perms.num_blocks(),
            self.name()
        );
        match self {
            TestStatistic::MeanDifference => mean::block_statistics(features, perms),
            TestStatistic::WelchT => welch::block_statistics(features, perms),
            TestStatistic::OneWayF => anova::block_statistics(features, perms),
        }
    }
}

fn check_compatible(
    statistic: TestStatistic,
    features: &FeatureMatrix<'_>,
    perms: &PermutationMatrix,
) -> Result<(), PermutationError> {
    if perms.num_samples() != features.num_samples() {
        return Err(PermutationError::InvalidInput(format!(
            "permutation matrix covers {} samples but the feature matrix has {}",
            perms.num_samples(),
            features.num_samples()
        )));
    }
    if perms.encoding() != statistic.encoding() {
        return Err(PermutationError::InvalidInput(format!(
            "the {} statistic needs a {:?} permutation matrix, got {:?}",
            statistic.name(),
            statistic.encoding(),
            perms.encoding()
        )));
    }
    let binary = matches!(
        statistic,
        TestStatistic::MeanDifference | TestStatistic::WelchT
    );
    if binary && perms.num_categories() != 2 {
        return Err(PermutationError::InvalidInput(format!(
            "the {} statistic compares exactly 2 categories, the permutation matrix has {}",
            statistic.name(),
            perms.num_categories()
        )));
    }
    if perms.num_categories() < 2 {
        return Err(PermutationError::InvalidInput(
            "at least 2 categories are required".to_string(),
        ));
    }
    Ok(())
}

/// Runs a full permutation test: draws the matrix, reduces it, and summarizes.
pub fn permutation_test<R: Rng + ?Sized>(
    statistic: TestStatistic,
    features: &FeatureMatrix<'_>,
    labels: &LabelVector,
    permutations: usize,
    shuffle: ShuffleMode,
    rng: &mut R,
) -> Result<TestOutcome, PermutationError> {
    features.check_labels(labels)?;
    statistic.validate_labels(labels)?;
    let perms =
        build_permutation_matrix(labels, permutations, statistic.encoding(), shuffle, rng)?;
    statistic_from_matrix(statistic, features, &perms)
}

/// Runs a statistic against a caller-built permutation matrix.
pub fn statistic_from_matrix(
    statistic: TestStatistic,
    features: &FeatureMatrix<'_>,
    perms: &PermutationMatrix,
) -> Result<TestOutcome, PermutationError> {
    let values = statistic.block_statistics(features, perms)?;
    summarize(&values)
}

pub fn mean_permutation_test<R: Rng + ?Sized>(
    features: &FeatureMatrix<'_>,
    labels: &LabelVector,
    permutations: usize,
    rng: &mut R,
) -> Result<TestOutcome, PermutationError> {
    permutation_test(
        TestStatistic::MeanDifference,
        features,
        labels,
        permutations,
        ShuffleMode::default(),
        rng,
    )
}

pub fn welch_permutation_test<R: Rng + ?Sized>(
    features: &FeatureMatrix<'_>,
    labels: &LabelVector,
    permutations: usize,
    rng: &mut R,
) -> Result<TestOutcome, PermutationError> {
    permutation_test(
        TestStatistic::WelchT,
        features,
        labels,
        permutations,
        ShuffleMode::default(),
        rng,
    )
}

pub fn f_permutation_test<R: Rng + ?Sized>(
    features: &FeatureMatrix<'_>,
    labels: &LabelVector,
    permutations: usize,
    rng: &mut R,
) -> Result<TestOutcome, PermutationError> {
    permutation_test(
        TestStatistic::OneWayF,
        features,
        labels,
        permutations,
        ShuffleMode::default(),
        rng,
    )
}

/// Collapses a `features × blocks` table into observed statistics and p-values.
///
/// Block 0 must be defined for every feature, otherwise the whole call fails.
/// Degenerate permuted blocks are dropped from both the tail count and the
/// denominator of that feature's p-value.
pub fn summarize(values: &Array2<BlockValue>) -> Result<TestOutcome, PermutationError> {
    let (num_features, num_blocks) = values.dim();
    if num_blocks == 0 {
        return Err(PermutationError::InvalidInput(
            "block table has no identity block".to_string(),
        ));
    }
    let permutations = num_blocks - 1;

    let mut statistics = Array1::<f64>::zeros(num_features);
    let mut pvalues = Array1::<f64>::zeros(num_features);
    let mut excluded_blocks = Array1::<usize>::zeros(num_features);
    let mut permuted = Vec::with_capacity(permutations);

    for (feature, row) in values.axis_iter(Axis(0)).enumerate() {
        let observed = match row[0] {
            BlockValue::Defined(v) => v,
            BlockValue::Degenerate(reason) => {
                return Err(PermutationError::DegenerateBlock {
                    feature,
                    block: 0,
                    reason,
                });
            }
        };
        permuted.clear();
        permuted.extend(row.iter().skip(1).filter_map(|v| v.defined()));

        statistics[feature] = observed;
        pvalues[feature] = tail_probability(observed, &permuted);
        excluded_blocks[feature] = permutations - permuted.len();
    }

    let affected = excluded_blocks.iter().filter(|&&e| e > 0).count();
    if affected > 0 {
        log::warn!(
            "{} of {} features had degenerate permutation blocks ({} blocks excluded in total)",
            affected,
            num_features,
            excluded_blocks.sum()
        );
    }

    Ok(TestOutcome {
        statistics,
        pvalues,
        excluded_blocks,
        permutations,
    })
}

/// Copy of the feature matrix with each row shifted to mean zero.
///
/// Every statistic here is shift-invariant per feature, and centering keeps the
/// `Σx² − (Σx)²/n` style formulas away from catastrophic cancellation.
pub(crate) fn centered(features: &FeatureMatrix<'_>) -> Array2<f64> {
    let view = features.view();
    let n = view.ncols() as f64;
    let means = view.sum_axis(Axis(1)) / n;
    &view - &means.insert_axis(Axis(1))
}

/// Per-block, per-category sums and sums of squares: `X·M` and `(X∘X)·M`.
pub(crate) struct GroupMoments {
    pub sums: Array2<f64>,
    pub sums_sq: Array2<f64>,
}

pub(crate) fn group_moments(
    values: &Array2<f64>,
    perms: ArrayView2<'_, f64>,
) -> Result<GroupMoments, PermutationError> {
    let squares = values.mapv(|v| v * v);
    let sums = values.dot(&perms);
    let sums_sq = squares.dot(&perms);
    ensure_finite(&sums, "group sums")?;
    ensure_finite(&sums_sq, "group sums of squares")?;
    Ok(GroupMoments { sums, sums_sq })
}

/// Fails with [`PermutationError::NumericOverflow`] on the first row holding a non-finite value.
pub(crate) fn ensure_finite(
    values: &Array2<f64>,
    stage: &'static str,
) -> Result<(), PermutationError> {
    for (feature, row) in values.axis_iter(Axis(0)).enumerate() {
        if row.iter().any(|v| !v.is_finite()) {
            return Err(PermutationError::NumericOverflow { feature, stage });
        }
    }
    Ok(())
}

/// Clamps round-off negatives of `a − b` style differences to zero, relative to `scale`.
pub(crate) fn clamp_roundoff(values: &mut Array2<f64>, scale: &Array2<f64>) {
    Zip::from(values).and(scale).for_each(|v, &s| {
        if *v <= ROUNDOFF * s.abs() {
            *v = 0.0;
        }
    });
}
