// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use std::fmt;
use thiserror::Error;

/// The single error taxonomy shared by the builder, the engines and the naive oracle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PermutationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Permutation block {block} of feature {feature} has an undefined statistic: {reason}.")]
    DegenerateBlock {
        feature: usize,
        block: usize,
        reason: Degeneracy,
    },

    #[error(
        "Numeric overflow while computing {stage} for feature {feature}; the values exceed f64 precision."
    )]
    NumericOverflow { feature: usize, stage: &'static str },
}

/// Why a single permutation block could not produce a statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    /// A category received no samples in this block.
    EmptyCategory { category: usize },
    /// A category received a single sample, so its sample variance is undefined.
    SingletonCategory { category: usize },
    /// The denominator of the statistic (pooled or within-group variance) is zero.
    ZeroVariance,
    /// Every sample sits in its own category, leaving no error degrees of freedom.
    NoErrorDegreesOfFreedom,
}

impl fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degeneracy::EmptyCategory { category } => {
                write!(f, "category {category} has no members")
            }
            Degeneracy::SingletonCategory { category } => {
                write!(f, "category {category} has a single member")
            }
            Degeneracy::ZeroVariance => write!(f, "zero within-group variance"),
            Degeneracy::NoErrorDegreesOfFreedom => write!(f, "zero error degrees of freedom"),
        }
    }
}

/// The statistic of one feature under one block's label assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockValue {
    Defined(f64),
    Degenerate(Degeneracy),
}

impl BlockValue {
    #[inline]
    pub fn defined(self) -> Option<f64> {
        match self {
            BlockValue::Defined(v) => Some(v),
            BlockValue::Degenerate(_) => None,
        }
    }
}

/// A read-only, validated view of the feature table.
///
/// Rows are features and columns are samples. Every entry is finite.
#[derive(Debug, Clone, Copy)]
pub struct FeatureMatrix<'a> {
    values: ArrayView2<'a, f64>,
}

impl<'a> FeatureMatrix<'a> {
    pub fn new(values: ArrayView2<'a, f64>) -> Result<Self, PermutationError> {
        if values.nrows() == 0 || values.ncols() == 0 {
            return Err(PermutationError::InvalidInput(format!(
                "feature matrix must be non-empty, got shape {}x{}",
                values.nrows(),
                values.ncols()
            )));
        }
        if let Some(((row, col), v)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(PermutationError::InvalidInput(format!(
                "feature matrix entry ({row}, {col}) is not finite: {v}"
            )));
        }
        Ok(Self { values })
    }

    #[inline]
    pub fn num_features(&self) -> usize {
        self.values.nrows()
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.values.ncols()
    }

    #[inline]
    pub fn view(&self) -> ArrayView2<'a, f64> {
        self.values
    }

    #[inline]
    pub fn row(&self, feature: usize) -> ArrayView1<'a, f64> {
        self.values.index_axis_move(Axis(0), feature)
    }

    /// Checks that the label vector has exactly one entry per sample column.
    pub fn check_labels(&self, labels: &LabelVector) -> Result<(), PermutationError> {
        if labels.len() != self.num_samples() {
            return Err(PermutationError::InvalidInput(format!(
                "feature matrix has {} samples but the label vector has {} entries",
                self.num_samples(),
                labels.len()
            )));
        }
        Ok(())
    }
}

/// Category assignment of every sample, with ids densely packed in `[0, K)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVector {
    labels: Vec<usize>,
    num_categories: usize,
}

impl LabelVector {
    pub fn new(labels: Vec<usize>) -> Result<Self, PermutationError> {
        if labels.is_empty() {
            return Err(PermutationError::InvalidInput(
                "label vector must be non-empty".to_string(),
            ));
        }
        // K never exceeds the sample count, so larger ids cannot be dense.
        if let Some(&bad) = labels.iter().find(|&&l| l >= labels.len()) {
            return Err(PermutationError::InvalidInput(format!(
                "label {bad} is outside [0, {}); category ids must be contiguous from 0",
                labels.len()
            )));
        }
        let mut seen = vec![false; labels.len()];
        for &label in &labels {
            seen[label] = true;
        }
        let num_categories = seen.iter().filter(|&&s| s).count();
        if let Some(&bad) = labels.iter().find(|&&l| l >= num_categories) {
            return Err(PermutationError::InvalidInput(format!(
                "label {bad} is outside [0, {num_categories}); category ids must be contiguous from 0"
            )));
        }
        if num_categories < 2 {
            return Err(PermutationError::InvalidInput(format!(
                "at least 2 distinct categories are required, found {num_categories}"
            )));
        }
        Ok(Self {
            labels,
            num_categories,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn num_categories(&self) -> usize {
        self.num_categories
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.labels
    }

    /// Number of samples in each category.
    pub fn group_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.num_categories];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    pub fn require_binary(&self) -> Result<(), PermutationError> {
        if self.num_categories != 2 {
            return Err(PermutationError::InvalidInput(format!(
                "this statistic compares exactly 2 categories, found {}",
                self.num_categories
            )));
        }
        Ok(())
    }
}

/// Observed statistics and permutation p-values, one entry per feature row.
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub statistics: Array1<f64>,
    pub pvalues: Array1<f64>,
    /// Permuted blocks left out of each feature's tail count because they were degenerate.
    pub excluded_blocks: Array1<usize>,
    pub permutations: usize,
}

impl TestOutcome {
    #[inline]
    pub fn num_features(&self) -> usize {
        self.statistics.len()
    }

    /// Applies a multiple-testing correction to the p-value vector.
    ///
    /// The correction itself is supplied by the caller; this only enforces that it
    /// returns one adjusted value per feature, each inside `(0, 1]`.
    pub fn adjust_pvalues<F>(&mut self, correction: F) -> Result<(), PermutationError>
    where
        F: FnOnce(ArrayView1<'_, f64>) -> Array1<f64>,
    {
        let adjusted = correction(self.pvalues.view());
        if adjusted.len() != self.pvalues.len() {
            return Err(PermutationError::InvalidInput(format!(
                "p-value correction returned {} values for {} features",
                adjusted.len(),
                self.pvalues.len()
            )));
        }
        if let Some(bad) = adjusted.iter().find(|p| !(**p > 0.0 && **p <= 1.0)) {
            return Err(PermutationError::InvalidInput(format!(
                "p-value correction produced {bad}, outside (0, 1]"
            )));
        }
        self.pvalues = adjusted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    #[test]
    fn label_vector_counts_categories() {
        let labels = LabelVector::new(vec![0, 2, 1, 2, 0]).unwrap();
        assert_eq!(labels.num_categories(), 3);
        assert_eq!(labels.group_sizes(), vec![2, 1, 2]);
        assert!(labels.require_binary().is_err());
    }

    #[test]
    fn label_vector_rejects_gaps_and_single_category() {
        assert!(matches!(
            LabelVector::new(vec![0, 2, 2]),
            Err(PermutationError::InvalidInput(_))
        ));
        assert!(matches!(
            LabelVector::new(vec![1, 1, 1]),
            Err(PermutationError::InvalidInput(_))
        ));
        assert!(matches!(
            LabelVector::new(vec![0, 0]),
            Err(PermutationError::InvalidInput(_))
        ));
        assert!(LabelVector::new(Vec::new()).is_err());
    }

    #[test]
    fn label_vector_rejects_huge_ids_without_allocating() {
        assert!(matches!(
            LabelVector::new(vec![0, 1, usize::MAX]),
            Err(PermutationError::InvalidInput(_))
        ));
        assert!(matches!(
            LabelVector::new(vec![0, 1, 1 << 40]),
            Err(PermutationError::InvalidInput(_))
        ));
        assert!(matches!(
            LabelVector::new(vec![0, 1, 3]),
            Err(PermutationError::InvalidInput(_))
        ));
    }

    #[test]
    fn feature_matrix_rejects_empty_and_non_finite() {
        let empty = Array2::<f64>::zeros((0, 4));
        assert!(FeatureMatrix::new(empty.view()).is_err());

        let nan = array![[1.0, f64::NAN]];
        assert!(FeatureMatrix::new(nan.view()).is_err());

        let ok = array![[1.0, 2.0, 3.0]];
        let fm = FeatureMatrix::new(ok.view()).unwrap();
        let labels = LabelVector::new(vec![0, 1]).unwrap();
        assert!(fm.check_labels(&labels).is_err());
    }

    #[test]
    fn adjust_pvalues_enforces_length_and_range() {
        let mut outcome = TestOutcome {
            statistics: array![1.0, 2.0],
            pvalues: array![0.2, 0.4],
            excluded_blocks: array![0, 0],
            permutations: 9,
        };
        assert!(outcome.adjust_pvalues(|p| p.to_owned()).is_ok());
        assert!(outcome.adjust_pvalues(|_| array![0.5]).is_err());
        assert!(outcome.adjust_pvalues(|p| p.mapv(|v| v * 10.0)).is_err());

        outcome
            .adjust_pvalues(|p| p.mapv(|v| (v * 2.0).min(1.0)))
            .unwrap();
        assert_eq!(outcome.pvalues, array![0.4, 0.8]);
    }
}
