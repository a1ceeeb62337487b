use crate::types::{LabelVector, PermutationError};
use ndarray::{Array2, ArrayView2, s};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// How each category column of a block encodes membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// 0/1 membership masks, one column per category.
    Indicator,
    /// Binary only. Membership divided by group size, so `X · M` yields group means directly.
    /// Column `2·block` weights category 1 and column `2·block + 1` weights category 0.
    Reciprocal,
}

/// How successive permutation blocks are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShuffleMode {
    /// Every block is a fresh shuffle of the original labels.
    #[default]
    Independent,
    /// One working copy is shuffled in place between blocks, so each block is
    /// conditioned on the previous one. Reproduces legacy output.
    Chained,
}

/// Encoded label assignments for the identity block followed by `P` permuted blocks.
///
/// Shape is `samples × K·(P+1)`; block `b` occupies columns `b·K .. (b+1)·K`.
#[derive(Debug, Clone, PartialEq)]
pub struct PermutationMatrix {
    values: Array2<f64>,
    /// `(P+1) × K` table of how many samples each category holds in each block.
    group_sizes: Array2<f64>,
    num_categories: usize,
    encoding: Encoding,
}

impl PermutationMatrix {
    #[inline]
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    #[inline]
    pub fn group_sizes(&self) -> ArrayView2<'_, f64> {
        self.group_sizes.view()
    }

    #[inline]
    pub fn num_categories(&self) -> usize {
        self.num_categories
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.values.nrows()
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.group_sizes.nrows()
    }

    /// Number of permuted blocks, excluding the identity block.
    #[inline]
    pub fn num_permutations(&self) -> usize {
        self.num_blocks() - 1
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The `samples × K` slice of columns belonging to one block.
    pub fn block(&self, block: usize) -> ArrayView2<'_, f64> {
        let k = self.num_categories;
        self.values.slice(s![.., block * k..(block + 1) * k])
    }
}

/// Permutes an arbitrary value vector `permutations` times.
///
/// Column 0 is always the untouched input; columns `1..=P` are shuffles drawn
/// according to `shuffle`.
pub fn permute_values<T, R>(
    values: &[T],
    permutations: usize,
    shuffle: ShuffleMode,
    rng: &mut R,
) -> Array2<T>
where
    T: Clone,
    R: Rng + ?Sized,
{
    let n = values.len();
    let mut columns: Vec<T> = Vec::with_capacity(n * (permutations + 1));
    columns.extend_from_slice(values);

    let mut working = values.to_vec();
    for _ in 0..permutations {
        if shuffle == ShuffleMode::Independent {
            working.clone_from_slice(values);
        }
        working.shuffle(rng);
        columns.extend_from_slice(&working);
    }

    Array2::from_shape_fn((n, permutations + 1), |(sample, block)| {
        columns[block * n + sample].clone()
    })
}

/// Draws the raw label assignments, `samples × (P+1)`, column 0 being the true labels.
pub fn label_permutations<R: Rng + ?Sized>(
    labels: &LabelVector,
    permutations: usize,
    shuffle: ShuffleMode,
    rng: &mut R,
) -> Array2<usize> {
    permute_values(labels.as_slice(), permutations, shuffle, rng)
}

/// Builds the encoded permutation matrix consumed by the statistic engines.
pub fn build_permutation_matrix<R: Rng + ?Sized>(
    labels: &LabelVector,
    permutations: usize,
    encoding: Encoding,
    shuffle: ShuffleMode,
    rng: &mut R,
) -> Result<PermutationMatrix, PermutationError> {
    if encoding == Encoding::Reciprocal {
        labels.require_binary()?;
    }
    let assignments = label_permutations(labels, permutations, shuffle, rng);
    let matrix = encode_assignments(&assignments, labels.num_categories(), encoding)?;
    log::debug!(
        "Built {:?} permutation matrix: {} samples x {} columns ({} blocks of {} categories, {:?} draws)",
        encoding,
        matrix.num_samples(),
        matrix.values.ncols(),
        matrix.num_blocks(),
        matrix.num_categories,
        shuffle
    );
    Ok(matrix)
}

/// Encodes explicit per-block assignments (`samples × blocks`) into a permutation matrix.
///
/// Callers that already hold their own assignments, e.g. an exhaustive
/// enumeration of relabelings, can bypass the random draws this way.
pub fn encode_assignments(
    assignments: &Array2<usize>,
    num_categories: usize,
    encoding: Encoding,
) -> Result<PermutationMatrix, PermutationError> {
    let (n, blocks) = assignments.dim();
    let k = num_categories;
    if n == 0 || blocks == 0 {
        return Err(PermutationError::InvalidInput(
            "assignment table must hold at least one sample and one block".to_string(),
        ));
    }
    if encoding == Encoding::Reciprocal && k != 2 {
        return Err(PermutationError::InvalidInput(format!(
            "reciprocal encoding needs exactly 2 categories, got {k}"
        )));
    }
    if let Some(&bad) = assignments.iter().find(|&&label| label >= k) {
        return Err(PermutationError::InvalidInput(format!(
            "assignment {bad} is outside [0, {k})"
        )));
    }
    let mut values = Array2::<f64>::zeros((n, k * blocks));
    let mut group_sizes = Array2::<f64>::zeros((blocks, k));

    for (block, column) in assignments.columns().into_iter().enumerate() {
        for &label in column {
            group_sizes[[block, label]] += 1.0;
        }
        match encoding {
            Encoding::Indicator => {
                for (sample, &label) in column.iter().enumerate() {
                    values[[sample, block * k + label]] = 1.0;
                }
            }
            Encoding::Reciprocal => {
                let ones = group_sizes[[block, 1]];
                let zeros = group_sizes[[block, 0]];
                for (sample, &label) in column.iter().enumerate() {
                    // Empty categories keep an all-zero column; the engine flags them.
                    if label == 1 && ones > 0.0 {
                        values[[sample, 2 * block]] = 1.0 / ones;
                    } else if label == 0 && zeros > 0.0 {
                        values[[sample, 2 * block + 1]] = 1.0 / zeros;
                    }
                }
            }
        }
    }

    Ok(PermutationMatrix {
        values,
        group_sizes,
        num_categories,
        encoding,
    })
}

/// `(K·B) × B` indicator mapping the K category columns of each block to one output column.
pub fn block_summation_matrix(num_categories: usize, num_blocks: usize) -> Array2<f64> {
    Array2::from_shape_fn((num_categories * num_blocks, num_blocks), |(row, col)| {
        if row / num_categories == col { 1.0 } else { 0.0 }
    })
}
