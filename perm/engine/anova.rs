use super::{GroupMoments, ROUNDOFF, centered, clamp_roundoff, group_moments};
use crate::design::{PermutationMatrix, block_summation_matrix};
use crate::types::{BlockValue, Degeneracy, FeatureMatrix, PermutationError};
use ndarray::{Array2, Axis};

/// One-way ANOVA F for every feature and block.
///
/// The total sum of squares depends only on row totals, so it is computed once.
/// Within-group sums of squares are collapsed per block through the block-summation
/// matrix, and the between-group part follows by subtraction.
pub fn block_statistics(
    features: &FeatureMatrix<'_>,
    perms: &PermutationMatrix,
) -> Result<Array2<BlockValue>, PermutationError> {
    let k = perms.num_categories();
    let num_blocks = perms.num_blocks();
    let values = centered(features);
    let n_samples = values.ncols() as f64;

    let row_sums = values.sum_axis(Axis(1));
    let row_sums_sq = values.mapv(|v| v * v).sum_axis(Axis(1));
    let sstot = &row_sums_sq - &(&row_sums * &row_sums / n_samples);

    let GroupMoments { sums, sums_sq } = group_moments(&values, perms.values())?;
    let tot = perms.values().sum_axis(Axis(0));
    let mut ss = &sums_sq - &(&(&sums * &sums) / &tot.view().insert_axis(Axis(0)));
    clamp_roundoff(&mut ss, &sums_sq);

    let sum_idx = block_summation_matrix(k, num_blocks);
    let sserr = ss.dot(&sum_idx);
    let dftrt = (k - 1) as f64;
    let dferr = tot.dot(&sum_idx) - k as f64;
    log::debug!(
        "ANOVA decomposition: {} categories, {} blocks, {} error degrees of freedom in block 0",
        k,
        num_blocks,
        dferr[0]
    );

    Ok(Array2::from_shape_fn(
        (features.num_features(), num_blocks),
        |(feature, block)| {
            if let Some(category) = (0..k).find(|&c| tot[block * k + c] == 0.0) {
                return BlockValue::Degenerate(Degeneracy::EmptyCategory { category });
            }
            if dferr[block] <= 0.0 {
                return BlockValue::Degenerate(Degeneracy::NoErrorDegreesOfFreedom);
            }
            let within = sserr[[feature, block]];
            if within <= ROUNDOFF * row_sums_sq[feature] {
                return BlockValue::Degenerate(Degeneracy::ZeroVariance);
            }
            let between = (sstot[feature] - within).max(0.0);
            BlockValue::Defined((between / dftrt) / (within / dferr[block]))
        },
    ))
}
