use super::{GroupMoments, centered, clamp_roundoff, group_moments};
use crate::design::PermutationMatrix;
use crate::types::{BlockValue, Degeneracy, FeatureMatrix, PermutationError};
use ndarray::{Array2, Axis};

/// Welch's t for every feature and block, from indicator sums and sums of squares.
pub fn block_statistics(
    features: &FeatureMatrix<'_>,
    perms: &PermutationMatrix,
) -> Result<Array2<BlockValue>, PermutationError> {
    let values = centered(features);
    let GroupMoments { sums, sums_sq } = group_moments(&values, perms.values())?;

    // Group sizes are the column sums of the indicator matrix.
    let n = perms.values().sum_axis(Axis(0)).insert_axis(Axis(0));
    let avgs = &sums / &n;
    let avgs_sq = &sums_sq / &n;
    let mut vars = &avgs_sq - &(&avgs * &avgs);
    clamp_roundoff(&mut vars, &avgs_sq);
    let samp_vars = &(&n * &vars) / &(&n - 1.0);

    let n = n.index_axis(Axis(0), 0);
    Ok(Array2::from_shape_fn(
        (features.num_features(), perms.num_blocks()),
        |(feature, block)| {
            let (c0, c1) = (2 * block, 2 * block + 1);
            for (category, column) in [(0, c0), (1, c1)] {
                if n[column] == 0.0 {
                    return BlockValue::Degenerate(Degeneracy::EmptyCategory { category });
                }
                if n[column] == 1.0 {
                    return BlockValue::Degenerate(Degeneracy::SingletonCategory { category });
                }
            }
            let denom =
                (samp_vars[[feature, c1]] / n[c1] + samp_vars[[feature, c0]] / n[c0]).sqrt();
            if denom == 0.0 {
                return BlockValue::Degenerate(Degeneracy::ZeroVariance);
            }
            BlockValue::Defined((avgs[[feature, c1]] - avgs[[feature, c0]]).abs() / denom)
        },
    ))
}
