use super::ensure_finite;
use crate::design::PermutationMatrix;
use crate::types::{BlockValue, Degeneracy, FeatureMatrix, PermutationError};
use ndarray::Array2;

/// Absolute difference of group means for every feature and block.
///
/// The reciprocal encoding already divides by group size, so a single product
/// `X · M` yields both group means of every block.
pub fn block_statistics(
    features: &FeatureMatrix<'_>,
    perms: &PermutationMatrix,
) -> Result<Array2<BlockValue>, PermutationError> {
    let averages = features.view().dot(&perms.values());
    ensure_finite(&averages, "weighted group means")?;

    let sizes = perms.group_sizes();
    let num_blocks = perms.num_blocks();
    Ok(Array2::from_shape_fn(
        (features.num_features(), num_blocks),
        |(feature, block)| {
            if let Some(category) = (0..2).find(|&c| sizes[[block, c]] == 0.0) {
                return BlockValue::Degenerate(Degeneracy::EmptyCategory { category });
            }
            let ones = averages[[feature, 2 * block]];
            let zeros = averages[[feature, 2 * block + 1]];
            BlockValue::Defined((ones - zeros).abs())
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{Encoding, encode_assignments};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn identity_block_is_plain_mean_difference() {
        let data = array![[1.0, 1.0, 1.0, 2.0, 2.0, 2.0], [4.0, 0.0, 2.0, 7.0, 1.0, 1.0]];
        let features = FeatureMatrix::new(data.view()).unwrap();
        let assignments = array![[0usize], [0], [0], [1], [1], [1]];
        let perms = encode_assignments(&assignments, 2, Encoding::Reciprocal).unwrap();
        let values = block_statistics(&features, &perms).unwrap();
        let first = values[[0, 0]].defined().unwrap();
        assert_abs_diff_eq!(first, 1.0, epsilon = 1e-12);
        let second = values[[1, 0]].defined().unwrap();
        assert_abs_diff_eq!(second, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_category_is_degenerate() {
        let data = array![[1.0, 2.0, 3.0]];
        let features = FeatureMatrix::new(data.view()).unwrap();
        let assignments = array![[0usize, 1], [1, 1], [0, 1]];
        let perms = encode_assignments(&assignments, 2, Encoding::Reciprocal).unwrap();
        let values = block_statistics(&features, &perms).unwrap();
        assert_eq!(values[[0, 0]], BlockValue::Defined(0.0));
        assert_eq!(
            values[[0, 1]],
            BlockValue::Degenerate(Degeneracy::EmptyCategory { category: 0 })
        );
    }
}
