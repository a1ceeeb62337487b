#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Permutation tests of group significance over many features at once.
//!
//! Rows of the feature matrix are features and columns are samples. The engines in
//! [`engine`] compute every feature's statistic under every permuted labelling with
//! a few dense matrix products; [`naive`] recomputes the same statistics one feature
//! and one draw at a time.

pub mod config;
pub mod design;
pub mod engine;
pub mod naive;
pub mod pvalue;
pub mod types;

pub use config::{ConfigError, PermutationConfig, PermutationTest};
pub use design::{
    Encoding, PermutationMatrix, ShuffleMode, block_summation_matrix, build_permutation_matrix,
    encode_assignments, label_permutations, permute_values,
};
pub use engine::{
    TestStatistic, f_permutation_test, mean_permutation_test, permutation_test,
    statistic_from_matrix, summarize, welch_permutation_test,
};
pub use naive::{naive_observed_statistics, naive_permutation_test};
pub use pvalue::{count_at_least, tail_probability};
pub use types::{
    BlockValue, Degeneracy, FeatureMatrix, LabelVector, PermutationError, TestOutcome,
};
