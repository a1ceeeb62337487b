use crate::design::ShuffleMode;
use crate::engine::{TestStatistic, permutation_test};
use crate::types::{FeatureMatrix, LabelVector, PermutationError, TestOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Run-level settings shared by every statistic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermutationConfig {
    /// Number of permuted blocks drawn in addition to the identity block.
    pub permutations: usize,
    pub shuffle: ShuffleMode,
    /// Seed for the run's generator; `None` draws one from OS entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            permutations: 1000,
            shuffle: ShuffleMode::Independent,
            seed: None,
        }
    }
}

impl PermutationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = self.to_toml_string()?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Convenience runner that owns seeding for a configured permutation test.
#[derive(Debug, Clone, Default)]
pub struct PermutationTest {
    config: PermutationConfig,
}

impl PermutationTest {
    pub fn new(config: PermutationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PermutationConfig {
        &self.config
    }

    /// Runs `statistic` with a generator seeded from the configuration.
    pub fn run(
        &self,
        statistic: TestStatistic,
        features: &FeatureMatrix<'_>,
        labels: &LabelVector,
    ) -> Result<TestOutcome, PermutationError> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.run_with_rng(statistic, features, labels, &mut rng)
    }

    /// Runs `statistic` drawing permutations from a caller-supplied generator.
    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        statistic: TestStatistic,
        features: &FeatureMatrix<'_>,
        labels: &LabelVector,
        rng: &mut R,
    ) -> Result<TestOutcome, PermutationError> {
        log::info!(
            "Running {} permutation test: {} features, {} samples, {} permutations ({:?} draws)",
            statistic.name(),
            features.num_features(),
            features.num_samples(),
            self.config.permutations,
            self.config.shuffle
        );
        let outcome = permutation_test(
            statistic,
            features,
            labels,
            self.config.permutations,
            self.config.shuffle,
            rng,
        )?;
        log::info!(
            "Finished {} permutation test; smallest p-value {:.4e}",
            statistic.name(),
            outcome.pvalues.iter().copied().fold(f64::INFINITY, f64::min)
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = PermutationConfig::from_toml_str("permutations = 250\n").unwrap();
        assert_eq!(config.permutations, 250);
        assert_eq!(config.shuffle, ShuffleMode::Independent);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn config_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perm.toml");
        let config = PermutationConfig {
            permutations: 99,
            shuffle: ShuffleMode::Chained,
            seed: Some(42),
        };
        config.save(&path).unwrap();
        assert_eq!(PermutationConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            PermutationConfig::from_toml_str("permutations = \"many\""),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let data = array![[0.5, 1.5, 0.7, 2.2, 2.9, 3.3, 1.1, 2.4]];
        let features = FeatureMatrix::new(data.view()).unwrap();
        let labels = LabelVector::new(vec![0, 0, 0, 1, 1, 1, 0, 1]).unwrap();
        let runner = PermutationTest::new(PermutationConfig {
            permutations: 200,
            shuffle: ShuffleMode::Independent,
            seed: Some(2024),
        });
        let first = runner.run(TestStatistic::WelchT, &features, &labels).unwrap();
        let second = runner.run(TestStatistic::WelchT, &features, &labels).unwrap();
        assert_eq!(first, second);
    }
}
