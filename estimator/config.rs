//! # Estimator Configuration
//!
//! Everything the framework needs to know to construct a mode and run the
//! estimator, persisted as TOML. Missing keys take their defaults, so a
//! minimal file only names what differs.

use crate::contract::ContractError;
use crate::estimate::EstimationOptions;
use crate::minimize::MinimizerConfig;
use crate::modes::{AdditiveQuantile, MultiplicativeQuantile, QuantileMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    MultiplicativeQuantile,
    AdditiveQuantile,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub mode: ModeKind,
    pub quantile: f64,
    /// Neutral factor in link space. A bin without samples receives its
    /// natural value, clamped away from zero before linking; the default 0
    /// therefore lands on ln(ε) under the log link and ε under the identity.
    pub neutral_factor_link: f64,
    pub parallel: bool,
    pub minimizer: MinimizerConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            mode: ModeKind::MultiplicativeQuantile,
            quantile: 0.5,
            neutral_factor_link: 0.0,
            parallel: false,
            minimizer: MinimizerConfig::default(),
        }
    }
}

impl EstimatorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Saves the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_string = self.to_toml_string()?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        Self::from_toml_str(&toml_string)
    }

    /// Constructs the configured mode, validating quantile and neutral factor.
    pub fn build_mode(&self) -> Result<QuantileMode, ContractError> {
        let mode = match self.mode {
            ModeKind::MultiplicativeQuantile => QuantileMode::Multiplicative(
                MultiplicativeQuantile::with_neutral_factor_link(
                    self.quantile,
                    self.neutral_factor_link,
                )?,
            ),
            ModeKind::AdditiveQuantile => QuantileMode::Additive(
                AdditiveQuantile::with_neutral_factor_link(self.quantile, self.neutral_factor_link)?,
            ),
        };
        log::debug!("Configured {:?} at quantile {}", self.mode, self.quantile);
        Ok(mode)
    }

    pub fn estimation_options(&self) -> EstimationOptions {
        EstimationOptions {
            minimizer: self.minimizer,
            parallel: self.parallel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::LossContract;
    use crate::link::LinkFunction;
    use crate::minimize::MinimizerMethod;
    use tempfile::tempdir;

    #[test]
    fn empty_document_gives_defaults() {
        let config = EstimatorConfig::from_toml_str("").unwrap();
        assert_eq!(config, EstimatorConfig::default());
        assert_eq!(config.minimizer.method, MinimizerMethod::NelderMead);
        assert_eq!(config.minimizer.max_iterations, 1000);
    }

    #[test]
    fn partial_document_overrides_named_keys() {
        let config = EstimatorConfig::from_toml_str(
            r#"
            mode = "additive_quantile"
            quantile = 0.9
            parallel = true

            [minimizer]
            method = "bfgs"
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, ModeKind::AdditiveQuantile);
        assert_eq!(config.quantile, 0.9);
        assert!(config.parallel);
        assert_eq!(config.neutral_factor_link, 0.0);
        assert_eq!(config.minimizer.method, MinimizerMethod::Bfgs);
        assert_eq!(config.minimizer.tolerance, 1e-10);

        let options = config.estimation_options();
        assert!(options.parallel);
        assert_eq!(options.minimizer, config.minimizer);
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let err = EstimatorConfig::from_toml_str("mode = \"poisson\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError(_)));
    }

    #[test]
    fn save_and_load_preserve_the_configuration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("estimator.toml");
        let config = EstimatorConfig {
            mode: ModeKind::AdditiveQuantile,
            quantile: 0.25,
            neutral_factor_link: -1.5,
            parallel: true,
            minimizer: MinimizerConfig {
                method: MinimizerMethod::Bfgs,
                max_iterations: 50,
                tolerance: 1e-6,
                param_tolerance: 1e-8,
            },
        };
        config.save(&path).unwrap();
        let loaded = EstimatorConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = EstimatorConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn build_mode_honours_kind_and_settings() {
        let config = EstimatorConfig {
            neutral_factor_link: 0.3,
            ..EstimatorConfig::default()
        };
        let mode = config.build_mode().unwrap();
        assert_eq!(mode.link(), LinkFunction::Log);
        assert!((mode.neutral_factor() - 0.3_f64.exp()).abs() < 1e-12);

        let config = EstimatorConfig {
            mode: ModeKind::AdditiveQuantile,
            quantile: 0.75,
            ..EstimatorConfig::default()
        };
        let mode = config.build_mode().unwrap();
        assert_eq!(mode.link(), LinkFunction::Identity);
        assert_eq!(mode.quantile(), 0.75);

        let config = EstimatorConfig {
            quantile: -0.1,
            ..EstimatorConfig::default()
        };
        assert_eq!(
            config.build_mode().unwrap_err(),
            ContractError::InvalidQuantile(-0.1)
        );
    }
}
