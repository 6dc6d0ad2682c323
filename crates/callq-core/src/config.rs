//! Module: config
//! Responsibility: compile-time limits and optimizer toggles.
//! Does not own: locating or reading configuration files.
//! Boundary: the enclosing service hands a parsed `CompileConfig` to the compiler.

use crate::{DEFAULT_DATETIME_MARGIN_SECS, DEFAULT_MAX_ARRAY_FILTER_LEN, DEFAULT_MAX_OBJECT_REF_CTES};
use serde::Deserialize;
use thiserror::Error as ThisError;

///
/// CompileConfig
///
/// Immutable knobs consulted by validation and the optimization passes.
/// Every field has a default so partial TOML documents are accepted.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CompileConfig {
    /// Maximum values in one hardcoded array filter (ids, refs, op names).
    pub max_array_filter_len: usize,

    /// Maximum object-reference CTEs one query may generate.
    pub max_object_ref_ctes: usize,

    /// Sort-key pruning margin applied to epoch datetime literals.
    pub datetime_margin_secs: i64,

    /// Emit `LIKE` pre-filters ahead of JSON extraction.
    pub like_prefilter: bool,

    /// Emit `sortable_datetime` pre-filters for epoch comparisons.
    pub datetime_prefilter: bool,

    /// Prefix for generated parameter names.
    pub param_prefix: String,
}

impl CompileConfig {
    /// Parse a TOML document, falling back to defaults for missing keys.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })?;
        config.check()?;

        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.max_array_filter_len == 0 {
            return Err(ConfigError::ZeroLimit {
                key: "max_array_filter_len",
            });
        }
        if self.datetime_margin_secs < 0 {
            return Err(ConfigError::NegativeMargin {
                value: self.datetime_margin_secs,
            });
        }
        if self.param_prefix.is_empty()
            || !self
                .param_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidParamPrefix {
                prefix: self.param_prefix.clone(),
            });
        }

        Ok(())
    }
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            max_array_filter_len: DEFAULT_MAX_ARRAY_FILTER_LEN,
            max_object_ref_ctes: DEFAULT_MAX_OBJECT_REF_CTES,
            datetime_margin_secs: DEFAULT_DATETIME_MARGIN_SECS,
            like_prefilter: true,
            datetime_prefilter: true,
            param_prefix: "pb".to_string(),
        }
    }
}

///
/// ConfigError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ConfigError {
    #[error("invalid compile config: {message}")]
    Parse { message: String },

    #[error("compile config key '{key}' must be greater than zero")]
    ZeroLimit { key: &'static str },

    #[error("datetime margin must not be negative (got {value})")]
    NegativeMargin { value: i64 },

    #[error("parameter prefix '{prefix}' must be non-empty ASCII alphanumeric")]
    InvalidParamPrefix { prefix: String },
}
