use thiserror::Error;

/// Invalid engine configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be in [0, 1], got {value}")]
    Probability { field: &'static str, value: f64 },

    #[error("{field} must be > 0, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("fault catalog must not be empty")]
    EmptyCatalog,

    #[error("invalid rule pattern: {0}")]
    Pattern(#[from] regex::Error),
}
