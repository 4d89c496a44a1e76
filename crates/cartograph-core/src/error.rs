use thiserror::Error;

/// Top-level error type shared across Cartograph crates.
#[derive(Error, Debug)]
pub enum CartographError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid facts: {0}")]
    InvalidFacts(String),
}

impl From<config::ConfigError> for CartographError {
    fn from(e: config::ConfigError) -> Self {
        CartographError::Config(e.to_string())
    }
}
