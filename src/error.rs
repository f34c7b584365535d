use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    /// Model and dataset disagree, or an enumeration name is not recognized.
    #[error("configuration mismatch: {0}")]
    ConfigurationMismatch(String),
    /// A division by a (near) zero quantity was about to happen.
    #[error("degenerate numeric: {0}")]
    DegenerateNumeric(String),
    #[error("parameters norm {norm} is greater than or equal to the error threshold {limit}")]
    Divergence { norm: f64, limit: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;
