use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("degenerate alignment: {0}")]
    DegenerateAlignment(String),
    #[error("periodic geometry error: {0}")]
    PeriodicGeometry(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type ForceResult<T> = Result<T, ForceError>;
