use thiserror::Error;

#[derive(Debug, Error)]
pub enum TidemarkError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("upstream error: {0}")]
    Upstream(String),
}

pub type TidemarkResult<T> = Result<T, TidemarkError>;
