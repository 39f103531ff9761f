// ABOUTME: Application-wide error types for easydep.
// ABOUTME: Uses thiserror for ergonomic error handling.

use thiserror::Error;

use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("release source error: {0}")]
    Source(#[from] SourceError),
}

pub type Result<T> = std::result::Result<T, Error>;
