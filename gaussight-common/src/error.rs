use thiserror::Error;

use crate::definition::DefinitionError;

/// Common error type for GaussSight components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid query definition: {0}")]
    Definition(#[from] DefinitionError),
}

/// Result type alias using GaussSight's Error.
pub type Result<T> = std::result::Result<T, Error>;
