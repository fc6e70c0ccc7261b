//! Error types for DistSheet

use thiserror::Error;

/// DistSheet error type
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown character while tokenizing a formula
    #[error("Lex error: {0}")]
    Lex(String),

    /// Unexpected or missing token, invalid range
    #[error("Parse error: {0}")]
    Parse(String),

    /// Function name not in the dispatch table
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments to a function
    #[error("Arity error: {0}")]
    Arity(String),

    /// Domain violation: scalar required, parameter out of range, division by zero
    #[error("Argument error: {0}")]
    Argument(String),

    /// Structural validation error (persistence, configuration)
    #[error("Validation error: {0}")]
    Validation(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
