//! Common error types for FBQ

use thiserror::Error;

/// Common result type for FBQ operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across FBQ crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
