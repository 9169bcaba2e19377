//! Common error types for NeoParental

use thiserror::Error;

/// Common result type for NeoParental operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across NeoParental services
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration read, parse or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
