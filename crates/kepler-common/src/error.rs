//! Error types shared across Kepler crates

use thiserror::Error;

/// Result type alias for Kepler operations
pub type Result<T> = std::result::Result<T, KeplerError>;

/// Errors that are not specific to a single crate
#[derive(Error, Debug)]
pub enum KeplerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid access level: '{0}'. Expected Public or Restricted")]
    InvalidAccessLevel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Render an error together with its whole `source()` chain.
///
/// Jobs store this string as their diagnostic, so nothing below the
/// outermost error is lost when a failure is recorded.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
