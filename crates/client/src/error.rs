//! Error types for the Beacon client crate.

use thiserror::Error;

/// Top-level error type for all Beacon client operations.
///
/// Only [`ClientError::InvalidSettings`] is part of the construction
/// contract; everything else flows inside the delivery path (where it is
/// absorbed and logged) or inside the load-test config loader.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience Result alias that defaults to [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;
