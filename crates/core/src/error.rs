//! Error types shared by every sweep-trader crate.

use thiserror::Error;

/// Result alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared across the workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// A config value failed validation.
    #[error("invalid config: {0}")]
    Config(String),

    /// Malformed bars or inconsistent market data.
    #[error("bad data: {0}")]
    Data(String),

    /// Bar source failure.
    #[error("feed failure: {0}")]
    Feed(String),

    /// Reading bars or config from disk.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Event or summary serialization.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed TOML config.
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    pub fn feed(msg: impl Into<String>) -> Self {
        Error::Feed(msg.into())
    }
}
