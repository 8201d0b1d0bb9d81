//! Connector error types.

use thiserror::Error;

/// Errors raised by connector handles.
///
/// `Configuration` failures point at the definition and are caught when a
/// job or connector is loaded; the remaining variants are transport
/// problems that surface during a run.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("messaging error: {0}")]
    Messaging(String),

    #[error("database error: {0}")]
    Database(String),
}

impl ConnectorError {
    /// True when the failure is a transport problem that may pass on retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ConnectorError::Configuration(_))
    }
}
