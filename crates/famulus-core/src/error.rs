//! Error types shared across the engine.

use thiserror::Error;

/// Definition-time errors. These are raised while a job or connector is
/// validated and loaded, before any run starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown action type: {0}")]
    UnknownAction(String),

    #[error("unknown connector: {0}")]
    UnknownConnector(String),

    #[error("connector '{id}' is not a {expected} connector")]
    ConnectorKind { id: String, expected: &'static str },

    #[error("connector test failed: {0}")]
    ConnectorTest(String),

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },
}

/// Parameter substitution errors.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template render failed: {0}")]
    Render(#[from] minijinja::Error),
}
