use famulus_connectors::ConnectorError;
use famulus_core::{ConfigError, TemplateError};
use thiserror::Error;

/// Errors raised while an action processes data items.
///
/// `Connector` wraps transient infrastructure failures, `Logic` marks
/// items or parameters the action cannot work with. The executor treats
/// both the same way and fails the execution; the distinction is kept
/// for log output and error causes in the run history.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("action logic error: {0}")]
    Logic(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActionError {
    /// True for failures that may succeed on a later run without a
    /// definition change.
    pub fn is_transient(&self) -> bool {
        match self {
            ActionError::Connector(err) => err.is_transient(),
            ActionError::Io(_) => true,
            ActionError::Configuration(_) | ActionError::Template(_) | ActionError::Logic(_) => {
                false
            }
        }
    }
}
