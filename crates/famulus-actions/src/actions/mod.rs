//! Built-in actions.
//!
//! One module per action. Each module exposes a `construct` function the
//! registry dispatches to, so [`default_registry`] is the single place
//! that wires type identifiers to implementations.

pub mod add_data;
pub mod copy_file;
pub mod delete_file;
pub mod duplicate;
pub mod execute_command;
pub mod filter_persisted;
pub mod filter_regexp;
pub mod filter_timestamp;
pub mod http_request;
pub mod limit;
pub mod list_files;
pub mod log;
pub mod move_file;
pub mod pause;
pub mod persist_value;
pub mod query_data;
pub mod read_file;
pub mod send_message;
pub mod skip;
pub mod sort_timestamp;
pub mod split_array;

use famulus_core::{ActionSpec, ConfigError};

use crate::registry::ActionRegistry;

/// Registry with every built-in action registered.
pub fn default_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register("listFiles", list_files::construct);
    registry.register("readFile", read_file::construct);
    registry.register("copyFile", copy_file::construct);
    registry.register("moveFile", move_file::construct);
    registry.register("deleteFile", delete_file::construct);
    registry.register("httpRequest", http_request::construct);
    registry.register("filterRegexp", filter_regexp::construct);
    registry.register("filterTimestamp", filter_timestamp::construct);
    registry.register("filterPersisted", filter_persisted::construct);
    registry.register("persistValue", persist_value::construct);
    registry.register("limit", limit::construct);
    registry.register("skip", skip::construct);
    registry.register("log", log::construct);
    registry.register("pause", pause::construct);
    registry.register("sortTimestamp", sort_timestamp::construct);
    registry.register("splitArray", split_array::construct);
    registry.register("duplicate", duplicate::construct);
    registry.register("addData", add_data::construct);
    registry.register("sendMessage", send_message::construct);
    registry.register("executeCommand", execute_command::construct);
    registry.register("queryData", query_data::construct);
    registry
}

/// Error for a constructor handed a spec of another action type.
pub(crate) fn mismatch(spec: &ActionSpec, expected: &str) -> ConfigError {
    ConfigError::InvalidParameter(format!(
        "action '{}' carries {} parameters, expected {expected}",
        spec.id,
        spec.params.kind()
    ))
}

/// Parse a timestamp with a chrono format string. Date-only formats are
/// accepted and resolve to midnight.
pub(crate) fn parse_timestamp(
    input: &str,
    format: &str,
) -> Result<chrono::NaiveDateTime, chrono::ParseError> {
    chrono::NaiveDateTime::parse_from_str(input, format).or_else(|_| {
        chrono::NaiveDate::parse_from_str(input, format)
            .map(|date| date.and_time(chrono::NaiveTime::MIN))
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::Arc;

    use famulus_connectors::ConnectorRegistry;
    use famulus_core::connector::LocalFileParams;
    use famulus_core::{ConnectorSpec, JobStateStore, TemplateEngine};
    use uuid::Uuid;

    use crate::context::ExecutionContext;

    pub fn context(simulation: bool) -> ExecutionContext {
        ExecutionContext::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "test-job",
            simulation,
            Arc::new(TemplateEngine::new()),
            Arc::new(ConnectorRegistry::new()),
            Arc::new(JobStateStore::new()),
        )
    }

    pub fn local_file(root: &Path) -> ConnectorSpec {
        ConnectorSpec::LocalFile(LocalFileParams {
            root: root.to_string_lossy().to_string(),
        })
    }
}
