//! Job definitions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionSpec;
use crate::error::ConfigError;
use crate::trigger::TriggerSpec;

/// A trigger followed by an ordered chain of actions.
///
/// Action order is significant and stable; the id is unique and immutable
/// after creation. Definitions are owned by the administrative layer in
/// front of the engine and submitted as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Inactive jobs keep their definition but run no trigger. Manual fires
    /// and simulations are still allowed.
    #[serde(default)]
    pub active: bool,

    /// Executions retained in history. Failed runs are pinned beyond this
    /// bound until resolved.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Items admitted into the first stage of a simulated run.
    #[serde(default = "default_simulation_limit")]
    pub simulation_limit: u32,

    /// When false, a new fire is refused while the latest execution is
    /// failed. When true, a finished run resolves the preceding failures.
    #[serde(default = "default_fault_tolerant")]
    pub fault_tolerant: bool,

    /// Worker count of parallel stages.
    #[serde(default = "default_num_threads")]
    pub num_threads: u32,

    pub trigger: TriggerSpec,

    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl Job {
    /// Structural validation applied before a definition is loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidParameter(
                "job name must not be empty".to_string(),
            ));
        }
        if self.num_threads == 0 {
            return Err(ConfigError::InvalidParameter(
                "numThreads must be at least 1".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for action in &self.actions {
            if action.id.trim().is_empty() {
                return Err(ConfigError::InvalidParameter(
                    "action id must not be empty".to_string(),
                ));
            }
            if !seen.insert(action.id.as_str()) {
                return Err(ConfigError::InvalidParameter(format!(
                    "duplicate action id: {}",
                    action.id
                )));
            }
        }
        Ok(())
    }

    /// Actions that take part in a run, in chain order.
    pub fn active_actions(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.iter().filter(|action| action.active)
    }

    /// Connectors referenced by the trigger and all active actions.
    pub fn connector_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        if let TriggerSpec::Message { connector_ref, .. } = &self.trigger {
            refs.push(connector_ref.as_str());
        }
        for action in self.active_actions() {
            refs.extend(action.params.connector_refs());
        }
        refs
    }
}

fn default_history_limit() -> u32 {
    5
}

fn default_simulation_limit() -> u32 {
    25
}

fn default_fault_tolerant() -> bool {
    true
}

fn default_num_threads() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_job(actions: serde_json::Value) -> Job {
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "archive-inbox",
            "trigger": { "type": "manual" },
            "actions": actions
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let job = minimal_job(json!([]));
        assert!(!job.active);
        assert_eq!(job.history_limit, 5);
        assert_eq!(job.simulation_limit, 25);
        assert!(job.fault_tolerant);
        assert_eq!(job.num_threads, 1);
    }

    #[test]
    fn test_validate_rejects_duplicate_action_ids() {
        let job = minimal_job(json!([
            { "id": "a", "type": "log" },
            { "id": "a", "type": "log" }
        ]));
        let err = job.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate action id"));
    }

    #[test]
    fn test_inactive_actions_are_skipped() {
        let job = minimal_job(json!([
            { "id": "a", "type": "log" },
            { "id": "b", "type": "log", "active": false },
            { "id": "c", "type": "log" }
        ]));
        let ids: Vec<&str> = job.active_actions().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_connector_refs_include_trigger() {
        let job: Job = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "orders",
            "trigger": { "type": "message", "connectorRef": "queue", "source": "orders.in" },
            "actions": [
                { "id": "fetch", "type": "httpRequest", "connector": "api", "url": "https://example.com" }
            ]
        }))
        .unwrap();
        assert_eq!(job.connector_refs(), vec!["queue", "api"]);
    }
}
