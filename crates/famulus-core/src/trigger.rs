//! Trigger definitions.

use serde::{Deserialize, Serialize};

/// How a job's runs are started.
///
/// Every fire produces one or more initial [`DataItem`](crate::DataItem)s:
/// cron and manual fires produce a single empty-payload item, webhook and
/// message fires carry the inbound payload as `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TriggerSpec {
    /// Six-field cron schedule: second, minute, hour, day-of-month, month,
    /// day-of-week.
    Cron { expression: String },

    /// Fires only on explicit command. Also used to seed simulations.
    Manual,

    /// Fires on an inbound request addressed to the job. The token is
    /// routing information for the transport layer in front of the engine.
    WebHook { token: String },

    /// Subscribes to a source provided by a messaging connector; every
    /// inbound message yields one run.
    Message {
        #[serde(rename = "connectorRef")]
        connector_ref: String,
        source: String,
    },
}

impl TriggerSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerSpec::Cron { .. } => "cron",
            TriggerSpec::Manual => "manual",
            TriggerSpec::WebHook { .. } => "webHook",
            TriggerSpec::Message { .. } => "message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_tagging() {
        let parsed: TriggerSpec =
            serde_json::from_value(serde_json::json!({ "type": "cron", "expression": "0 * * * * *" }))
                .unwrap();
        assert_eq!(
            parsed,
            TriggerSpec::Cron {
                expression: "0 * * * * *".to_string()
            }
        );

        let parsed: TriggerSpec = serde_json::from_value(serde_json::json!({
            "type": "message",
            "connectorRef": "queue",
            "source": "inbound.orders"
        }))
        .unwrap();
        assert_eq!(parsed.kind(), "message");

        let manual = serde_json::to_value(TriggerSpec::Manual).unwrap();
        assert_eq!(manual["type"], "manual");
    }
}
