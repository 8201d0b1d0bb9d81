//! Data items flowing through a job's action chain.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Key under which unsafe actions report their suppressed effect during a
/// simulated run.
pub const SIMULATION_LOG_KEY: &str = "simulationLog";

/// Metadata attached to every data item at fire time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    /// Job this item belongs to.
    pub job_id: Uuid,

    /// True while the item flows through a simulated run.
    pub simulation: bool,

    /// Fire time in epoch milliseconds.
    pub timestamp: i64,
}

/// Unit of payload flowing through a job's action chain.
///
/// Wire shape, consumed by external viewers:
///
/// ```json
/// { "data": { ... },
///   "meta": { "jobId": "<uuid>", "simulation": false, "timestamp": 1700000000000 },
///   "webResponse": { ... } }
/// ```
///
/// `data` is the open-ended payload; keys next to `data` and `meta` are
/// appended by actions (e.g. `copiedFile` after a copy). Items are value
/// objects: every stage consumes one and produces zero or more new ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    pub data: Value,
    pub meta: ItemMeta,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataItem {
    /// Create the initial item of a run.
    pub fn new(job_id: Uuid, simulation: bool, data: Value) -> Self {
        Self {
            data,
            meta: ItemMeta {
                job_id,
                simulation,
                timestamp: Utc::now().timestamp_millis(),
            },
            extra: Map::new(),
        }
    }

    /// Create an empty-payload item, as produced by cron and manual fires.
    pub fn empty(job_id: Uuid, simulation: bool) -> Self {
        Self::new(job_id, simulation, Value::Object(Map::new()))
    }

    pub fn is_simulation(&self) -> bool {
        self.meta.simulation
    }

    /// Append an action-produced key next to `data` and `meta`.
    pub fn put_extra(&mut self, key: &str, value: Value) {
        self.extra.insert(key.to_string(), value);
    }

    /// Record what an unsafe action would have done during a simulation.
    pub fn log_simulation(&mut self, message: impl Into<String>) {
        self.extra
            .insert(SIMULATION_LOG_KEY.to_string(), Value::String(message.into()));
    }

    /// Read the value at a dot-separated path rooted at `data` or an
    /// action-appended key, e.g. `data.filename` or `webResponse.body`.
    pub fn value_at(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = match first {
            "data" => &self.data,
            other => self.extra.get(other)?,
        };
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Write a value at a dot-separated path, creating intermediate objects
    /// along the way. Paths root at `data` or an action-appended key.
    pub fn put_value(&mut self, path: &str, value: Value) {
        let mut parts = path.split('.');
        let first = match parts.next() {
            Some(first) if !first.is_empty() => first,
            _ => return,
        };
        let mut current = match first {
            "data" => &mut self.data,
            other => self
                .extra
                .entry(other.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
        };
        for part in parts {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let object = match current.as_object_mut() {
                Some(object) => object,
                None => return,
            };
            current = object.entry(part.to_string()).or_insert(Value::Null);
        }
        *current = value;
    }

    /// Build the context parameter templates are rendered against: the
    /// item's own wire shape (`data`, `meta` and all appended keys).
    pub fn to_context(&self) -> Value {
        let mut context = Map::new();
        context.insert("data".to_string(), self.data.clone());
        context.insert(
            "meta".to_string(),
            serde_json::json!({
                "jobId": self.meta.job_id.to_string(),
                "simulation": self.meta.simulation,
                "timestamp": self.meta.timestamp,
            }),
        );
        for (key, value) in &self.extra {
            context.insert(key.clone(), value.clone());
        }
        Value::Object(context)
    }
}
