use std::collections::HashMap;

use async_trait::async_trait;
use famulus_connectors::ConnectorRegistry;
use famulus_core::{
    ActionParams, ActionSpec, ConcurrencyPolicy, ConfigError, ConnectorFamily, DataItem,
};

use crate::context::ExecutionContext;
use crate::error::ActionError;

/// One stage of a job pipeline.
///
/// Implementations receive items one at a time and may emit zero, one or
/// many items downstream. Instances are built fresh for every run, so
/// stage state like counters and sort buffers never leaks between runs.
#[async_trait]
pub trait Action: Send + Sync {
    /// Type identifier as it appears in job definitions.
    fn kind(&self) -> &'static str;

    /// Whether the stage may run on several worker tasks at once.
    fn concurrency(&self) -> ConcurrencyPolicy {
        ConcurrencyPolicy::Parallel
    }

    /// False for actions with outside effects that a simulated run must
    /// suppress.
    fn simulation_safe(&self) -> bool {
        true
    }

    /// Process one item and return the items to pass downstream.
    async fn process(
        &self,
        item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError>;

    /// Called once after the stage's input is exhausted. Buffering actions
    /// flush their held items here.
    async fn complete(&self, ctx: &ExecutionContext) -> Result<Vec<DataItem>, ActionError> {
        let _ = ctx;
        Ok(Vec::new())
    }
}

impl std::fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action").field("kind", &self.kind()).finish()
    }
}

type ActionConstructor = fn(&ActionSpec) -> Result<Box<dyn Action>, ConfigError>;

/// Registry mapping action type identifiers to constructors.
///
/// Construction doubles as parameter validation: a constructor rejects
/// structurally broken parameters, like a non-templated filter expression
/// that does not compile, at definition load time.
pub struct ActionRegistry {
    constructors: HashMap<&'static str, ActionConstructor>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: &'static str, constructor: ActionConstructor) {
        self.constructors.insert(kind, constructor);
    }

    pub fn has(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// All registered type identifiers, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<&'static str> = self.constructors.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build a stage instance for one run.
    pub fn build(&self, spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
        let kind = spec.params.kind();
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownAction(kind.to_string()))?;
        constructor(spec)
    }

    /// Check an action definition without running it: parameters must
    /// construct and every referenced connector must exist with the
    /// family the action expects.
    pub async fn validate(
        &self,
        spec: &ActionSpec,
        connectors: &ConnectorRegistry,
    ) -> Result<(), ConfigError> {
        self.build(spec)?;
        for (id, family) in required_connectors(&spec.params) {
            match connectors.family_of(id).await {
                None => return Err(ConfigError::UnknownConnector(id.to_string())),
                Some(actual) if actual != family => {
                    return Err(ConfigError::ConnectorKind {
                        id: id.to_string(),
                        expected: family.as_str(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        crate::actions::default_registry()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Connector references of an action together with the family each
/// reference must resolve to.
pub fn required_connectors(params: &ActionParams) -> Vec<(&str, ConnectorFamily)> {
    match params {
        ActionParams::ListFiles(p) => vec![(p.connector.as_str(), ConnectorFamily::FileHandling)],
        ActionParams::ReadFile(p) => vec![(p.connector.as_str(), ConnectorFamily::FileHandling)],
        ActionParams::CopyFile(p) => vec![
            (p.source.as_str(), ConnectorFamily::FileHandling),
            (p.target.as_str(), ConnectorFamily::FileHandling),
        ],
        ActionParams::MoveFile(p) => vec![(p.connector.as_str(), ConnectorFamily::FileHandling)],
        ActionParams::DeleteFile(p) => vec![(p.connector.as_str(), ConnectorFamily::FileHandling)],
        ActionParams::HttpRequest(p) => vec![(p.connector.as_str(), ConnectorFamily::Web)],
        ActionParams::SendMessage(p) => vec![(p.connector.as_str(), ConnectorFamily::Messaging)],
        ActionParams::QueryData(p) => vec![(p.connector.as_str(), ConnectorFamily::Data)],
        _ => Vec::new(),
    }
}
