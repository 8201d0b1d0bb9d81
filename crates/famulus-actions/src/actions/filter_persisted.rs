use async_trait::async_trait;
use famulus_core::action::FilterPersistedParams;
use famulus_core::{ActionParams, ActionSpec, ConcurrencyPolicy, ConfigError, DataItem};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Drops items whose input value was persisted by an earlier run, the
/// usual guard against processing the same file twice.
pub struct FilterPersistedAction {
    params: FilterPersistedParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::FilterPersisted(params) => Ok(Box::new(FilterPersistedAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "filterPersisted")),
    }
}

#[async_trait]
impl Action for FilterPersistedAction {
    fn kind(&self) -> &'static str {
        "filterPersisted"
    }

    fn concurrency(&self) -> ConcurrencyPolicy {
        ConcurrencyPolicy::SingleThreaded
    }

    async fn process(
        &self,
        item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let input = ctx.render(&self.params.input, &item)?;
        if ctx.state.contains(&Value::String(input)) {
            Ok(Vec::new())
        } else {
            Ok(vec![item])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_drops_already_persisted_values() {
        let ctx = test_support::context(false);
        ctx.state.persist(json!("a.txt"));

        let action = FilterPersistedAction {
            params: FilterPersistedParams {
                input: "{{data.filename}}".to_string(),
            },
        };

        let seen = DataItem::new(Uuid::new_v4(), false, json!({ "filename": "a.txt" }));
        let fresh = DataItem::new(Uuid::new_v4(), false, json!({ "filename": "b.txt" }));

        assert!(action.process(seen, &ctx).await.unwrap().is_empty());
        assert_eq!(action.process(fresh, &ctx).await.unwrap().len(), 1);
    }
}
