use async_trait::async_trait;
use famulus_core::action::PersistValueParams;
use famulus_core::{ActionParams, ActionSpec, ConcurrencyPolicy, ConfigError, DataItem};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Persists the input value into the job's store so later runs can filter
/// against it. Once the stage's input is exhausted the store is trimmed to
/// the configured size, oldest values first.
pub struct PersistValueAction {
    params: PersistValueParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::PersistValue(params) => Ok(Box::new(PersistValueAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "persistValue")),
    }
}

#[async_trait]
impl Action for PersistValueAction {
    fn kind(&self) -> &'static str {
        "persistValue"
    }

    fn concurrency(&self) -> ConcurrencyPolicy {
        ConcurrencyPolicy::SingleThreaded
    }

    fn simulation_safe(&self) -> bool {
        false
    }

    async fn process(
        &self,
        mut item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let input = ctx.render(&self.params.input, &item)?;

        if item.is_simulation() {
            item.log_simulation(format!("Would have persisted: '{input}'"));
            return Ok(vec![item]);
        }

        if ctx.state.persist(Value::String(input.clone())) {
            tracing::debug!(job = %ctx.job_name, value = %input, "persisted value");
        }
        Ok(vec![item])
    }

    async fn complete(&self, ctx: &ExecutionContext) -> Result<Vec<DataItem>, ActionError> {
        if !ctx.simulation && self.params.num_values_to_keep > 0 {
            ctx.state.trim(self.params.num_values_to_keep as usize);
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use famulus_core::item::SIMULATION_LOG_KEY;
    use serde_json::json;
    use uuid::Uuid;

    fn action(keep: u32) -> PersistValueAction {
        PersistValueAction {
            params: PersistValueParams {
                input: "{{data.filename}}".to_string(),
                num_values_to_keep: keep,
            },
        }
    }

    fn item(filename: &str, simulation: bool) -> DataItem {
        DataItem::new(
            Uuid::new_v4(),
            simulation,
            json!({ "filename": filename }),
        )
    }

    #[tokio::test]
    async fn test_persists_and_trims_on_complete() {
        let ctx = test_support::context(false);
        let action = action(2);

        for name in ["a.txt", "b.txt", "c.txt"] {
            action.process(item(name, false), &ctx).await.unwrap();
        }
        assert_eq!(ctx.state.len(), 3);

        action.complete(&ctx).await.unwrap();
        assert_eq!(ctx.state.len(), 2);
        assert!(!ctx.state.contains(&json!("a.txt")));
        assert!(ctx.state.contains(&json!("c.txt")));
    }

    #[tokio::test]
    async fn test_simulation_leaves_store_untouched() {
        let ctx = test_support::context(true);
        let action = action(0);

        let output = action.process(item("a.txt", true), &ctx).await.unwrap();
        action.complete(&ctx).await.unwrap();

        assert!(ctx.state.is_empty());
        assert_eq!(
            output[0].value_at(SIMULATION_LOG_KEY),
            Some(&json!("Would have persisted: 'a.txt'"))
        );
    }
}
