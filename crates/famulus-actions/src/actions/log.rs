use async_trait::async_trait;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Writes the item to the log and passes it through unchanged.
pub struct LogAction;

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::Log(_) => Ok(Box::new(LogAction)),
        _ => Err(super::mismatch(spec, "log")),
    }
}

#[async_trait]
impl Action for LogAction {
    fn kind(&self) -> &'static str {
        "log"
    }

    async fn process(
        &self,
        item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let wire = serde_json::to_string(&item).unwrap_or_else(|_| "<unserializable>".to_string());
        tracing::info!(
            job = %ctx.job_name,
            execution = %ctx.execution_id,
            item = %wire,
            "data item"
        );
        Ok(vec![item])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_passes_item_through() {
        let ctx = test_support::context(false);
        let item = DataItem::new(Uuid::new_v4(), false, json!({ "x": 1 }));

        let output = LogAction.process(item.clone(), &ctx).await.unwrap();
        assert_eq!(output, vec![item]);
    }
}
