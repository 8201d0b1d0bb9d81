use async_trait::async_trait;
use famulus_core::action::DuplicateParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Emits N copies of every item, mostly useful for load tests.
pub struct DuplicateAction {
    params: DuplicateParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::Duplicate(params) => Ok(Box::new(DuplicateAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "duplicate")),
    }
}

#[async_trait]
impl Action for DuplicateAction {
    fn kind(&self) -> &'static str {
        "duplicate"
    }

    async fn process(
        &self,
        item: DataItem,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        Ok((0..self.params.amount).map(|_| item.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_emits_the_configured_amount() {
        let ctx = test_support::context(false);
        let action = DuplicateAction {
            params: DuplicateParams { amount: 3 },
        };

        let item = DataItem::empty(Uuid::new_v4(), false);
        let output = action.process(item, &ctx).await.unwrap();
        assert_eq!(output.len(), 3);
    }
}
