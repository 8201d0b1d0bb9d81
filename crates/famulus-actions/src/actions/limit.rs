use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use famulus_core::action::LimitParams;
use famulus_core::{ActionParams, ActionSpec, ConcurrencyPolicy, ConfigError, DataItem};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Passes the first N items of a run and drops the rest.
pub struct LimitAction {
    params: LimitParams,
    seen: AtomicU64,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::Limit(params) => Ok(Box::new(LimitAction {
            params: params.clone(),
            seen: AtomicU64::new(0),
        })),
        _ => Err(super::mismatch(spec, "limit")),
    }
}

#[async_trait]
impl Action for LimitAction {
    fn kind(&self) -> &'static str {
        "limit"
    }

    fn concurrency(&self) -> ConcurrencyPolicy {
        ConcurrencyPolicy::SingleThreaded
    }

    async fn process(
        &self,
        item: DataItem,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        if self.seen.fetch_add(1, Ordering::SeqCst) < self.params.number {
            Ok(vec![item])
        } else {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_passes_only_the_first_items() {
        let ctx = test_support::context(false);
        let action = LimitAction {
            params: LimitParams { number: 2 },
            seen: AtomicU64::new(0),
        };

        let mut passed = 0;
        for _ in 0..5 {
            let item = DataItem::empty(Uuid::new_v4(), false);
            passed += action.process(item, &ctx).await.unwrap().len();
        }
        assert_eq!(passed, 2);
    }
}
