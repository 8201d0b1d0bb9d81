use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use famulus_core::action::SkipParams;
use famulus_core::{ActionParams, ActionSpec, ConcurrencyPolicy, ConfigError, DataItem};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Drops the first N items of a run and passes the rest.
pub struct SkipAction {
    params: SkipParams,
    seen: AtomicU64,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::Skip(params) => Ok(Box::new(SkipAction {
            params: params.clone(),
            seen: AtomicU64::new(0),
        })),
        _ => Err(super::mismatch(spec, "skip")),
    }
}

#[async_trait]
impl Action for SkipAction {
    fn kind(&self) -> &'static str {
        "skip"
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
    use uuid::Uuid;

    #[tokio::test]
    async fn test_drops_only_the_first_items() {
        let ctx = test_support::context(false);
        let action = SkipAction {
            params: SkipParams { number: 3 },
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
