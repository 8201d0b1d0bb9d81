use async_trait::async_trait;
use chrono::Utc;
use famulus_core::action::FilterTimestampParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Filters items by a timestamp parsed from a templated input value,
/// compared against `now - amount * unit`.
pub struct FilterTimestampAction {
    params: FilterTimestampParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::FilterTimestamp(params) => Ok(Box::new(FilterTimestampAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "filterTimestamp")),
    }
}

#[async_trait]
impl Action for FilterTimestampAction {
    fn kind(&self) -> &'static str {
        "filterTimestamp"
    }

    async fn process(
        &self,
        item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let input = ctx.render(&self.params.input, &item)?;
        let timestamp =
            super::parse_timestamp(&input, &self.params.timestamp_format).map_err(|e| {
                ActionError::Logic(format!(
                    "cannot parse '{input}' with format '{}': {e}",
                    self.params.timestamp_format
                ))
            })?;

        let threshold = Utc::now().naive_utc() - self.params.unit.to_duration(self.params.amount);
        let older = timestamp < threshold;
        let survives = if self.params.drop_older { !older } else { older };

        if survives {
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
    use chrono::Duration;
    use famulus_core::action::TimeUnit;
    use serde_json::json;
    use uuid::Uuid;

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    fn item(timestamp: chrono::DateTime<Utc>) -> DataItem {
        DataItem::new(
            Uuid::new_v4(),
            false,
            json!({ "seen": timestamp.format(FORMAT).to_string() }),
        )
    }

    fn action(drop_older: bool) -> FilterTimestampAction {
        FilterTimestampAction {
            params: FilterTimestampParams {
                input: "{{data.seen}}".to_string(),
                timestamp_format: FORMAT.to_string(),
                amount: 1,
                unit: TimeUnit::Hours,
                drop_older,
            },
        }
    }

    #[tokio::test]
    async fn test_drop_older_keeps_recent_items() {
        let ctx = test_support::context(false);
        let action = action(true);

        let recent = item(Utc::now() - Duration::minutes(5));
        let old = item(Utc::now() - Duration::hours(3));

        assert_eq!(action.process(recent, &ctx).await.unwrap().len(), 1);
        assert!(action.process(old, &ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inverted_filter_keeps_old_items() {
        let ctx = test_support::context(false);
        let action = action(false);

        let old = item(Utc::now() - Duration::hours(3));
        assert_eq!(action.process(old, &ctx).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unparsable_input_is_a_logic_error() {
        let ctx = test_support::context(false);
        let action = action(true);

        let item = DataItem::new(Uuid::new_v4(), false, json!({ "seen": "not a date" }));
        let err = action.process(item, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::Logic(_)));
    }
}
