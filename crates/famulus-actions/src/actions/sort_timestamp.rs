use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use famulus_core::action::SortTimestampParams;
use famulus_core::{ActionParams, ActionSpec, ConcurrencyPolicy, ConfigError, DataItem};
use regex::Regex;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Buffers all items of a run and emits them sorted by a timestamp
/// extracted from a templated input value.
///
/// The pattern's first match in the input is parsed with the configured
/// format. Emission happens when the stage's input is exhausted, so this
/// stage only produces output once every upstream item arrived.
pub struct SortTimestampAction {
    params: SortTimestampParams,
    pattern: Regex,
    buffer: Mutex<Vec<(NaiveDateTime, DataItem)>>,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::SortTimestamp(params) => {
            let pattern = Regex::new(&params.pattern).map_err(|e| {
                ConfigError::InvalidParameter(format!(
                    "invalid pattern '{}': {e}",
                    params.pattern
                ))
            })?;
            Ok(Box::new(SortTimestampAction {
                params: params.clone(),
                pattern,
                buffer: Mutex::new(Vec::new()),
            }))
        }
        _ => Err(super::mismatch(spec, "sortTimestamp")),
    }
}

#[async_trait]
impl Action for SortTimestampAction {
    fn kind(&self) -> &'static str {
        "sortTimestamp"
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
        let matched = self.pattern.find(&input).ok_or_else(|| {
            ActionError::Logic(format!(
                "no timestamp in '{input}' matching '{}'",
                self.params.pattern
            ))
        })?;
        let timestamp = super::parse_timestamp(matched.as_str(), &self.params.timestamp_format)
            .map_err(|e| {
                ActionError::Logic(format!(
                    "cannot parse '{}' with format '{}': {e}",
                    matched.as_str(),
                    self.params.timestamp_format
                ))
            })?;

        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((timestamp, item));
        Ok(Vec::new())
    }

    async fn complete(&self, _ctx: &ExecutionContext) -> Result<Vec<DataItem>, ActionError> {
        let mut buffered = {
            let mut guard = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        if self.params.sort_ascending {
            buffered.sort_by(|a, b| a.0.cmp(&b.0));
        } else {
            buffered.sort_by(|a, b| b.0.cmp(&a.0));
        }
        Ok(buffered.into_iter().map(|(_, item)| item).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use serde_json::json;
    use uuid::Uuid;

    fn build(ascending: bool) -> Box<dyn Action> {
        construct(
            &serde_json::from_value(json!({
                "id": "sort",
                "type": "sortTimestamp",
                "input": "{{data.filename}}",
                "pattern": r"\d{4}-\d{2}-\d{2}",
                "timestampFormat": "%Y-%m-%d",
                "sortAscending": ascending
            }))
            .unwrap(),
        )
        .unwrap()
    }

    fn item(filename: &str) -> DataItem {
        DataItem::new(Uuid::new_v4(), false, json!({ "filename": filename }))
    }

    #[tokio::test]
    async fn test_emits_sorted_on_complete() {
        let ctx = test_support::context(false);
        let action = build(true);

        for name in ["report-2024-03-01.txt", "report-2024-01-15.txt", "report-2024-02-20.txt"] {
            assert!(action.process(item(name), &ctx).await.unwrap().is_empty());
        }

        let output = action.complete(&ctx).await.unwrap();
        let names: Vec<&str> = output
            .iter()
            .map(|item| item.value_at("data.filename").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "report-2024-01-15.txt",
                "report-2024-02-20.txt",
                "report-2024-03-01.txt"
            ]
        );
    }

    #[tokio::test]
    async fn test_descending_order() {
        let ctx = test_support::context(false);
        let action = build(false);

        action.process(item("a-2024-01-15.txt"), &ctx).await.unwrap();
        action.process(item("b-2024-02-20.txt"), &ctx).await.unwrap();

        let output = action.complete(&ctx).await.unwrap();
        assert_eq!(
            output[0].value_at("data.filename"),
            Some(&json!("b-2024-02-20.txt"))
        );
    }

    #[tokio::test]
    async fn test_missing_timestamp_is_a_logic_error() {
        let ctx = test_support::context(false);
        let action = build(true);

        let err = action.process(item("no-date.txt"), &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::Logic(_)));
    }

    #[test]
    fn test_broken_pattern_rejected_at_build() {
        let spec: ActionSpec = serde_json::from_value(json!({
            "id": "sort",
            "type": "sortTimestamp",
            "input": "{{data.filename}}",
            "pattern": "([unclosed",
            "timestampFormat": "%Y-%m-%d"
        }))
        .unwrap();
        assert!(matches!(
            construct(&spec),
            Err(ConfigError::InvalidParameter(_))
        ));
    }
}
