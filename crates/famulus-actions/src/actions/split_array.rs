use async_trait::async_trait;
use famulus_core::action::SplitArrayParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Fans an array out into one item per element. The element replaces the
/// array at the configured path.
pub struct SplitArrayAction {
    params: SplitArrayParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::SplitArray(params) => Ok(Box::new(SplitArrayAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "splitArray")),
    }
}

#[async_trait]
impl Action for SplitArrayAction {
    fn kind(&self) -> &'static str {
        "splitArray"
    }

    async fn process(
        &self,
        item: DataItem,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let path = &self.params.input;
        let entries = match item.value_at(path) {
            Some(Value::Array(entries)) => entries.clone(),
            Some(_) => {
                return Err(ActionError::Logic(format!(
                    "value at '{path}' is not an array"
                )))
            }
            None => return Err(ActionError::Logic(format!("no value at '{path}'"))),
        };

        let mut output = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut next = item.clone();
            next.put_value(path, entry);
            output.push(next);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use serde_json::json;
    use uuid::Uuid;

    fn action(path: &str) -> SplitArrayAction {
        SplitArrayAction {
            params: SplitArrayParams {
                input: path.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_fans_out_one_item_per_element() {
        let ctx = test_support::context(false);
        let item = DataItem::new(
            Uuid::new_v4(),
            false,
            json!({ "entries": [{ "n": 1 }, { "n": 2 }, { "n": 3 }] }),
        );

        let output = action("data.entries").process(item, &ctx).await.unwrap();

        assert_eq!(output.len(), 3);
        assert_eq!(output[1].value_at("data.entries.n"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_non_array_is_a_logic_error() {
        let ctx = test_support::context(false);
        let item = DataItem::new(Uuid::new_v4(), false, json!({ "entries": 7 }));

        let err = action("data.entries").process(item, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::Logic(_)));
    }
}
