use async_trait::async_trait;
use famulus_core::action::AddDataParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Merges a configured object into the item's `data`. String values may be
/// templated and are rendered against the item before merging.
pub struct AddDataAction {
    params: AddDataParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::AddData(params) => {
            if !params.json.is_object() {
                return Err(ConfigError::InvalidParameter(format!(
                    "action '{}': json must be an object",
                    spec.id
                )));
            }
            Ok(Box::new(AddDataAction {
                params: params.clone(),
            }))
        }
        _ => Err(super::mismatch(spec, "addData")),
    }
}

#[async_trait]
impl Action for AddDataAction {
    fn kind(&self) -> &'static str {
        "addData"
    }

    async fn process(
        &self,
        mut item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let rendered = ctx.render_value(&self.params.json, &item)?;
        let object = rendered
            .as_object()
            .cloned()
            .ok_or_else(|| ActionError::Logic("rendered json is not an object".to_string()))?;

        if !item.data.is_object() {
            item.data = Value::Object(Map::new());
        }
        if let Some(data) = item.data.as_object_mut() {
            for (key, value) in object {
                data.insert(key, value);
            }
        }
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
    async fn test_merges_rendered_values_into_data() {
        let ctx = test_support::context(false);
        let action = AddDataAction {
            params: AddDataParams {
                json: json!({ "label": "copy of {{data.filename}}", "priority": 3 }),
            },
        };

        let item = DataItem::new(Uuid::new_v4(), false, json!({ "filename": "a.txt" }));
        let output = action.process(item, &ctx).await.unwrap();

        assert_eq!(
            output[0].value_at("data.label"),
            Some(&json!("copy of a.txt"))
        );
        assert_eq!(output[0].value_at("data.priority"), Some(&json!(3)));
        assert_eq!(output[0].value_at("data.filename"), Some(&json!("a.txt")));
    }

    #[test]
    fn test_non_object_json_rejected_at_build() {
        let spec: ActionSpec = serde_json::from_value(json!({
            "id": "enrich",
            "type": "addData",
            "json": [1, 2, 3]
        }))
        .unwrap();
        assert!(matches!(
            construct(&spec),
            Err(ConfigError::InvalidParameter(_))
        ));
    }
}
