use async_trait::async_trait;
use famulus_core::action::QueryDataParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Runs a templated SQL statement through a data connector and appends the
/// result as `queryResult`.
pub struct QueryDataAction {
    params: QueryDataParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::QueryData(params) => Ok(Box::new(QueryDataAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "queryData")),
    }
}

#[async_trait]
impl Action for QueryDataAction {
    fn kind(&self) -> &'static str {
        "queryData"
    }

    fn simulation_safe(&self) -> bool {
        false
    }

    async fn process(
        &self,
        mut item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let query = ctx.render(&self.params.query, &item)?;

        if item.is_simulation() {
            item.log_simulation(format!("Would have executed query '{query}'."));
            return Ok(vec![item]);
        }

        let connector = ctx
            .connectors
            .resolve_postgres(&self.params.connector)
            .await?;
        let result = connector.query(&query).await?;
        tracing::debug!(job = %ctx.job_name, "query done");

        item.put_extra("queryResult", result);
        Ok(vec![item])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use famulus_core::item::SIMULATION_LOG_KEY;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_simulation_suppresses_the_query() {
        let ctx = test_support::context(true);
        let action = QueryDataAction {
            params: QueryDataParams {
                connector: "warehouse".to_string(),
                query: "DELETE FROM runs WHERE job = '{{data.job}}'".to_string(),
            },
        };

        let item = DataItem::new(Uuid::new_v4(), true, json!({ "job": "cleanup" }));
        let output = action.process(item, &ctx).await.unwrap();

        assert_eq!(
            output[0].value_at(SIMULATION_LOG_KEY),
            Some(&json!(
                "Would have executed query 'DELETE FROM runs WHERE job = 'cleanup''."
            ))
        );
        assert!(output[0].value_at("queryResult").is_none());
    }
}
