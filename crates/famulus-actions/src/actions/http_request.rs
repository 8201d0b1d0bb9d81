use async_trait::async_trait;
use famulus_core::action::HttpRequestParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};
use serde_json::json;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Sends an HTTP request through a web connector and appends the response
/// as `webResponse` with `status` and `body`.
pub struct HttpRequestAction {
    params: HttpRequestParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::HttpRequest(params) => Ok(Box::new(HttpRequestAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "httpRequest")),
    }
}

#[async_trait]
impl Action for HttpRequestAction {
    fn kind(&self) -> &'static str {
        "httpRequest"
    }

    fn simulation_safe(&self) -> bool {
        false
    }

    async fn process(
        &self,
        mut item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let url = ctx.render(&self.params.url, &item)?;

        if item.is_simulation() {
            item.log_simulation(format!(
                "Would have executed a {} request against '{url}'.",
                self.params.method.as_str()
            ));
            return Ok(vec![item]);
        }

        let connector = ctx.connectors.resolve_http(&self.params.connector).await?;
        let mut headers = Vec::with_capacity(self.params.headers.len());
        for (key, value) in &self.params.headers {
            headers.push((key.clone(), ctx.render(value, &item)?));
        }
        let body = ctx.render(&self.params.body, &item)?;

        let response = connector
            .request(self.params.method, &url, &headers, &body)
            .await?;
        tracing::debug!(
            job = %ctx.job_name,
            url = %url,
            status = response.status,
            "http request done"
        );

        item.put_extra(
            "webResponse",
            json!({ "status": response.status, "body": response.body }),
        );
        Ok(vec![item])
    }
}
