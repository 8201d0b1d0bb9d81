use async_trait::async_trait;
use famulus_core::action::SendMessageParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Publishes a templated message through a messaging connector.
pub struct SendMessageAction {
    params: SendMessageParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::SendMessage(params) => Ok(Box::new(SendMessageAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "sendMessage")),
    }
}

#[async_trait]
impl Action for SendMessageAction {
    fn kind(&self) -> &'static str {
        "sendMessage"
    }

    fn simulation_safe(&self) -> bool {
        false
    }

    async fn process(
        &self,
        mut item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let subject = ctx.render(&self.params.subject, &item)?;
        let message = ctx.render(&self.params.message, &item)?;

        if item.is_simulation() {
            item.log_simulation(format!("Would have sent a message to '{subject}'."));
            return Ok(vec![item]);
        }

        let connector = ctx.connectors.resolve_nats(&self.params.connector).await?;
        connector.publish(&subject, message.into_bytes()).await?;
        tracing::info!(job = %ctx.job_name, subject = %subject, "sent message");
        Ok(vec![item])
    }
}
