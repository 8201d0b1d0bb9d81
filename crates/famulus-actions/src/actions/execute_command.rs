use async_trait::async_trait;
use famulus_core::action::ExecuteCommandParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};
use serde_json::json;
use tokio::process::Command;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Runs an external command and appends its outcome as `commandResult`
/// with `exitCode`, `stdout` and `stderr`. A non-zero exit code does not
/// fail the run; downstream filters can branch on it.
pub struct ExecuteCommandAction {
    params: ExecuteCommandParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::ExecuteCommand(params) => Ok(Box::new(ExecuteCommandAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "executeCommand")),
    }
}

#[async_trait]
impl Action for ExecuteCommandAction {
    fn kind(&self) -> &'static str {
        "executeCommand"
    }

    fn simulation_safe(&self) -> bool {
        false
    }

    async fn process(
        &self,
        mut item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let command = ctx.render(&self.params.command, &item)?;
        let mut arguments = Vec::with_capacity(self.params.arguments.len());
        for argument in &self.params.arguments {
            arguments.push(ctx.render(argument, &item)?);
        }

        if item.is_simulation() {
            item.log_simulation(format!("Would have executed command '{command}'."));
            return Ok(vec![item]);
        }

        let output = Command::new(&command)
            .args(&arguments)
            .output()
            .await
            .map_err(|e| ActionError::Logic(format!("cannot run '{command}': {e}")))?;

        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            tracing::warn!(
                job = %ctx.job_name,
                command = %command,
                code = exit_code,
                "command failed"
            );
        }

        item.put_extra(
            "commandResult",
            json!({
                "exitCode": exit_code,
                "stdout": String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
                "stderr": String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            }),
        );
        Ok(vec![item])
    }
}
