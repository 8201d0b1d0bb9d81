use async_trait::async_trait;
use famulus_core::action::DeleteFileParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Deletes a file and passes the item through unchanged.
pub struct DeleteFileAction {
    params: DeleteFileParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::DeleteFile(params) => Ok(Box::new(DeleteFileAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "deleteFile")),
    }
}

#[async_trait]
impl Action for DeleteFileAction {
    fn kind(&self) -> &'static str {
        "deleteFile"
    }

    fn simulation_safe(&self) -> bool {
        false
    }

    async fn process(
        &self,
        mut item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let file = ctx.render(&self.params.file, &item)?;

        if item.is_simulation() {
            item.log_simulation(format!("Would have deleted file '{file}'."));
            return Ok(vec![item]);
        }

        let connector = ctx.connectors.resolve_file(&self.params.connector).await?;
        connector.delete(&file).await?;
        tracing::info!(job = %ctx.job_name, file = %file, "deleted file");
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

    fn action() -> DeleteFileAction {
        DeleteFileAction {
            params: DeleteFileParams {
                connector: "inbox".to_string(),
                file: "{{data.filename}}".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();

        let ctx = test_support::context(false);
        ctx.connectors
            .register("inbox", test_support::local_file(dir.path()))
            .await;

        let mut item = DataItem::empty(Uuid::new_v4(), false);
        item.put_value("data.filename", json!("a.txt"));
        action().process(item, &ctx).await.unwrap();

        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_simulation_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();

        let ctx = test_support::context(true);
        ctx.connectors
            .register("inbox", test_support::local_file(dir.path()))
            .await;

        let mut item = DataItem::empty(Uuid::new_v4(), true);
        item.put_value("data.filename", json!("a.txt"));
        let output = action().process(item, &ctx).await.unwrap();

        assert!(dir.path().join("a.txt").exists());
        assert_eq!(
            output[0].value_at(SIMULATION_LOG_KEY),
            Some(&json!("Would have deleted file 'a.txt'."))
        );
    }
}
