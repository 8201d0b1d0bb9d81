use async_trait::async_trait;
use famulus_core::action::MoveFileParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};
use serde_json::json;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Renames a file within one connector and appends a `movedFile` key.
pub struct MoveFileAction {
    params: MoveFileParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::MoveFile(params) => Ok(Box::new(MoveFileAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "moveFile")),
    }
}

#[async_trait]
impl Action for MoveFileAction {
    fn kind(&self) -> &'static str {
        "moveFile"
    }

    fn simulation_safe(&self) -> bool {
        false
    }

    async fn process(
        &self,
        mut item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let source_file = ctx.render(&self.params.source_file, &item)?;
        let target_file = ctx.render(&self.params.target_file, &item)?;

        if item.is_simulation() {
            item.log_simulation(format!(
                "Would have moved '{source_file}' to '{target_file}'."
            ));
            return Ok(vec![item]);
        }

        let connector = ctx.connectors.resolve_file(&self.params.connector).await?;
        connector.rename(&source_file, &target_file).await?;
        tracing::info!(
            job = %ctx.job_name,
            source = %source_file,
            target = %target_file,
            "moved file"
        );

        item.put_extra(
            "movedFile",
            json!({ "sourceFile": source_file, "targetFile": target_file }),
        );
        Ok(vec![item])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_moves_within_connector() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();

        let ctx = test_support::context(false);
        ctx.connectors
            .register("inbox", test_support::local_file(dir.path()))
            .await;

        let action = MoveFileAction {
            params: MoveFileParams {
                connector: "inbox".to_string(),
                source_file: "a.txt".to_string(),
                target_file: "done/a.txt".to_string(),
            },
        };

        let item = DataItem::empty(Uuid::new_v4(), false);
        let output = action.process(item, &ctx).await.unwrap();

        assert!(!dir.path().join("a.txt").exists());
        assert!(dir.path().join("done/a.txt").exists());
        assert_eq!(
            output[0].value_at("movedFile.sourceFile"),
            Some(&json!("a.txt"))
        );
    }
}
