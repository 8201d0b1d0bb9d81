use async_trait::async_trait;
use famulus_core::action::CopyFileParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};
use serde_json::json;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Copies a file between two file connectors and appends a `copiedFile`
/// key with the resolved paths. A simulated run records the copy it would
/// have performed instead of touching the target.
pub struct CopyFileAction {
    params: CopyFileParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::CopyFile(params) => Ok(Box::new(CopyFileAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "copyFile")),
    }
}

#[async_trait]
impl Action for CopyFileAction {
    fn kind(&self) -> &'static str {
        "copyFile"
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
                "Would have copied '{source_file}' to '{target_file}'."
            ));
            return Ok(vec![item]);
        }

        let source = ctx.connectors.resolve_file(&self.params.source).await?;
        let target = ctx.connectors.resolve_file(&self.params.target).await?;
        let bytes = source
            .copy_to(
                &source_file,
                &target,
                &target_file,
                self.params.transfer_suffix,
            )
            .await?;
        tracing::info!(
            job = %ctx.job_name,
            source = %source_file,
            target = %target_file,
            bytes,
            "copied file"
        );

        item.put_extra(
            "copiedFile",
            json!({ "sourceFile": source_file, "targetFile": target_file, "bytes": bytes }),
        );
        Ok(vec![item])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use famulus_core::item::SIMULATION_LOG_KEY;
    use uuid::Uuid;

    fn action() -> CopyFileAction {
        CopyFileAction {
            params: CopyFileParams {
                source: "in".to_string(),
                source_file: "{{data.filename}}".to_string(),
                target: "out".to_string(),
                target_file: "archive/{{data.filename}}".to_string(),
                transfer_suffix: true,
            },
        }
    }

    #[tokio::test]
    async fn test_copies_and_reports_paths() {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        std::fs::write(source_dir.path().join("a.txt"), "payload").unwrap();

        let ctx = test_support::context(false);
        ctx.connectors
            .register("in", test_support::local_file(source_dir.path()))
            .await;
        ctx.connectors
            .register("out", test_support::local_file(target_dir.path()))
            .await;

        let mut item = DataItem::empty(Uuid::new_v4(), false);
        item.put_value("data.filename", json!("a.txt"));
        let output = action().process(item, &ctx).await.unwrap();

        assert!(target_dir.path().join("archive/a.txt").exists());
        assert_eq!(
            output[0].value_at("copiedFile.targetFile"),
            Some(&json!("archive/a.txt"))
        );
    }

    #[tokio::test]
    async fn test_simulation_suppresses_the_copy() {
        let ctx = test_support::context(true);

        let mut item = DataItem::empty(Uuid::new_v4(), true);
        item.put_value("data.filename", json!("a.txt"));
        let output = action().process(item, &ctx).await.unwrap();

        // No connector was resolved, so nothing was copied.
        assert_eq!(
            output[0].value_at(SIMULATION_LOG_KEY),
            Some(&json!("Would have copied 'a.txt' to 'archive/a.txt'."))
        );
        assert!(output[0].value_at("copiedFile").is_none());
    }
}
