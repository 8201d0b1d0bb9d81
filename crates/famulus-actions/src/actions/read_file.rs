use async_trait::async_trait;
use famulus_core::action::ReadFileParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Reads a file into `data.fileContents`.
pub struct ReadFileAction {
    params: ReadFileParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::ReadFile(params) => Ok(Box::new(ReadFileAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "readFile")),
    }
}

#[async_trait]
impl Action for ReadFileAction {
    fn kind(&self) -> &'static str {
        "readFile"
    }

    async fn process(
        &self,
        mut item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let connector = ctx.connectors.resolve_file(&self.params.connector).await?;
        let file = ctx.render(&self.params.file, &item)?;
        let contents = connector.read_to_string(&file).await?;
        item.put_value("data.fileContents", Value::String(contents));
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
    async fn test_reads_templated_file_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.txt"), "hello famulus").unwrap();

        let ctx = test_support::context(false);
        ctx.connectors
            .register("inbox", test_support::local_file(dir.path()))
            .await;

        let action = ReadFileAction {
            params: ReadFileParams {
                connector: "inbox".to_string(),
                file: "{{data.filename}}".to_string(),
            },
        };

        let item = DataItem::new(Uuid::new_v4(), false, json!({ "filename": "report.txt" }));
        let output = action.process(item, &ctx).await.unwrap();

        assert_eq!(output.len(), 1);
        assert_eq!(
            output[0].value_at("data.fileContents"),
            Some(&json!("hello famulus"))
        );
    }
}
