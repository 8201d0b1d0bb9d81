use async_trait::async_trait;
use famulus_core::action::ListFilesParams;
use famulus_core::{ActionParams, ActionSpec, ConcurrencyPolicy, ConfigError, DataItem};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Emits one item per file in a directory.
///
/// Every emitted item carries `data.filename`, `data.directory` and, where
/// the filesystem reports it, `data.lastModified` as an RFC 3339 string.
/// Runs single threaded so downstream stages see files in listing order.
pub struct ListFilesAction {
    params: ListFilesParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::ListFiles(params) => Ok(Box::new(ListFilesAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "listFiles")),
    }
}

#[async_trait]
impl Action for ListFilesAction {
    fn kind(&self) -> &'static str {
        "listFiles"
    }

    fn concurrency(&self) -> ConcurrencyPolicy {
        ConcurrencyPolicy::SingleThreaded
    }

    async fn process(
        &self,
        item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let connector = ctx.connectors.resolve_file(&self.params.connector).await?;
        let directory = ctx.render(&self.params.directory, &item)?;
        let file_ending = ctx.render(&self.params.file_ending, &item)?;

        let files = connector.list_files(&directory, &file_ending).await?;
        tracing::debug!(
            job = %ctx.job_name,
            directory = %directory,
            files = files.len(),
            "listed files"
        );

        let mut output = Vec::with_capacity(files.len());
        for file in files {
            let mut next = item.clone();
            next.put_value("data.filename", Value::String(file.name));
            next.put_value("data.directory", Value::String(file.directory));
            if let Some(modified) = file.last_modified {
                next.put_value("data.lastModified", Value::String(modified.to_rfc3339()));
            }
            output.push(next);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_emits_one_item_per_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("notes.md"), "n").unwrap();

        let ctx = test_support::context(false);
        ctx.connectors
            .register("inbox", test_support::local_file(dir.path()))
            .await;

        let action = ListFilesAction {
            params: ListFilesParams {
                connector: "inbox".to_string(),
                directory: "".to_string(),
                file_ending: ".txt".to_string(),
            },
        };

        let item = DataItem::empty(Uuid::new_v4(), false);
        let output = action.process(item, &ctx).await.unwrap();

        let names: Vec<&str> = output
            .iter()
            .map(|item| item.value_at("data.filename").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert!(output[0].value_at("data.lastModified").is_some());
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_support::context(false);
        ctx.connectors
            .register("inbox", test_support::local_file(dir.path()))
            .await;

        let action = ListFilesAction {
            params: ListFilesParams {
                connector: "inbox".to_string(),
                directory: "missing".to_string(),
                file_ending: String::new(),
            },
        };

        let item = DataItem::empty(Uuid::new_v4(), false);
        assert!(action.process(item, &ctx).await.is_err());
    }
}
