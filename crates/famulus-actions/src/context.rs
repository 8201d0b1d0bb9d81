use std::sync::Arc;

use famulus_connectors::ConnectorRegistry;
use famulus_core::{CancelFlag, DataItem, JobStateStore, TemplateError, TemplateEngine};
use serde_json::Value;
use uuid::Uuid;

/// Shared context handed to every action of a running job.
///
/// One context is built per execution and cloned into each stage. The
/// state store and cancel flag are shared across stages, so a persisted
/// value is visible to filters of the same run and a cancel request
/// reaches all of them.
#[derive(Clone)]
pub struct ExecutionContext {
    pub job_id: Uuid,
    pub execution_id: Uuid,
    pub job_name: String,
    pub simulation: bool,
    pub template: Arc<TemplateEngine>,
    pub connectors: Arc<ConnectorRegistry>,
    pub state: Arc<JobStateStore>,
    pub cancel: CancelFlag,
}

impl ExecutionContext {
    pub fn new(
        job_id: Uuid,
        execution_id: Uuid,
        job_name: impl Into<String>,
        simulation: bool,
        template: Arc<TemplateEngine>,
        connectors: Arc<ConnectorRegistry>,
        state: Arc<JobStateStore>,
    ) -> Self {
        Self {
            job_id,
            execution_id,
            job_name: job_name.into(),
            simulation,
            template,
            connectors,
            state,
            cancel: CancelFlag::new(),
        }
    }

    /// Renders a parameter template against the item's context.
    pub fn render(&self, template: &str, item: &DataItem) -> Result<String, TemplateError> {
        self.template.render(template, &item.to_context())
    }

    /// Renders every string nested in `value` against the item's context.
    pub fn render_value(&self, value: &Value, item: &DataItem) -> Result<Value, TemplateError> {
        self.template.render_value(value, &item.to_context())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
