//! Execution records and the run state machine.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cause recorded when a run is cancelled instead of finishing.
pub const CANCELLED_CAUSE: &str = "cancelled";

/// Lifecycle of one run.
///
/// `Waiting` runs are queued for a free execution slot. A `Failed` run may
/// later become `Resolved`, either explicitly or because a later run of a
/// fault tolerant job finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionState {
    Waiting,
    Running,
    Finished,
    Failed,
    Resolved,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Finished | ExecutionState::Failed | ExecutionState::Resolved
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Waiting => "waiting",
            ExecutionState::Running => "running",
            ExecutionState::Finished => "finished",
            ExecutionState::Failed => "failed",
            ExecutionState::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

/// One run of a job, as kept in the execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub state: ExecutionState,
    pub created: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,

    /// Why the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_cause: Option<String>,

    /// Id of the action that raised the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_action: Option<String>,

    /// Stage the run most recently entered, for operator inspection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_action: Option<String>,

    /// Event log of message-driven runs, one line per consumed message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
}

impl JobExecution {
    /// Create a freshly queued run.
    pub fn waiting(job_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            state: ExecutionState::Waiting,
            created: Utc::now(),
            started: None,
            finished: None,
            error_cause: None,
            failed_action: None,
            current_action: None,
            events: Vec::new(),
        }
    }

    pub fn mark_running(&mut self) {
        self.state = ExecutionState::Running;
        self.started = Some(Utc::now());
    }

    pub fn mark_finished(&mut self) {
        self.state = ExecutionState::Finished;
        self.finished = Some(Utc::now());
        self.current_action = None;
    }

    pub fn mark_failed(&mut self, cause: impl Into<String>, failed_action: Option<String>) {
        self.state = ExecutionState::Failed;
        self.finished = Some(Utc::now());
        self.error_cause = Some(cause.into());
        self.failed_action = failed_action;
    }

    pub fn mark_cancelled(&mut self) {
        self.mark_failed(CANCELLED_CAUSE, None);
    }

    pub fn mark_resolved(&mut self) {
        self.state = ExecutionState::Resolved;
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Shared cancellation flag of one run.
///
/// Cancellation is cooperative: stage workers check the flag at item
/// boundaries and stop intake, they are never pre-empted mid-item.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut execution = JobExecution::waiting(Uuid::new_v4());
        assert_eq!(execution.state, ExecutionState::Waiting);
        assert!(!execution.is_terminal());

        execution.mark_running();
        assert_eq!(execution.state, ExecutionState::Running);
        assert!(execution.started.is_some());

        execution.mark_failed("boom", Some("copy-1".to_string()));
        assert_eq!(execution.state, ExecutionState::Failed);
        assert_eq!(execution.error_cause.as_deref(), Some("boom"));
        assert_eq!(execution.failed_action.as_deref(), Some("copy-1"));
        assert!(execution.is_terminal());

        execution.mark_resolved();
        assert_eq!(execution.state, ExecutionState::Resolved);
    }

    #[test]
    fn test_cancelled_runs_are_failed() {
        let mut execution = JobExecution::waiting(Uuid::new_v4());
        execution.mark_running();
        execution.mark_cancelled();
        assert_eq!(execution.state, ExecutionState::Failed);
        assert_eq!(execution.error_cause.as_deref(), Some(CANCELLED_CAUSE));
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_wire_names() {
        let execution = JobExecution::waiting(Uuid::new_v4());
        let wire = serde_json::to_value(&execution).unwrap();
        assert_eq!(wire["state"], "waiting");
        assert!(wire.get("errorCause").is_none());
        assert!(wire.get("jobId").is_some());
    }
}
